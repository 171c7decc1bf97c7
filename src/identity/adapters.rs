//! In-memory collaborators. They count calls, can be switched into failure, and can
//! hold calls behind a gate so callers can interleave slow lookups with other events.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::audit::AuditEntry;
use super::permissions::AdminPermissions;
use super::principal::{Identity, Profile, Session, UserRole};
use super::provider::{AuditSink, AuthEvent, AuthorizationStore, IdentityService, ProfileStore, SignInRequest, SignUpRequest};

/// Open by default; `hold` closes it until `release`.
struct Gate {
    tx: watch::Sender<bool>,
}

impl Default for Gate {
    fn default() -> Self { Self { tx: watch::channel(true).0 } }
}

impl Gate {
    fn hold(&self) { self.tx.send_replace(false); }
    fn release(&self) { self.tx.send_replace(true); }
    async fn pass(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

fn offline(what: &str) -> AppError {
    AppError::transport("network_error".to_string(), format!("{} unavailable", what))
}

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: String,
}

pub struct MemoryIdentityService {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    session_fetches: AtomicUsize,
    sign_out_calls: AtomicUsize,
    fail_session_fetch: AtomicBool,
    fail_sign_out: AtomicBool,
    gate: Gate,
}

impl MemoryIdentityService {
    pub fn new(event_buffer: usize) -> Self {
        let (events, _rx) = broadcast::channel(event_buffer.max(1));
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            session_fetches: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            fail_session_fetch: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            gate: Gate::default(),
        }
    }

    /// A fresh one-hour session for `id`.
    pub fn session_for(id: Identity) -> Session {
        Session {
            identity: id,
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: Some(Uuid::new_v4().simple().to_string()),
            email: None,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    /// Seed an account without going through sign-up.
    pub fn register(&self, email: &str, password: &str) -> Identity {
        let identity = Identity::new_v4();
        self.accounts
            .lock()
            .insert(email.trim().to_ascii_lowercase(), Account { identity, password: password.to_string() });
        identity
    }

    /// Pretend a session survived from a previous run.
    pub fn restore(&self, session: Session) { *self.current.lock() = Some(session); }

    pub fn current(&self) -> Option<Session> { self.current.lock().clone() }

    /// Push a notification to every subscriber.
    pub fn emit(&self, event: AuthEvent) { let _ = self.events.send(event); }

    /// Rotate the current session's token and announce it as a refresh.
    pub fn refresh(&self) -> Option<Session> {
        let rotated = {
            let mut cur = self.current.lock();
            let s = cur.as_mut()?;
            s.access_token = Uuid::new_v4().simple().to_string();
            s.expires_at = Utc::now() + Duration::hours(1);
            s.clone()
        };
        self.emit(AuthEvent::Refreshed(rotated.clone()));
        Some(rotated)
    }

    pub fn subscriber_count(&self) -> usize { self.events.receiver_count() }
    pub fn session_fetches(&self) -> usize { self.session_fetches.load(Ordering::SeqCst) }
    pub fn sign_out_calls(&self) -> usize { self.sign_out_calls.load(Ordering::SeqCst) }
    pub fn fail_session_fetch(&self, on: bool) { self.fail_session_fetch.store(on, Ordering::SeqCst); }
    pub fn fail_sign_out(&self, on: bool) { self.fail_sign_out.store(on, Ordering::SeqCst); }
    pub fn hold(&self) { self.gate.hold(); }
    pub fn release(&self) { self.gate.release(); }

    fn establish(&self, identity: Identity, email: &str) {
        let mut session = Self::session_for(identity);
        session.email = Some(email.to_string());
        *self.current.lock() = Some(session.clone());
        self.emit(AuthEvent::Established(session));
    }
}

#[async_trait]
impl IdentityService for MemoryIdentityService {
    async fn current_session(&self) -> AppResult<Option<Session>> {
        self.session_fetches.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.fail_session_fetch.load(Ordering::SeqCst) {
            return Err(offline("session endpoint"));
        }
        Ok(self.current.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.events.subscribe() }

    async fn sign_up(&self, req: &SignUpRequest) -> AppResult<()> {
        let key = req.email.trim().to_ascii_lowercase();
        let identity = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&key) {
                return Err(AppError::auth("user_already_exists", "User already registered"));
            }
            let identity = Identity::new_v4();
            accounts.insert(key, Account { identity, password: req.password.clone() });
            identity
        };
        self.establish(identity, &req.email);
        Ok(())
    }

    async fn sign_in_with_password(&self, req: &SignInRequest) -> AppResult<()> {
        let key = req.email.trim().to_ascii_lowercase();
        let found = self.accounts.lock().get(&key).cloned();
        match found {
            Some(acct) if acct.password == req.password => {
                self.establish(acct.identity, &req.email);
                Ok(())
            }
            _ => Err(AppError::auth("invalid_credentials", "Invalid login credentials")),
        }
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(offline("sign-out endpoint"));
        }
        *self.current.lock() = None;
        self.emit(AuthEvent::Cleared);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    rows: Mutex<HashMap<Identity, Profile>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    gate: Gate,
}

impl MemoryProfileStore {
    pub fn insert(&self, profile: Profile) { self.rows.lock().insert(profile.id, profile); }
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
    pub fn set_failing(&self, on: bool) { self.failing.store(on, Ordering::SeqCst); }
    pub fn hold(&self) { self.gate.hold(); }
    pub fn release(&self) { self.gate.release(); }

    /// Minimal profile row for tests and demos.
    pub fn basic(id: Identity, full_name: &str, role: UserRole) -> Profile {
        Profile {
            id,
            full_name: full_name.to_string(),
            role,
            email: None,
            phone: None,
            country: None,
            avatar_url: None,
            public_slug: None,
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn select_by_identity(&self, id: &Identity) -> AppResult<Option<Profile>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline("profiles"));
        }
        Ok(self.rows.lock().get(id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryAuthorizationStore {
    admins: Mutex<HashSet<Identity>>,
    chiefs: Mutex<HashSet<Identity>>,
    delegated: Mutex<HashMap<Identity, AdminPermissions>>,
    admin_calls: AtomicUsize,
    chief_calls: AtomicUsize,
    delegated_calls: AtomicUsize,
    fail_admin: AtomicBool,
    fail_chief: AtomicBool,
    fail_delegated: AtomicBool,
    gate: Gate,
}

fn toggle(set: &Mutex<HashSet<Identity>>, id: Identity, on: bool) {
    let mut s = set.lock();
    if on { s.insert(id); } else { s.remove(&id); }
}

impl MemoryAuthorizationStore {
    pub fn set_admin(&self, id: Identity, on: bool) { toggle(&self.admins, id, on); }
    pub fn set_chief(&self, id: Identity, on: bool) { toggle(&self.chiefs, id, on); }
    pub fn set_delegated(&self, id: Identity, perms: AdminPermissions) { self.delegated.lock().insert(id, perms); }
    pub fn clear_delegated(&self, id: &Identity) { self.delegated.lock().remove(id); }
    pub fn fail_admin(&self, on: bool) { self.fail_admin.store(on, Ordering::SeqCst); }
    pub fn fail_chief(&self, on: bool) { self.fail_chief.store(on, Ordering::SeqCst); }
    pub fn fail_delegated(&self, on: bool) { self.fail_delegated.store(on, Ordering::SeqCst); }
    pub fn admin_calls(&self) -> usize { self.admin_calls.load(Ordering::SeqCst) }
    pub fn chief_calls(&self) -> usize { self.chief_calls.load(Ordering::SeqCst) }
    pub fn delegated_calls(&self) -> usize { self.delegated_calls.load(Ordering::SeqCst) }
    pub fn total_calls(&self) -> usize { self.admin_calls() + self.chief_calls() + self.delegated_calls() }
    pub fn hold(&self) { self.gate.hold(); }
    pub fn release(&self) { self.gate.release(); }
}

#[async_trait]
impl AuthorizationStore for MemoryAuthorizationStore {
    async fn is_admin(&self, id: &Identity) -> AppResult<bool> {
        self.admin_calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.fail_admin.load(Ordering::SeqCst) {
            return Err(offline("is_admin"));
        }
        Ok(self.admins.lock().contains(id))
    }

    async fn is_chief_admin(&self, id: &Identity) -> AppResult<bool> {
        self.chief_calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.fail_chief.load(Ordering::SeqCst) {
            return Err(offline("is_chief_admin"));
        }
        Ok(self.chiefs.lock().contains(id))
    }

    async fn delegated_permissions(&self, id: &Identity) -> AppResult<Option<AdminPermissions>> {
        self.delegated_calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.fail_delegated.load(Ordering::SeqCst) {
            return Err(offline("admin_permissions"));
        }
        Ok(self.delegated.lock().get(id).copied())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> { self.entries.lock().clone() }
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
    pub fn set_failing(&self, on: bool) { self.failing.store(on, Ordering::SeqCst); }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline("admin_action_logs"));
        }
        self.entries.lock().push(entry);
        Ok(())
    }
}
