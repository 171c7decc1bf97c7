//! Session manager: the single writer of the session read model.
//!
//! Every resolution pass carries a generation number taken from the ledger when the
//! pass starts. Identity-establishing events, identity-clearing events and sign-out
//! advance the generation, so a pass that finishes after a newer transition is
//! discarded instead of published. Generation checks and store writes happen under
//! the same lock, which keeps "is this pass current?" and "publish" atomic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::AppResult;

use super::authorizer::AuthorizationResolver;
use super::permissions::PermissionResolver;
use super::principal::Session;
use super::profile::ProfileResolver;
use super::provider::{AuditSink, AuthEvent, AuthorizationStore, IdentityService, ProfileStore, SignInRequest, SignUpRequest};
use super::request_context::{AuthPhase, ContextStore, SessionSnapshot};

/// Remote collaborators injected into a session context.
#[derive(Clone)]
pub struct SessionServices {
    pub identity: Arc<dyn IdentityService>,
    pub profiles: Arc<dyn ProfileStore>,
    pub authz: Arc<dyn AuthorizationStore>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Debug, Default)]
struct Ledger {
    generation: u64,
}

struct Inner {
    identity: Arc<dyn IdentityService>,
    profiles: ProfileResolver,
    authz: AuthorizationResolver,
    permissions: PermissionResolver,
    store: ContextStore,
    ledger: Mutex<Ledger>,
    alive: AtomicBool,
    initialized: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
    min_password_len: usize,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(services: &SessionServices, store: ContextStore, cfg: &SessionConfig) -> Self {
        let inner = Inner {
            identity: services.identity.clone(),
            profiles: ProfileResolver::new(services.profiles.clone()),
            authz: AuthorizationResolver::new(services.authz.clone()),
            permissions: PermissionResolver::new(services.authz.clone()),
            store,
            ledger: Mutex::new(Ledger::default()),
            alive: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            listener: Mutex::new(None),
            min_password_len: cfg.min_password_len,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn store(&self) -> &ContextStore { &self.inner.store }

    pub fn permission_resolver(&self) -> &PermissionResolver { &self.inner.permissions }

    pub fn is_alive(&self) -> bool { self.inner.alive.load(Ordering::SeqCst) }

    /// Subscribe to the identity service's notifications. Must run inside a Tokio runtime.
    pub fn start(&self) {
        let mut slot = self.inner.listener.lock();
        if slot.is_some() || !self.is_alive() {
            return;
        }
        let rx = self.inner.identity.subscribe();
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(listen(weak, rx)));
        debug!(target: "appointly::session", "subscribed to auth events");
    }

    /// One-time load of the current session. Later calls are no-ops.
    /// Never fails: a fetch error leaves the signed-out state.
    pub async fn initialize(&self) {
        if !self.is_alive() {
            debug!(target: "appointly::session", "initialize after teardown; skipping");
            return;
        }
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            debug!(target: "appointly::session", "initialize already ran; skipping");
            return;
        }
        let generation = {
            let mut ledger = self.inner.ledger.lock();
            ledger.generation += 1;
            if self.is_alive() && self.inner.store.snapshot().phase == AuthPhase::Uninitialized {
                self.inner.store.replace(SessionSnapshot { phase: AuthPhase::Loading, ..Default::default() });
            }
            ledger.generation
        };

        let next = match self.inner.identity.current_session().await {
            Ok(Some(session)) => self.resolve_snapshot(session).await,
            Ok(None) => SessionSnapshot::signed_out(),
            Err(e) => {
                warn!(target: "appointly::session", error = %e, "initial session fetch failed; starting signed out");
                SessionSnapshot::signed_out()
            }
        };
        if self.commit(generation, next) {
            debug!(target: "appointly::session", generation, "initial load published");
        }
    }

    /// Apply one change notification. Returns the handle of the background resolution
    /// pass when the event established a new identity.
    pub fn handle_event(&self, event: AuthEvent) -> Option<JoinHandle<()>> {
        debug!(target: "appointly::session", kind = event.kind(), "auth event");
        match event {
            AuthEvent::Established(session) => self.establish(session, false),
            AuthEvent::Refreshed(session) => self.establish(session, true),
            AuthEvent::Cleared => {
                self.clear();
                None
            }
        }
    }

    pub async fn sign_in(&self, req: &SignInRequest) -> AppResult<()> {
        req.validate(self.inner.min_password_len)?;
        match self.inner.identity.sign_in_with_password(req).await {
            Ok(()) => {
                info!(target: "appointly::session", email = %req.email, "sign-in accepted");
                Ok(())
            }
            Err(e) => {
                info!(target: "appointly::session", email = %req.email, error = %e, "sign-in rejected");
                Err(e)
            }
        }
    }

    pub async fn sign_up(&self, req: &SignUpRequest) -> AppResult<()> {
        req.validate(self.inner.min_password_len)?;
        match self.inner.identity.sign_up(req).await {
            Ok(()) => {
                info!(target: "appointly::session", email = %req.email, role = %req.role, "sign-up accepted");
                Ok(())
            }
            Err(e) => {
                info!(target: "appointly::session", email = %req.email, error = %e, "sign-up rejected");
                Err(e)
            }
        }
    }

    /// Local state is cleared whether or not the remote call succeeds.
    pub async fn sign_out(&self) {
        self.invalidate();
        if let Err(e) = self.inner.identity.sign_out().await {
            warn!(target: "appointly::session", error = %e, "remote sign-out failed; clearing local state anyway");
        }
        self.clear();
        info!(target: "appointly::session", "signed out");
    }

    /// Unsubscribe and stop publishing. In-flight collaborator calls run to
    /// completion but their results are dropped.
    pub fn teardown(&self) {
        {
            let _ledger = self.inner.ledger.lock();
            self.inner.alive.store(false, Ordering::SeqCst);
        }
        if let Some(handle) = self.inner.listener.lock().take() {
            handle.abort();
        }
        debug!(target: "appointly::session", "session manager torn down");
    }

    async fn resolve_snapshot(&self, session: Session) -> SessionSnapshot {
        let id = session.identity;
        let (profile, (tier, permissions)) = tokio::join!(self.inner.profiles.resolve(&id), async {
            let tier = self.inner.authz.resolve(&id).await;
            let permissions = self.inner.permissions.resolve(tier, &id).await;
            (tier, permissions)
        });
        SessionSnapshot::resolved(session, profile, tier, permissions)
    }

    fn establish(&self, session: Session, refresh: bool) -> Option<JoinHandle<()>> {
        let generation = {
            let mut ledger = self.inner.ledger.lock();
            if !self.is_alive() {
                return None;
            }
            let current = self.inner.store.snapshot();
            if current.identity() == Some(session.identity) {
                if current.session.as_ref() != Some(&session) {
                    self.inner.store.replace_quiet(SessionSnapshot { session: Some(session), ..current });
                }
                debug!(target: "appointly::session", refresh, "identity unchanged; no re-resolution");
                return None;
            }
            if refresh {
                warn!(target: "appointly::session", identity = %session.identity, "refresh for an identity not established here; resolving");
            }
            ledger.generation += 1;
            self.inner.store.replace(SessionSnapshot::partial(session.clone()));
            ledger.generation
        };

        let this = self.clone();
        Some(tokio::spawn(async move {
            let next = this.resolve_snapshot(session).await;
            if this.commit(generation, next) {
                debug!(target: "appointly::session", generation, "resolution pass published");
            }
        }))
    }

    fn clear(&self) {
        let mut ledger = self.inner.ledger.lock();
        ledger.generation += 1;
        if self.is_alive() {
            self.inner.store.replace(SessionSnapshot::signed_out());
        }
    }

    fn invalidate(&self) {
        self.inner.ledger.lock().generation += 1;
    }

    /// Publish a finished pass if it is still current. A refresh that landed while the
    /// pass was running wins over the session the pass started with.
    fn commit(&self, generation: u64, mut next: SessionSnapshot) -> bool {
        let ledger = self.inner.ledger.lock();
        if !self.is_alive() {
            debug!(target: "appointly::session", generation, "manager torn down; discarding pass");
            return false;
        }
        if ledger.generation != generation {
            debug!(target: "appointly::session", generation, current = ledger.generation, "stale pass discarded");
            return false;
        }
        if let (Some(cached), Some(pending)) = (self.inner.store.snapshot().session, next.session.as_mut()) {
            if cached.same_principal(pending) {
                *pending = cached;
            }
        }
        self.inner.store.replace(next);
        true
    }

    async fn resync(&self) {
        match self.inner.identity.current_session().await {
            Ok(Some(session)) => {
                self.handle_event(AuthEvent::Established(session));
            }
            Ok(None) => self.clear(),
            Err(e) => warn!(target: "appointly::session", error = %e, "resync after lag failed; keeping current state"),
        }
    }
}

async fn listen(inner: Weak<Inner>, mut rx: broadcast::Receiver<AuthEvent>) {
    loop {
        let received = rx.recv().await;
        let Some(strong) = inner.upgrade() else { break };
        let manager = SessionManager { inner: strong };
        match received {
            Ok(event) => {
                manager.handle_event(event);
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(target: "appointly::session", missed, "auth events lagged; resyncing");
                manager.resync().await;
            }
            Err(RecvError::Closed) => {
                debug!(target: "appointly::session", "auth event stream closed");
                break;
            }
        }
    }
}
