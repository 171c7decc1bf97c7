//! Session context: the read model plus lifecycle operations, handed to every consumer.
//! Each context owns its own store and manager, so independent instances never share state.

use tokio::sync::watch;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{AppError, AppResult};

use super::audit::{AuditEntry, AuditLogger};
use super::authorizer::AdministratorTier;
use super::permissions::{AdminPermissions, Capability};
use super::principal::{Identity, Profile, Session, UserRole};
use super::provider::{SignInRequest, SignUpRequest};
use super::request_context::{AuthPhase, ContextStore, SessionSnapshot};
use super::session::{SessionManager, SessionServices};

#[derive(Clone)]
pub struct SessionContext {
    manager: SessionManager,
    audit: AuditLogger,
}

impl SessionContext {
    /// Build an unmounted context. Nothing is fetched until `start`/`initialize`.
    pub fn new(services: SessionServices, cfg: &SessionConfig) -> Self {
        let manager = SessionManager::new(&services, ContextStore::new(), cfg);
        let audit = AuditLogger::new(services.audit.clone(), cfg.audit_enabled);
        Self { manager, audit }
    }

    /// Subscribe to auth events and run the initial load to completion.
    pub async fn mount(services: SessionServices, cfg: &SessionConfig) -> Self {
        let ctx = Self::new(services, cfg);
        ctx.start();
        ctx.initialize().await;
        ctx
    }

    pub fn start(&self) { self.manager.start(); }

    pub async fn initialize(&self) { self.manager.initialize().await; }

    /// Unmount: stop listening and drop any pending resolution results.
    pub fn teardown(&self) { self.manager.teardown(); }

    pub fn manager(&self) -> &SessionManager { &self.manager }

    pub fn snapshot(&self) -> SessionSnapshot { self.manager.store().snapshot() }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> { self.manager.store().subscribe() }

    pub async fn wait_until<F>(&self, pred: F) -> AppResult<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        self.manager.store().wait_until(pred).await
    }

    /// Wait for the next settled state (not loading, not partial).
    pub async fn settled(&self) -> AppResult<SessionSnapshot> {
        self.wait_until(|s| matches!(s.phase, AuthPhase::Unauthenticated | AuthPhase::Resolved)).await
    }

    pub fn identity(&self) -> Option<Identity> { self.snapshot().identity() }
    pub fn session(&self) -> Option<Session> { self.snapshot().session }
    pub fn profile(&self) -> Option<Profile> { self.snapshot().profile }
    pub fn tier(&self) -> AdministratorTier { self.snapshot().tier }
    pub fn permissions(&self) -> AdminPermissions { self.snapshot().permissions }
    pub fn is_admin(&self) -> bool { self.snapshot().is_admin() }
    pub fn is_chief_admin(&self) -> bool { self.snapshot().is_chief_admin() }
    pub fn is_loading(&self) -> bool { self.snapshot().is_loading() }

    /// Re-derive permissions for the current identity and tier straight from the store.
    /// Fails closed with no identity.
    pub async fn refresh_permissions(&self) -> AdminPermissions {
        let snap = self.snapshot();
        match snap.identity() {
            Some(id) => self.manager.permission_resolver().resolve(snap.tier, &id).await,
            None => AdminPermissions::NONE,
        }
    }

    pub async fn sign_in(&self, req: &SignInRequest) -> AppResult<()> { self.manager.sign_in(req).await }

    pub async fn sign_up(&self, req: &SignUpRequest) -> AppResult<()> { self.manager.sign_up(req).await }

    pub async fn sign_out(&self) { self.manager.sign_out().await }

    // --- guards for privileged screens ---

    fn settled_snapshot(&self) -> AppResult<SessionSnapshot> {
        let snap = self.snapshot();
        match snap.phase {
            AuthPhase::Resolved => Ok(snap),
            AuthPhase::Unauthenticated => Err(AppError::auth("not_authenticated", "sign in required")),
            AuthPhase::Uninitialized | AuthPhase::Loading | AuthPhase::Partial => {
                Err(AppError::auth("session_pending", "session is still loading"))
            }
        }
    }

    pub fn require_admin(&self) -> AppResult<Identity> {
        let snap = self.settled_snapshot()?;
        match snap.identity() {
            Some(id) if snap.is_admin() => Ok(id),
            _ => Err(AppError::auth("admin_required", "administrator access required")),
        }
    }

    pub fn require_chief_admin(&self) -> AppResult<Identity> {
        let snap = self.settled_snapshot()?;
        match snap.identity() {
            Some(id) if snap.is_chief_admin() => Ok(id),
            _ => Err(AppError::auth("chief_admin_required", "chief administrator access required")),
        }
    }

    pub fn require(&self, cap: Capability) -> AppResult<Identity> {
        let snap = self.settled_snapshot()?;
        match snap.identity() {
            Some(id) if snap.is_admin() && snap.permissions.allows(cap) => Ok(id),
            _ => Err(AppError::auth("permission_denied".to_string(), format!("missing capability {:?}", cap))),
        }
    }

    pub fn require_role(&self, role: UserRole) -> AppResult<Profile> {
        let snap = self.settled_snapshot()?;
        match snap.profile {
            Some(p) if p.role == role => Ok(p),
            Some(_) => Err(AppError::auth("wrong_role".to_string(), format!("{} account required", role))),
            None => Err(AppError::auth("profile_missing", "no profile loaded")),
        }
    }

    /// Record a privileged action for the current admin. Skipped when the caller is
    /// not an admin or auditing is off; sink errors never reach the caller.
    pub fn log_admin_action(&self, entry: impl FnOnce(Identity) -> AuditEntry) -> Option<tokio::task::JoinHandle<()>> {
        let snap = self.snapshot();
        let admin = match snap.identity() {
            Some(id) if snap.is_admin() => id,
            _ => {
                debug!(target: "appointly::audit", "not an admin; audit entry skipped");
                return None;
            }
        };
        self.audit.record(entry(admin))
    }
}
