use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::error::{AppError, AppResult};

use super::authorizer::AdministratorTier;
use super::permissions::AdminPermissions;
use super::principal::{Identity, Profile, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    #[default]
    Uninitialized,
    Loading,
    Unauthenticated,
    /// Session known, profile and tier still resolving.
    Partial,
    Resolved,
}

/// Read model published to every consumer. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    pub phase: AuthPhase,
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub tier: AdministratorTier,
    pub permissions: AdminPermissions,
}

impl SessionSnapshot {
    pub fn signed_out() -> Self {
        Self { phase: AuthPhase::Unauthenticated, ..Default::default() }
    }

    pub(crate) fn partial(session: Session) -> Self {
        Self { phase: AuthPhase::Partial, session: Some(session), ..Default::default() }
    }

    pub(crate) fn resolved(session: Session, profile: Option<Profile>, tier: AdministratorTier, permissions: AdminPermissions) -> Self {
        Self { phase: AuthPhase::Resolved, session: Some(session), profile, tier, permissions }
    }

    pub fn identity(&self) -> Option<Identity> { self.session.as_ref().map(|s| s.identity) }
    pub fn is_loading(&self) -> bool { matches!(self.phase, AuthPhase::Uninitialized | AuthPhase::Loading) }
    pub fn is_authenticated(&self) -> bool { self.session.is_some() }
    pub fn is_admin(&self) -> bool { self.tier.is_admin() }
    pub fn is_chief_admin(&self) -> bool { self.tier.is_chief_admin() }
}

/// Observable container for the session read model. Each instance is independent;
/// nothing here is process-global.
#[derive(Clone)]
pub struct ContextStore {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for ContextStore {
    fn default() -> Self { Self::new() }
}

impl ContextStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SessionSnapshot { self.tx.borrow().clone() }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> { self.tx.subscribe() }

    /// Resolve once the published snapshot satisfies `pred` (checked immediately first).
    pub async fn wait_until<F>(&self, mut pred: F) -> AppResult<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.tx.subscribe();
        let snap = rx
            .wait_for(|s| pred(s))
            .await
            .map_err(|_| AppError::internal("store_closed", "session store was dropped"))?;
        Ok(snap.clone())
    }

    pub(crate) fn replace(&self, next: SessionSnapshot) {
        self.tx.send_replace(next);
    }

    /// Update the cached value without waking observers.
    pub(crate) fn replace_quiet(&self, next: SessionSnapshot) {
        self.tx.send_if_modified(|cur| {
            *cur = next;
            false
        });
    }
}
