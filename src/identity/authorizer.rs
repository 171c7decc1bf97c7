use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppResult;

use super::principal::Identity;
use super::provider::AuthorizationStore;

/// Administrator tier derived from the two remote checks. Never stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdministratorTier {
    #[default]
    None,
    CollaboratorAdmin,
    ChiefAdmin,
}

impl AdministratorTier {
    pub fn is_admin(&self) -> bool { !matches!(self, AdministratorTier::None) }
    pub fn is_chief_admin(&self) -> bool { matches!(self, AdministratorTier::ChiefAdmin) }
}

/// Combine the two check outcomes. The admin check is the gate: unless it
/// positively returns true, the chief check is ignored.
pub fn tier_from_checks(admin: &AppResult<bool>, chief: &AppResult<bool>) -> AdministratorTier {
    match (admin, chief) {
        (Ok(true), Ok(true)) => AdministratorTier::ChiefAdmin,
        (Ok(true), _) => AdministratorTier::CollaboratorAdmin,
        (Ok(false), _) | (Err(_), _) => AdministratorTier::None,
    }
}

#[derive(Clone)]
pub struct AuthorizationResolver {
    store: Arc<dyn AuthorizationStore>,
}

impl AuthorizationResolver {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self { Self { store } }

    /// Both checks run concurrently; failures resolve to the most restrictive tier.
    pub async fn resolve(&self, id: &Identity) -> AdministratorTier {
        let (admin, chief) = tokio::join!(self.store.is_admin(id), self.store.is_chief_admin(id));
        if let Err(e) = &admin {
            warn!(target: "appointly::authz", identity = %id, error = %e, "is_admin check failed; denying admin tier");
        }
        match (&admin, &chief) {
            (Ok(true), Err(e)) => {
                warn!(target: "appointly::authz", identity = %id, error = %e, "is_chief_admin check failed; treating as collaborator");
            }
            (Ok(false), Ok(true)) => {
                warn!(target: "appointly::authz", identity = %id, "chief flag set without admin flag; ignoring");
            }
            _ => {}
        }
        let tier = tier_from_checks(&admin, &chief);
        debug!(target: "appointly::authz", identity = %id, ?tier, "tier resolved");
        tier
    }
}
