use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::authorizer::AdministratorTier;
use super::principal::Identity;
use super::provider::AuthorizationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ApproveProviders,
    SuspendProviders,
    ViewEmails,
    ViewContacts,
    ViewFinancials,
    ManageSubscriptions,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ApproveProviders,
        Capability::SuspendProviders,
        Capability::ViewEmails,
        Capability::ViewContacts,
        Capability::ViewFinancials,
        Capability::ManageSubscriptions,
    ];
}

/// Effective admin capability set. Field names match the delegated permission columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminPermissions {
    pub can_approve_providers: bool,
    pub can_suspend_providers: bool,
    pub can_view_emails: bool,
    pub can_view_contacts: bool,
    pub can_view_financials: bool,
    pub can_manage_subscriptions: bool,
}

impl AdminPermissions {
    pub const NONE: AdminPermissions = AdminPermissions {
        can_approve_providers: false,
        can_suspend_providers: false,
        can_view_emails: false,
        can_view_contacts: false,
        can_view_financials: false,
        can_manage_subscriptions: false,
    };

    pub const ALL: AdminPermissions = AdminPermissions {
        can_approve_providers: true,
        can_suspend_providers: true,
        can_view_emails: true,
        can_view_contacts: true,
        can_view_financials: true,
        can_manage_subscriptions: true,
    };

    pub fn allows(&self, cap: Capability) -> bool {
        match cap {
            Capability::ApproveProviders => self.can_approve_providers,
            Capability::SuspendProviders => self.can_suspend_providers,
            Capability::ViewEmails => self.can_view_emails,
            Capability::ViewContacts => self.can_view_contacts,
            Capability::ViewFinancials => self.can_view_financials,
            Capability::ManageSubscriptions => self.can_manage_subscriptions,
        }
    }

    pub fn granted(&self) -> Vec<Capability> {
        Capability::ALL.iter().copied().filter(|c| self.allows(*c)).collect()
    }
}

#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn AuthorizationStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn AuthorizationStore>) -> Self { Self { store } }

    /// `None` and `ChiefAdmin` never touch the store. The chief set is synthesized
    /// here and cannot be narrowed by a delegated row.
    pub async fn resolve(&self, tier: AdministratorTier, id: &Identity) -> AdminPermissions {
        match tier {
            AdministratorTier::None => AdminPermissions::NONE,
            AdministratorTier::ChiefAdmin => AdminPermissions::ALL,
            AdministratorTier::CollaboratorAdmin => match self.store.delegated_permissions(id).await {
                Ok(Some(perms)) => perms,
                Ok(None) => {
                    debug!(target: "appointly::authz", identity = %id, "no delegated permission row; granting nothing");
                    AdminPermissions::NONE
                }
                Err(e) => {
                    warn!(target: "appointly::authz", identity = %id, error = %e, "delegated permission lookup failed; granting nothing");
                    AdminPermissions::NONE
                }
            },
        }
    }
}
