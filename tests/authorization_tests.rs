//! Authorization integration tests: administrator tier and permission resolution
//! against the in-memory authorization store, including failure paths.

use std::sync::Arc;

use appointly::identity::adapters::MemoryAuthorizationStore;
use appointly::identity::{AdminPermissions, AdministratorTier, AuthorizationResolver, Capability, Identity, PermissionResolver};

fn resolvers() -> (Arc<MemoryAuthorizationStore>, AuthorizationResolver, PermissionResolver) {
    let store = Arc::new(MemoryAuthorizationStore::default());
    (store.clone(), AuthorizationResolver::new(store.clone()), PermissionResolver::new(store))
}

#[tokio::test]
async fn both_checks_are_issued_even_when_admin_check_fails() {
    let (store, authz, _) = resolvers();
    let id = Identity::new_v4();
    store.set_chief(id, true);
    store.fail_admin(true);

    assert_eq!(authz.resolve(&id).await, AdministratorTier::None);
    assert_eq!(store.admin_calls(), 1);
    assert_eq!(store.chief_calls(), 1);
}

#[tokio::test]
async fn chief_flag_without_admin_flag_is_ignored() {
    let (store, authz, perms) = resolvers();
    let id = Identity::new_v4();
    store.set_chief(id, true);

    let tier = authz.resolve(&id).await;
    assert_eq!(tier, AdministratorTier::None);
    assert_eq!(perms.resolve(tier, &id).await, AdminPermissions::NONE);
    assert_eq!(store.delegated_calls(), 0);
}

#[tokio::test]
async fn chief_check_failure_downgrades_to_collaborator() {
    let (store, authz, perms) = resolvers();
    let id = Identity::new_v4();
    store.set_admin(id, true);
    store.set_chief(id, true);
    store.fail_chief(true);
    store.set_delegated(id, AdminPermissions { can_approve_providers: true, ..AdminPermissions::NONE });

    let tier = authz.resolve(&id).await;
    assert_eq!(tier, AdministratorTier::CollaboratorAdmin);
    let granted = perms.resolve(tier, &id).await.granted();
    assert_eq!(granted, vec![Capability::ApproveProviders]);
}

#[tokio::test]
async fn delegated_rows_are_per_identity() {
    let (store, authz, perms) = resolvers();
    let alice = Identity::new_v4();
    let bruno = Identity::new_v4();
    for id in [alice, bruno] {
        store.set_admin(id, true);
    }
    store.set_delegated(alice, AdminPermissions { can_view_contacts: true, can_view_emails: true, ..AdminPermissions::NONE });

    let a = perms.resolve(authz.resolve(&alice).await, &alice).await;
    let b = perms.resolve(authz.resolve(&bruno).await, &bruno).await;
    assert!(a.allows(Capability::ViewContacts) && a.allows(Capability::ViewEmails));
    assert!(!a.allows(Capability::ManageSubscriptions));
    assert_eq!(b, AdminPermissions::NONE);

    store.clear_delegated(&alice);
    assert_eq!(perms.resolve(AdministratorTier::CollaboratorAdmin, &alice).await, AdminPermissions::NONE);
}
