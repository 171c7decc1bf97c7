//! Session and authorization core: who is signed in, their profile, and the
//! administrator capabilities that gate privileged screens.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod provider;
mod profile;
mod authorizer;
mod permissions;
mod request_context;
mod session;
mod context;
mod audit;
pub mod adapters;

pub use principal::{Identity, Profile, Session, UserRole};
pub use provider::{AuditSink, AuthEvent, AuthorizationStore, IdentityService, ProfileStore, SignInRequest, SignUpRequest};
pub use profile::ProfileResolver;
pub use authorizer::{AdministratorTier, AuthorizationResolver, tier_from_checks};
pub use permissions::{AdminPermissions, Capability, PermissionResolver};
pub use request_context::{AuthPhase, ContextStore, SessionSnapshot};
pub use session::{SessionManager, SessionServices};
pub use context::SessionContext;
pub use audit::{AuditEntry, AuditLogger};
