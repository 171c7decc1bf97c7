//! Boundary of the remote collaborators the session core talks to.
//! Wire formats belong to the managed backend; only the calls and their outcomes are modelled here.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{AppError, AppResult};

use super::audit::AuditEntry;
use super::permissions::AdminPermissions;
use super::principal::{Identity, Profile, Session, UserRole};

/// Session change notification from the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A session was established (sign-in, sign-up with auto-confirm, restored session).
    Established(Session),
    /// Credential refresh; identity is expected to be unchanged.
    Refreshed(Session),
    /// The session ended.
    Cleared,
}

impl AuthEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthEvent::Established(_) => "established",
            AuthEvent::Refreshed(_) => "refreshed",
            AuthEvent::Cleared => "cleared",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub country: Option<String>,
}

fn check_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => Ok(()),
        _ => Err(AppError::user("invalid_email", "email address is not valid")),
    }
}

fn check_password(password: &str, min_len: usize) -> AppResult<()> {
    if password.chars().count() < min_len {
        return Err(AppError::user("weak_password".to_string(), format!("password must be at least {} characters", min_len)));
    }
    Ok(())
}

impl SignInRequest {
    pub fn validate(&self, min_password_len: usize) -> AppResult<()> {
        check_email(&self.email)?;
        check_password(&self.password, min_password_len)
    }
}

impl SignUpRequest {
    pub fn validate(&self, min_password_len: usize) -> AppResult<()> {
        check_email(&self.email)?;
        check_password(&self.password, min_password_len)?;
        if self.display_name.trim().is_empty() {
            return Err(AppError::user("missing_name", "display name is required"));
        }
        Ok(())
    }
}

/// Authenticates credentials and owns the session lifecycle.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// One-shot fetch of the current session, if any.
    async fn current_session(&self) -> AppResult<Option<Session>>;
    /// Change notification stream. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
    async fn sign_up(&self, req: &SignUpRequest) -> AppResult<()>;
    async fn sign_in_with_password(&self, req: &SignInRequest) -> AppResult<()>;
    async fn sign_out(&self) -> AppResult<()>;
}

/// Keyed lookup against the `profiles` collection.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn select_by_identity(&self, id: &Identity) -> AppResult<Option<Profile>>;
}

/// Remote administrator checks plus the delegated permission rows.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn is_admin(&self, id: &Identity) -> AppResult<bool>;
    async fn is_chief_admin(&self, id: &Identity) -> AppResult<bool>;
    async fn delegated_permissions(&self, id: &Identity) -> AppResult<Option<AdminPermissions>>;
}

/// Write-only admin action log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_up(email: &str, password: &str, name: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: password.into(),
            display_name: name.into(),
            role: UserRole::Client,
            phone: None,
            country: Some("PT".into()),
        }
    }

    #[test]
    fn sign_in_validation() {
        let ok = SignInRequest { email: "ana@example.com".into(), password: "secret1".into() };
        assert!(ok.validate(6).is_ok());
        let bad = SignInRequest { email: "ana.example.com".into(), password: "secret1".into() };
        assert_eq!(bad.validate(6).unwrap_err().code_str(), "invalid_email");
        let short = SignInRequest { email: "ana@example.com".into(), password: "abc".into() };
        assert_eq!(short.validate(6).unwrap_err().code_str(), "weak_password");
    }

    #[test]
    fn sign_up_requires_display_name() {
        assert!(sign_up("bo@example.com", "hunter22", "Bo").validate(6).is_ok());
        assert_eq!(sign_up("bo@example.com", "hunter22", "  ").validate(6).unwrap_err().code_str(), "missing_name");
        assert_eq!(sign_up("@example.com", "hunter22", "Bo").validate(6).unwrap_err().code_str(), "invalid_email");
    }
}
