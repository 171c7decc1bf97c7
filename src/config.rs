use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Settings for the session context. Unspecified values take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Fallback tracing filter when RUST_LOG is unset.
    pub log_filter: String,
    /// Capacity of the auth event broadcast channel.
    pub event_buffer: usize,
    /// Write admin actions to the audit sink.
    pub audit_enabled: bool,
    /// Local password length check applied before sign-in/sign-up reach the identity service.
    pub min_password_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            event_buffer: 64,
            audit_enabled: true,
            min_password_len: 6,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> AppResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::config("bad_env".to_string(), format!("{}='{}' could not be parsed", key, raw))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(key: &str, raw: &str) -> AppResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::config("bad_env".to_string(), format!("{}='{}' is not a boolean", key, raw))),
    }
}

impl SessionConfig {
    /// Defaults overlaid with APPOINTLY_* environment variables.
    pub fn from_env() -> AppResult<Self> {
        let mut cfg = Self::default();
        if let Ok(filter) = std::env::var("APPOINTLY_LOG") {
            cfg.log_filter = filter;
        }
        if let Some(n) = env_parse::<usize>("APPOINTLY_EVENT_BUFFER")? {
            cfg.event_buffer = n;
        }
        if let Ok(raw) = std::env::var("APPOINTLY_AUDIT") {
            cfg.audit_enabled = parse_flag("APPOINTLY_AUDIT", &raw)?;
        }
        if let Some(n) = env_parse::<usize>("APPOINTLY_MIN_PASSWORD_LEN")? {
            cfg.min_password_len = n;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a (possibly partial) JSON document.
    pub fn from_json(doc: &str) -> AppResult<Self> {
        let cfg: SessionConfig = serde_json::from_str(doc)
            .map_err(|e| AppError::config("bad_json".to_string(), e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.event_buffer == 0 {
            return Err(AppError::config("event_buffer", "event_buffer must be greater than zero"));
        }
        if self.min_password_len == 0 {
            return Err(AppError::config("min_password_len", "min_password_len must be at least 1"));
        }
        Ok(())
    }
}
