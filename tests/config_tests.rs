//! Configuration loading from the environment. Kept in its own test binary because
//! it mutates process environment variables.

use appointly::{telemetry, SessionConfig};

#[test]
fn env_overrides_and_rejects_garbage() {
    std::env::set_var("APPOINTLY_EVENT_BUFFER", "128");
    std::env::set_var("APPOINTLY_AUDIT", "off");
    std::env::set_var("APPOINTLY_MIN_PASSWORD_LEN", "10");
    std::env::set_var("APPOINTLY_LOG", "appointly=debug");

    let cfg = SessionConfig::from_env().expect("valid env");
    assert_eq!(cfg.event_buffer, 128);
    assert!(!cfg.audit_enabled);
    assert_eq!(cfg.min_password_len, 10);
    assert_eq!(cfg.log_filter, "appointly=debug");

    // Repeated initialisation must not panic.
    telemetry::init_tracing(&cfg);
    telemetry::init_tracing(&cfg);

    std::env::set_var("APPOINTLY_EVENT_BUFFER", "lots");
    let err = SessionConfig::from_env().unwrap_err();
    assert_eq!(err.code_str(), "bad_env");

    std::env::set_var("APPOINTLY_EVENT_BUFFER", "0");
    let err = SessionConfig::from_env().unwrap_err();
    assert_eq!(err.code_str(), "event_buffer");

    for key in ["APPOINTLY_EVENT_BUFFER", "APPOINTLY_AUDIT", "APPOINTLY_MIN_PASSWORD_LEN", "APPOINTLY_LOG"] {
        std::env::remove_var(key);
    }
    assert_eq!(SessionConfig::from_env().unwrap(), SessionConfig::default());
}
