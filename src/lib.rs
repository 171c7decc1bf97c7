//! appointly session core: session tracking, profile loading and administrator
//! capability resolution for the booking platform.

pub mod config;
pub mod error;
pub mod identity;
pub mod telemetry;

pub use config::SessionConfig;
pub use error::{AppError, AppResult};
