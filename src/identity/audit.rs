//! Admin action log. Writes are fire-and-forget: a failing sink never blocks or
//! fails the privileged operation being recorded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::principal::Identity;
use super::provider::AuditSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub admin_id: Identity,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(admin_id: Identity, action: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            admin_id,
            action: action.into(),
            target_type: target_type.into(),
            target_id: None,
            target_name: None,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn target(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.target_id = Some(id.into());
        self.target_name = name;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    enabled: bool,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, enabled: bool) -> Self { Self { sink, enabled } }

    /// Spawn the sink write and return at once. The handle is only useful to tests.
    pub fn record(&self, entry: AuditEntry) -> Option<tokio::task::JoinHandle<()>> {
        if !self.enabled {
            debug!(target: "appointly::audit", action = %entry.action, "audit disabled; entry dropped");
            return None;
        }
        let sink = self.sink.clone();
        Some(tokio::spawn(async move {
            let action = entry.action.clone();
            let admin = entry.admin_id;
            if let Err(e) = sink.append(entry).await {
                warn!(target: "appointly::audit", admin = %admin, action = %action, error = %e, "audit write failed; ignored");
            }
        }))
    }
}
