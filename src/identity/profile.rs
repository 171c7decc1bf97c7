use std::sync::Arc;

use tracing::{debug, warn};

use super::principal::{Identity, Profile};
use super::provider::ProfileStore;

/// Loads the profile row for an identity. Never fails: absence and transport
/// errors both resolve to `None`.
#[derive(Clone)]
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self { Self { store } }

    pub async fn resolve(&self, id: &Identity) -> Option<Profile> {
        match self.store.select_by_identity(id).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                debug!(target: "appointly::session", identity = %id, "no profile row yet");
                None
            }
            Err(e) => {
                warn!(target: "appointly::session", identity = %id, error = %e, "profile fetch failed; continuing without profile");
                None
            }
        }
    }
}
