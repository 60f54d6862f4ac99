//! Webhook event deduplication.
//!
//! Upstream sources redeliver events they consider unacknowledged. The first
//! sighting of an event id writes a tombstone; later sightings within its TTL
//! are duplicates. "Not a duplicate" means "probably novel": the store is
//! eventually consistent and a store failure lets the event through.

use crate::config::DedupConfig;
use crate::observability::metrics;
use crate::store::{namespaced, SharedStore};

const MARKER: &str = "1";

/// Marks event ids as seen and reports repeats.
#[derive(Clone)]
pub struct EventDeduplicator {
    store: SharedStore,
    config: DedupConfig,
}

impl EventDeduplicator {
    pub fn new(store: SharedStore, config: DedupConfig) -> Self {
        Self { store, config }
    }

    /// True if `event_id` was already seen. A novel id is marked seen.
    pub async fn is_duplicate(&self, event_id: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let key = namespaced(&self.config.key_prefix, event_id);
        match self
            .store
            .put_if_absent(&key, MARKER, self.config.ttl_secs)
            .await
        {
            Ok(true) => false,
            Ok(false) => {
                tracing::debug!(event_id = %event_id, "Duplicate event");
                metrics::record_duplicate_event();
                true
            }
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Dedup check failed, treating as novel");
                false
            }
        }
    }
}
