//! Snapshot cache keyed by connection and schema

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::schema::types::SchemaSnapshot;

struct CachedSnapshot {
    snapshot: Arc<SchemaSnapshot>,
    stored_at: Instant,
}

/// Recently taken snapshots, shared read-only.
///
/// Entries expire after `ttl`; a zero TTL disables caching. Anything that changes a
/// connection's schema or data must call [`SnapshotCache::invalidate_connection`].
pub struct SnapshotCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, String), CachedSnapshot>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(connection: &str, schema: &str) -> (String, String) {
        (connection.to_string(), schema.to_string())
    }

    pub async fn get(&self, connection: &str, schema: &str) -> Option<Arc<SchemaSnapshot>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(&Self::key(connection, schema))
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.snapshot))
    }

    pub async fn insert(
        &self,
        connection: &str,
        schema: &str,
        snapshot: SchemaSnapshot,
    ) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(snapshot);
        if !self.ttl.is_zero() {
            self.entries.write().await.insert(
                Self::key(connection, schema),
                CachedSnapshot {
                    snapshot: Arc::clone(&snapshot),
                    stored_at: Instant::now(),
                },
            );
        }
        snapshot
    }

    /// Return the cached snapshot or take and store a fresh one
    pub async fn get_or_load<F>(
        &self,
        connection: &str,
        schema: &str,
        load: F,
    ) -> Result<Arc<SchemaSnapshot>>
    where
        F: Future<Output = Result<SchemaSnapshot>>,
    {
        if let Some(snapshot) = self.get(connection, schema).await {
            tracing::debug!(connection, schema, fingerprint = %snapshot.fingerprint(), "Snapshot cache hit");
            return Ok(snapshot);
        }
        let snapshot = load.await?;
        Ok(self.insert(connection, schema, snapshot).await)
    }

    /// Drop every snapshot taken through `connection`
    pub async fn invalidate_connection(&self, connection: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(name, _), _| name != connection);
        if entries.len() != before {
            tracing::debug!(connection, evicted = before - entries.len(), "Snapshot cache invalidated");
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
