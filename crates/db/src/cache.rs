//! Fingerprint-keyed result cache.
//!
//! The store is dumb string storage with a TTL; [`CacheGate`] layers the
//! report (de)serialization and the best-effort contract on top: a lookup
//! error degrades to a miss and a store error is swallowed, so the cache can
//! never fail a request that the pipeline itself would have served.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use revvy_core::config::CacheConfig;
use revvy_core::domain::OptimizeReport;

use crate::repositories::RepositoryError;
use crate::DbPool;

#[async_trait]
pub trait ResultCacheStore: Send + Sync {
    /// Fetch a fresh payload. Expired entries are reported as absent.
    async fn lookup(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    /// Insert or replace a payload with a fresh TTL.
    async fn store(&self, key: &str, payload: &str, ttl_secs: u64) -> Result<(), RepositoryError>;

    /// Drop entries past their TTL. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, RepositoryError>;
}

fn expiry_after(ttl_secs: u64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64)
}

pub struct SqlResultCacheStore {
    pool: DbPool,
}

impl SqlResultCacheStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultCacheStore for SqlResultCacheStore {
    async fn lookup(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload_json FROM result_cache WHERE cache_key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(payload,)| payload))
    }

    async fn store(&self, key: &str, payload: &str, ttl_secs: u64) -> Result<(), RepositoryError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO result_cache (cache_key, payload_json, expires_at, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                payload_json = excluded.payload_json,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(expiry_after(ttl_secs).to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM result_cache WHERE expires_at <= ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Cache store backed by a map, for tests and cacheless wiring.
#[derive(Default)]
pub struct InMemoryResultCacheStore {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

#[async_trait]
impl ResultCacheStore for InMemoryResultCacheStore {
    async fn lookup(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(payload, _)| payload.clone()))
    }

    async fn store(&self, key: &str, payload: &str, ttl_secs: u64) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (payload.to_string(), expiry_after(ttl_secs)));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > Utc::now());
        Ok((before - entries.len()) as u64)
    }
}

/// Best-effort cache over a [`ResultCacheStore`]. Every failure path is a
/// miss or a no-op; callers never see an error from here.
#[derive(Clone)]
pub struct CacheGate {
    store: Arc<dyn ResultCacheStore>,
    enabled: bool,
    ttl_secs: u64,
}

impl CacheGate {
    pub fn new(store: Arc<dyn ResultCacheStore>, config: &CacheConfig) -> Self {
        Self { store, enabled: config.enabled, ttl_secs: config.ttl_secs }
    }

    /// A gate that always misses. Used when caching is switched off entirely.
    pub fn disabled() -> Self {
        Self {
            store: Arc::new(InMemoryResultCacheStore::default()),
            enabled: false,
            ttl_secs: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn lookup(&self, key: &str) -> Option<OptimizeReport> {
        if !self.enabled {
            return None;
        }
        let payload = match self.store.lookup(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(event_name = "cache.miss", key, "cache miss");
                return None;
            }
            Err(error) => {
                warn!(event_name = "cache.lookup_failed", key, error = %error, "cache lookup failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str::<OptimizeReport>(&payload) {
            Ok(report) => {
                info!(event_name = "cache.hit", key, "cache hit");
                Some(report)
            }
            Err(error) => {
                warn!(event_name = "cache.decode_failed", key, error = %error, "cached payload did not decode, treating as miss");
                None
            }
        }
    }

    pub async fn store(&self, key: &str, report: &OptimizeReport) {
        if !self.enabled {
            return;
        }
        let payload = match serde_json::to_string(report) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(event_name = "cache.encode_failed", key, error = %error, "report did not encode, skipping cache store");
                return;
            }
        };
        match self.store.store(key, &payload, self.ttl_secs).await {
            Ok(()) => {
                info!(event_name = "cache.stored", key, ttl_secs = self.ttl_secs, "cached result");
            }
            Err(error) => {
                warn!(event_name = "cache.store_failed", key, error = %error, "cache store failed, result not cached");
            }
        }
    }
}
