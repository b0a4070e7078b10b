//! Scope-keyed, time-boxed cache of aggregation output.
//!
//! Each feature owns a [`CacheFamily`] with its own key namespace and TTL.
//! Keys are `"{family prefix}:{scope}"`, where the scope is an organization,
//! a user, an org/user pair, or a `repo#number` reference.
//!
//! Entries persist as `{ "data": <payload>, "timestamp": <epoch ms> }`
//! through a pluggable [`CacheStore`]. Expiry is lazy: an entry whose age
//! has reached its family TTL is deleted by the read that notices it, and
//! unparseable entries are deleted the same way. Nothing scans the store
//! in the background.

pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-entry size budget for quota-constrained storage media.
pub const QUOTA_ENTRY_BYTES: usize = 4 * 1024;

/// Feature-level cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheFamily {
    /// A user's open pull request list. Short-lived to absorb rapid UI
    /// interactions without serving stale lists.
    PrSnapshot,
    /// Per-PR enrichment ("turn") data.
    PrTurn,
    Changelog,
    Leaderboard,
    OrgStats,
    /// Organizations a user belongs to.
    Membership,
}

impl CacheFamily {
    pub const ALL: [CacheFamily; 6] = [
        CacheFamily::PrSnapshot,
        CacheFamily::PrTurn,
        CacheFamily::Changelog,
        CacheFamily::Leaderboard,
        CacheFamily::OrgStats,
        CacheFamily::Membership,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            CacheFamily::PrSnapshot => "pr_snapshot",
            CacheFamily::PrTurn => "pr_turn",
            CacheFamily::Changelog => "changelog",
            CacheFamily::Leaderboard => "leaderboard",
            CacheFamily::OrgStats => "org_stats",
            CacheFamily::Membership => "user_orgs",
        }
    }

    pub fn ttl(&self) -> Duration {
        const HOUR: u64 = 3600;
        match self {
            CacheFamily::PrSnapshot => Duration::from_secs(10),
            CacheFamily::PrTurn => Duration::from_secs(2 * HOUR),
            CacheFamily::Changelog | CacheFamily::Leaderboard => Duration::from_secs(4 * HOUR),
            CacheFamily::OrgStats => Duration::from_secs(2 * HOUR),
            CacheFamily::Membership => Duration::from_secs(24 * HOUR),
        }
    }

    /// Resolve the family owning a raw key string.
    pub fn from_key(key: &str) -> Option<CacheFamily> {
        let prefix = key.split(':').next()?;
        Self::ALL.into_iter().find(|f| f.prefix() == prefix)
    }
}

/// A namespaced cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub family: CacheFamily,
    pub scope: String,
}

impl CacheKey {
    pub fn new(family: CacheFamily, scope: impl Into<String>) -> Self {
        Self {
            family,
            scope: scope.into(),
        }
    }

    pub fn org(family: CacheFamily, org: &str) -> Self {
        Self::new(family, org.to_lowercase())
    }

    pub fn user(family: CacheFamily, user: &str) -> Self {
        Self::new(family, user.to_lowercase())
    }

    pub fn org_user(family: CacheFamily, org: &str, user: &str) -> Self {
        Self::new(
            family,
            format!("{}/{}", org.to_lowercase(), user.to_lowercase()),
        )
    }

    pub fn pull(family: CacheFamily, repo: &str, number: u64) -> Self {
        Self::new(family, format!("{}#{}", repo.to_lowercase(), number))
    }

    /// Append a variant discriminator (date window, toggle) to the scope.
    pub fn variant(mut self, variant: impl fmt::Display) -> Self {
        self.scope = format!("{}@{}", self.scope, variant);
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family.prefix(), self.scope)
    }
}

/// Persisted form of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Epoch milliseconds at which the entry was stored.
    pub timestamp: i64,
}

/// Raw key/value storage behind a [`TtlCache`].
///
/// Implementations only move strings; TTL, serialization, and corruption
/// handling live in [`TtlCache`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;

    async fn save(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn remove_prefix(&self, prefix: &str) -> Result<u64>;
}

/// Outcome of a [`TtlCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// Skipped because the serialized entry exceeds the size budget.
    TooLarge,
    /// Skipped because serialization or the store write failed.
    Failed,
}

/// TTL-enforcing, JSON-serializing view over a [`CacheStore`].
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn CacheStore>,
    max_entry_bytes: Option<usize>,
}

impl TtlCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            max_entry_bytes: None,
        }
    }

    /// Enforce a per-entry size budget, as for a quota-constrained medium.
    pub fn with_max_entry_bytes(mut self, max: Option<usize>) -> Self {
        self.max_entry_bytes = max;
        self
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.get_at(key, Utc::now()).await
    }

    /// Read `key` as of `now`. Expired and corrupt entries are deleted and
    /// reported as a miss.
    pub async fn get_at<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let raw_key = key.to_string();
        let raw = match self.store.load(&raw_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %raw_key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %raw_key, "cache read failed: {:#}", e);
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %raw_key, "discarding corrupt cache entry: {}", e);
                self.evict(&raw_key).await;
                return None;
            }
        };

        let age_ms = now.timestamp_millis() - entry.timestamp;
        let ttl_ms = key.family.ttl().as_millis() as i64;
        if age_ms >= ttl_ms {
            debug!(key = %raw_key, age_ms, ttl_ms, "cache entry expired");
            self.evict(&raw_key).await;
            return None;
        }

        debug!(key = %raw_key, age_ms, "cache hit");
        Some(entry.data)
    }

    pub async fn put<T: Serialize>(&self, key: &CacheKey, payload: &T) -> PutOutcome {
        self.put_at(key, payload, Utc::now()).await
    }

    /// Store `payload` stamped with `now`. Never fails the caller: oversized
    /// or unserializable payloads are logged and skipped.
    pub async fn put_at<T: Serialize>(
        &self,
        key: &CacheKey,
        payload: &T,
        now: DateTime<Utc>,
    ) -> PutOutcome {
        let raw_key = key.to_string();
        let entry = CacheEntry {
            data: payload,
            timestamp: now.timestamp_millis(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %raw_key, "cache payload not serializable: {}", e);
                return PutOutcome::Failed;
            }
        };

        if let Some(max) = self.max_entry_bytes {
            if raw.len() > max {
                warn!(key = %raw_key, bytes = raw.len(), max, "cache entry too large, skipping");
                return PutOutcome::TooLarge;
            }
        }

        match self.store.save(&raw_key, &raw).await {
            Ok(()) => PutOutcome::Stored,
            Err(e) => {
                warn!(key = %raw_key, "cache write failed: {:#}", e);
                PutOutcome::Failed
            }
        }
    }

    /// Remove every entry whose key starts with `prefix`.
    pub async fn clear(&self, prefix: &str) -> Result<u64> {
        self.store.remove_prefix(prefix).await
    }

    pub async fn clear_family(&self, family: CacheFamily) -> Result<u64> {
        self.clear(&format!("{}:", family.prefix())).await
    }

    async fn evict(&self, raw_key: &str) {
        if let Err(e) = self.store.remove(raw_key).await {
            warn!(key = %raw_key, "cache eviction failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryCacheStore;
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn cache() -> (Arc<InMemoryCacheStore>, TtlCache) {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = TtlCache::new(store.clone());
        (store, cache)
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            CacheKey::org(CacheFamily::OrgStats, "Acme").to_string(),
            "org_stats:acme"
        );
        assert_eq!(
            CacheKey::pull(CacheFamily::PrTurn, "acme/widgets", 42).to_string(),
            "pr_turn:acme/widgets#42"
        );
        assert_eq!(
            CacheKey::org_user(CacheFamily::Leaderboard, "acme", "Octocat")
                .variant("2024-03-01")
                .to_string(),
            "leaderboard:acme/octocat@2024-03-01"
        );
        assert_eq!(
            CacheFamily::from_key("user_orgs:octocat"),
            Some(CacheFamily::Membership)
        );
        assert_eq!(CacheFamily::from_key("nope:x"), None);
    }

    #[tokio::test]
    async fn test_hit_within_ttl_and_lazy_expiry() {
        let (store, cache) = cache();
        let key = CacheKey::user(CacheFamily::PrSnapshot, "octocat");
        let t0 = Utc::now();

        assert_eq!(cache.put_at(&key, &vec![1, 2, 3], t0).await, PutOutcome::Stored);

        let hit: Option<Vec<i32>> = cache.get_at(&key, t0 + ChronoDuration::seconds(9)).await;
        assert_eq!(hit, Some(vec![1, 2, 3]));

        let miss: Option<Vec<i32>> = cache.get_at(&key, t0 + ChronoDuration::seconds(10)).await;
        assert_eq!(miss, None);
        assert!(store.load(&key.to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_families_have_independent_ttls() {
        let (_, cache) = cache();
        let t0 = Utc::now();
        let later = t0 + ChronoDuration::minutes(90);

        let snapshot = CacheKey::org(CacheFamily::PrSnapshot, "acme");
        let stats = CacheKey::org(CacheFamily::OrgStats, "acme");
        cache.put_at(&snapshot, &"a", t0).await;
        cache.put_at(&stats, &"b", t0).await;

        assert_eq!(cache.get_at::<String>(&snapshot, later).await, None);
        assert_eq!(
            cache.get_at::<String>(&stats, later).await,
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_removed() {
        let (store, cache) = cache();
        let key = CacheKey::org(CacheFamily::OrgStats, "acme");
        store.save(&key.to_string(), "{not json").await.unwrap();

        assert_eq!(cache.get::<String>(&key).await, None);
        assert!(store.load(&key.to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_treated_as_corrupt() {
        let (store, cache) = cache();
        let key = CacheKey::org(CacheFamily::OrgStats, "acme");
        cache.put(&key, &"a string").await;

        assert_eq!(cache.get::<Vec<u64>>(&key).await, None);
        assert!(store.load(&key.to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_put_is_skipped() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = TtlCache::new(store.clone()).with_max_entry_bytes(Some(QUOTA_ENTRY_BYTES));
        let key = CacheKey::org(CacheFamily::OrgStats, "acme");

        let big = "x".repeat(QUOTA_ENTRY_BYTES);
        assert_eq!(cache.put(&key, &big).await, PutOutcome::TooLarge);
        assert!(store.is_empty());

        assert_eq!(cache.put(&key, &"small").await, PutOutcome::Stored);
    }

    #[tokio::test]
    async fn test_persisted_layout() {
        let (store, cache) = cache();
        let key = CacheKey::org(CacheFamily::OrgStats, "acme");
        let t0 = Utc::now();
        cache.put_at(&key, &serde_json::json!({"open": 3}), t0).await;

        let raw = store.load("org_stats:acme").await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["data"]["open"], 3);
        assert_eq!(value["timestamp"], t0.timestamp_millis());
    }

    #[tokio::test]
    async fn test_clear_by_prefix_respects_namespaces() {
        let (_, cache) = cache();
        cache.put(&CacheKey::org(CacheFamily::OrgStats, "acme"), &1).await;
        cache.put(&CacheKey::org(CacheFamily::OrgStats, "globex"), &2).await;
        cache.put(&CacheKey::user(CacheFamily::Membership, "acme"), &3).await;

        assert_eq!(cache.clear_family(CacheFamily::OrgStats).await.unwrap(), 2);
        assert_eq!(
            cache
                .get::<i32>(&CacheKey::user(CacheFamily::Membership, "acme"))
                .await,
            Some(3)
        );
    }
}
