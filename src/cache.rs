use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::agents::tasks::TaskResult;
use crate::agents::time::TimeContext;
use crate::cli::CacheBackendKind;
use crate::config::RuntimeConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt cache entry '{key}': {message}")]
    Corrupt { key: String, message: String },

    #[error("cache entry '{0}' not found")]
    Missing(String),

    #[error("invalid cache key '{0}'")]
    InvalidKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub timestamp: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub hit_count: u64,
}

impl CacheMetadata {
    pub fn fresh(now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            timestamp: now,
            ttl_seconds: ttl.as_secs(),
            hit_count: 1,
        }
    }

    /// Staleness is measured from the first write, never from the last read.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp).num_seconds();
        age > 0 && age as u64 > self.ttl_seconds
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub payload: Vec<TaskResult>,
    pub metadata: CacheMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Vec<TaskResult>,
    pub metadata: CacheMetadata,
}

/// Content-addressed key for one analysis request.
///
/// md5 over a sorted-key JSON document, so identical inputs on the same
/// calendar day always collide and any differing field changes the key.
pub fn fingerprint(
    company_name: &str,
    task_descriptions: &[&str],
    model_version: &str,
    time: &TimeContext,
) -> String {
    let mut doc = BTreeMap::<&str, Value>::new();
    doc.insert("company", json!(company_name.trim()));
    doc.insert("date", json!(time.day_key()));
    doc.insert("model", json!(model_version));
    doc.insert("tasks", json!(task_descriptions));
    let canonical = serde_json::to_string(&doc).unwrap_or_default();
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

/// Storage behind the result cache. Backends own expiry: an expired entry
/// reads as absent.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<TaskResult>>, CacheError>;

    /// Create (or overwrite) an entry; metadata starts at hit_count 1.
    async fn put(&self, key: &str, payload: &[TaskResult], ttl: Duration) -> Result<(), CacheError>;

    async fn get_metadata(&self, key: &str) -> Result<Option<CacheMetadata>, CacheError>;

    async fn set_metadata(&self, key: &str, metadata: &CacheMetadata) -> Result<(), CacheError>;

    /// Count one read of a live entry as a single atomic step. Returns the
    /// record as this read observed it; the stored count ends one higher.
    async fn record_hit(&self, key: &str) -> Result<Option<CacheRecord>, CacheError>;

    /// Drop every entry, returning how many were removed.
    async fn clear(&self) -> Result<usize, CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, CacheRecord>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn live_record(&self, key: &str) -> Option<CacheRecord> {
        {
            let entries = self.entries.read().await;
            let record = entries.get(key)?;
            if !record.metadata.is_expired_at(Utc::now()) {
                return Some(record.clone());
            }
        }

        // Expiry is re-checked under the write lock: a concurrent put may
        // have refreshed the entry since the read above.
        let mut entries = self.entries.write().await;
        let expired = entries.get(key)?.metadata.is_expired_at(Utc::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<TaskResult>>, CacheError> {
        Ok(self.live_record(key).await.map(|record| record.payload))
    }

    async fn put(&self, key: &str, payload: &[TaskResult], ttl: Duration) -> Result<(), CacheError> {
        let record = CacheRecord {
            payload: payload.to_vec(),
            metadata: CacheMetadata::fresh(Utc::now(), ttl),
        };
        self.entries.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<CacheMetadata>, CacheError> {
        Ok(self.live_record(key).await.map(|record| record.metadata))
    }

    async fn set_metadata(&self, key: &str, metadata: &CacheMetadata) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let record = entries
            .get_mut(key)
            .ok_or_else(|| CacheError::Missing(key.to_string()))?;
        record.metadata = metadata.clone();
        Ok(())
    }

    async fn record_hit(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let mut entries = self.entries.write().await;
        let expired = match entries.get(key) {
            Some(record) => record.metadata.is_expired_at(Utc::now()),
            None => return Ok(None),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }

        let Some(record) = entries.get_mut(key) else {
            return Ok(None);
        };
        let observed = record.clone();
        record.metadata.hit_count = record.metadata.hit_count.saturating_add(1);
        Ok(Some(observed))
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

/// One JSON file per key. Writes go through a temp file and a rename, so
/// concurrent writers on the same key resolve as last-writer-wins.
///
/// Every operation on a key holds that key's lock, which keeps hit counting
/// and expiry removal from interleaving with writers in this process.
#[derive(Debug, Clone)]
pub struct FileCacheBackend {
    dir: PathBuf,
    key_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FileCacheBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key_locks: Arc::default(),
        }
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    async fn read_record(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let path = self.entry_path(key)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(CacheError::Unavailable(format!(
                    "failed to read '{}': {err}",
                    path.display()
                )));
            }
        };

        let record = serde_json::from_str::<CacheRecord>(&content).map_err(|err| {
            CacheError::Corrupt {
                key: key.to_string(),
                message: err.to_string(),
            }
        })?;

        if record.metadata.is_expired_at(Utc::now()) {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                tracing::debug!(key = key, error = %err, "expired cache entry removal failed");
            }
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn write_record(&self, key: &str, record: &CacheRecord) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            CacheError::Unavailable(format!(
                "failed to create cache directory '{}': {err}",
                self.dir.display()
            ))
        })?;

        let body = serde_json::to_vec_pretty(record).map_err(|err| CacheError::Corrupt {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        let tmp = self.dir.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        tokio::fs::write(&tmp, body).await.map_err(|err| {
            CacheError::Unavailable(format!("failed to write '{}': {err}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|err| {
            CacheError::Unavailable(format!("failed to replace '{}': {err}", path.display()))
        })
    }
}

#[async_trait]
impl CacheBackend for FileCacheBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<TaskResult>>, CacheError> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        Ok(self.read_record(key).await?.map(|record| record.payload))
    }

    async fn put(&self, key: &str, payload: &[TaskResult], ttl: Duration) -> Result<(), CacheError> {
        let record = CacheRecord {
            payload: payload.to_vec(),
            metadata: CacheMetadata::fresh(Utc::now(), ttl),
        };
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        self.write_record(key, &record).await
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<CacheMetadata>, CacheError> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        Ok(self.read_record(key).await?.map(|record| record.metadata))
    }

    async fn set_metadata(&self, key: &str, metadata: &CacheMetadata) -> Result<(), CacheError> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        let mut record = self
            .read_record(key)
            .await?
            .ok_or_else(|| CacheError::Missing(key.to_string()))?;
        record.metadata = metadata.clone();
        self.write_record(key, &record).await
    }

    async fn record_hit(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        let Some(observed) = self.read_record(key).await? else {
            return Ok(None);
        };
        let mut bumped = observed.clone();
        bumped.metadata.hit_count = bumped.metadata.hit_count.saturating_add(1);
        self.write_record(key, &bumped).await?;
        Ok(Some(observed))
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(CacheError::Unavailable(err.to_string())),
        };

        let mut removed = 0usize;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|err| CacheError::Unavailable(err.to_string()))?
        {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|err| CacheError::Unavailable(err.to_string()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Cache layer used by the analyzer: hit counting on reads, and
/// graceful degradation when the backend misbehaves.
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read an entry and count the hit. The returned metadata is what this
    /// read observed; the stored count moves one ahead.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let Some(record) = self.backend.record_hit(key).await? else {
            return Ok(None);
        };
        if record.payload.is_empty() {
            return Err(CacheError::Corrupt {
                key: key.to_string(),
                message: "entry has an empty payload".to_string(),
            });
        }

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload: record.payload,
            metadata: record.metadata,
        }))
    }

    pub async fn put(&self, key: &str, payload: &[TaskResult]) -> Result<(), CacheError> {
        self.backend.put(key, payload, self.ttl).await
    }

    /// Metadata without counting a hit.
    pub async fn peek(&self, key: &str) -> Result<Option<CacheMetadata>, CacheError> {
        self.backend.get_metadata(key).await
    }

    pub async fn clear(&self) -> Result<usize, CacheError> {
        self.backend.clear().await
    }

    /// `get` with every backend failure treated as a miss.
    pub async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.get(key).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(
                    backend = self.backend_name(),
                    key = key,
                    error = %err,
                    "cache read failed; treating as miss"
                );
                None
            }
        }
    }

    /// `put` that only warns on failure. Returns whether the write landed.
    pub async fn store(&self, key: &str, payload: &[TaskResult]) -> bool {
        match self.put(key, payload).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    backend = self.backend_name(),
                    key = key,
                    error = %err,
                    "cache write failed; result not cached"
                );
                false
            }
        }
    }
}

pub fn build_cache_backend(kind: CacheBackendKind, dir: &str) -> Arc<dyn CacheBackend> {
    match kind {
        CacheBackendKind::Memory => Arc::new(MemoryCacheBackend::new()),
        CacheBackendKind::File => Arc::new(FileCacheBackend::new(dir)),
    }
}

pub fn build_result_cache(cfg: &RuntimeConfig) -> ResultCache {
    ResultCache::new(
        build_cache_backend(cfg.cache_backend, &cfg.cache_dir),
        Duration::from_secs(cfg.cache_ttl_secs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tasks::TaskId;
    use chrono::TimeZone;
    use tempfile::tempdir;

    const DAY: Duration = Duration::from_secs(86_400);

    fn day(d: u32, h: u32) -> TimeContext {
        TimeContext::at(Utc.with_ymd_and_hms(2024, 5, d, h, 0, 0).unwrap())
    }

    fn payload() -> Vec<TaskResult> {
        vec![
            TaskResult::success(TaskId::Financial, "Financial Metrics:\n- Revenue: $1B"),
            TaskResult::success(TaskId::Market, "Market Position:\n- Competitors: A, B"),
        ]
    }

    #[test]
    fn fingerprint_is_stable_within_a_day() {
        let tasks = ["a", "b"];
        let first = fingerprint("Acme Corp", &tasks, "model-1", &day(3, 1));
        let later = fingerprint("Acme Corp", &tasks, "model-1", &day(3, 22));
        assert_eq!(first, later);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_any_input() {
        let tasks = ["a", "b"];
        let base = fingerprint("Acme Corp", &tasks, "model-1", &day(3, 1));
        assert_ne!(base, fingerprint("Acme Inc", &tasks, "model-1", &day(3, 1)));
        assert_ne!(base, fingerprint("Acme Corp", &["a"], "model-1", &day(3, 1)));
        assert_ne!(base, fingerprint("Acme Corp", &tasks, "model-2", &day(3, 1)));
        assert_ne!(base, fingerprint("Acme Corp", &tasks, "model-1", &day(4, 1)));
    }

    #[test]
    fn expiry_is_measured_from_creation() {
        let created = Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap();
        let meta = CacheMetadata::fresh(created, DAY);
        assert!(!meta.is_expired_at(created));
        assert!(!meta.is_expired_at(created + chrono::Duration::seconds(86_400)));
        assert!(meta.is_expired_at(created + chrono::Duration::seconds(86_401)));
    }

    #[tokio::test]
    async fn hit_count_starts_at_one_and_increments_per_read() {
        let cache = ResultCache::new(Arc::new(MemoryCacheBackend::new()), DAY);
        cache.put("k1", &payload()).await.expect("put should succeed");

        let first = cache.get("k1").await.expect("get").expect("entry");
        assert_eq!(first.payload, payload());
        assert_eq!(first.metadata.hit_count, 1);

        let second = cache.get("k1").await.expect("get").expect("entry");
        let third = cache.get("k1").await.expect("get").expect("entry");
        assert_eq!(second.metadata.hit_count, 2);
        assert_eq!(third.metadata.hit_count, 3);
        assert_eq!(third.metadata.timestamp, first.metadata.timestamp);

        let peeked = cache.peek("k1").await.expect("peek").expect("metadata");
        assert_eq!(peeked.hit_count, 4);
        assert!(cache.get("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn file_backend_round_trips_and_counts_hits() {
        let dir = tempdir().expect("temp directory should create");
        let cache = ResultCache::new(Arc::new(FileCacheBackend::new(dir.path())), DAY);

        assert!(cache.store("abc123", &payload()).await);
        let first = cache.lookup("abc123").await.expect("entry should exist");
        let second = cache.lookup("abc123").await.expect("entry should exist");
        assert_eq!(first.payload, payload());
        assert_eq!(first.metadata.hit_count, 1);
        assert_eq!(second.metadata.hit_count, 2);

        assert_eq!(cache.clear().await.expect("clear should succeed"), 1);
        assert!(cache.lookup("abc123").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lookups_each_count_one_hit() {
        let dir = tempdir().expect("temp directory should create");
        let backends: [Arc<dyn CacheBackend>; 2] = [
            Arc::new(MemoryCacheBackend::new()),
            Arc::new(FileCacheBackend::new(dir.path())),
        ];

        for backend in backends {
            let cache = ResultCache::new(backend, DAY);
            assert!(cache.store("shared", &payload()).await);

            let readers = (0..20)
                .map(|_| {
                    let cache = cache.clone();
                    tokio::spawn(async move { cache.lookup("shared").await })
                })
                .collect::<Vec<_>>();

            let mut observed = Vec::new();
            for joined in futures::future::join_all(readers).await {
                let entry = joined
                    .expect("reader task should not panic")
                    .expect("every reader should hit");
                assert_eq!(entry.payload, payload());
                observed.push(entry.metadata.hit_count);
            }
            observed.sort_unstable();

            assert_eq!(
                observed,
                (1..=20).collect::<Vec<u64>>(),
                "{} backend",
                cache.backend_name()
            );
            let stored = cache.peek("shared").await.expect("peek").expect("metadata");
            assert_eq!(stored.hit_count, 21, "{} backend", cache.backend_name());
        }
    }

    #[tokio::test]
    async fn expired_entry_is_not_counted_as_a_hit() {
        let backend = MemoryCacheBackend::new();
        backend.put("k", &payload(), DAY).await.expect("put");
        let stale = CacheMetadata {
            timestamp: Utc::now() - chrono::Duration::days(2),
            ttl_seconds: DAY.as_secs(),
            hit_count: 3,
        };
        backend.set_metadata("k", &stale).await.expect("set metadata");

        assert!(backend.record_hit("k").await.expect("record hit").is_none());
        backend.put("k", &payload(), DAY).await.expect("put");
        let fresh = backend.record_hit("k").await.expect("record hit").expect("entry");
        assert_eq!(fresh.metadata.hit_count, 1);
    }

    #[tokio::test]
    async fn backdated_entries_read_as_absent() {
        let backend = MemoryCacheBackend::new();
        backend.put("k", &payload(), DAY).await.expect("put");
        let stale = CacheMetadata {
            timestamp: Utc::now() - chrono::Duration::days(2),
            ttl_seconds: DAY.as_secs(),
            hit_count: 7,
        };
        backend.set_metadata("k", &stale).await.expect("set metadata");
        assert!(backend.get("k").await.expect("get").is_none());
        assert!(backend.get_metadata("k").await.expect("metadata").is_none());
    }

    #[tokio::test]
    async fn corrupt_file_degrades_to_miss() {
        let dir = tempdir().expect("temp directory should create");
        std::fs::write(dir.path().join("deadbeef.json"), "{not json").expect("write");
        let cache = ResultCache::new(Arc::new(FileCacheBackend::new(dir.path())), DAY);

        assert!(matches!(
            cache.get("deadbeef").await,
            Err(CacheError::Corrupt { .. })
        ));
        assert!(cache.lookup("deadbeef").await.is_none());
    }

    #[tokio::test]
    async fn unwritable_directory_only_warns() {
        let dir = tempdir().expect("temp directory should create");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").expect("write");
        let cache = ResultCache::new(Arc::new(FileCacheBackend::new(&blocker)), DAY);

        assert!(!cache.store("abc", &payload()).await);
        assert!(cache.lookup("abc").await.is_none());
    }

    #[tokio::test]
    async fn file_backend_rejects_path_like_keys() {
        let dir = tempdir().expect("temp directory should create");
        let backend = FileCacheBackend::new(dir.path());
        assert!(matches!(
            backend.get("../escape").await,
            Err(CacheError::InvalidKey(_))
        ));
    }
}
