//! Per-organization TTL cache over the agent store.
//!
//! Each organization scope owns a bucket behind its own lock. A background
//! poller watches the store's latest modification time and drops every bucket
//! in one swap when it advances.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::config::{MAX_CACHE_TTL_MS, MIN_CACHE_TTL_MS};
use crate::domain::models::{AgentDefinition, AgentRecord, RegistryConfig};
use crate::domain::ports::AgentStore;

/// `None` is the global (no-organization) bucket.
type BucketKey = Option<String>;

struct CacheEntry {
    definition: Arc<AgentDefinition>,
    expires_at: Instant,
}

#[derive(Default)]
struct Bucket {
    entries: HashMap<String, CacheEntry>,
    /// Set when the whole scope was listed from the store.
    listed_until: Option<Instant>,
}

type BucketMap = HashMap<BucketKey, Arc<RwLock<Bucket>>>;

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that went to the store.
    pub misses: u64,
    /// Full clears, including poll-triggered ones.
    pub clears: u64,
}

/// Handle to a running invalidation poller.
struct PollerHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

/// TTL cache of agent definitions, bucketed by organization scope.
pub struct RegistryCache {
    store: Arc<dyn AgentStore>,
    ttl: Duration,
    poll_interval: Duration,
    buckets: RwLock<BucketMap>,
    baseline: Mutex<Option<Option<DateTime<Utc>>>>,
    poller: Mutex<Option<PollerHandle>>,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

impl RegistryCache {
    /// Cache over `store` using the configured TTL and poll interval.
    pub fn new(store: Arc<dyn AgentStore>, config: &RegistryConfig) -> Self {
        Self {
            store,
            ttl: config.cache_ttl(),
            poll_interval: config.poll_interval(),
            buckets: RwLock::new(HashMap::new()),
            baseline: Mutex::new(None),
            poller: Mutex::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    /// Cache with an explicit TTL, clamped to the supported range.
    pub fn with_ttl(store: Arc<dyn AgentStore>, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(MAX_CACHE_TTL_MS);
        let config = RegistryConfig {
            cache_ttl_ms: ttl_ms.clamp(MIN_CACHE_TTL_MS, MAX_CACHE_TTL_MS),
            poll_interval_ms: RegistryConfig::default().poll_interval_ms,
            poll_enabled: false,
        };
        Self::new(store, &config)
    }

    /// Effective entry TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Effective poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }

    async fn bucket(&self, key: &BucketKey) -> Arc<RwLock<Bucket>> {
        if let Some(bucket) = self.buckets.read().await.get(key) {
            return bucket.clone();
        }
        self.buckets
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Resolve an agent visible to `org` by slug.
    pub async fn get(
        &self,
        org: Option<&str>,
        slug: &str,
    ) -> DomainResult<Option<Arc<AgentDefinition>>> {
        let key: BucketKey = org.map(str::to_string);
        let bucket = self.bucket(&key).await;

        {
            let guard = bucket.read().await;
            if let Some(entry) = guard.entries.get(slug) {
                if Instant::now() < entry.expires_at {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.definition.clone()));
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(org = ?org, slug, "Registry cache miss");

        let Some(record) = self.store.find_by_slug(org, slug).await? else {
            return Ok(None);
        };
        let definition = Arc::new(AgentDefinition::try_from(&record)?);

        bucket.write().await.entries.insert(
            slug.to_string(),
            CacheEntry {
                definition: definition.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(Some(definition))
    }

    /// List agents for the given scopes plus the global bucket, de-duplicated by slug.
    pub async fn list(&self, org_scopes: &[String]) -> DomainResult<Vec<Arc<AgentDefinition>>> {
        let mut keys: Vec<BucketKey> = org_scopes.iter().cloned().map(Some).collect();
        keys.push(None);

        let mut seen = HashSet::new();
        let mut definitions = Vec::new();
        for key in keys {
            for definition in self.list_bucket(&key).await? {
                if seen.insert(definition.slug.clone()) {
                    definitions.push(definition);
                }
            }
        }
        definitions.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(definitions)
    }

    async fn list_bucket(&self, key: &BucketKey) -> DomainResult<Vec<Arc<AgentDefinition>>> {
        let bucket = self.bucket(key).await;
        let now = Instant::now();

        {
            let guard = bucket.read().await;
            if guard.listed_until.is_some_and(|until| now < until) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(guard
                    .entries
                    .values()
                    .map(|e| e.definition.clone())
                    .collect());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let records = self.store.list_by_organization(key.as_deref()).await?;
        let definitions = build_definitions(&records);

        let expires_at = Instant::now() + self.ttl;
        let mut guard = bucket.write().await;
        guard.entries = definitions
            .iter()
            .map(|d| {
                (
                    d.slug.clone(),
                    CacheEntry {
                        definition: d.clone(),
                        expires_at,
                    },
                )
            })
            .collect();
        guard.listed_until = Some(expires_at);
        Ok(definitions)
    }

    /// Drop one entry, or the whole organization bucket when `slug` is `None`.
    pub async fn invalidate(&self, org: Option<&str>, slug: Option<&str>) {
        let key: BucketKey = org.map(str::to_string);
        match slug {
            Some(slug) => {
                let bucket = self.buckets.read().await.get(&key).cloned();
                if let Some(bucket) = bucket {
                    let mut guard = bucket.write().await;
                    guard.entries.remove(slug);
                    guard.listed_until = None;
                }
            }
            None => {
                self.buckets.write().await.remove(&key);
            }
        }
        debug!(org = ?org, slug = ?slug, "Registry cache invalidated");
    }

    /// Drop `slug` from every bucket it may be cached in.
    pub async fn invalidate_agent(&self, slug: &str) {
        let buckets: Vec<_> = self.buckets.read().await.values().cloned().collect();
        for bucket in buckets {
            let mut guard = bucket.write().await;
            if guard.entries.remove(slug).is_some() {
                guard.listed_until = None;
            }
        }
        debug!(slug, "Registry cache invalidated agent in all scopes");
    }

    /// Drop every bucket in one swap.
    pub async fn clear(&self) {
        let dropped = std::mem::take(&mut *self.buckets.write().await);
        self.clears.fetch_add(1, Ordering::Relaxed);
        debug!(buckets = dropped.len(), "Registry cache cleared");
    }

    /// One poll cycle. The first call only records the baseline.
    /// Returns true when the cache was cleared.
    pub async fn poll_once(&self) -> DomainResult<bool> {
        let latest = self.store.latest_modified_at().await?;
        let mut baseline = self.baseline.lock().await;

        match *baseline {
            None => {
                *baseline = Some(latest);
                Ok(false)
            }
            Some(previous) if latest > previous => {
                *baseline = Some(latest);
                drop(baseline);
                info!(previous = ?previous, latest = ?latest, "Agent store changed, clearing registry cache");
                self.clear().await;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Start the background poller. A second call while running is a no-op.
    pub async fn start_poller(self: &Arc<Self>) {
        let mut slot = self.poller.lock().await;
        if slot.as_ref().is_some_and(|p| !p.task.is_finished()) {
            return;
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let cache = Arc::downgrade(self);
        let period = self.poll_interval;
        let task_stop = stop_flag.clone();
        let task_wake = wake.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = task_wake.notified() => {}
                }
                if task_stop.load(Ordering::Acquire) {
                    break;
                }
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if let Err(e) = cache.poll_once().await {
                    warn!(error = %e, "Registry invalidation poll failed");
                }
            }
            debug!("Registry invalidation poller stopped");
        });

        info!(interval_ms = period.as_millis() as u64, "Registry invalidation poller started");
        *slot = Some(PollerHandle {
            stop_flag,
            wake,
            task,
        });
    }

    /// Stop the background poller and wait for it to exit.
    pub async fn stop_poller(&self) {
        let handle = self.poller.lock().await.take();
        if let Some(handle) = handle {
            handle.stop_flag.store(true, Ordering::Release);
            handle.wake.notify_one();
            let _ = handle.task.await;
        }
    }

    /// Whether the invalidation poller is running.
    pub async fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| !p.task.is_finished())
    }
}

fn build_definitions(records: &[AgentRecord]) -> Vec<Arc<AgentDefinition>> {
    records
        .iter()
        .filter_map(|record| match AgentDefinition::try_from(record) {
            Ok(definition) => Some(Arc::new(definition)),
            Err(e) => {
                warn!(slug = %record.slug, error = %e, "Skipping agent with invalid definition");
                None
            }
        })
        .collect()
}
