//! Indexer Manager
//!
//! The IndexerManager is responsible for:
//! - Building indexer instances from the active definition set
//! - Fanning one search out across many indexers concurrently
//! - Caching merged result sets so re-sorting and paging stay local
//! - Limiting concurrent searches per indexer to avoid tracker bans

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::cardigann::CardigannIndexer;
use super::cardigann::store::DefinitionStore;
use super::categories;
use super::error::{AggregateError, SearchError};
use super::http::{ChallengeSolver, DEFAULT_USER_AGENT, HttpFetcher};
use super::types::{
    IndexerFailure, IndexerSummary, IndexerType, ReleaseInfo, SearchRequest, SearchResponse,
    SortField, SortOrder, TorznabQuery,
};
use super::Indexer;
use crate::config::{Config, IndexerInstanceConfig};

/// Default cache TTL (2 minutes)
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2 * 60);
/// Default number of cached searches kept
const DEFAULT_CACHE_CAPACITY: usize = 100;
/// Maximum concurrent searches per indexer
const MAX_CONCURRENT_SEARCHES: usize = 2;

/// Tunables for the manager, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub search_timeout: Duration,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub user_agent: String,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(45),
            request_timeout: super::cardigann::DEFAULT_REQUEST_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&Config> for ManagerOptions {
    fn from(config: &Config) -> Self {
        Self {
            search_timeout: config.search_timeout,
            request_timeout: config.request_timeout,
            cache_ttl: config.cache_ttl,
            cache_capacity: config.cache_capacity,
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Where definition-backed indexers come from
struct DefinitionSource {
    store: Arc<DefinitionStore>,
    instances: Option<Vec<IndexerInstanceConfig>>,
    fetcher: Arc<dyn HttpFetcher>,
    solver: Option<Arc<dyn ChallengeSolver>>,
}

/// What one indexer contributed to a fan-out
struct IndexerOutcome {
    summary: IndexerSummary,
    priority: i32,
    releases: Vec<ReleaseInfo>,
}

/// Manages all configured indexer instances
pub struct IndexerManager {
    options: ManagerOptions,
    /// Definition store and instance config, when built from disk
    source: Option<DefinitionSource>,
    /// Loaded indexer instances by instance id
    indexers: RwLock<HashMap<String, Arc<dyn Indexer>>>,
    /// Search cache
    cache: SearchCache,
    /// Rate limiting semaphores per indexer
    rate_limiters: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl IndexerManager {
    /// Create an empty manager; indexers are added with [`register`](Self::register)
    pub fn new(options: ManagerOptions) -> Self {
        Self {
            cache: SearchCache::new(options.cache_ttl, options.cache_capacity),
            options,
            source: None,
            indexers: RwLock::new(HashMap::new()),
            rate_limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Create a manager whose indexers are built from a definition store.
    /// `instances` of `None` enables every loaded definition with defaults.
    pub fn from_store(
        store: Arc<DefinitionStore>,
        instances: Option<Vec<IndexerInstanceConfig>>,
        fetcher: Arc<dyn HttpFetcher>,
        solver: Option<Arc<dyn ChallengeSolver>>,
        options: ManagerOptions,
    ) -> Self {
        let mut manager = Self::new(options);
        manager.source = Some(DefinitionSource {
            store,
            instances,
            fetcher,
            solver,
        });
        manager.rebuild();
        manager
    }

    /// Add or replace an indexer
    pub fn register(&self, indexer: Arc<dyn Indexer>) {
        let id = indexer.id().to_string();
        self.rate_limiters
            .write()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(MAX_CONCURRENT_SEARCHES)));
        self.indexers.write().insert(id, indexer);
    }

    /// Remove an indexer
    pub fn unload_indexer(&self, id: &str) {
        self.indexers.write().remove(id);
        self.rate_limiters.write().remove(id);
    }

    /// Get an indexer by instance id (case-insensitive)
    pub fn get_indexer(&self, id: &str) -> Option<Arc<dyn Indexer>> {
        let indexers = self.indexers.read();
        indexers.get(id).cloned().or_else(|| {
            indexers
                .values()
                .find(|idx| idx.id().eq_ignore_ascii_case(id))
                .cloned()
        })
    }

    /// All indexers ordered by (priority, name)
    pub fn get_all_indexers(&self) -> Vec<Arc<dyn Indexer>> {
        let mut all: Vec<_> = self.indexers.read().values().cloned().collect();
        sort_indexers(&mut all);
        all
    }

    /// Reload definitions from disk, rebuild every definition-backed
    /// indexer and drop cached results. Returns the number of indexers.
    pub fn reload(&self) -> usize {
        if let Some(source) = &self.source {
            source.store.reload();
        }
        let count = self.rebuild();
        self.cache.clear();
        count
    }

    fn rebuild(&self) -> usize {
        let Some(source) = &self.source else {
            return self.indexers.read().len();
        };
        let set = source.store.snapshot();

        let instances = match &source.instances {
            Some(instances) => instances.clone(),
            None => set
                .definitions()
                .iter()
                .map(|d| IndexerInstanceConfig::for_definition(&d.id))
                .collect(),
        };

        let mut built: HashMap<String, Arc<dyn Indexer>> = HashMap::new();
        for instance in instances.iter().filter(|i| i.enabled) {
            let Some(definition) = set.get(instance.definition_id()) else {
                tracing::warn!(
                    indexer_id = %instance.id,
                    definition = %instance.definition_id(),
                    "Configured indexer has no loaded definition"
                );
                continue;
            };

            let indexer = match CardigannIndexer::new(definition, source.fetcher.clone()) {
                Ok(indexer) => indexer,
                Err(e) => {
                    tracing::warn!(indexer_id = %instance.id, error = %e, "Failed to build indexer");
                    continue;
                }
            };
            let mut indexer = indexer
                .with_instance(instance.id.clone(), instance.name.clone())
                .with_priority(instance.priority)
                .with_settings(&instance.settings_list())
                .with_request_timeout(self.options.request_timeout)
                .with_user_agent(self.options.user_agent.clone());
            if let Some(solver) = &source.solver {
                indexer = indexer.with_solver(solver.clone());
            }

            if built.contains_key(&instance.id) {
                tracing::warn!(indexer_id = %instance.id, "Duplicate indexer id, keeping the first");
                continue;
            }
            built.insert(instance.id.clone(), Arc::new(indexer));
        }

        let count = built.len();
        {
            let mut limiters = self.rate_limiters.write();
            limiters.retain(|id, _| built.contains_key(id));
            for id in built.keys() {
                limiters
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(MAX_CONCURRENT_SEARCHES)));
            }
        }
        *self.indexers.write() = built;

        tracing::info!(indexers = count, "Indexers loaded");
        count
    }

    /// Search across the requested indexers (all when none are named)
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, AggregateError> {
        let start = Instant::now();
        let query_text = request.query.trim().to_string();
        if query_text.is_empty() {
            return Err(AggregateError::EmptyQuery);
        }

        let (indexers, mut unknown) = self.resolve(&request.indexer_ids);
        let indexer_ids: Vec<String> = indexers.iter().map(|i| i.id().to_string()).collect();

        // Entries hold the unfiltered merge; categories are applied below
        let key = CacheKey::new(&query_text, &indexer_ids).digest();
        let cached = if request.fresh { None } else { self.cache.get(&key) };

        let (merged, mut summaries, from_cache) = match cached {
            Some(entry) => {
                tracing::debug!(query = %query_text, results = entry.releases.len(), "Search served from cache");
                let summaries = entry
                    .summaries
                    .into_iter()
                    .map(|mut s| {
                        s.from_cache = true;
                        s.elapsed_ms = 0;
                        s
                    })
                    .collect();
                (entry.releases, summaries, true)
            }
            None => {
                let query = TorznabQuery::search(&query_text);
                let (merged, summaries) = self.fan_out(indexers, &query).await;
                self.cache.insert(
                    key,
                    CachedSearch {
                        releases: merged.clone(),
                        summaries: summaries.clone(),
                    },
                );
                (merged, summaries, false)
            }
        };

        let mut errors: Vec<IndexerFailure> = summaries
            .iter()
            .filter_map(|s| {
                s.error.as_ref().map(|message| IndexerFailure {
                    indexer_id: s.indexer_id.clone(),
                    indexer_name: s.indexer_name.clone(),
                    message: message.clone(),
                })
            })
            .collect();
        errors.append(&mut unknown);

        let mut results: Vec<ReleaseInfo> = if request.category_ids.is_empty() {
            merged
        } else {
            merged
                .into_iter()
                .filter(|r| categories::intersects(&r.categories, &request.category_ids))
                .collect()
        };

        sort_releases(&mut results, request.sort_by, request.sort_order);
        let total = results.len();
        let results: Vec<ReleaseInfo> = results
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();

        summaries.sort_by(|a, b| a.indexer_id.cmp(&b.indexer_id));
        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            query = %query_text,
            indexers = summaries.len(),
            total,
            returned = results.len(),
            errors = errors.len(),
            cached = from_cache,
            elapsed_ms,
            "Search complete"
        );

        Ok(SearchResponse {
            results,
            total,
            indexers: summaries,
            errors,
            elapsed_ms,
            cached: from_cache,
        })
    }

    /// Indexers to search plus an error entry per unknown id
    fn resolve(&self, ids: &[String]) -> (Vec<Arc<dyn Indexer>>, Vec<IndexerFailure>) {
        if ids.is_empty() {
            return (self.get_all_indexers(), vec![]);
        }

        let mut found: Vec<Arc<dyn Indexer>> = Vec::new();
        let mut unknown = Vec::new();
        for id in ids {
            match self.get_indexer(id) {
                Some(idx) if !found.iter().any(|f| f.id() == idx.id()) => {
                    found.push(idx)
                }
                Some(_) => {}
                None => unknown.push(IndexerFailure {
                    indexer_id: id.clone(),
                    indexer_name: id.clone(),
                    message: "indexer not found".to_string(),
                }),
            }
        }
        sort_indexers(&mut found);
        (found, unknown)
    }

    /// Run every indexer concurrently and merge in (priority, name) order
    async fn fan_out(
        &self,
        indexers: Vec<Arc<dyn Indexer>>,
        query: &TorznabQuery,
    ) -> (Vec<ReleaseInfo>, Vec<IndexerSummary>) {
        let (declarative, native): (Vec<_>, Vec<_>) = indexers
            .into_iter()
            .partition(|idx| idx.indexer_type() == IndexerType::Cardigann);
        tracing::debug!(
            cardigann = declarative.len(),
            native = native.len(),
            "Dispatching search"
        );

        // Dropping the set aborts every search still in flight, so a caller
        // that gives up does not leave tasks running until their deadline.
        let mut tasks = JoinSet::new();
        for indexer in declarative.into_iter().chain(native) {
            let query = query.clone();
            let rate_limiter = self.rate_limiters.read().get(indexer.id()).cloned();
            let timeout = self.options.search_timeout;
            let id = indexer.id().to_string();
            let name = indexer.name().to_string();
            let priority = indexer.priority();

            tasks.spawn(async move {
                let search = Self::search_single(indexer, &query, rate_limiter, timeout);
                match AssertUnwindSafe(search).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!(indexer_id = %id, "Indexer search task panicked");
                        IndexerOutcome {
                            summary: IndexerSummary {
                                indexer_id: id,
                                indexer_name: name,
                                result_count: 0,
                                elapsed_ms: 0,
                                from_cache: false,
                                error: Some("search task panicked".to_string()),
                            },
                            priority,
                            releases: vec![],
                        }
                    }
                }
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!(error = %e, "Indexer search task failed to join"),
            }
        }

        // Tasks finish in any order; the merge order must not depend on it
        outcomes.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.summary.indexer_name.to_lowercase().cmp(&b.summary.indexer_name.to_lowercase()))
                .then_with(|| a.summary.indexer_id.cmp(&b.summary.indexer_id))
        });

        let mut merged = Vec::new();
        let mut summaries = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            merged.extend(outcome.releases);
            summaries.push(outcome.summary);
        }
        (merged, summaries)
    }

    /// Search a single indexer under its rate limit and deadline
    async fn search_single(
        indexer: Arc<dyn Indexer>,
        query: &TorznabQuery,
        rate_limiter: Option<Arc<Semaphore>>,
        timeout: Duration,
    ) -> IndexerOutcome {
        let start = Instant::now();

        // Acquire rate limit permit
        let _permit = match &rate_limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        let result = match tokio::time::timeout(timeout, indexer.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(timeout)),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(mut releases) => {
                for release in &mut releases {
                    if release.indexer_id.is_none() {
                        release.indexer_id = Some(indexer.id().to_string());
                        release.indexer_name = Some(indexer.name().to_string());
                        release.indexer_priority = indexer.priority();
                    }
                }
                tracing::debug!(
                    indexer_id = %indexer.id(),
                    results = releases.len(),
                    elapsed_ms,
                    "Indexer search succeeded"
                );

                IndexerOutcome {
                    summary: IndexerSummary {
                        indexer_id: indexer.id().to_string(),
                        indexer_name: indexer.name().to_string(),
                        result_count: releases.len(),
                        elapsed_ms,
                        from_cache: false,
                        error: None,
                    },
                    priority: indexer.priority(),
                    releases,
                }
            }
            Err(e) => {
                tracing::warn!(
                    indexer_id = %indexer.id(),
                    indexer_name = %indexer.name(),
                    error = %e,
                    "Search failed"
                );

                IndexerOutcome {
                    summary: IndexerSummary {
                        indexer_id: indexer.id().to_string(),
                        indexer_name: indexer.name().to_string(),
                        result_count: 0,
                        elapsed_ms,
                        from_cache: false,
                        error: Some(e.to_string()),
                    },
                    priority: indexer.priority(),
                    releases: vec![],
                }
            }
        }
    }

    /// Test an indexer connection
    pub async fn test_indexer(&self, id: &str) -> Result<bool, SearchError> {
        let indexer = self
            .get_indexer(id)
            .ok_or_else(|| SearchError::Other(format!("indexer not loaded: {}", id)))?;

        indexer.test_connection().await
    }

    /// The definition store backing this manager, if any
    pub fn store(&self) -> Option<&Arc<DefinitionStore>> {
        self.source.as_ref().map(|s| &s.store)
    }

    pub fn cached_searches(&self) -> usize {
        self.cache.len()
    }
}

fn sort_indexers(indexers: &mut [Arc<dyn Indexer>]) {
    indexers.sort_by(|a, b| {
        a.priority()
            .cmp(&b.priority())
            .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
    });
}

/// Stable sort: indexer priority ascending, then `field` in `order`.
/// Releases that compare equal keep their relative order.
pub fn sort_releases(releases: &mut [ReleaseInfo], field: SortField, order: SortOrder) {
    releases.sort_by(|a, b| {
        let by_field = match field {
            // Smaller age means newer
            SortField::Age => b.publish_date.cmp(&a.publish_date),
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortField::Size => a.size.cmp(&b.size),
            SortField::Seeders => a.seeders.cmp(&b.seeders),
            SortField::Leechers => a.leechers.cmp(&b.leechers),
            SortField::Grabs => a.grabs.cmp(&b.grabs),
            SortField::Category => a.primary_category().cmp(&b.primary_category()),
            SortField::Indexer => a
                .indexer_name
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
                .cmp(&b.indexer_name.as_deref().unwrap_or_default().to_lowercase()),
        };
        let by_field = match order {
            SortOrder::Asc => by_field,
            SortOrder::Desc => by_field.reverse(),
        };
        a.indexer_priority.cmp(&b.indexer_priority).then(by_field)
    });
}

/// Normalized (query, indexer set)
#[derive(Debug, Clone)]
struct CacheKey {
    query: String,
    indexers: Vec<String>,
}

impl CacheKey {
    fn new(query: &str, indexers: &[String]) -> Self {
        let mut indexers: Vec<String> = indexers.iter().map(|s| s.to_lowercase()).collect();
        indexers.sort();
        indexers.dedup();
        Self {
            query: query.trim().to_lowercase(),
            indexers,
        }
    }

    fn digest(&self) -> String {
        let raw = format!("{}\n{}", self.query, self.indexers.join(","));
        format!("{:x}", Sha256::digest(raw.as_bytes()))
    }
}

#[derive(Clone)]
struct CachedSearch {
    releases: Vec<ReleaseInfo>,
    summaries: Vec<IndexerSummary>,
}

struct CacheEntry {
    search: CachedSearch,
    inserted_at: Instant,
    expires_at: Instant,
}

/// Bounded in-memory search cache. Expired entries are swept on insert and
/// the oldest entry is evicted when full.
struct SearchCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl SearchCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &str) -> Option<CachedSearch> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.search.clone())
    }

    fn insert(&self, key: String, search: CachedSearch) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expires_at > now);

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                search,
                inserted_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl std::fmt::Debug for IndexerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerManager")
            .field("indexers_count", &self.indexers.read().len())
            .field("cached_searches", &self.cache.len())
            .finish()
    }
}
