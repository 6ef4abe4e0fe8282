//! Link directory tests
//!
//! These tests drive the cache-aside create/resolve paths against
//! instrumented stores and caches so store traffic and cache bookkeeping
//! can be observed directly.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use shortener::cache::PopularityCache;
use shortener::links::{CodeGenerator, LinkDirectory};
use shortener::models::{Link, NewLink};
use shortener::storage::{LinkStore, MemoryStorage, StorageResult};
use shortener::ShortenerError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Link store that counts reads and existence checks
#[derive(Default)]
struct CountingStore {
    inner: MemoryStorage,
    gets: AtomicUsize,
    exists_calls: AtomicUsize,
    created: Mutex<Vec<String>>,
    /// Number of upcoming `exists` calls that should fail
    failing_exists: AtomicUsize,
}

#[async_trait]
impl LinkStore for CountingStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Link>> {
        self.inner.get_all().await
    }

    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(short_code).await
    }

    async fn create(&self, link: &NewLink) -> StorageResult<Link> {
        self.created.lock().unwrap().push(link.short_code.clone());
        self.inner.create(link).await
    }

    async fn exists(&self, short_code: &str) -> Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failing_exists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(anyhow!("connection reset"));
        }
        self.inner.exists(short_code).await
    }
}

/// Cache that records every call
struct RecordingCache {
    entries: DashMap<String, Link>,
    saves: AtomicUsize,
    increments: AtomicUsize,
    min_uses: i64,
    broken: AtomicBool,
}

impl RecordingCache {
    fn new(min_uses: i64) -> Self {
        Self {
            entries: DashMap::new(),
            saves: AtomicUsize::new(0),
            increments: AtomicUsize::new(0),
            min_uses,
            broken: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(anyhow!("cache unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PopularityCache for RecordingCache {
    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        self.check()?;
        Ok(self.entries.get(short_code).map(|e| e.value().clone()))
    }

    async fn save(&self, link: &Link) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.entries.insert(link.short_code.clone(), link.clone());
        Ok(())
    }

    async fn increment_usage(&self, _link: &Link, delta: u64) -> Result<()> {
        self.increments.fetch_add(delta as usize, Ordering::SeqCst);
        self.check()
    }

    fn min_uses_before_caching(&self) -> i64 {
        self.min_uses
    }
}

/// Generator that replays a fixed list of candidates
struct ScriptedGenerator {
    candidates: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(candidates: &[&str]) -> Self {
        Self {
            candidates: Mutex::new(candidates.iter().map(|c| c.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(&self, length: usize) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.candidates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "x".repeat(length))
    }
}

fn directory(
    store: &Arc<CountingStore>,
    cache: &Arc<RecordingCache>,
    generator: &Arc<ScriptedGenerator>,
) -> LinkDirectory {
    LinkDirectory::new(store.clone(), cache.clone(), 4).with_generator(generator.clone())
}

/// Poll until `condition` holds, letting detached tasks run
async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_generated_code_skips_existing_codes() {
    let store = Arc::new(CountingStore::default());
    store.inner.create(&NewLink::with_code("aaaa", "https://a.example")).await.unwrap();
    store.inner.create(&NewLink::with_code("bbbb", "https://b.example")).await.unwrap();

    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&["aaaa", "bbbb", "cccc"]));
    let directory = directory(&store, &cache, &generator);

    let link = directory
        .create(NewLink::new("https://example.com/new"))
        .await
        .unwrap();

    assert_eq!(link.short_code, "cccc");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.exists_calls.load(Ordering::SeqCst), 3);
    assert_eq!(*store.created.lock().unwrap(), vec!["cccc".to_string()]);
}

#[tokio::test]
async fn test_explicit_taken_code_conflicts_without_generation() {
    let store = Arc::new(CountingStore::default());
    store.inner.create(&NewLink::with_code("taken", "https://a.example")).await.unwrap();

    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&["free"]));
    let directory = directory(&store, &cache, &generator);

    let err = directory
        .create(NewLink::with_code("taken", "https://b.example"))
        .await
        .unwrap_err();

    assert!(matches!(err, ShortenerError::AlreadyExists));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.exists_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        store.inner.get("taken").await.unwrap().unwrap().source_url,
        "https://a.example"
    );
}

#[tokio::test]
async fn test_resolve_round_trip() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&["abcd"]));
    let directory = directory(&store, &cache, &generator);

    let source_url = "https://example.com/path?q=1#frag";
    let created = directory.create(NewLink::new(source_url)).await.unwrap();
    let resolved = directory.resolve(&created.short_code).await.unwrap();

    assert_eq!(resolved.source_url, source_url);
    assert_eq!(resolved, created);
}

#[tokio::test]
async fn test_cache_hit_skips_store() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = directory(&store, &cache, &generator);

    let link = store.inner.create(&NewLink::with_code("hot", "https://hot.example")).await.unwrap();
    cache.entries.insert("hot".to_string(), link.clone());

    let resolved = directory.resolve("hot").await.unwrap();
    assert_eq!(resolved, link);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    assert_eq!(cache.increments.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_miss_reads_store_and_promotes() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = directory(&store, &cache, &generator);

    store.inner.create(&NewLink::with_code("cold", "https://cold.example")).await.unwrap();

    directory.resolve("cold").await.unwrap();
    directory.resolve("cold").await.unwrap();

    assert_eq!(store.gets.load(Ordering::SeqCst), 2);
    eventually(|| cache.increments.load(Ordering::SeqCst) == 2).await;
}

#[tokio::test]
async fn test_resolve_missing_is_not_found() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = directory(&store, &cache, &generator);

    let err = directory.resolve("nope").await.unwrap_err();
    assert!(matches!(err, ShortenerError::NotFound));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.increments.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_instant_caching_below_threshold() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(0));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = directory(&store, &cache, &generator);

    let link = directory
        .create(NewLink::with_code("fresh", "https://fresh.example"))
        .await
        .unwrap();

    eventually(|| cache.entries.contains_key("fresh")).await;
    assert_eq!(cache.saves.load(Ordering::SeqCst), 1);

    // Served from the cache from now on
    assert_eq!(directory.resolve("fresh").await.unwrap(), link);
    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_no_caching_on_create_at_threshold() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(1));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = directory(&store, &cache, &generator);

    directory
        .create(NewLink::with_code("later", "https://later.example"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_failures_are_absorbed() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(0));
    cache.broken.store(true, Ordering::SeqCst);
    let generator = Arc::new(ScriptedGenerator::new(&["gen1"]));
    let directory = directory(&store, &cache, &generator);

    let created = directory.create(NewLink::new("https://example.com")).await.unwrap();
    let resolved = directory.resolve(&created.short_code).await.unwrap();
    assert_eq!(resolved, created);

    eventually(|| {
        cache.saves.load(Ordering::SeqCst) == 1 && cache.increments.load(Ordering::SeqCst) == 1
    })
    .await;
}

#[tokio::test]
async fn test_existence_errors_draw_new_candidate() {
    let store = Arc::new(CountingStore::default());
    store.failing_exists.store(2, Ordering::SeqCst);
    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&["err1", "err2", "okay"]));
    let directory = directory(&store, &cache, &generator);

    let link = directory.create(NewLink::new("https://example.com")).await.unwrap();

    assert_eq!(link.short_code, "okay");
    assert_eq!(store.exists_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_generation_cap_reports_exhaustion() {
    let store = Arc::new(CountingStore::default());
    store.inner.create(&NewLink::with_code("xxxx", "https://x.example")).await.unwrap();
    let cache = Arc::new(RecordingCache::new(3));
    // Exhausted script falls back to "xxxx", which is always taken
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = directory(&store, &cache, &generator).with_max_generation_attempts(Some(5));

    let err = directory.create(NewLink::new("https://example.com")).await.unwrap_err();

    assert!(matches!(err, ShortenerError::GenerationExhausted { attempts: 5 }));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 5);
    assert!(store.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_source_url_is_validation_error() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = directory(&store, &cache, &generator);

    let err = directory.create(NewLink::new("")).await.unwrap_err();
    assert!(matches!(err, ShortenerError::Validation(_)));
    assert!(store.created.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_for_same_code() {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(RecordingCache::new(3));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let directory = Arc::new(directory(&store, &cache, &generator));

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let directory = Arc::clone(&directory);
            tokio::spawn(async move {
                directory
                    .create(NewLink::with_code("contested", format!("https://example.com/{i}")))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ShortenerError::AlreadyExists) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1, "exactly one create should win");
    assert_eq!(conflicts, 19);
}
