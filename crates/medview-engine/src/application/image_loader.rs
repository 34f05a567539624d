//! ImageLoader: quality-tiered, single-flight image fetching over a bounded
//! worker pool.
//!
//! One `ImageLoader` instance owns the resident [`ImageCache`], a fixed number
//! of Tokio worker tasks and the queue those workers drain.  Callers never
//! talk to the [`ImageSource`] directly.
//!
//! # How a request flows (for beginners)
//!
//! ```text
//! request(ref, tier)
//!     │
//!     ├─ resident?  ──────────────►  Ready(buffer)
//!     │
//!     └─ miss ──► join the flight for (ref, tier), or start one
//!                   │
//!                   ├─ foreground queue ─┐
//!                   │                    ├──►  worker ──► source.fetch_frame()
//!                   └─ background queue ─┘        │
//!                                                 ▼
//!                              cache.insert() + every waiter gets the same buffer
//! ```
//!
//! - **Single-flight**: a *flight* exists per `(ref, tier)` key while a fetch
//!   is queued or running.  Every caller asking for that key subscribes to the
//!   same flight, so the source sees one request and every caller receives
//!   the identical `ImageBuffer` (same allocation).
//! - **Two priorities**: workers always drain the foreground queue before the
//!   background (prefetch) queue.  A foreground request for a key that is
//!   still queued as a prefetch promotes the job.
//! - **Cancellation**: a prefetch job checks its scope flag right before a
//!   worker starts it.  A foreground job whose last waiter went away before it
//!   started is dropped from the flight table.
//! - **Progressive quality**: on a miss, the best lower tier already resident
//!   is returned alongside the pending load as a placeholder.
//!
//! No lock is ever held across an `.await`; every critical section is a few
//! map operations under a `parking_lot::Mutex`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use medview_core::{CacheKey, FetchError, ImageBuffer, ImageReference, QualityTier, SeriesId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::image_cache::{EvictionPolicy, ImageCache};

/// Upper bound on the worker count accepted from configuration.
pub const MAX_WORKERS: usize = 32;

// ── Ports ─────────────────────────────────────────────────────────────────────

/// The external collaborator that actually produces frame data (a remote
/// archive client, a directory of files, a test double).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_frame(&self, reference: &ImageReference, tier: QualityTier) -> Result<ImageBuffer, FetchError>;
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("load was cancelled before it completed")]
    Cancelled,

    #[error("image loader has been shut down")]
    ShutDown,
}

// ── Settings and statistics ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Resident byte budget of the cache.
    pub capacity_bytes: usize,
    /// Number of concurrent fetches.
    pub workers: usize,
    /// How many series neighbours `prefetch` schedules.
    pub prefetch_neighbours: usize,
    /// Tier used for prefetch jobs.
    pub prefetch_tier: QualityTier,
    pub eviction: EvictionPolicy,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            capacity_bytes: 512 * 1024 * 1024,
            workers: 4,
            prefetch_neighbours: 3,
            prefetch_tier: QualityTier::Preview,
            eviction: EvictionPolicy::Lru,
        }
    }
}

/// Point-in-time loader counters.
///
/// Hits and misses count foreground requests only; prefetch scheduling does
/// not touch them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Fetches that reached the image source.
    pub fetches: u64,
    pub fetch_failures: u64,
    pub average_fetch_latency: Duration,
    /// Prefetch jobs that completed successfully.
    pub prefetch_completed: u64,
    /// Prefetched entries later handed to a foreground request.
    pub prefetch_hits: u64,
    pub evictions: u64,
    pub resident_bytes: usize,
    pub entries: usize,
    pub capacity_bytes: usize,
}

impl CacheStats {
    /// Fraction of completed prefetches that were later displayed.
    pub fn prefetch_hit_ratio(&self) -> f64 {
        if self.prefetch_completed == 0 {
            0.0
        } else {
            self.prefetch_hits as f64 / self.prefetch_completed as f64
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ── Public request types ──────────────────────────────────────────────────────

/// Result of [`ImageLoader::request`].
pub enum LoadRequest {
    /// The requested tier was resident.
    Ready(ImageBuffer),
    /// A fetch is queued or running.  `placeholder` is the best lower tier of
    /// the same frame that is already resident, if any.
    Pending {
        placeholder: Option<ImageBuffer>,
        pending: PendingLoad,
    },
}

type Outcome = Option<Result<ImageBuffer, LoadError>>;

/// A subscription to one in-flight fetch.
///
/// Dropping it without calling [`PendingLoad::wait`] to completion releases
/// the caller's interest; a foreground fetch nobody waits for any more is
/// dropped if no worker has picked it up yet.
pub struct PendingLoad {
    shared: Arc<Shared>,
    key: CacheKey,
    flight: u64,
    rx: watch::Receiver<Outcome>,
    settled: bool,
}

impl PendingLoad {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Waits for the flight to finish.  Cancel-safe: dropping the future
    /// releases this waiter.
    pub async fn wait(mut self) -> Result<ImageBuffer, LoadError> {
        let result = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(LoadError::Cancelled)),
            Err(_) => Err(LoadError::Cancelled),
        };
        self.settled = true;
        result
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.state.lock().release(&self.key, self.flight);
        }
    }
}

// ── Internal state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Priority {
    Foreground,
    Background,
}

struct Flight {
    id: u64,
    tx: watch::Sender<Outcome>,
    priority: Priority,
    started: bool,
    /// Foreground callers currently subscribed.
    waiters: usize,
    /// Raised when the prefetch scope that queued this job is cancelled.
    scope_cancel: Option<Arc<AtomicBool>>,
    /// Queued by prefetch.
    from_prefetch: bool,
    /// A foreground request joined this prefetch before it finished.
    claimed: bool,
}

impl Flight {
    /// A prefetch nobody in the foreground is waiting for yet.
    fn unclaimed_prefetch(&self) -> bool {
        self.from_prefetch && !self.claimed
    }
}

struct PrefetchScope {
    series: SeriesId,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    fetches: u64,
    fetch_failures: u64,
    total_latency: Duration,
    prefetch_completed: u64,
    prefetch_hits: u64,
}

struct State {
    cache: ImageCache,
    flights: HashMap<CacheKey, Flight>,
    foreground: VecDeque<CacheKey>,
    background: VecDeque<CacheKey>,
    scopes: HashMap<Uuid, PrefetchScope>,
    counters: Counters,
    next_flight: u64,
    shut_down: bool,
}

impl State {
    fn new(cache: ImageCache) -> Self {
        Self {
            cache,
            flights: HashMap::new(),
            foreground: VecDeque::new(),
            background: VecDeque::new(),
            scopes: HashMap::new(),
            counters: Counters::default(),
            next_flight: 0,
            shut_down: false,
        }
    }

    fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits,
            misses: c.misses,
            fetches: c.fetches,
            fetch_failures: c.fetch_failures,
            average_fetch_latency: if c.fetches == 0 {
                Duration::ZERO
            } else {
                c.total_latency / c.fetches as u32
            },
            prefetch_completed: c.prefetch_completed,
            prefetch_hits: c.prefetch_hits,
            evictions: self.cache.evictions(),
            resident_bytes: self.cache.resident_bytes(),
            entries: self.cache.len(),
            capacity_bytes: self.cache.capacity_bytes(),
        }
    }

    fn open_flight(
        &mut self,
        key: CacheKey,
        priority: Priority,
        scope_cancel: Option<Arc<AtomicBool>>,
        waiters: usize,
    ) -> (u64, watch::Receiver<Outcome>) {
        let id = self.next_flight;
        self.next_flight += 1;
        let (tx, rx) = watch::channel(None);
        let from_prefetch = priority == Priority::Background;
        self.flights.insert(
            key.clone(),
            Flight {
                id,
                tx,
                priority,
                started: false,
                waiters,
                scope_cancel,
                from_prefetch,
                claimed: false,
            },
        );
        match priority {
            Priority::Foreground => self.foreground.push_back(key),
            Priority::Background => self.background.push_back(key),
        }
        (id, rx)
    }

    /// Subscribes a foreground caller to the flight for `key`, opening one if
    /// needed.  Returns `true` in the last slot when a worker should be woken.
    fn join_foreground(&mut self, key: &CacheKey) -> (u64, watch::Receiver<Outcome>, bool) {
        if let Some(flight) = self.flights.get_mut(key) {
            flight.waiters += 1;
            let mut wake = false;
            if flight.priority == Priority::Background && !flight.started {
                flight.priority = Priority::Foreground;
                flight.scope_cancel = None;
                self.foreground.push_back(key.clone());
                wake = true;
                trace!(%key, "prefetch promoted to foreground");
            }
            // Counted as a prefetch hit once the fetch succeeds.
            flight.claimed |= flight.from_prefetch;
            return (flight.id, flight.tx.subscribe(), wake);
        }
        let (id, rx) = self.open_flight(key.clone(), Priority::Foreground, None, 1);
        (id, rx, true)
    }

    /// Pops the next runnable job, foreground first.
    fn next_job(&mut self) -> Option<(CacheKey, u64)> {
        loop {
            let (key, priority) = if let Some(key) = self.foreground.pop_front() {
                (key, Priority::Foreground)
            } else if let Some(key) = self.background.pop_front() {
                (key, Priority::Background)
            } else {
                return None;
            };
            let Some(flight) = self.flights.get_mut(&key) else {
                continue;
            };
            // Stale queue entries: already running, or promoted to the other queue.
            if flight.started || flight.priority != priority {
                continue;
            }
            let cancelled = flight
                .scope_cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Acquire));
            if cancelled {
                if let Some(flight) = self.flights.remove(&key) {
                    flight.tx.send_replace(Some(Err(LoadError::Cancelled)));
                }
                trace!(%key, "prefetch cancelled before start");
                continue;
            }
            flight.started = true;
            return Some((key, flight.id));
        }
    }

    fn release(&mut self, key: &CacheKey, id: u64) {
        let Some(flight) = self.flights.get_mut(key) else {
            return;
        };
        if flight.id != id {
            return;
        }
        flight.waiters = flight.waiters.saturating_sub(1);
        if flight.waiters == 0 && !flight.started && !flight.unclaimed_prefetch() {
            if let Some(flight) = self.flights.remove(key) {
                flight.tx.send_replace(Some(Err(LoadError::Cancelled)));
            }
            trace!(%key, "foreground load abandoned before start");
        }
    }

    /// Returns the cancellation flag of a prefetch scope, replacing it when
    /// the scope moved to a different series.
    fn scope_flag(&mut self, scope: Uuid, series: &SeriesId) -> Arc<AtomicBool> {
        if let Some(existing) = self.scopes.get(&scope) {
            if &existing.series == series {
                return Arc::clone(&existing.cancelled);
            }
            existing.cancelled.store(true, Ordering::Release);
            debug!(%scope, from = %existing.series, to = %series, "prefetch scope changed series");
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        self.scopes.insert(
            scope,
            PrefetchScope {
                series: series.clone(),
                cancelled: Arc::clone(&cancelled),
            },
        );
        cancelled
    }
}

struct Shared {
    state: Mutex<State>,
    source: Arc<dyn ImageSource>,
    work: Notify,
    stats_tx: watch::Sender<CacheStats>,
}

impl Shared {
    async fn run(&self, key: CacheKey, id: u64) {
        let started = Instant::now();
        debug!(%key, "fetch started");
        let result = self.source.fetch_frame(&key.reference, key.tier).await;
        let latency = started.elapsed();

        let stats = {
            let mut state = self.state.lock();
            state.counters.fetches += 1;
            state.counters.total_latency += latency;

            // After shutdown the flight is gone, or belongs to a newer request.
            let owned = state.flights.get(&key).is_some_and(|f| f.id == id);
            let flight = if owned { state.flights.remove(&key) } else { None };
            let (from_prefetch, claimed) = flight
                .as_ref()
                .map_or((false, false), |f| (f.from_prefetch, f.claimed));

            match &result {
                Ok(buffer) if !state.shut_down => {
                    // Unclaimed prefetches are counted as hits when first requested.
                    let evicted = state.cache.insert(buffer.clone(), from_prefetch && !claimed);
                    if from_prefetch {
                        state.counters.prefetch_completed += 1;
                    }
                    if claimed {
                        state.counters.prefetch_hits += 1;
                    }
                    debug!(
                        %key,
                        latency_ms = latency.as_millis() as u64,
                        bytes = buffer.byte_size(),
                        evicted = evicted.len(),
                        "fetch finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    state.counters.fetch_failures += 1;
                    if from_prefetch && !claimed {
                        warn!(%key, error = %e, "prefetch failed");
                    } else {
                        debug!(%key, error = %e, "fetch failed");
                    }
                }
            }

            if let Some(flight) = flight {
                flight.tx.send_replace(Some(result.map_err(LoadError::from)));
            }
            state.stats()
        };
        self.stats_tx.send_replace(stats);
    }
}

async fn worker_loop(shared: Arc<Shared>, worker: usize) {
    trace!(worker, "loader worker started");
    loop {
        let job = {
            let mut state = shared.state.lock();
            if state.shut_down {
                break;
            }
            state.next_job()
        };
        match job {
            Some((key, id)) => shared.run(key, id).await,
            None => shared.work.notified().await,
        }
    }
    trace!(worker, "loader worker stopped");
}

// ── ImageLoader ───────────────────────────────────────────────────────────────

/// The single owner of the image cache and fetch workers.
///
/// Must be created inside a Tokio runtime; the workers are spawned
/// immediately and stop on [`ImageLoader::shutdown`] or drop.
pub struct ImageLoader {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    settings: LoaderSettings,
}

impl ImageLoader {
    pub fn new(source: Arc<dyn ImageSource>, settings: LoaderSettings) -> Self {
        let workers = settings.workers.clamp(1, MAX_WORKERS);
        let state = State::new(ImageCache::new(settings.capacity_bytes, settings.eviction));
        let (stats_tx, _) = watch::channel(state.stats());
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            source,
            work: Notify::new(),
            stats_tx,
        });
        let handles = (0..workers)
            .map(|worker| tokio::spawn(worker_loop(Arc::clone(&shared), worker)))
            .collect();
        info!(
            workers,
            capacity_bytes = settings.capacity_bytes,
            eviction = ?settings.eviction,
            "image loader started"
        );
        Self {
            shared,
            workers: Mutex::new(handles),
            settings,
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Looks up `(reference, tier)` and, on a miss, joins or starts its fetch.
    ///
    /// Never blocks on I/O: the returned [`PendingLoad`] is awaited separately.
    pub fn request(&self, reference: &ImageReference, tier: QualityTier) -> Result<LoadRequest, LoadError> {
        let key = CacheKey::new(reference.clone(), tier);
        let (placeholder, id, rx, wake) = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return Err(LoadError::ShutDown);
            }
            if let Some(buffer) = state.cache.get(&key) {
                state.counters.hits += 1;
                if state.cache.take_prefetched(&key) {
                    state.counters.prefetch_hits += 1;
                }
                trace!(%key, "cache hit");
                return Ok(LoadRequest::Ready(buffer));
            }
            state.counters.misses += 1;
            let placeholder = tier
                .lower_tiers()
                .find_map(|lower| state.cache.get(&CacheKey::new(reference.clone(), lower)));
            let (id, rx, wake) = state.join_foreground(&key);
            (placeholder, id, rx, wake)
        };
        if wake {
            self.shared.work.notify_one();
        }
        trace!(%key, placeholder = placeholder.is_some(), "cache miss");
        Ok(LoadRequest::Pending {
            placeholder,
            pending: PendingLoad {
                shared: Arc::clone(&self.shared),
                key,
                flight: id,
                rx,
                settled: false,
            },
        })
    }

    /// Returns the requested tier, fetching it if necessary.
    pub async fn load(&self, reference: &ImageReference, tier: QualityTier) -> Result<ImageBuffer, LoadError> {
        match self.request(reference, tier)? {
            LoadRequest::Ready(buffer) => Ok(buffer),
            LoadRequest::Pending { pending, .. } => pending.wait().await,
        }
    }

    /// Schedules background loads of the configured number of neighbours of
    /// `series[index]` at the configured prefetch tier.
    pub fn prefetch(&self, scope: Uuid, series: &[ImageReference], index: usize) -> usize {
        self.prefetch_with(
            scope,
            series,
            index,
            self.settings.prefetch_neighbours,
            self.settings.prefetch_tier,
        )
    }

    /// Schedules background loads of the `count` nearest neighbours of
    /// `series[index]`, nearest first and alternating forward and back.
    ///
    /// `scope` identifies the requester (usually a viewport).  When the same
    /// scope prefetches from a different series, its queued jobs are
    /// cancelled.  Returns the number of jobs queued.
    pub fn prefetch_with(
        &self,
        scope: Uuid,
        series: &[ImageReference],
        index: usize,
        count: usize,
        tier: QualityTier,
    ) -> usize {
        let Some(center) = series.get(index) else {
            return 0;
        };
        let scheduled = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return 0;
            }
            let flag = state.scope_flag(scope, &center.series);
            let mut scheduled = 0;
            for reference in neighbours(series, index, count) {
                let key = CacheKey::new(reference.clone(), tier);
                if state.cache.contains(&key) || state.flights.contains_key(&key) {
                    continue;
                }
                state.open_flight(key, Priority::Background, Some(Arc::clone(&flag)), 0);
                scheduled += 1;
            }
            scheduled
        };
        for _ in 0..scheduled.min(self.worker_count()) {
            self.shared.work.notify_one();
        }
        debug!(%scope, series = %center.series, index, scheduled, "prefetch scheduled");
        scheduled
    }

    /// Cancels every queued prefetch job of `scope`.  Jobs already running
    /// finish and are cached.
    pub fn cancel_prefetch(&self, scope: Uuid) {
        if let Some(removed) = self.shared.state.lock().scopes.remove(&scope) {
            removed.cancelled.store(true, Ordering::Release);
            debug!(%scope, series = %removed.series, "prefetch cancelled");
        }
    }

    /// Pins a resident entry.  Returns `false` if it is not resident.
    pub fn pin(&self, key: &CacheKey) -> bool {
        self.shared.state.lock().cache.pin(key)
    }

    /// Pins the entry for `buffer`, re-inserting it if it was evicted since it
    /// was handed out.
    pub fn pin_buffer(&self, buffer: &ImageBuffer) -> bool {
        let key = buffer.key();
        let mut state = self.shared.state.lock();
        if state.shut_down {
            return false;
        }
        if state.cache.pin(&key) {
            return true;
        }
        state.cache.insert_pinned(buffer.clone());
        trace!(%key, "re-inserted evicted buffer to pin it");
        true
    }

    /// Releases one pin; runs eviction if the cache is over budget.
    pub fn unpin(&self, key: &CacheKey) -> bool {
        self.shared.state.lock().cache.unpin(key)
    }

    pub fn is_resident(&self, reference: &ImageReference, tier: QualityTier) -> bool {
        self.shared
            .state
            .lock()
            .cache
            .contains(&CacheKey::new(reference.clone(), tier))
    }

    /// Returns a resident buffer without affecting recency or counters.
    pub fn cached(&self, reference: &ImageReference, tier: QualityTier) -> Option<ImageBuffer> {
        self.shared
            .state
            .lock()
            .cache
            .peek(&CacheKey::new(reference.clone(), tier))
            .cloned()
    }

    pub fn pin_count(&self, key: &CacheKey) -> u32 {
        self.shared.state.lock().cache.pin_count(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.shared.state.lock().stats()
    }

    /// Subscribes to counter updates, published after every fetch.
    pub fn subscribe_stats(&self) -> watch::Receiver<CacheStats> {
        self.shared.stats_tx.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Clears the cache, fails every outstanding flight with
    /// [`LoadError::ShutDown`] and stops the workers.  Idempotent.
    pub fn shutdown(&self) {
        let (flights, stats) = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.foreground.clear();
            state.background.clear();
            for (_, scope) in state.scopes.drain() {
                scope.cancelled.store(true, Ordering::Release);
            }
            state.cache.clear();
            let flights: Vec<Flight> = state.flights.drain().map(|(_, f)| f).collect();
            (flights, state.stats())
        };
        let outstanding = flights.len();
        for flight in flights {
            flight.tx.send_replace(Some(Err(LoadError::ShutDown)));
        }
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }
        self.shared.work.notify_waiters();
        self.shared.stats_tx.send_replace(stats);
        info!(outstanding, "image loader shut down");
    }

    fn worker_count(&self) -> usize {
        self.settings.workers.clamp(1, MAX_WORKERS)
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        for handle in self.workers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Neighbours of `series[index]` in the order +1, −1, +2, −2, …
fn neighbours(series: &[ImageReference], index: usize, count: usize) -> Vec<&ImageReference> {
    let mut picked = Vec::with_capacity(count);
    let mut distance = 1;
    while picked.len() < count {
        let forward = index.checked_add(distance).filter(|&i| i < series.len());
        let backward = index.checked_sub(distance);
        if forward.is_none() && backward.is_none() {
            break;
        }
        for i in [forward, backward].into_iter().flatten() {
            if picked.len() < count {
                picked.push(&series[i]);
            }
        }
        distance += 1;
    }
    picked
}

// ── Tests ─────────────────────────────────────────────────────────────────────
