//! In-memory cache of parsed data sets, keyed by resource url.
//!
//! Each url is fetched and parsed at most once at a time: the first caller
//! becomes the leader and starts the load, overlapping callers await the same
//! shared future and observe the same result. A successful load is kept until
//! it is unloaded or the cache is purged; a failed load is dropped so the next
//! caller retries.

mod events;

pub use events::{CacheAction, CacheEvent, CacheInfo};

use std::{
    any::{Any, type_name_of_val},
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    dataset::{DataSet, DataSetParser, Part10Parser},
    error::{FetchError, LoadError, ParseError, Result},
    fetch::FetchStrategy,
};

const DEFAULT_EVENT_CAPACITY: usize = 64;

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<DataSet>>>>;

struct InFlight {
    generation: u64,
    load: SharedLoad,
}

#[derive(Default)]
struct CacheState {
    loaded: HashMap<String, Arc<DataSet>>,
    in_flight: HashMap<String, InFlight>,
    cache_size_in_bytes: usize,
}

impl CacheState {
    fn info(&self) -> CacheInfo {
        CacheInfo {
            cache_size_in_bytes: self.cache_size_in_bytes,
            number_of_data_sets_cached: self.loaded.len(),
        }
    }
}

struct CacheInner {
    parser: Arc<dyn DataSetParser>,
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
    generation: AtomicU64,
    // Diagnostics: counts of singleflight leaders/waiters
    sf_leaders: AtomicU64,
    sf_waiters: AtomicU64,
}

/// Handle to a shared data set cache. Clones refer to the same cache.
#[derive(Clone)]
pub struct DataSetCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for DataSetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (info, in_flight) = {
            let state = self.inner.state.lock();
            (state.info(), state.in_flight.len())
        };

        f.debug_struct("DataSetCache")
            .field("parser", &type_name_of_val(self.inner.parser.as_ref()))
            .field("info", &info)
            .field("in_flight_loads", &in_flight)
            .field(
                "sf_leaders",
                &self.inner.sf_leaders.load(Ordering::Relaxed),
            )
            .field(
                "sf_waiters",
                &self.inner.sf_waiters.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl Default for DataSetCache {
    fn default() -> Self {
        Self::new(Arc::new(Part10Parser))
    }
}

/// Single-flight counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleFlightStats {
    /// Loads that started a fetch.
    pub leaders: u64,
    /// Loads that joined a fetch already in flight.
    pub waiters: u64,
}

impl DataSetCache {
    pub fn new(parser: Arc<dyn DataSetParser>) -> Self {
        Self::with_event_capacity(parser, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(
        parser: Arc<dyn DataSetParser>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(CacheInner {
                parser,
                state: Mutex::new(CacheState::default()),
                events,
                generation: AtomicU64::new(0),
                sf_leaders: AtomicU64::new(0),
                sf_waiters: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.inner.state.lock().loaded.contains_key(url)
    }

    /// The cached data set for `url`, if one is loaded.
    pub fn get(&self, url: &str) -> Option<Arc<DataSet>> {
        self.inner.state.lock().loaded.get(url).cloned()
    }

    /// Resolve the data set for `url`, fetching it with `strategy` unless it
    /// is cached or already being fetched.
    pub async fn load(
        &self,
        url: &str,
        strategy: Arc<dyn FetchStrategy>,
        image_id: &str,
    ) -> Result<Arc<DataSet>> {
        let load = {
            let mut state = self.inner.state.lock();
            if let Some(data_set) = state.loaded.get(url) {
                debug!(url, "data set already loaded");
                return Ok(Arc::clone(data_set));
            }

            if let Some(in_flight) = state.in_flight.get(url) {
                let waiters =
                    self.inner.sf_waiters.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    url,
                    image_id,
                    generation = in_flight.generation,
                    waiters,
                    "singleflight wait"
                );
                in_flight.load.clone()
            } else {
                let generation =
                    self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
                let load = self
                    .fetch_and_parse(
                        url.to_owned(),
                        strategy,
                        image_id.to_owned(),
                        generation,
                    )
                    .boxed()
                    .shared();
                state.in_flight.insert(
                    url.to_owned(),
                    InFlight {
                        generation,
                        load: load.clone(),
                    },
                );
                let leaders =
                    self.inner.sf_leaders.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(url, image_id, generation, leaders, "singleflight lead");
                load
            }
        };

        load.await
    }

    /// Evict `url`. Loads in flight for it still complete for their callers
    /// but are not cached. Unloading an absent url does nothing.
    pub fn unload(&self, url: &str) {
        let (removed, info) = {
            let mut state = self.inner.state.lock();
            if state.in_flight.remove(url).is_some() {
                debug!(url, "detached in-flight load from the cache");
            }
            let removed = state.loaded.remove(url);
            if let Some(data_set) = &removed {
                state.cache_size_in_bytes = state
                    .cache_size_in_bytes
                    .saturating_sub(data_set.byte_len());
            }
            (removed, state.info())
        };

        if removed.is_some() {
            debug!(url, ?info, "data set unloaded");
            self.inner.emit(CacheEvent {
                url: Some(url.to_owned()),
                action: CacheAction::Unloaded,
                info,
            });
        }
    }

    /// Drop every cached data set and detach every in-flight load.
    pub fn purge(&self) {
        let info = {
            let mut state = self.inner.state.lock();
            *state = CacheState::default();
            state.info()
        };
        info!("data set cache purged");
        self.inner.emit(CacheEvent {
            url: None,
            action: CacheAction::Purged,
            info,
        });
    }

    pub fn info(&self) -> CacheInfo {
        self.inner.state.lock().info()
    }

    pub fn singleflight_stats(&self) -> SingleFlightStats {
        SingleFlightStats {
            leaders: self.inner.sf_leaders.load(Ordering::Relaxed),
            waiters: self.inner.sf_waiters.load(Ordering::Relaxed),
        }
    }

    /// Receive a [`CacheEvent`] for every load, unload and purge from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    fn fetch_and_parse(
        &self,
        url: String,
        strategy: Arc<dyn FetchStrategy>,
        image_id: String,
        generation: u64,
    ) -> impl Future<Output = Result<Arc<DataSet>>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async move {
            // A panic must still settle the in-flight entry, otherwise every
            // later load of `url` would join the poisoned shared future.
            let result = async {
                let fetched = AssertUnwindSafe(strategy.fetch(&url, &image_id))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(FetchError::Panicked {
                            url: url.clone(),
                            message: panic_message(&*panic),
                        })
                    })?;
                let data_set = panic::catch_unwind(AssertUnwindSafe(|| {
                    inner.parser.parse(fetched.bytes)
                }))
                .unwrap_or_else(|panic| {
                    Err(ParseError::Panicked(panic_message(&*panic)))
                })?;
                Ok::<_, LoadError>(Arc::new(data_set))
            }
            .await;
            inner.settle(&url, generation, &result);
            result
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        "unknown panic".to_owned()
    }
}

impl CacheInner {
    fn settle(
        &self,
        url: &str,
        generation: u64,
        result: &Result<Arc<DataSet>>,
    ) {
        let mut state = self.state.lock();
        let current = state
            .in_flight
            .get(url)
            .is_some_and(|in_flight| in_flight.generation == generation);
        if !current {
            debug!(url, generation, "load settled after unload; not cached");
            return;
        }
        state.in_flight.remove(url);

        match result {
            Ok(data_set) => {
                state.cache_size_in_bytes += data_set.byte_len();
                state.loaded.insert(url.to_owned(), Arc::clone(data_set));
                let info = state.info();
                drop(state);

                info!(
                    url,
                    byte_len = data_set.byte_len(),
                    cached = info.number_of_data_sets_cached,
                    "data set loaded"
                );
                self.emit(CacheEvent {
                    url: Some(url.to_owned()),
                    action: CacheAction::Loaded,
                    info,
                });
            }
            Err(err) => {
                drop(state);
                warn!(url, stage = err.stage(), error = %err, "data set load failed");
            }
        }
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
