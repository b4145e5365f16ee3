use serde::Serialize;

/// Snapshot of the cache's size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub cache_size_in_bytes: usize,
    pub number_of_data_sets_cached: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheAction {
    Loaded,
    Unloaded,
    Purged,
}

/// Broadcast after every change to the set of cached data sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEvent {
    /// The affected url; `None` for a purge.
    pub url: Option<String>,
    pub action: CacheAction,
    /// Cache size after the change.
    pub info: CacheInfo,
}
