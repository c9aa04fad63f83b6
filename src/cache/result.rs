use chrono::{DateTime, Utc};

use super::freshness::last_updated_time;
use crate::models::Article;

/// Where a loaded article set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Freshly fetched and written to the store
    Network,
    /// Served from the store without contacting the origin; still fresh
    CacheFresh,
    /// Offline, serving whatever the store holds
    Offline,
    /// Online, but the fetch failed so the store contents were served
    Fallback,
}

impl CacheSource {
    pub fn label(&self) -> &'static str {
        match self {
            CacheSource::Network => "network",
            CacheSource::CacheFresh => "cache",
            CacheSource::Offline => "offline",
            CacheSource::Fallback => "cache (refresh failed)",
        }
    }
}

/// Result of a load, with data and where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
    pub data: T,
    pub source: CacheSource,
}

impl CacheResult<Vec<Article>> {
    pub fn new(data: Vec<Article>, source: CacheSource) -> Self {
        Self { data, source }
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        last_updated_time(&self.data)
    }
}
