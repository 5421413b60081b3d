//! Capability contracts the configuration hands out to, or receives from, the server

use std::fmt;
use std::time::Duration;

/// Policy handle for the cache of opened dataset matrices
pub trait CacheManager: Send + Sync + fmt::Debug {
    /// Maximum number of datasets held open at once
    fn max_cached(&self) -> usize;

    /// How long an idle dataset may stay cached, if bounded
    fn timelimit(&self) -> Option<Duration>;
}

/// Default cache manager created at completion when none was injected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixDataCacheManager {
    max_cached: usize,
    timelimit: Option<Duration>,
}

impl MatrixDataCacheManager {
    pub fn new(max_cached: usize, timelimit: Option<Duration>) -> Self {
        Self {
            max_cached,
            timelimit,
        }
    }
}

impl CacheManager for MatrixDataCacheManager {
    fn max_cached(&self) -> usize {
        self.max_cached
    }

    fn timelimit(&self) -> Option<Duration> {
        self.timelimit
    }
}

/// Source of a dataset's title and description, usually a data adaptor
pub trait DataAdaptorTitleProvider {
    fn get_title(&self) -> String;

    fn get_about(&self) -> Option<String>;
}
