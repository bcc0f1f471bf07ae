//! Shared trait abstractions.

use crate::{core::viewport::Viewport, Result};

/// Memoizing store with hit/miss accounting
pub trait Cacheable {
    type Key: Clone + Eq + std::hash::Hash;
    type Value: Clone;

    /// Get cached value
    fn get_cached(&self, key: &Self::Key) -> Option<Self::Value>;

    /// Cache a value
    fn cache(&mut self, key: Self::Key, value: Self::Value);

    /// Invalidate cache entry
    fn invalidate(&mut self, key: &Self::Key);

    /// Clear entire cache
    fn clear_cache(&mut self);

    /// Get cache statistics
    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    /// Every lookup, hit or miss
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Components that follow the camera
pub trait ViewportAware {
    /// Handle viewport changes
    fn on_viewport_changed(&mut self, viewport: &Viewport) -> Result<()>;
}
