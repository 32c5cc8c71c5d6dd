//! Model availability cache.
//!
//! Read-through cache over the service's model registry:
//! - Fast path: answer from the cache under a read lock
//! - Refresh: one registry listing replaces the known set under a write lock
//! - Explicit invalidation per model or wholesale
//!
//! Negative answers are cached too, so a missing model keeps failing fast
//! (with the listing seen at refresh time) until it is invalidated.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

// =============================================================================
// Types
// =============================================================================

/// Cached answer for a single model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAvailability {
    Available,
    /// Absent from the registry; carries the names that were listed
    Missing { available: Vec<String> },
}

impl ModelAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, ModelAvailability::Available)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    models: HashMap<String, bool>,
    /// Registry listing from the latest refresh, in registry order
    listing: Vec<String>,
}

// =============================================================================
// Model Cache
// =============================================================================

/// Thread-safe model availability cache shared by clones of a client.
#[derive(Debug, Default)]
pub struct ModelCache {
    state: RwLock<CacheState>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning only means a writer panicked mid-update; the map is still usable.
    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached availability of `model`, if known.
    pub fn get(&self, model: &str) -> Option<ModelAvailability> {
        let state = self.read();
        state.models.get(model).map(|&available| {
            if available {
                ModelAvailability::Available
            } else {
                ModelAvailability::Missing {
                    available: state.listing.clone(),
                }
            }
        })
    }

    /// Replace the known set with a fresh registry listing and answer for `model`.
    ///
    /// Every previously known model not in `listing` is marked unavailable.
    pub fn refresh(&self, model: &str, listing: Vec<String>) -> ModelAvailability {
        let mut state = self.write();

        for available in state.models.values_mut() {
            *available = false;
        }
        for name in &listing {
            state.models.insert(name.clone(), true);
        }
        let found = listing.iter().any(|name| name == model);
        if !found {
            state.models.insert(model.to_string(), false);
        }
        state.listing = listing;

        debug!(
            model = %model,
            found,
            listed = state.listing.len(),
            "Refreshed model availability cache"
        );

        if found {
            ModelAvailability::Available
        } else {
            ModelAvailability::Missing {
                available: state.listing.clone(),
            }
        }
    }

    /// Forget the cached answer for one model.
    pub fn invalidate(&self, model: &str) {
        self.write().models.remove(model);
    }

    /// Names listed at the latest refresh.
    pub fn available(&self) -> Vec<String> {
        self.read().listing.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
