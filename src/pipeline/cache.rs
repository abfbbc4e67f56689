//! Memoization of method outcomes.
//!
//! The cache is a collaborator handed to the [`super::Decompiler`] rather than a global: a
//! caller that decompiles the same classes repeatedly shares one cache between runs and
//! invalidates it with [`MethodCache::begin_run`] when the input changes.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{bytecode::MethodKey, pipeline::MethodOutcome};

/// Storage for finished method outcomes, keyed by method identity.
///
/// Implementations are shared by all worker threads of a run.
pub trait MethodCache: Send + Sync {
    /// Returns the stored outcome for `key`.
    fn get(&self, key: &MethodKey) -> Option<Arc<MethodOutcome>>;

    /// Stores the outcome of a method, replacing any previous one.
    fn insert(&self, key: MethodKey, outcome: Arc<MethodOutcome>);

    /// Starts a new run, dropping every stored outcome.
    fn begin_run(&self);

    /// Returns the number of stored outcomes.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`MethodCache`] on a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<MethodKey, Arc<MethodOutcome>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MethodCache for MemoryCache {
    fn get(&self, key: &MethodKey) -> Option<Arc<MethodOutcome>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn insert(&self, key: MethodKey, outcome: Arc<MethodOutcome>) {
        self.entries.insert(key, outcome);
    }

    fn begin_run(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
