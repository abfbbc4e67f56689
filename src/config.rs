//! Configuration for the decompilation pipeline.
//!
//! This module provides [`DecompilerConfig`], which controls iteration bounds, optional
//! pipeline features and the size of the worker pool.

/// Configuration for the method decompilation pipeline.
///
/// The iteration bounds are hard limits: a method that needs more structuring iterations
/// than allowed is reported as degraded and rendered with explicit jumps, and type inference
/// resolves whatever it has narrowed once its round budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompilerConfig {
    /// Maximum region folding iterations per method, shared by nested loop bodies
    /// (default: 10000).
    pub max_structuring_iterations: usize,

    /// Maximum constraint propagation rounds per method (default: 64).
    pub max_type_iterations: usize,

    /// Inline single-use values into compound expressions (default: true).
    ///
    /// When disabled every computed value becomes a named local.
    pub inline_expressions: bool,

    /// Merge duplicated `finally` code into a single finally clause (default: true).
    pub merge_finally: bool,

    /// Number of worker threads for batch decompilation; 0 uses the rayon default
    /// (default: 0).
    pub worker_threads: usize,

    /// Memoize method outcomes in the configured cache (default: true).
    pub use_cache: bool,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            max_structuring_iterations: 10_000,
            max_type_iterations: 64,
            inline_expressions: true,
            merge_finally: true,
            worker_threads: 0,
            use_cache: true,
        }
    }
}

impl DecompilerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that keeps output closest to the bytecode.
    ///
    /// This configuration disables expression inlining and finally merging, which makes every
    /// instruction visible as its own statement. Useful when inspecting suspicious methods.
    #[must_use]
    pub fn literal() -> Self {
        Self {
            inline_expressions: false,
            merge_finally: false,
            ..Self::default()
        }
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DecompilerConfig::default();
        assert_eq!(config.max_structuring_iterations, 10_000);
        assert!(config.inline_expressions);
        assert!(config.merge_finally);
        assert_eq!(config.worker_threads, 0);
    }

    #[test]
    fn test_literal_config() {
        let config = DecompilerConfig::literal().with_threads(2);
        assert!(!config.inline_expressions);
        assert!(!config.merge_finally);
        assert_eq!(config.worker_threads, 2);
    }
}
