//! Parallel processing configuration and management
//!
//! This module configures Rayon's global thread pool and decides when the
//! regridder should spread batch slices across threads.

use crate::errors::{RegridError, Result};
use rayon::ThreadPoolBuilder;

/// Batch count from which regridding goes parallel by default
pub const DEFAULT_MIN_PARALLEL_BATCHES: usize = 2;

/// Configuration for parallel processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
    /// Batch slices below this count are processed serially
    pub min_parallel_batches: usize,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new(num_threads: Option<usize>) -> Self {
        Self {
            num_threads,
            min_parallel_batches: DEFAULT_MIN_PARALLEL_BATCHES,
        }
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self::new(Some(num_cpus::get()))
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self::new(Some(num_threads))
    }

    /// Never parallelize batch slices
    pub fn serial() -> Self {
        Self {
            num_threads: Some(1),
            min_parallel_batches: usize::MAX,
        }
    }

    #[must_use]
    pub fn with_min_parallel_batches(mut self, min_parallel_batches: usize) -> Self {
        self.min_parallel_batches = min_parallel_batches.max(1);
        self
    }

    /// Whether `n_batches` independent slices should be fanned out over Rayon
    pub fn should_parallelize(&self, n_batches: usize) -> bool {
        n_batches >= self.min_parallel_batches && self.num_threads != Some(1)
    }

    /// Set up the global Rayon thread pool with the specified configuration
    ///
    /// # Errors
    ///
    /// Returns `ThreadPoolError` if the global pool was already initialized.
    pub fn setup_global_pool(&self) -> Result<()> {
        if let Some(num_threads) = self.num_threads {
            ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()
                .map_err(|e| {
                    RegridError::ThreadPoolError(format!(
                        "Failed to initialize thread pool with {num_threads} threads: {e}"
                    ))
                })?;

            log::info!("Configured parallel processing with {num_threads} threads");
        } else {
            log::info!("Using default thread pool configuration");
        }

        Ok(())
    }

    /// Get the current number of threads being used
    pub fn current_threads(&self) -> usize {
        rayon::current_num_threads()
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Get information about the current parallel configuration
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
}
