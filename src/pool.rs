//! Bounded rayon pools for discovery and sampling.
//!
//! Use [`WorkerPool::install`] to run a `par_iter` with a fixed number of
//! threads.

use rayon::ThreadPoolBuilder;

use crate::error::FixtureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    pub workers: usize,
    pub name: &'static str,
}

impl WorkerPool {
    pub fn new(name: &'static str, workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            name,
        }
    }

    pub fn sequential(name: &'static str) -> Self {
        Self::new(name, 1)
    }

    /// Run `f` inside a temporary pool of [`workers`](WorkerPool::workers)
    /// threads.
    pub fn install<F, R>(&self, f: F) -> Result<R, FixtureError>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        let name = self.name;
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(move |i| format!("{name}-{i}"))
            .build()
            .map_err(|err| FixtureError::WorkerPool(err.to_string()))?;
        Ok(pool.install(f))
    }
}
