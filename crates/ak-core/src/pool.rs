//! Bounded worker pool for partitioned detection.
//!
//! Work is split into fixed-size row ranges ("shards") whose boundaries depend
//! only on the table length and `shard_size`, never on the worker count.
//! Workers pull shard indices from a shared counter and results are stored by
//! shard index, so the merged output is identical for any `max_workers`.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, error};

/// Pool failures. Neither leaves shared state modified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("work cancelled")]
    Cancelled,

    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Cooperative cancellation flag checked between work items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Split `0..len` into consecutive ranges of at most `shard_size` rows.
pub fn shard_ranges(len: usize, shard_size: usize) -> Vec<Range<usize>> {
    let size = shard_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        WorkerPool {
            max_workers: max_workers.max(1),
        }
    }

    pub fn sequential() -> Self {
        WorkerPool::new(1)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `f` for every index in `0..count` and return results in index order.
    pub fn map_indexed<T, F>(
        &self,
        count: usize,
        cancel: &CancelToken,
        f: F,
    ) -> Result<Vec<T>, PoolError>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let workers = self.max_workers.min(count);
        if workers <= 1 {
            let mut out = Vec::with_capacity(count);
            for idx in 0..count {
                if cancel.is_cancelled() {
                    return Err(PoolError::Cancelled);
                }
                out.push(f(idx));
            }
            return Ok(out);
        }

        debug!(count, workers, "dispatching to worker pool");
        let next = AtomicUsize::new(0);
        let per_worker: Vec<thread::Result<Vec<(usize, T)>>> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(|| {
                        let mut local = Vec::new();
                        loop {
                            if cancel.is_cancelled() {
                                break;
                            }
                            let idx = next.fetch_add(1, Ordering::Relaxed);
                            if idx >= count {
                                break;
                            }
                            local.push((idx, f(idx)));
                        }
                        local
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
        for result in per_worker {
            let items = result.map_err(|_| {
                error!("worker thread panicked");
                PoolError::WorkerPanicked
            })?;
            for (idx, value) in items {
                slots[idx] = Some(value);
            }
        }

        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        slots
            .into_iter()
            .map(|slot| slot.ok_or(PoolError::Cancelled))
            .collect()
    }

    /// Run `f` over each shard of `0..len`, results in shard order.
    pub fn map_shards<T, F>(
        &self,
        len: usize,
        shard_size: usize,
        cancel: &CancelToken,
        f: F,
    ) -> Result<Vec<T>, PoolError>
    where
        T: Send,
        F: Fn(Range<usize>) -> T + Sync,
    {
        let shards = shard_ranges(len, shard_size);
        self.map_indexed(shards.len(), cancel, |idx| f(shards[idx].clone()))
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool::sequential()
    }
}
