//! Fixed-size worker pool for independent jobs (null-model sweeps).
//!
//! Jobs share nothing mutable: each one owns its inputs and returns its own
//! result. Results come back in submission order, and a failing or panicking
//! job only fails its own slot.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WorkerPool {
    /// `1` runs every job on the calling thread, in order.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run<J, T, F>(&self, jobs: Vec<J>, work: F) -> Vec<Result<T>>
    where
        J: Send,
        T: Send,
        F: Fn(J) -> Result<T> + Sync,
    {
        if self.workers <= 1 || jobs.len() <= 1 {
            return jobs.into_iter().map(|job| guarded(&work, job)).collect();
        }

        #[cfg(feature = "parallel")]
        {
            self.run_rayon(jobs, work)
        }

        #[cfg(not(feature = "parallel"))]
        {
            self.run_scoped(jobs, work)
        }
    }

    #[cfg(feature = "parallel")]
    fn run_rayon<J, T, F>(&self, jobs: Vec<J>, work: F) -> Vec<Result<T>>
    where
        J: Send,
        T: Send,
        F: Fn(J) -> Result<T> + Sync,
    {
        use rayon::prelude::*;

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool.install(|| {
                jobs.into_par_iter()
                    .map(|job| guarded(&work, job))
                    .collect()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "rayon pool unavailable; using scoped threads");
                self.run_scoped(jobs, work)
            }
        }
    }

    fn run_scoped<J, T, F>(&self, jobs: Vec<J>, work: F) -> Vec<Result<T>>
    where
        J: Send,
        T: Send,
        F: Fn(J) -> Result<T> + Sync,
    {
        let total = jobs.len();
        let threads = self.workers.min(total);
        let queue = Mutex::new(jobs.into_iter().enumerate());
        let mut slots: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();

        std::thread::scope(|scope| {
            let queue = &queue;
            let work = &work;
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                            let Some((idx, job)) = next else { break };
                            done.push((idx, guarded(work, job)));
                        }
                        done
                    })
                })
                .collect();

            for handle in handles {
                // Jobs are guarded, so a worker only dies on a panic in the
                // queue plumbing itself.
                if let Ok(done) = handle.join() {
                    for (idx, result) in done {
                        slots[idx] = Some(result);
                    }
                }
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(Error::JobPanicked("worker exited without a result".into())))
            })
            .collect()
    }
}

fn guarded<J, T, F>(work: &F, job: J) -> Result<T>
where
    F: Fn(J) -> Result<T>,
{
    panic::catch_unwind(AssertUnwindSafe(|| work(job)))
        .unwrap_or_else(|payload| Err(Error::JobPanicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
