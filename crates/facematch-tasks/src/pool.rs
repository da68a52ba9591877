//! Fixed-size pool of OS threads draining an unbounded FIFO job queue.

use crate::error::TaskError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    tx: async_channel::Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` worker threads (at least one).
    pub fn new(size: usize) -> Result<Self, TaskError> {
        let size = size.max(1);
        let (tx, rx) = async_channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("facematch-worker-{id}"))
                .spawn(move || {
                    tracing::debug!(worker = id, "worker started");
                    while let Ok(job) = rx.recv_blocking() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!(worker = id, "job panicked; worker continues");
                        }
                    }
                    tracing::debug!(worker = id, "worker exiting");
                })?;
            workers.push(handle);
        }

        tracing::info!(size, "worker pool started");
        Ok(Self {
            tx,
            workers: Mutex::new(workers),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    /// Queue a job. Never blocks and never rejects for capacity.
    pub fn execute<F>(&self, job: F) -> Result<(), TaskError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .try_send(Box::new(job))
            .map_err(|_| TaskError::PoolClosed)
    }

    /// Stop accepting jobs, let queued jobs finish, and join every worker.
    pub fn shutdown(&self) {
        self.tx.close();
        let workers = match self.workers.lock() {
            Ok(mut w) => std::mem::take(&mut *w),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked during shutdown");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.tx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn test_runs_every_job() {
        let pool = WorkerPool::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_jobs_run_concurrently_up_to_pool_size() {
        let pool = WorkerPool::new(2).unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let (done_tx, done_rx) = mpsc::channel();
        for _ in 0..2 {
            let barrier = Arc::clone(&barrier);
            let done_tx = done_tx.clone();
            pool.execute(move || {
                // Deadlocks unless both jobs are running at once.
                barrier.wait();
                done_tx.send(()).unwrap();
            })
            .unwrap();
        }
        for _ in 0..2 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        pool.shutdown();
    }

    #[test]
    fn test_single_worker_is_fifo() {
        let pool = WorkerPool::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let order = Arc::clone(&order);
            pool.execute(move || order.lock().unwrap().push(i)).unwrap();
        }
        pool.shutdown();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.execute(|| panic!("job failure")).unwrap();
        let c = Arc::clone(&counter);
        pool.execute(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_after_shutdown_fails() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        assert!(matches!(pool.execute(|| {}), Err(TaskError::PoolClosed)));
    }

    #[test]
    fn test_zero_size_rounds_up() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.size(), 1);
        pool.shutdown();
    }
}
