use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use super::tracker::{Tracker, TrackerGuard};
use super::{PoolConfig, PoolError, Task, WorkerPool};

/// A fixed number of named worker threads fed through a channel
///
/// With a bounded queue `submit` blocks while the queue is full.
/// After `shutdown` the workers finish all queued tasks and exit.
pub struct ThreadPool {
    sender: Mutex<Option<Sender<Task>>>,
    shutdown: AtomicBool,
    workers: Arc<Tracker>,
    size: usize,
}

impl ThreadPool {
    /// Starts the worker threads.
    ///
    /// Values not set in `config` are defaulted.
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        let mut config = config.clone();
        config.validate()?;
        config.apply_defaults();

        let size = config.pool_size.unwrap_or_default().into_inner();
        let name_prefix = config.worker_name_prefix.unwrap_or_default();

        let (sender, receiver) = match config.queue_capacity {
            Some(capacity) => channel::bounded(capacity.into_inner()),
            None => channel::unbounded(),
        };

        let workers = Arc::new(Tracker::default());
        for index in 0..size {
            let guard = Tracker::enter(&workers);
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("{}-{}", name_prefix, index))
                .spawn(move || work(receiver, guard))
                .map_err(|err| {
                    PoolError::new(format!("could not start worker thread {}", index))
                        .with_source(err)
                })?;
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            shutdown: AtomicBool::new(false),
            workers,
            size,
        })
    }

    /// A pool with `size` workers and defaults for everything else
    pub fn with_size(size: usize) -> Result<Self, PoolError> {
        Self::new(&PoolConfig::default().pool_size(size))
    }

    /// The number of worker threads this pool was started with
    pub fn size(&self) -> usize {
        self.size
    }

    /// The number of worker threads still running
    pub fn running_workers(&self) -> usize {
        self.workers.running()
    }
}

impl WorkerPool for ThreadPool {
    fn submit(&self, task: Task) -> Result<(), PoolError> {
        // Clone the sender so a full queue does not block `shutdown`
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
            .ok_or_else(PoolError::shut_down)?;

        sender
            .send(task)
            .map_err(|_| PoolError::new("all worker threads of the pool have stopped"))
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.workers.running() == 0
    }

    fn await_termination(&self, timeout: Duration) -> Result<bool, PoolError> {
        if !self.is_shutdown() {
            thread::sleep(timeout);
            return Ok(false);
        }
        self.workers.wait_for_none(timeout)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown()
    }
}

fn work(receiver: Receiver<Task>, _guard: TrackerGuard) {
    // Ends once the pool was shut down and the queue is empty
    for task in receiver.iter() {
        let _ = panic::catch_unwind(AssertUnwindSafe(task));
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn executes_all_tasks_before_terminating() {
        let pool = ThreadPool::with_size(3).unwrap();
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let executed = Arc::clone(&executed);
            pool.submit(Box::new(move || {
                executed.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        pool.shutdown();
        while !pool.is_terminated() {
            pool.await_termination(Duration::from_secs(1)).unwrap();
        }

        assert_eq!(executed.load(Ordering::SeqCst), 100);
        assert_eq!(pool.running_workers(), 0);
    }

    #[test]
    fn rejects_tasks_after_shutdown() {
        let pool = ThreadPool::with_size(1).unwrap();
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert!(pool.submit(Box::new(|| {})).is_err());
    }

    #[test]
    fn names_worker_threads() {
        let config = PoolConfig::default()
            .pool_size(2usize)
            .worker_name_prefix("loader");
        let pool = ThreadPool::new(&config).unwrap();
        let names = Arc::new(Mutex::new(HashSet::new()));

        for _ in 0..20 {
            let names = Arc::clone(&names);
            pool.submit(Box::new(move || {
                let name = thread::current().name().map(ToOwned::to_owned);
                names.lock().unwrap().insert(name);
                thread::sleep(Duration::from_millis(1));
            }))
            .unwrap();
        }

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(10)).unwrap());

        let names = names.lock().unwrap();
        assert!(!names.is_empty());
        for name in names.iter() {
            let name = name.as_ref().unwrap();
            assert!(name == "loader-0" || name == "loader-1", "{}", name);
        }
    }

    #[test]
    fn panicking_tasks_do_not_stop_workers() {
        let pool = ThreadPool::with_size(1).unwrap();
        let executed = Arc::new(AtomicUsize::new(0));

        pool.submit(Box::new(|| panic!("task failed"))).unwrap();
        let counter = Arc::clone(&executed);
        pool.submit(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(10)).unwrap());
        assert_eq!(executed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn awaiting_a_running_pool_times_out() {
        let pool = ThreadPool::with_size(1).unwrap();
        assert!(!pool.await_termination(Duration::from_millis(5)).unwrap());
        assert!(!pool.is_terminated());
    }
}
