//! Worker pools executing batch jobs
//!
//! A `WorkerPool` is used for exactly one run-cycle. Once it has been
//! shut down it accepts no more tasks, so the `BatchProcessor` asks a
//! `PoolFactory` for a fresh pool at the start of every run-cycle.
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batchproc_types::config::{PoolSize, QueueCapacity, WorkerNamePrefix};
use crate::batchproc_types::{Error, BATCHPROC_PREFIX};

mod thread_pool;
#[cfg(feature = "tokio")]
mod tokio_pool;
mod tracker;

pub use self::thread_pool::ThreadPool;
#[cfg(feature = "tokio")]
pub use self::tokio_pool::{TokioPool, TokioPoolFactory};

/// A unit of work submitted to a `WorkerPool`
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes tasks in parallel
pub trait WorkerPool: Send + Sync {
    /// Submit a task for execution.
    ///
    /// Fails if the pool has been shut down. May block if the
    /// pool has no capacity left.
    fn submit(&self, task: Task) -> Result<(), PoolError>;

    /// Stop accepting new tasks.
    ///
    /// Tasks already submitted will still be executed.
    fn shutdown(&self);

    /// Returns `true` once `shutdown` has been called.
    fn is_shutdown(&self) -> bool;

    /// Returns `true` if the pool has been shut down and all
    /// tasks have finished.
    fn is_terminated(&self) -> bool;

    /// Block until the pool terminated or `timeout` elapsed.
    ///
    /// Returns whether the pool terminated. An error means waiting
    /// was interrupted and the state of the pool is unknown.
    fn await_termination(&self, timeout: Duration) -> Result<bool, PoolError>;
}

/// Creates a new `WorkerPool` for each run-cycle
pub trait PoolFactory: Send + Sync + 'static {
    fn create(&self) -> Result<Arc<dyn WorkerPool>, PoolError>;
}

impl<F> PoolFactory for F
where
    F: Fn() -> Result<Arc<dyn WorkerPool>, PoolError> + Send + Sync + 'static,
{
    fn create(&self) -> Result<Arc<dyn WorkerPool>, PoolError> {
        (self)()
    }
}

/// Creates a `ThreadPool` from a `PoolConfig`
#[derive(Debug, Clone, Default)]
pub struct ThreadPoolFactory {
    config: PoolConfig,
}

impl ThreadPoolFactory {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }
}

impl PoolFactory for ThreadPoolFactory {
    fn create(&self) -> Result<Arc<dyn WorkerPool>, PoolError> {
        Ok(Arc::new(ThreadPool::new(&self.config)?))
    }
}

/// Configures a `ThreadPool`
///
/// # Environment
///
/// When initialized/updated from the environment the following environment variable
/// are used which by are by default prefixed with "BATCHPROC_" or a custom prefix "<prefix>_":
///
/// * "POOL_SIZE"
/// * "QUEUE_CAPACITY"
/// * "WORKER_NAME_PREFIX"
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PoolConfig {
    /// The number of worker threads.
    ///
    /// The default is the available parallelism of the machine.
    pub pool_size: Option<PoolSize>,
    /// The number of queued tasks after which submissions block.
    ///
    /// The default is the pool size.
    pub queue_capacity: Option<QueueCapacity>,
    /// Worker threads are named "<prefix>-<index>".
    pub worker_name_prefix: Option<WorkerNamePrefix>,
}

impl PoolConfig {
    /// Initializes all fields from environment variables prefixed with "BATCHPROC_"
    pub fn from_env() -> Result<Self, Error> {
        let mut me = Self::default();
        me.fill_from_env()?;
        Ok(me)
    }

    /// Initializes all fields from environment variables prefixed with "[prefix]_"
    pub fn from_env_prefixed<T: AsRef<str>>(prefix: T) -> Result<Self, Error> {
        let mut me = Self::default();
        me.fill_from_env_prefixed(prefix)?;
        Ok(me)
    }

    /// Updates all not yet set fields from environment variables prefixed with "BATCHPROC_"
    pub fn fill_from_env(&mut self) -> Result<(), Error> {
        self.fill_from_env_prefixed(BATCHPROC_PREFIX)
    }

    /// Updates all not yet set fields from environment variables prefixed with "[prefix]_"
    pub fn fill_from_env_prefixed<T: AsRef<str>>(&mut self, prefix: T) -> Result<(), Error> {
        if self.pool_size.is_none() {
            self.pool_size = PoolSize::try_from_env_prefixed(prefix.as_ref())?;
        }
        if self.queue_capacity.is_none() {
            self.queue_capacity = QueueCapacity::try_from_env_prefixed(prefix.as_ref())?;
        }
        if self.worker_name_prefix.is_none() {
            self.worker_name_prefix = WorkerNamePrefix::try_from_env_prefixed(prefix.as_ref())?;
        }
        Ok(())
    }

    /// The number of worker threads.
    pub fn pool_size<T: Into<PoolSize>>(mut self, pool_size: T) -> Self {
        self.pool_size = Some(pool_size.into());
        self
    }

    /// The number of queued tasks after which submissions block.
    pub fn queue_capacity<T: Into<QueueCapacity>>(mut self, queue_capacity: T) -> Self {
        self.queue_capacity = Some(queue_capacity.into());
        self
    }

    /// Worker threads are named "<prefix>-<index>".
    pub fn worker_name_prefix<T: Into<WorkerNamePrefix>>(mut self, prefix: T) -> Self {
        self.worker_name_prefix = Some(prefix.into());
        self
    }

    /// Applies the defaults to all values that have not been set so far.
    pub fn apply_defaults(&mut self) {
        let pool_size = self.pool_size.unwrap_or_default();
        let queue_capacity = self.queue_capacity.unwrap_or_else(|| pool_size.into());
        let worker_name_prefix = self.worker_name_prefix.take().unwrap_or_default();

        self.pool_size = Some(pool_size);
        self.queue_capacity = Some(queue_capacity);
        self.worker_name_prefix = Some(worker_name_prefix);
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(pool_size) = self.pool_size {
            pool_size.validate()?;
        }
        Ok(())
    }
}

/// Returned when a `WorkerPool` could not be created or used
#[derive(Debug)]
pub struct PoolError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl PoolError {
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E: StdError + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn shut_down() -> Self {
        Self::new("the worker pool has been shut down")
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for PoolError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl From<Error> for PoolError {
    fn from(err: Error) -> Self {
        Self::new(err.into_inner())
    }
}

/// Pools for deterministic tests
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Queues all tasks and runs them on the thread awaiting termination
    #[derive(Default)]
    pub struct DeferredPool {
        tasks: Mutex<VecDeque<Task>>,
        shutdown: AtomicBool,
    }

    impl DeferredPool {
        pub fn pending(&self) -> usize {
            self.tasks.lock().unwrap().len()
        }

        pub fn run_pending(&self) {
            loop {
                let next = self.tasks.lock().unwrap().pop_front();
                match next {
                    Some(task) => task(),
                    None => break,
                }
            }
        }
    }

    impl WorkerPool for DeferredPool {
        fn submit(&self, task: Task) -> Result<(), PoolError> {
            if self.is_shutdown() {
                return Err(PoolError::shut_down());
            }
            self.tasks.lock().unwrap().push_back(task);
            Ok(())
        }

        fn shutdown(&self) {
            self.shutdown.store(true, Ordering::SeqCst);
        }

        fn is_shutdown(&self) -> bool {
            self.shutdown.load(Ordering::SeqCst)
        }

        fn is_terminated(&self) -> bool {
            self.is_shutdown() && self.pending() == 0
        }

        fn await_termination(&self, _timeout: Duration) -> Result<bool, PoolError> {
            self.run_pending();
            Ok(self.is_terminated())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_derive_queue_capacity_from_pool_size() {
        let mut config = PoolConfig::default().pool_size(3usize);
        config.apply_defaults();

        assert_eq!(config.pool_size, Some(PoolSize::new(3usize)));
        assert_eq!(config.queue_capacity, Some(QueueCapacity::new(3usize)));
        assert_eq!(
            config.worker_name_prefix,
            Some(WorkerNamePrefix::new("batchproc-worker"))
        );
    }

    #[test]
    fn fill_from_env_keeps_values_already_set() {
        std::env::set_var("POOL_TEST_A_POOL_SIZE", "7");
        std::env::set_var("POOL_TEST_A_QUEUE_CAPACITY", "70");

        let mut config = PoolConfig::default().queue_capacity(5usize);
        config.fill_from_env_prefixed("POOL_TEST_A").unwrap();

        assert_eq!(config.pool_size, Some(PoolSize::new(7usize)));
        assert_eq!(config.queue_capacity, Some(QueueCapacity::new(5usize)));
        assert_eq!(config.worker_name_prefix, None);
    }

    #[test]
    fn deserializes_from_json() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"pool_size":2,"worker_name_prefix":"loader"}"#).unwrap();

        assert_eq!(config.pool_size, Some(PoolSize::new(2usize)));
        assert_eq!(config.queue_capacity, None);
        assert_eq!(
            config.worker_name_prefix,
            Some(WorkerNamePrefix::new("loader"))
        );
    }

    #[test]
    fn closures_are_pool_factories() {
        let factory = || -> Result<Arc<dyn WorkerPool>, PoolError> {
            Ok(Arc::new(testing::DeferredPool::default()))
        };
        let pool = factory.create().unwrap();
        assert!(!pool.is_shutdown());
    }

    #[test]
    fn zero_sized_pools_are_invalid() {
        assert!(PoolConfig::default().pool_size(0usize).validate().is_err());
        assert!(ThreadPoolFactory::new(PoolConfig::default().pool_size(0usize))
            .create()
            .is_err());
    }
}
