use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::tracker::Tracker;
use super::{PoolError, PoolFactory, Task, WorkerPool};

/// Runs tasks on the blocking threads of a tokio runtime
///
/// The size of the pool is governed by the runtime's blocking thread limit.
/// Do not drain a processor using this pool from within an async task of
/// the same runtime since draining blocks.
pub struct TokioPool {
    handle: Handle,
    shutdown: AtomicBool,
    in_flight: Arc<Tracker>,
}

impl TokioPool {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            shutdown: AtomicBool::new(false),
            in_flight: Arc::new(Tracker::default()),
        }
    }

    /// Uses the runtime of the current context.
    ///
    /// Fails if not called from within a tokio runtime.
    pub fn current() -> Result<Self, PoolError> {
        let handle = Handle::try_current()
            .map_err(|err| PoolError::new("not within a tokio runtime").with_source(err))?;
        Ok(Self::new(handle))
    }

    pub fn tasks_in_flight(&self) -> usize {
        self.in_flight.running()
    }
}

impl WorkerPool for TokioPool {
    fn submit(&self, task: Task) -> Result<(), PoolError> {
        let guard = Tracker::enter(&self.in_flight);
        if self.is_shutdown() {
            return Err(PoolError::shut_down());
        }

        self.handle.spawn_blocking(move || {
            let _guard = guard;
            let _ = panic::catch_unwind(AssertUnwindSafe(task));
        });

        Ok(())
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.in_flight.running() == 0
    }

    fn await_termination(&self, timeout: Duration) -> Result<bool, PoolError> {
        if !self.is_shutdown() {
            std::thread::sleep(timeout);
            return Ok(false);
        }
        self.in_flight.wait_for_none(timeout)
    }
}

/// Creates a `TokioPool` on the given runtime for each run-cycle
#[derive(Clone)]
pub struct TokioPoolFactory {
    handle: Handle,
}

impl TokioPoolFactory {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl PoolFactory for TokioPoolFactory {
    fn create(&self) -> Result<Arc<dyn WorkerPool>, PoolError> {
        Ok(Arc::new(TokioPool::new(self.handle.clone())))
    }
}
