use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::logging::Logger;
use crate::pool::WorkerPool;

/// The worker pool of a `BatchProcessor` between and during run-cycles
pub(crate) enum PoolState {
    /// No pool exists. The next submission creates one.
    Absent,
    /// The pool accepts batch jobs.
    Active(Cycle),
    /// The pool was shut down and is being awaited.
    Draining(Cycle),
}

impl Default for PoolState {
    fn default() -> Self {
        PoolState::Absent
    }
}

/// Everything belonging to one run-cycle
#[derive(Clone)]
pub(crate) struct Cycle {
    pub ordinal: u64,
    pub pool: Arc<dyn WorkerPool>,
    pub shutdown: ShutdownSignal,
    pub logger: Logger,
}

impl Cycle {
    pub fn new(ordinal: u64, pool: Arc<dyn WorkerPool>, logger: Logger) -> Self {
        Self {
            ordinal,
            pool,
            shutdown: ShutdownSignal::default(),
            logger: logger.with_cycle(ordinal),
        }
    }

    pub fn is_same(&self, other: &Cycle) -> bool {
        self.ordinal == other.ordinal && Arc::ptr_eq(&self.pool, &other.pool)
    }
}

/// Tells batch jobs that their run-cycle stopped accepting work
///
/// Shared by all jobs of a run-cycle.
#[derive(Clone, Default)]
pub(crate) struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
