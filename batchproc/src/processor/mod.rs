//! The batch processor
//!
//! A `BatchProcessor` is driven by a loop which owns the batch currently
//! being filled:
//!
//! 1. merge an item into the current batch
//! 2. hand the batch to `offer`, which submits it as a job once the
//!    `BatchCollector` considers it ready and returns the batch to continue with
//! 3. at the end of input `flush` the last batch
//! 4. `drain` the processor, which blocks until all jobs completed
//!
//! `BatchProcessor::process` runs this loop for an `ItemizedBatchCollector`.
//!
//! A worker pool is created on the first submission of a run-cycle and
//! released by `drain`. The same processor can therefore run any number
//! of run-cycles one after another.
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::batchproc_types::config::{DrainPollIntervalSecs, JobLogPeriod};
use crate::batchproc_types::Error;
use crate::collector::{BatchCollector, ItemizedBatchCollector};
use crate::error::{ProcessorError, ProcessorErrorKind, SubmitError};
use crate::instrumentation::{Instrumentation, Instruments};
use crate::job::BatchJob;
use crate::logging::{DevNullLogger, Logger, Logs};
use crate::pool::{PoolFactory, ThreadPoolFactory, WorkerPool};

mod builder;
mod cycle;
mod wrapper;

pub use self::builder::Builder;

use self::cycle::{Cycle, PoolState};
use self::wrapper::{BatchSlot, Counters, JobWrapper};

/// Accumulates batches and runs them as parallel jobs
///
/// * `B` is the type of a batch
/// * `C` decides when a batch is ready and creates new batches
/// * `J` is the job run with every completed batch
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use batchproc::collector::SizeBasedCollector;
/// use batchproc::BatchProcessor;
///
/// let stored = Arc::new(AtomicUsize::new(0));
/// let stored_by_job = Arc::clone(&stored);
///
/// let processor: BatchProcessor<Vec<u32>, _, _> = BatchProcessor::new(
///     move |batch: Vec<u32>| -> Result<(), String> {
///         stored_by_job.fetch_add(batch.len(), Ordering::SeqCst);
///         Ok(())
///     },
///     SizeBasedCollector::new(3).unwrap(),
/// );
///
/// processor.process(0..7u32, "waiting for the batch jobs").unwrap();
///
/// assert_eq!(processor.submitted_batches(), 3);
/// assert_eq!(processor.completed_batches(), 3);
/// assert_eq!(stored.load(Ordering::SeqCst), 7);
/// ```
pub struct BatchProcessor<B, C, J> {
    batch_job: Arc<J>,
    batch_collector: Arc<C>,
    pool_factory: Arc<dyn PoolFactory>,
    job_log_period: JobLogPeriod,
    drain_poll_interval: Duration,
    state: Mutex<PoolState>,
    counters: Arc<Counters>,
    cycles: AtomicU64,
    logger: Logger,
    instrumentation: Instrumentation,
    _batch: PhantomData<fn(B)>,
}

impl<B, C, J> BatchProcessor<B, C, J>
where
    B: Send + 'static,
    C: BatchCollector<B>,
    J: BatchJob<B>,
{
    /// Creates a processor with default settings which does not log.
    ///
    /// Use a `Builder` for anything else.
    pub fn new(batch_job: J, batch_collector: C) -> Self {
        Self::assemble(
            Arc::new(batch_job),
            Arc::new(batch_collector),
            Arc::new(ThreadPoolFactory::default()),
            JobLogPeriod::default(),
            DrainPollIntervalSecs::default().into_duration(),
            Logger::new(Arc::new(DevNullLogger)),
            Instrumentation::default(),
        )
    }

    pub(crate) fn assemble(
        batch_job: Arc<J>,
        batch_collector: Arc<C>,
        pool_factory: Arc<dyn PoolFactory>,
        job_log_period: JobLogPeriod,
        drain_poll_interval: Duration,
        logger: Logger,
        instrumentation: Instrumentation,
    ) -> Self {
        Self {
            batch_job,
            batch_collector,
            pool_factory,
            job_log_period,
            drain_poll_interval,
            state: Mutex::new(PoolState::default()),
            counters: Arc::new(Counters::default()),
            cycles: AtomicU64::new(0),
            logger,
            instrumentation,
            _batch: PhantomData,
        }
    }

    /// Submits `current_batch` as a job if it is ready or if `force_flush` is `true`.
    ///
    /// Returns the batch to continue filling: `current_batch` itself if
    /// nothing was submitted, otherwise a new batch from the `BatchCollector`.
    ///
    /// If the batch could not be submitted it is returned within the error.
    pub fn handle_new_batch(
        &self,
        current_batch: B,
        force_flush: bool,
    ) -> Result<B, SubmitError<B>> {
        if !(force_flush || self.batch_collector.is_ready(&current_batch)) {
            return Ok(current_batch);
        }

        let cycle = match self.active_cycle() {
            Ok(cycle) => cycle,
            Err(err) => return Err(SubmitError::new(err, current_batch)),
        };

        let slot = BatchSlot::new(current_batch);
        let task = JobWrapper {
            job: Arc::clone(&self.batch_job),
            counters: Arc::clone(&self.counters),
            shutdown: cycle.shutdown.clone(),
            logger: cycle.logger.clone(),
            instrumentation: self.instrumentation.clone(),
            job_log_period: self.job_log_period,
        }
        .wrap(slot.clone());

        if let Err(err) = cycle.pool.submit(task) {
            let err = ProcessorError::new(ProcessorErrorKind::Rejected)
                .with_message(format!("the worker pool rejected a batch job: {}", err))
                .with_source(err);
            match slot.take() {
                Some(batch) => return Err(SubmitError::new(err, batch)),
                // The job owns the batch and will be counted as completed
                None => cycle.logger.warn(format_args!(
                    "{}, but the batch job already started",
                    err
                )),
            }
        }
        self.instrumentation.batch_submitted();

        let submitted = self.counters.submitted();
        if self.job_log_period.is_boundary(submitted) {
            cycle
                .logger
                .info(format_args!("{} batch jobs submitted", submitted));
        }

        Ok(self.batch_collector.new_batch())
    }

    /// Submits `current_batch` only if the `BatchCollector` considers it ready.
    ///
    /// This is what a driver loop calls after each item.
    pub fn offer(&self, current_batch: B) -> Result<B, SubmitError<B>> {
        self.handle_new_batch(current_batch, false)
    }

    /// Submits `current_batch` regardless of whether it is ready.
    ///
    /// This is what a driver loop calls once at the end of its input.
    pub fn flush(&self, current_batch: B) -> Result<B, SubmitError<B>> {
        self.handle_new_batch(current_batch, true)
    }

    /// Runs a complete run-cycle over `items`.
    ///
    /// Each item is merged into the current batch which is then offered.
    /// The last batch is flushed even if it is empty. Finally the processor
    /// is drained, logging `progress_message` while waiting.
    pub fn process<I, S>(&self, items: I, progress_message: &str) -> Result<(), ProcessorError>
    where
        I: IntoIterator<Item = S>,
        C: ItemizedBatchCollector<B, S>,
    {
        let mut batch = self.batch_collector.new_batch();
        for item in items {
            self.batch_collector.accumulate(&mut batch, item);
            batch = self.offer(batch)?;
        }
        self.flush(batch)?;
        self.drain(progress_message)
    }
}

impl<B, C, J> BatchProcessor<B, C, J> {
    /// Returns the worker pool of the current run-cycle.
    ///
    /// Creates the pool if there is none. Fails while the processor is draining.
    pub fn pool(&self) -> Result<Arc<dyn WorkerPool>, ProcessorError> {
        self.active_cycle().map(|cycle| cycle.pool)
    }

    /// Returns `true` if a worker pool exists, either active or draining.
    pub fn has_pool(&self) -> bool {
        !matches!(*self.lock_state(), PoolState::Absent)
    }

    /// Blocks until all submitted batch jobs completed and releases the worker pool.
    ///
    /// The pool stops accepting jobs. While waiting `progress_message` is
    /// logged every drain poll interval. Afterwards the next submission
    /// starts a new run-cycle with a new pool.
    ///
    /// Does nothing if no batch was submitted since the last drain.
    ///
    /// Fails if waiting for the pool is interrupted. The processor keeps
    /// draining in that case and calling `drain` again resumes waiting.
    pub fn drain(&self, progress_message: &str) -> Result<(), ProcessorError> {
        let cycle = {
            let mut state = self.lock_state();
            let (cycle, start_draining) = match *state {
                PoolState::Absent => return Ok(()),
                PoolState::Active(ref cycle) => (cycle.clone(), true),
                PoolState::Draining(ref cycle) => (cycle.clone(), false),
            };
            if start_draining {
                cycle.shutdown.request();
                cycle.pool.shutdown();
                *state = PoolState::Draining(cycle.clone());
            }
            cycle
        };

        let started = Instant::now();
        while !cycle.pool.is_terminated() {
            cycle.logger.info(format_args!("{}", progress_message));
            cycle
                .pool
                .await_termination(self.drain_poll_interval)
                .map_err(ProcessorError::drain_interrupted)?;
        }

        {
            let mut state = self.lock_state();
            let drained = match *state {
                PoolState::Draining(ref current) => current.is_same(&cycle),
                _ => false,
            };
            if drained {
                *state = PoolState::Absent;
            }
        }

        cycle.logger.debug(format_args!(
            "worker pool released, {}/{} batch jobs completed",
            self.completed_batches(),
            self.submitted_batches()
        ));
        self.instrumentation.pool_drained(started.elapsed());

        Ok(())
    }

    /// The number of batch jobs submitted over all run-cycles
    pub fn submitted_batches(&self) -> u64 {
        self.counters.submitted.load(Ordering::SeqCst)
    }

    /// The number of batch jobs completed over all run-cycles
    ///
    /// Failed jobs are completed jobs, too.
    pub fn completed_batches(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    /// The number of completed batch jobs which failed
    pub fn failed_batches(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }

    /// The number of run-cycles started, i.e. worker pools created
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn batch_job(&self) -> &J {
        &self.batch_job
    }

    /// Jobs already submitted keep running with the previous job.
    pub fn set_batch_job<T: Into<Arc<J>>>(&mut self, batch_job: T) {
        self.batch_job = batch_job.into();
    }

    pub fn batch_collector(&self) -> &C {
        &self.batch_collector
    }

    pub fn set_batch_collector<T: Into<Arc<C>>>(&mut self, batch_collector: T) {
        self.batch_collector = batch_collector.into();
    }

    /// Used from the next run-cycle on.
    pub fn set_pool_factory<F: PoolFactory>(&mut self, pool_factory: F) {
        self.pool_factory = Arc::new(pool_factory);
    }

    pub fn job_log_period(&self) -> JobLogPeriod {
        self.job_log_period
    }

    pub fn set_job_log_period<T: Into<JobLogPeriod>>(
        &mut self,
        job_log_period: T,
    ) -> Result<(), Error> {
        let job_log_period = job_log_period.into();
        job_log_period.validate()?;
        self.job_log_period = job_log_period;
        Ok(())
    }

    pub fn drain_poll_interval(&self) -> Duration {
        self.drain_poll_interval
    }

    pub fn set_drain_poll_interval(&mut self, drain_poll_interval: Duration) {
        self.drain_poll_interval = drain_poll_interval;
    }

    fn active_cycle(&self) -> Result<Cycle, ProcessorError> {
        let mut state = self.lock_state();
        match *state {
            PoolState::Active(ref cycle) => return Ok(cycle.clone()),
            PoolState::Draining(ref cycle) => {
                return Err(ProcessorError::draining().with_message(format!(
                    "run-cycle {} is draining and accepts no batch jobs",
                    cycle.ordinal
                )))
            }
            PoolState::Absent => {}
        }

        let pool = self.pool_factory.create().map_err(|err| {
            ProcessorError::new(ProcessorErrorKind::PoolUnavailable)
                .with_message(format!("could not create a worker pool: {}", err))
                .with_source(err)
        })?;
        let ordinal = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let cycle = Cycle::new(ordinal, pool, self.logger.clone());

        cycle.logger.debug(format_args!("worker pool created"));
        self.instrumentation.pool_created();

        *state = PoolState::Active(cycle.clone());
        Ok(cycle)
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
