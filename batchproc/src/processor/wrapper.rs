use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;

use crate::batchproc_types::config::JobLogPeriod;
use crate::instrumentation::{Instrumentation, Instruments};
use crate::job::{BatchJob, JobOutcome};
use crate::logging::{Logger, Logs};
use crate::pool::Task;

use super::cycle::ShutdownSignal;

/// Counters of a `BatchProcessor`
///
/// These accumulate over all run-cycles.
#[derive(Default)]
pub(crate) struct Counters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

impl Counters {
    /// Returns the new number of submitted batches
    pub fn submitted(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the new number of completed batches
    pub fn completed(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Holds a submitted batch until its job starts
///
/// Whoever takes the batch first owns it. This is either the job on a
/// worker thread or the processor after the pool refused the job.
pub(crate) struct BatchSlot<B>(Arc<AtomicCell<Option<B>>>);

impl<B> BatchSlot<B> {
    pub fn new(batch: B) -> Self {
        BatchSlot(Arc::new(AtomicCell::new(Some(batch))))
    }

    pub fn take(&self) -> Option<B> {
        self.0.take()
    }
}

impl<B> Clone for BatchSlot<B> {
    fn clone(&self) -> Self {
        BatchSlot(Arc::clone(&self.0))
    }
}

/// Everything a batch job needs on a worker thread
///
/// Catches failures of the job, counts the job as completed in any case
/// and logs the progress of completed jobs.
pub(crate) struct JobWrapper<J> {
    pub job: Arc<J>,
    pub counters: Arc<Counters>,
    pub shutdown: ShutdownSignal,
    pub logger: Logger,
    pub instrumentation: Instrumentation,
    pub job_log_period: JobLogPeriod,
}

impl<J> JobWrapper<J> {
    pub fn wrap<B>(self, slot: BatchSlot<B>) -> Task
    where
        B: Send + 'static,
        J: BatchJob<B>,
    {
        Box::new(move || {
            if let Some(batch) = slot.take() {
                self.run(batch)
            }
        })
    }

    fn run<B>(self, batch: B)
    where
        J: BatchJob<B>,
    {
        let started = Instant::now();
        let outcome = JobOutcome::of(&*self.job, batch);
        let elapsed = started.elapsed();

        // Counted before any collaborator runs. A panicking logger or
        // instrumentation must not keep a drain waiting forever.
        if let JobOutcome::Failed(_) = outcome {
            self.counters.failed();
        }
        let completed = self.counters.completed();
        let submitted = self.counters.submitted.load(Ordering::SeqCst);

        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            self.report(outcome, elapsed, completed, submitted)
        }));
    }

    fn report(&self, outcome: JobOutcome, elapsed: Duration, completed: u64, submitted: u64) {
        match outcome {
            JobOutcome::Completed => self.instrumentation.batch_completed(elapsed),
            JobOutcome::Failed(failure) => {
                let current = thread::current();
                self.logger.error(format_args!(
                    "error while running batch job on thread {}: {}",
                    current.name().unwrap_or("<unnamed>"),
                    failure
                ));
                self.instrumentation.batch_failed(elapsed);
            }
        }

        if self.should_log_completion(completed, submitted) {
            self.logger.info(format_args!(
                "{}/{} batch jobs completed",
                completed, submitted
            ));
        }
    }

    /// Either condition alone is enough to log.
    ///
    /// The second one makes sure the last job of a drained run-cycle
    /// is reported even if it is not on a cadence boundary.
    ///
    /// The submitted counter is incremented only after the pool accepted
    /// a job. A job finishing before that, or finishing before the drain
    /// requested the shutdown, sees no shutdown or a lower submitted count.
    /// The last job of such a run-cycle is then not reported unless it is
    /// on a cadence boundary. The counters are correct in any case.
    fn should_log_completion(&self, completed: u64, submitted: u64) -> bool {
        self.job_log_period.is_boundary(completed)
            || (completed == submitted && self.shutdown.is_requested())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::job::JobFailure;
    use crate::logging::collecting::{CollectingLogger, Level};

    struct Noop;

    impl BatchJob<u32> for Noop {
        fn run(&self, _batch: u32) -> Result<(), JobFailure> {
            Ok(())
        }
    }

    fn wrapper(period: u64, shutdown: &ShutdownSignal, logs: &CollectingLogger) -> JobWrapper<Noop> {
        JobWrapper {
            job: Arc::new(Noop),
            counters: Arc::new(Counters::default()),
            shutdown: shutdown.clone(),
            logger: Logger::new(Arc::new(logs.clone())),
            instrumentation: Instrumentation::off(),
            job_log_period: JobLogPeriod::new(period),
        }
    }

    #[test]
    fn logs_on_cadence_boundaries() {
        let logs = CollectingLogger::default();
        let w = wrapper(10, &ShutdownSignal::default(), &logs);

        assert!(!w.should_log_completion(9, 20));
        assert!(w.should_log_completion(10, 20));
        assert!(w.should_log_completion(20, 20));
    }

    #[test]
    fn logs_the_last_job_only_after_shutdown() {
        let logs = CollectingLogger::default();
        let shutdown = ShutdownSignal::default();
        let w = wrapper(10, &shutdown, &logs);

        assert!(!w.should_log_completion(7, 7));
        shutdown.request();
        assert!(w.should_log_completion(7, 7));
        assert!(!w.should_log_completion(6, 7));
    }

    #[test]
    fn counts_and_logs_a_completed_job() {
        let logs = CollectingLogger::default();
        let shutdown = ShutdownSignal::default();
        shutdown.request();
        let w = wrapper(10, &shutdown, &logs);
        let counters = Arc::clone(&w.counters);
        counters.submitted();

        let task = w.wrap(BatchSlot::new(1u32));
        task();

        assert_eq!(counters.completed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.failed.load(Ordering::SeqCst), 0);
        assert_eq!(
            logs.lines(Level::Info),
            vec!["1/1 batch jobs completed".to_owned()]
        );
    }

    #[test]
    fn a_taken_batch_is_not_run() {
        let logs = CollectingLogger::default();
        let w = wrapper(1, &ShutdownSignal::default(), &logs);
        let counters = Arc::clone(&w.counters);
        let slot = BatchSlot::new(1u32);

        let task = w.wrap(slot.clone());
        assert_eq!(slot.take(), Some(1));
        task();

        assert_eq!(counters.completed.load(Ordering::SeqCst), 0);
        assert!(logs.lines(Level::Info).is_empty());
    }

    struct PanickingInstruments;

    impl Instruments for PanickingInstruments {
        fn batch_submitted(&self) {}
        fn batch_completed(&self, _time: Duration) {
            panic!("instruments are broken");
        }
        fn batch_failed(&self, _time: Duration) {}
        fn pool_created(&self) {}
        fn pool_drained(&self, _time: Duration) {}
    }

    #[test]
    fn a_panicking_instrumentation_does_not_stop_counting() {
        let logs = CollectingLogger::default();
        let mut w = wrapper(10, &ShutdownSignal::default(), &logs);
        w.instrumentation = Instrumentation::new(PanickingInstruments);
        let counters = Arc::clone(&w.counters);
        counters.submitted();

        let task = w.wrap(BatchSlot::new(1u32));
        task();

        assert_eq!(counters.completed.load(Ordering::SeqCst), 1);
    }
}
