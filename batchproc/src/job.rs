//! The unit of work executed for each completed batch
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Processes one completed batch
///
/// The batch is handed over by value. The driver loop has already
/// moved on to a fresh batch when the job runs.
///
/// A job may run on any worker thread and many jobs may run at the same
/// time, hence the `Send + Sync` bound.
///
/// Failing jobs are never retried. A failure (returned or a panic) is
/// logged and the job still counts as completed.
///
/// # Example
///
/// Closures returning a `Result` are batch jobs:
///
/// ```rust
/// use batchproc::job::BatchJob;
///
/// let job = |batch: Vec<u32>| -> Result<(), String> {
///     if batch.is_empty() {
///         Err("nothing to store".to_owned())
///     } else {
///         Ok(())
///     }
/// };
///
/// assert!(job.run(vec![1, 2]).is_ok());
/// assert!(job.run(vec![]).is_err());
/// ```
pub trait BatchJob<B>: Send + Sync + 'static {
    fn run(&self, batch: B) -> Result<(), JobFailure>;
}

impl<B, F, E> BatchJob<B> for F
where
    F: Fn(B) -> Result<(), E> + Send + Sync + 'static,
    E: fmt::Display,
{
    fn run(&self, batch: B) -> Result<(), JobFailure> {
        (self)(batch).map_err(JobFailure::new)
    }
}

/// The reason a batch job failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure(String);

impl JobFailure {
    pub fn new<M: fmt::Display>(message: M) -> Self {
        Self(message.to_string())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for JobFailure {}

/// What happened when a batch job ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    Failed(JobFailure),
}

impl JobOutcome {
    /// Runs the job and captures both returned errors and panics.
    pub fn of<B, J>(job: &J, batch: B) -> Self
    where
        J: BatchJob<B> + ?Sized,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| job.run(batch))) {
            Ok(Ok(())) => JobOutcome::Completed,
            Ok(Err(failure)) => JobOutcome::Failed(failure),
            Err(payload) => JobOutcome::Failed(JobFailure::new(format!(
                "panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown cause"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Failing;

    impl BatchJob<u32> for Failing {
        fn run(&self, batch: u32) -> Result<(), JobFailure> {
            Err(JobFailure::new(format!("cannot store {}", batch)))
        }
    }

    #[test]
    fn closures_are_batch_jobs() {
        let job = |_batch: u32| -> Result<(), String> { Ok(()) };
        assert_eq!(JobOutcome::of(&job, 1), JobOutcome::Completed);
    }

    #[test]
    fn returned_errors_are_failures() {
        assert_eq!(
            JobOutcome::of(&Failing, 7),
            JobOutcome::Failed(JobFailure::new("cannot store 7"))
        );
    }

    #[test]
    fn panics_are_failures() {
        let job = |batch: u32| -> Result<(), String> { panic!("boom {}", batch) };
        assert_eq!(
            JobOutcome::of(&job, 3),
            JobOutcome::Failed(JobFailure::new("panicked: boom 3"))
        );
    }

    #[test]
    fn static_panic_messages_are_kept() {
        let job = |_batch: u32| -> Result<(), String> { panic!("static boom") };
        assert_eq!(
            JobOutcome::of(&job, 3),
            JobOutcome::Failed(JobFailure::new("panicked: static boom"))
        );
    }
}
