use std::error::Error as StdError;
use std::fmt;

use crate::batchproc_types::Error;
use crate::pool::PoolError;

/// Returned by the operations of a `BatchProcessor`
///
/// Failures of batch jobs are never returned. They are logged
/// and counted instead.
#[derive(Debug)]
pub struct ProcessorError {
    message: Option<String>,
    kind: ProcessorErrorKind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ProcessorError {
    pub fn new(kind: ProcessorErrorKind) -> Self {
        Self {
            message: None,
            kind,
            source: None,
        }
    }

    pub fn draining() -> Self {
        Self::new(ProcessorErrorKind::Draining)
    }

    pub fn new_with_message<M: fmt::Display>(kind: ProcessorErrorKind, message: M) -> Self {
        Self {
            message: Some(message.to_string()),
            kind,
            source: None,
        }
    }

    pub fn with_message<T: fmt::Display>(mut self, message: T) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_source<E: StdError + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ProcessorErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub(crate) fn drain_interrupted(err: PoolError) -> Self {
        Self::new(ProcessorErrorKind::DrainInterrupted)
            .with_message(format!(
                "unexpected interruption while waiting for batch job termination: {}",
                err
            ))
            .with_source(err)
    }
}

impl StdError for ProcessorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = self.message() {
            write!(f, "{}", message)?;
        } else if let Some(source) = self.source() {
            write!(f, "{}", source)?;
        } else {
            write!(f, "{}", self.kind)?;
        }
        Ok(())
    }
}

impl From<ProcessorErrorKind> for ProcessorError {
    fn from(kind: ProcessorErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<Error> for ProcessorError {
    fn from(err: Error) -> Self {
        Self {
            message: Some(err.into_inner()),
            kind: ProcessorErrorKind::Config,
            source: None,
        }
    }
}

impl From<ProcessorError> for Error {
    fn from(err: ProcessorError) -> Self {
        Self::from_error(err)
    }
}

/// A `ProcessorError` returned from submitting a batch
///
/// Carries the batch which could not be submitted so that the caller
/// can retry it later or dispose of it.
pub struct SubmitError<B> {
    error: ProcessorError,
    batch: B,
}

impl<B> SubmitError<B> {
    pub(crate) fn new(error: ProcessorError, batch: B) -> Self {
        Self { error, batch }
    }

    pub fn kind(&self) -> ProcessorErrorKind {
        self.error.kind()
    }

    pub fn error(&self) -> &ProcessorError {
        &self.error
    }

    pub fn batch(&self) -> &B {
        &self.batch
    }

    pub fn into_batch(self) -> B {
        self.batch
    }

    pub fn into_error(self) -> ProcessorError {
        self.error
    }

    pub fn into_parts(self) -> (ProcessorError, B) {
        (self.error, self.batch)
    }
}

impl<B> fmt::Debug for SubmitError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitError")
            .field("error", &self.error)
            .finish()
    }
}

impl<B> fmt::Display for SubmitError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<B> StdError for SubmitError<B> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

impl<B> From<SubmitError<B>> for ProcessorError {
    fn from(err: SubmitError<B>) -> Self {
        err.error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProcessorErrorKind {
    /// The current run-cycle is being drained and accepts no more batches
    Draining,
    /// The pool factory failed to create a worker pool
    PoolUnavailable,
    /// The worker pool did not accept a batch job
    Rejected,
    /// Waiting for the worker pool to terminate failed
    DrainInterrupted,
    /// Invalid configuration
    Config,
}

impl fmt::Display for ProcessorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorErrorKind::Draining => write!(f, "draining")?,
            ProcessorErrorKind::PoolUnavailable => write!(f, "worker pool unavailable")?,
            ProcessorErrorKind::Rejected => write!(f, "batch job rejected")?,
            ProcessorErrorKind::DrainInterrupted => write!(f, "drain interrupted")?,
            ProcessorErrorKind::Config => write!(f, "configuration")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn drain_interrupted_keeps_the_cause() {
        let err = ProcessorError::drain_interrupted(PoolError::new("lock poisoned"));

        assert_eq!(err.kind(), ProcessorErrorKind::DrainInterrupted);
        assert_eq!(
            err.to_string(),
            "unexpected interruption while waiting for batch job termination: lock poisoned"
        );
        assert_eq!(err.source().unwrap().to_string(), "lock poisoned");
    }

    #[test]
    fn display_falls_back_to_the_kind() {
        assert_eq!(ProcessorError::draining().to_string(), "draining");
    }

    #[test]
    fn submit_errors_give_back_the_batch() {
        let err = SubmitError::new(ProcessorError::draining(), vec![1, 2]);

        assert_eq!(err.kind(), ProcessorErrorKind::Draining);
        assert_eq!(err.to_string(), "draining");
        assert_eq!(err.batch(), &vec![1, 2]);

        let (error, batch) = err.into_parts();
        assert_eq!(error.kind(), ProcessorErrorKind::Draining);
        assert_eq!(batch, vec![1, 2]);
    }

    #[test]
    fn config_errors_convert() {
        let err: ProcessorError = Error::new("pool size must be greater than 0").into();
        assert_eq!(err.kind(), ProcessorErrorKind::Config);
        assert_eq!(err.to_string(), "pool size must be greater than 0");
    }
}
