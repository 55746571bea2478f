//! # Batchproc
//!
//! Accumulates items into batches and runs each completed batch as a job
//! on a pool of worker threads.
//!
//! The pieces are
//!
//! * a `BatchCollector` which decides when a batch is ready and creates new batches
//! * a `BatchJob` which is run with every submitted batch
//! * a `BatchProcessor` which submits ready batches, creates a worker pool on
//!   demand and waits for all jobs to complete when drained
//!
//! A processor can run any number of run-cycles. Each run-cycle gets its own
//! worker pool which is released when the processor is drained. The counters
//! of submitted and completed batch jobs accumulate over all run-cycles.
//!
//! Failures of batch jobs never reach the caller. A job returning an error or
//! panicking is logged, counted as failed and still counted as completed.
//!
//! ## Example
//!
//! ```rust
//! use batchproc::collector::SizeBasedCollector;
//! use batchproc::logging::DevNullLogger;
//! use batchproc::{BatchProcessor, Builder};
//!
//! fn store(batch: Vec<String>) -> Result<(), String> {
//!     if batch.iter().any(|line| line.is_empty()) {
//!         return Err("empty line".to_owned());
//!     }
//!     Ok(())
//! }
//!
//! let processor: BatchProcessor<Vec<String>, _, _> = Builder::default()
//!     .processor_name("lines")
//!     .job_log_period(100u64)
//!     .configure_pool(|config| config.pool_size(2usize))
//!     .build_with(store, SizeBasedCollector::new(10).unwrap(), DevNullLogger)
//!     .unwrap();
//!
//! let lines = (0..95).map(|n| n.to_string());
//! processor.process(lines, "still storing lines").unwrap();
//!
//! assert_eq!(processor.submitted_batches(), 10);
//! assert_eq!(processor.completed_batches(), 10);
//! assert_eq!(processor.failed_batches(), 0);
//! ```
//!
//! ## Environment
//!
//! The `Builder` and the `PoolConfig` can be initialized from environment
//! variables prefixed with "BATCHPROC_" or a custom prefix.
//!
//! ## Logging
//!
//! Logging goes through a `LoggingAdapter`. Adapters for `log` and `slog`
//! are available via the features of the same names.
pub use batchproc_types;
pub use batchproc_types::Error;

pub mod collector;
pub mod error;
pub mod instrumentation;
pub mod job;
pub mod logging;
pub mod pool;
pub mod processor;

pub use collector::{BatchCollector, ItemizedBatchCollector};
pub use error::{ProcessorError, ProcessorErrorKind, SubmitError};
pub use job::{BatchJob, JobFailure};
pub use processor::{BatchProcessor, Builder};
