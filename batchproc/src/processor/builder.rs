use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batchproc_types::config::{DrainPollIntervalSecs, JobLogPeriod, ProcessorName};
use crate::batchproc_types::{Error, BATCHPROC_PREFIX};
use crate::collector::BatchCollector;
use crate::instrumentation::Instrumentation;
use crate::job::BatchJob;
use crate::logging::{Logger, LoggingAdapter};
use crate::pool::{PoolConfig, PoolFactory, ThreadPoolFactory};

use super::BatchProcessor;

/// Creates a `BatchProcessor`
///
/// The batch job and the `BatchCollector` are not part of the `Builder`
/// since a processor can not exist without them. They are passed to `build_with`.
///
/// # Environment
///
/// When initialized/updated from the environment the following environment variable
/// are used which by are by default prefixed with "BATCHPROC_" or a custom prefix "<prefix>_":
///
/// * "PROCESSOR_NAME"
/// * "JOB_LOG_PERIOD"
/// * "DRAIN_POLL_INTERVAL_SECS"
///
/// For `pool_config`:
///
/// * "POOL_SIZE"
/// * "QUEUE_CAPACITY"
/// * "WORKER_NAME_PREFIX"
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Builder {
    /// Identifies the processor in log lines.
    pub processor_name: Option<ProcessorName>,
    /// The instrumentation notified of submissions, completions and pools
    #[serde(skip)]
    pub instrumentation: Option<Instrumentation>,
    /// Every this many submitted and completed batch jobs a line is logged.
    ///
    /// The default is 1000.
    pub job_log_period: Option<JobLogPeriod>,
    /// While draining the progress message is logged at this interval.
    ///
    /// The default is 300 seconds.
    pub drain_poll_interval_secs: Option<DrainPollIntervalSecs>,
    /// Configures the `ThreadPool` created for each run-cycle.
    ///
    /// Not used if a custom `PoolFactory` is given.
    #[serde(default)]
    pub pool_config: PoolConfig,
}

impl Builder {
    /// Creates a new `Builder` from the environment where all the env vars
    /// are prefixed with `BATCHPROC_`.
    pub fn from_env() -> Result<Self, Error> {
        let mut me = Self::default();
        me.fill_from_env()?;
        Ok(me)
    }

    /// Creates a new `Builder` from the environment where all the env vars
    /// are prefixed with `<prefix>_`.
    pub fn from_env_prefixed<T: AsRef<str>>(prefix: T) -> Result<Self, Error> {
        let mut me = Self::default();
        me.fill_from_env_prefixed(prefix)?;
        Ok(me)
    }

    /// Updates all not yet set fields from the environment where all the env vars
    /// are prefixed with `BATCHPROC_`.
    pub fn fill_from_env(&mut self) -> Result<(), Error> {
        self.fill_from_env_prefixed(BATCHPROC_PREFIX)
    }

    /// Updates all not yet set fields from the environment where all the env vars
    /// are prefixed with `<prefix>_`.
    pub fn fill_from_env_prefixed<T: AsRef<str>>(&mut self, prefix: T) -> Result<(), Error> {
        if self.processor_name.is_none() {
            self.processor_name = ProcessorName::try_from_env_prefixed(prefix.as_ref())?;
        }

        if self.job_log_period.is_none() {
            self.job_log_period = JobLogPeriod::try_from_env_prefixed(prefix.as_ref())?;
        }

        if self.drain_poll_interval_secs.is_none() {
            self.drain_poll_interval_secs =
                DrainPollIntervalSecs::try_from_env_prefixed(prefix.as_ref())?;
        }

        self.pool_config.fill_from_env_prefixed(prefix.as_ref())?;

        Ok(())
    }

    /// Identifies the processor in log lines.
    pub fn processor_name<T: Into<ProcessorName>>(mut self, processor_name: T) -> Self {
        self.processor_name = Some(processor_name.into());
        self
    }

    /// The instrumentation notified of submissions, completions and pools
    pub fn instrumentation(mut self, instr: Instrumentation) -> Self {
        self.instrumentation = Some(instr);
        self
    }

    /// Every this many submitted and completed batch jobs a line is logged.
    pub fn job_log_period<T: Into<JobLogPeriod>>(mut self, job_log_period: T) -> Self {
        self.job_log_period = Some(job_log_period.into());
        self
    }

    /// While draining the progress message is logged at this interval.
    pub fn drain_poll_interval_secs<T: Into<DrainPollIntervalSecs>>(
        mut self,
        drain_poll_interval_secs: T,
    ) -> Self {
        self.drain_poll_interval_secs = Some(drain_poll_interval_secs.into());
        self
    }

    pub fn pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }

    /// Modify the current `PoolConfig` with a closure.
    pub fn configure_pool<F>(mut self, f: F) -> Self
    where
        F: FnOnce(PoolConfig) -> PoolConfig,
    {
        self.pool_config = f(self.pool_config);
        self
    }

    /// Applies the defaults to all values that have not been set so far.
    ///
    /// The processor name has no default.
    pub fn apply_defaults(&mut self) {
        let instrumentation = self.instrumentation.clone().unwrap_or_default();
        let job_log_period = self.job_log_period.unwrap_or_default();
        let drain_poll_interval_secs = self.drain_poll_interval_secs.unwrap_or_default();

        self.pool_config.apply_defaults();

        self.instrumentation = Some(instrumentation);
        self.job_log_period = Some(job_log_period);
        self.drain_poll_interval_secs = Some(drain_poll_interval_secs);
    }

    /// Create a `BatchProcessor` which runs its batch jobs on `ThreadPool`s
    pub fn build_with<B, C, J, L>(
        &self,
        batch_job: J,
        batch_collector: C,
        logs: L,
    ) -> Result<BatchProcessor<B, C, J>, Error>
    where
        B: Send + 'static,
        C: BatchCollector<B>,
        J: BatchJob<B>,
        L: LoggingAdapter,
    {
        self.pool_config.validate()?;
        let pool_factory = ThreadPoolFactory::new(self.pool_config.clone());
        self.build_with_pool_factory(batch_job, batch_collector, pool_factory, logs)
    }

    /// Create a `BatchProcessor` which gets its worker pools from `pool_factory`
    ///
    /// The `pool_config` of this `Builder` is ignored.
    pub fn build_with_pool_factory<B, C, J, F, L>(
        &self,
        batch_job: J,
        batch_collector: C,
        pool_factory: F,
        logs: L,
    ) -> Result<BatchProcessor<B, C, J>, Error>
    where
        B: Send + 'static,
        C: BatchCollector<B>,
        J: BatchJob<B>,
        F: PoolFactory,
        L: LoggingAdapter,
    {
        let job_log_period = self.job_log_period.unwrap_or_default();
        job_log_period.validate()?;

        let drain_poll_interval = self.drain_poll_interval_secs.unwrap_or_default();
        let instrumentation = self.instrumentation.clone().unwrap_or_default();

        let mut logger = Logger::new(Arc::new(logs));
        if let Some(ref processor_name) = self.processor_name {
            logger = logger.with_processor_name(processor_name.clone());
        }

        Ok(BatchProcessor::assemble(
            Arc::new(batch_job),
            Arc::new(batch_collector),
            Arc::new(pool_factory),
            job_log_period,
            drain_poll_interval.into_duration(),
            logger,
            instrumentation,
        ))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::batchproc_types::config::{PoolSize, QueueCapacity};
    use crate::collector::SizeBasedCollector;
    use crate::logging::collecting::{CollectingLogger, Level};
    use crate::pool::testing::DeferredPool;
    use crate::pool::{PoolError, WorkerPool};

    fn noop(_batch: Vec<u32>) -> Result<(), String> {
        Ok(())
    }

    fn deferred() -> Result<Arc<dyn WorkerPool>, PoolError> {
        let pool: Arc<dyn WorkerPool> = Arc::new(DeferredPool::default());
        Ok(pool)
    }

    #[test]
    fn fill_from_env_reads_all_values() {
        std::env::set_var("BUILDER_TEST_A_PROCESSOR_NAME", "loader");
        std::env::set_var("BUILDER_TEST_A_JOB_LOG_PERIOD", "50");
        std::env::set_var("BUILDER_TEST_A_DRAIN_POLL_INTERVAL_SECS", "2");
        std::env::set_var("BUILDER_TEST_A_POOL_SIZE", "4");

        let builder = Builder::from_env_prefixed("BUILDER_TEST_A").unwrap();

        assert_eq!(builder.processor_name, Some(ProcessorName::new("loader")));
        assert_eq!(builder.job_log_period, Some(JobLogPeriod::new(50u64)));
        assert_eq!(
            builder.drain_poll_interval_secs,
            Some(DrainPollIntervalSecs::new(2u64))
        );
        assert_eq!(builder.pool_config.pool_size, Some(PoolSize::new(4usize)));
        assert_eq!(builder.pool_config.queue_capacity, None);
    }

    #[test]
    fn values_set_are_not_overwritten_from_env() {
        std::env::set_var("BUILDER_TEST_B_JOB_LOG_PERIOD", "50");

        let mut builder = Builder::default().job_log_period(7u64);
        builder.fill_from_env_prefixed("BUILDER_TEST_B").unwrap();

        assert_eq!(builder.job_log_period, Some(JobLogPeriod::new(7u64)));
    }

    #[test]
    fn unparsable_env_values_fail() {
        std::env::set_var("BUILDER_TEST_C_JOB_LOG_PERIOD", "often");

        assert!(Builder::from_env_prefixed("BUILDER_TEST_C").is_err());
    }

    #[test]
    fn apply_defaults() {
        let mut builder = Builder::default().configure_pool(|config| config.pool_size(2usize));
        builder.apply_defaults();

        assert_eq!(builder.processor_name, None);
        assert!(builder.instrumentation.is_some());
        assert_eq!(builder.job_log_period, Some(JobLogPeriod::new(1000u64)));
        assert_eq!(
            builder.drain_poll_interval_secs,
            Some(DrainPollIntervalSecs::new(300u64))
        );
        assert_eq!(
            builder.pool_config.queue_capacity,
            Some(QueueCapacity::new(2usize))
        );
    }

    #[test]
    fn deserializes_from_json() {
        let builder: Builder = serde_json::from_str(
            r#"{"processor_name":"loader","job_log_period":10,"pool_config":{"pool_size":3}}"#,
        )
        .unwrap();

        assert_eq!(builder.processor_name, Some(ProcessorName::new("loader")));
        assert_eq!(builder.job_log_period, Some(JobLogPeriod::new(10u64)));
        assert_eq!(builder.drain_poll_interval_secs, None);
        assert_eq!(builder.pool_config.pool_size, Some(PoolSize::new(3usize)));
    }

    #[test]
    fn invalid_values_fail_the_build() {
        let collector = SizeBasedCollector::<Vec<u32>>::new(1).unwrap();

        let zero_period = Builder::default().job_log_period(0u64);
        assert!(zero_period
            .build_with(noop, collector.clone(), CollectingLogger::default())
            .is_err());

        let zero_pool = Builder::default().configure_pool(|config| config.pool_size(0usize));
        assert!(zero_pool
            .build_with(noop, collector, CollectingLogger::default())
            .is_err());
    }

    #[test]
    fn builds_a_configured_processor() {
        let logs = CollectingLogger::default();
        let processor = Builder::default()
            .processor_name("loader")
            .job_log_period(1u64)
            .drain_poll_interval_secs(1u64)
            .build_with_pool_factory(
                noop,
                SizeBasedCollector::<Vec<u32>>::new(2).unwrap(),
                deferred,
                logs.clone(),
            )
            .unwrap();

        assert_eq!(processor.job_log_period(), JobLogPeriod::new(1u64));
        assert_eq!(processor.drain_poll_interval(), Duration::from_secs(1));

        processor.flush(vec![1]).unwrap();
        processor.drain("waiting").unwrap();

        assert_eq!(
            logs.lines(Level::Info),
            vec![
                "[PROC:loader;CYC:1] 1 batch jobs submitted".to_owned(),
                "[PROC:loader;CYC:1] waiting".to_owned(),
                "[PROC:loader;CYC:1] 1/1 batch jobs completed".to_owned(),
            ]
        );
    }
}
