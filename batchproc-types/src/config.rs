//! Configuration values of a batch processor
//!
//! Every value can be read from the environment. The default
//! prefix of the environment variables is "BATCHPROC".
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

new_type! {
    #[doc="Every this many submitted (and completed) batch jobs a progress line is logged.\n\n\
    Must be greater than 0. Default is 1000.\n"]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub copy struct JobLogPeriod(u64, env="JOB_LOG_PERIOD");
}
impl JobLogPeriod {
    pub fn validate(self) -> Result<(), Error> {
        if self.0 == 0 {
            return Err(Error::new("job log period must be greater than 0"));
        }
        Ok(())
    }

    /// Returns `true` if `count` lies on a log boundary.
    ///
    /// A period of 0 never matches.
    pub fn is_boundary(self, count: u64) -> bool {
        self.0 != 0 && count % self.0 == 0
    }
}
impl Default for JobLogPeriod {
    fn default() -> Self {
        Self(1000)
    }
}

new_type! {
    #[doc="The interval at which a drain re-logs its progress message while \
    waiting for the worker pool to terminate.\n\nDefault is 300 seconds.\n"]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub secs struct DrainPollIntervalSecs(u64, env="DRAIN_POLL_INTERVAL_SECS");
}
impl Default for DrainPollIntervalSecs {
    fn default() -> Self {
        Self(300)
    }
}

new_type! {
    #[doc="The number of worker threads of a pool.\n\n\
    Must be greater than 0. Default is the available parallelism of the machine.\n"]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub copy struct PoolSize(usize, env="POOL_SIZE");
}
impl PoolSize {
    pub fn validate(self) -> Result<(), Error> {
        if self.0 == 0 {
            return Err(Error::new("pool size must be greater than 0"));
        }
        Ok(())
    }
}
impl Default for PoolSize {
    fn default() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self(n)
    }
}

new_type! {
    #[doc="The number of submitted tasks a pool queues before submissions block.\n\n\
    A capacity of 0 hands every task directly to an idle worker. \
    Defaults to the pool size.\n"]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub copy struct QueueCapacity(usize, env="QUEUE_CAPACITY");
}
impl From<PoolSize> for QueueCapacity {
    fn from(size: PoolSize) -> Self {
        Self(size.into_inner())
    }
}

new_type! {
    #[doc="Worker threads are named \"<prefix>-<index>\".\n\n\
    Default is \"batchproc-worker\".\n"]
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct WorkerNamePrefix(String, env="WORKER_NAME_PREFIX");
}
impl Default for WorkerNamePrefix {
    fn default() -> Self {
        Self("batchproc-worker".to_owned())
    }
}

new_type! {
    #[doc="A name identifying a processor in log lines.\n"]
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ProcessorName(String, env="PROCESSOR_NAME");
}
