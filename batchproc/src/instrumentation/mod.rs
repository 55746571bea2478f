//! Types for implementing custom instrumentation
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Receives notifications on what a `BatchProcessor` does
///
/// Completion and failure notifications are emitted on worker threads.
pub trait Instruments {
    // === SUBMISSION ===
    fn batch_submitted(&self);

    // === JOBS ===
    fn batch_completed(&self, time: Duration);
    fn batch_failed(&self, time: Duration);

    // === POOL ===
    fn pool_created(&self);
    fn pool_drained(&self, time: Duration);
}

#[derive(Clone)]
pub struct Instrumentation {
    instr: InstrumentationSelection,
}

impl Instrumentation {
    pub fn off() -> Self {
        Instrumentation {
            instr: InstrumentationSelection::Off,
        }
    }

    pub fn new<I>(instruments: I) -> Self
    where
        I: Instruments + Send + Sync + 'static,
    {
        Instrumentation {
            instr: InstrumentationSelection::Custom(Arc::new(instruments)),
        }
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Instrumentation::off()
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instrumentation")?;
        Ok(())
    }
}

impl Instruments for Instrumentation {
    fn batch_submitted(&self) {
        if let InstrumentationSelection::Custom(ref instr) = self.instr {
            instr.batch_submitted();
        }
    }

    fn batch_completed(&self, time: Duration) {
        if let InstrumentationSelection::Custom(ref instr) = self.instr {
            instr.batch_completed(time);
        }
    }

    fn batch_failed(&self, time: Duration) {
        if let InstrumentationSelection::Custom(ref instr) = self.instr {
            instr.batch_failed(time);
        }
    }

    fn pool_created(&self) {
        if let InstrumentationSelection::Custom(ref instr) = self.instr {
            instr.pool_created();
        }
    }

    fn pool_drained(&self, time: Duration) {
        if let InstrumentationSelection::Custom(ref instr) = self.instr {
            instr.pool_drained(time);
        }
    }
}

#[derive(Clone)]
enum InstrumentationSelection {
    Off,
    Custom(Arc<dyn Instruments + Send + Sync>),
}
