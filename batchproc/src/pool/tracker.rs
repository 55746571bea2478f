use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use super::PoolError;

/// Counts running units (workers or tasks) and lets a thread wait
/// until none are left
#[derive(Default)]
pub(crate) struct Tracker {
    running: Mutex<usize>,
    none_running: Condvar,
}

impl Tracker {
    /// Registers a running unit which is unregistered once the
    /// returned guard is dropped.
    pub fn enter(tracker: &Arc<Tracker>) -> TrackerGuard {
        *tracker.running.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        TrackerGuard(Arc::clone(tracker))
    }

    pub fn running(&self) -> usize {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if nothing was running when `timeout` elapsed or earlier.
    pub fn wait_for_none(&self, timeout: Duration) -> Result<bool, PoolError> {
        let running = self
            .running
            .lock()
            .map_err(|_| PoolError::new("the termination lock of the pool is poisoned"))?;
        let (running, _) = self
            .none_running
            .wait_timeout_while(running, timeout, |running| *running > 0)
            .map_err(|_| PoolError::new("the termination lock of the pool is poisoned"))?;
        Ok(*running == 0)
    }

    fn leave(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        *running = running.saturating_sub(1);
        if *running == 0 {
            self.none_running.notify_all();
        }
    }
}

pub(crate) struct TrackerGuard(Arc<Tracker>);

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.0.leave()
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn waits_until_all_guards_are_dropped() {
        let tracker = Arc::new(Tracker::default());
        let guard = Tracker::enter(&tracker);
        assert_eq!(tracker.running(), 1);
        assert!(!tracker.wait_for_none(Duration::from_millis(1)).unwrap());

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(guard);
        });

        assert!(tracker.wait_for_none(Duration::from_secs(10)).unwrap());
        assert_eq!(tracker.running(), 0);
        handle.join().unwrap();
    }
}
