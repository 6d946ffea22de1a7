//! Count of accepted, unfinished work that callers can wait on.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counts in-flight work and wakes waiters when it drains to zero.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlight {
    pub(crate) fn count(&self) -> usize {
        *self.count.lock()
    }

    pub(crate) fn enter(&self) {
        *self.count.lock() += 1;
    }

    /// Enters unless `capacity` units are already in flight.
    pub(crate) fn try_enter(&self, capacity: usize) -> bool {
        let mut count = self.count.lock();
        if *count >= capacity {
            return false;
        }
        *count += 1;
        true
    }

    pub(crate) fn exit(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Waits up to `timeout` for the count to reach zero. Returns true if it did.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut count = self.count.lock();
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut count, deadline).timed_out() {
                        return *count == 0;
                    }
                }
                None => self.drained.wait(&mut count),
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_enter_respects_capacity() {
        let in_flight = InFlight::default();
        assert!(in_flight.try_enter(2));
        assert!(in_flight.try_enter(2));
        assert!(!in_flight.try_enter(2));
        in_flight.exit();
        assert!(in_flight.try_enter(2));
        assert_eq!(in_flight.count(), 2);
    }

    #[test]
    fn test_wait_drained_wakes_on_last_exit() {
        let in_flight = Arc::new(InFlight::default());
        assert!(in_flight.wait_drained(Duration::ZERO));

        in_flight.enter();
        in_flight.enter();
        assert!(!in_flight.wait_drained(Duration::from_millis(10)));

        let exits = {
            let in_flight = in_flight.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                in_flight.exit();
                in_flight.exit();
            })
        };
        assert!(in_flight.wait_drained(Duration::from_secs(5)));
        assert_eq!(in_flight.count(), 0);
        exits.join().unwrap();
    }
}
