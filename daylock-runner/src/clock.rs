//! Wall-clock abstraction so tasks can run against simulated time.

use chrono::{Duration, NaiveDateTime};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration as StdDuration;

pub trait Clock: Send + Sync {
    /// Current exchange-local time.
    fn now(&self) -> NaiveDateTime;
}

/// Local system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Settable clock for tests and replays.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cooperative stop flag shared by all background tasks.
///
/// `sleep` returns early as soon as `stop` is called, so tasks never sit out a
/// full poll interval after shutdown is requested.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sleep up to `timeout`. Returns `true` if stopped.
    pub fn sleep(&self, timeout: StdDuration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (stopped, _) = cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn manual_clock_advances() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 15, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::minutes(25));
        assert_eq!(clock.now(), start + Duration::minutes(25));
    }

    #[test]
    fn stop_wakes_sleepers() {
        let signal = StopSignal::new();
        let sleeper = signal.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(StdDuration::from_secs(30)));
        thread::sleep(StdDuration::from_millis(20));
        signal.stop();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < StdDuration::from_secs(10));
        assert!(signal.sleep(StdDuration::from_secs(30)));
    }

    #[test]
    fn sleep_times_out_when_running() {
        assert!(!StopSignal::new().sleep(StdDuration::from_millis(5)));
    }
}
