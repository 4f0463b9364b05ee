//! Local wall clock used by the time synchronization engine.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the local time in Unix seconds.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> f64;
}

/// The operating system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    pub fn set(&self, t: f64) {
        *self.now.lock().expect("ManualClock lock poisoned") = t;
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().expect("ManualClock lock poisoned") += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().expect("ManualClock lock poisoned")
    }
}
