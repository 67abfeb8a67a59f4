use chrono::{Local, NaiveDateTime};
use std::sync::{Arc, Mutex};

/// Wall clock used for day rollover and packet timestamps.
///
/// Returns `None` while the clock is not valid yet (e.g. before time sync).
pub trait TimeSource: Send {
    fn now(&self) -> Option<NaiveDateTime>;
}

/// The host's local clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Option<NaiveDateTime> {
        Some(Local::now().naive_local())
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Option<NaiveDateTime>>>,
}

impl ManualClock {
    pub fn new(now: Option<NaiveDateTime>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: Option<NaiveDateTime>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Option<NaiveDateTime> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
