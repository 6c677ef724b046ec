//! Wall-clock access and the events derived from it.

use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    /// Wall-clock time used for the `:00` check.
    fn local_now(&self) -> NaiveDateTime {
        self.now().with_timezone(&Local).naive_local()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays. Its local time is UTC.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_utc()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Ordinary minute tick.
    Tick,
    /// First tick at `:00` of a new hour.
    HourBoundary,
    /// The dashboard went from hidden to visible.
    BecameVisible,
}

/// Fires once per wall-clock hour, on the `:00` minute.
#[derive(Debug, Default)]
pub struct HourlyTrigger {
    last_hour: Option<NaiveDateTime>,
}

impl HourlyTrigger {
    pub fn check(&mut self, now: NaiveDateTime) -> bool {
        if now.minute() != 0 {
            return false;
        }
        let hour = now.with_second(0).and_then(|t| t.with_nanosecond(0));
        if hour.is_none() || hour == self.last_hour {
            return false;
        }
        self.last_hour = hour;
        true
    }
}

/// Turns minute ticks and visibility changes into [`ClockEvent`]s.
pub struct ClockSource {
    clock: Arc<dyn Clock>,
    hourly: HourlyTrigger,
    visible: bool,
}

impl ClockSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            hourly: HourlyTrigger::default(),
            visible: true,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Called on every minute tick.
    pub fn on_tick(&mut self) -> ClockEvent {
        if self.hourly.check(self.clock.local_now()) {
            ClockEvent::HourBoundary
        } else {
            ClockEvent::Tick
        }
    }

    /// Only a hidden-to-visible transition produces an event.
    pub fn on_visibility(&mut self, visible: bool) -> Option<ClockEvent> {
        let became_visible = visible && !self.visible;
        self.visible = visible;
        became_visible.then_some(ClockEvent::BecameVisible)
    }
}
