//! Typing indicator debounce.
//!
//! Every keystroke while connected announces typing (once per burst) and
//! pushes the stop deadline out by the idle window. When the deadline passes
//! without another keystroke a single stop is emitted. The debouncer is pure:
//! the runtime feeds it the current instant and schedules the next poll.

use std::{
    fmt::Debug,
    ops::{Add, Sub},
    time::Duration,
};

/// Typing transition to announce to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// First keystroke of a burst.
    Started,
    /// Idle window elapsed after the last keystroke.
    Stopped,
}

impl TypingSignal {
    /// Value of the `typing` field in the status frame.
    pub fn is_typing(self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Restart-on-activity typing stop timer.
#[derive(Debug, Clone)]
pub struct TypingDebouncer<I> {
    idle: Duration,
    stop_deadline: Option<I>,
}

impl<I> TypingDebouncer<I>
where
    I: Copy + Ord + Debug + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Debouncer with the given idle window.
    pub fn new(idle: Duration) -> Self {
        Self { idle, stop_deadline: None }
    }

    /// Record a keystroke.
    ///
    /// Returns `Started` on the first keystroke of a burst. Any pending stop
    /// is cancelled and rescheduled at `now + idle`.
    pub fn keystroke(&mut self, now: I) -> Option<TypingSignal> {
        let started = self.stop_deadline.is_none();
        self.stop_deadline = Some(now + self.idle);
        started.then_some(TypingSignal::Started)
    }

    /// Returns `Stopped` once the deadline has passed.
    pub fn poll(&mut self, now: I) -> Option<TypingSignal> {
        match self.stop_deadline {
            Some(deadline) if now >= deadline => {
                self.stop_deadline = None;
                Some(TypingSignal::Stopped)
            },
            _ => None,
        }
    }

    /// Pending stop deadline, if a burst is in progress.
    pub fn deadline(&self) -> Option<I> {
        self.stop_deadline
    }

    /// True while a burst is in progress.
    pub fn is_typing(&self) -> bool {
        self.stop_deadline.is_some()
    }

    /// Forget any burst without emitting a stop (channel went away).
    pub fn reset(&mut self) {
        self.stop_deadline = None;
    }
}
