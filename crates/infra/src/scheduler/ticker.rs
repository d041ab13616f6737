//! Injectable clocks for the scheduler loop.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Decides when periodic firings are due.
///
/// `wait` blocks for at most `timeout` and reports whether a firing became
/// due. The scheduler calls it in a loop, checking for shutdown and manual
/// triggers in between.
pub trait Ticker: Send + 'static {
    fn wait(&mut self, timeout: Duration) -> bool;
}

/// Wall-clock ticker with a stable cadence: a late firing does not shift the
/// following ones, and missed periods collapse into one firing.
#[derive(Debug, Clone)]
pub struct IntervalTicker {
    interval: Duration,
    next_tick: Instant,
}

impl IntervalTicker {
    /// First firing one `interval` from now.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: Instant::now() + interval,
        }
    }

    /// First firing immediately.
    pub fn starting_now(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Ticker for IntervalTicker {
    fn wait(&mut self, timeout: Duration) -> bool {
        let now = Instant::now();
        if now < self.next_tick {
            thread::sleep(self.next_tick.saturating_duration_since(now).min(timeout));
        }

        let now = Instant::now();
        if now < self.next_tick {
            return false;
        }
        while self.next_tick <= now {
            self.next_tick += self.interval;
        }
        true
    }
}

/// Virtual-time ticker: fires only when its [`TickSender`] says so.
#[derive(Debug)]
pub struct ManualTicker {
    ticks: mpsc::Receiver<()>,
}

/// Advances a [`ManualTicker`].
#[derive(Debug, Clone)]
pub struct TickSender {
    ticks: mpsc::Sender<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, TickSender) {
        let (tx, rx) = mpsc::channel();
        (Self { ticks: rx }, TickSender { ticks: tx })
    }
}

impl TickSender {
    /// Make one periodic firing due.
    pub fn tick(&self) {
        let _ = self.ticks.send(());
    }
}

impl Ticker for ManualTicker {
    fn wait(&mut self, timeout: Duration) -> bool {
        match self.ticks.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                false
            }
        }
    }
}
