//! Background scheduler thread.

use std::io;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::info;

use super::{FireReason, ManualTriggerResponse, SchedulerStatsSnapshot, Ticker, TrainingScheduler};
use crate::processor::RunOnce;

/// Upper bound on how long the loop waits before re-checking shutdown and
/// triggers.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handle for a running scheduler (shutdown, trigger hook, manual runs).
#[derive(Debug)]
pub struct SchedulerHandle<P> {
    scheduler: TrainingScheduler<P>,
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl<P: RunOnce + 'static> SchedulerHandle<P> {
    /// Ask the scheduler thread for an extra firing as soon as possible.
    ///
    /// Triggers are coalesced: while one is pending, further calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Fire on the calling thread and report the outcome.
    pub fn run_now(&self) -> ManualTriggerResponse {
        self.scheduler.run_now()
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.scheduler.stats()
    }

    /// Stop the thread after its current firing and wait for it.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl<P: RunOnce + 'static> TrainingScheduler<P> {
    /// Run the scheduler loop on a dedicated thread driven by `ticker`.
    ///
    /// Dropping the returned handle without calling `shutdown` also stops the
    /// loop, at its next poll.
    pub fn spawn<T: Ticker>(&self, name: &str, ticker: T) -> io::Result<SchedulerHandle<P>> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);

        let scheduler = self.clone();
        let thread_name = name.to_string();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || scheduler.run_loop(&thread_name, ticker, shutdown_rx, trigger_rx))?;

        Ok(SchedulerHandle {
            scheduler: self.clone(),
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        })
    }

    fn run_loop<T: Ticker>(
        &self,
        name: &str,
        mut ticker: T,
        shutdown_rx: mpsc::Receiver<()>,
        trigger_rx: mpsc::Receiver<()>,
    ) {
        info!(scheduler = name, "training scheduler started");

        loop {
            match shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let mut reason = ticker.wait(POLL_INTERVAL).then_some(FireReason::Tick);

            // Drain to coalesce multiple triggers into one firing.
            while trigger_rx.try_recv().is_ok() {
                reason.get_or_insert(FireReason::Trigger);
            }

            if let Some(reason) = reason {
                self.fire(reason);
            }
        }

        info!(scheduler = name, "training scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::processor::RunOutcome;
    use crate::scheduler::ManualTicker;

    #[derive(Default)]
    struct CountingProcessor {
        runs: AtomicUsize,
    }

    impl RunOnce for CountingProcessor {
        fn run_once(&self) -> RunOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            RunOutcome::Idle
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let started = Instant::now();
        while !done() {
            assert!(started.elapsed() < Duration::from_secs(5), "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn each_virtual_tick_fires_once() {
        let processor = Arc::new(CountingProcessor::default());
        let (ticker, ticks) = ManualTicker::new();
        let handle = TrainingScheduler::new(processor.clone())
            .spawn("scheduler-test", ticker)
            .unwrap();

        ticks.tick();
        wait_for(|| processor.runs.load(Ordering::SeqCst) == 1);
        ticks.tick();
        ticks.tick();
        wait_for(|| processor.runs.load(Ordering::SeqCst) == 3);

        handle.shutdown();
        assert_eq!(processor.runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn trigger_requests_an_extra_firing() {
        let processor = Arc::new(CountingProcessor::default());
        let (ticker, _ticks) = ManualTicker::new();
        let handle = TrainingScheduler::new(processor.clone())
            .spawn("scheduler-trigger-test", ticker)
            .unwrap();

        handle.trigger();
        wait_for(|| handle.stats().firings >= 1);

        handle.shutdown();
        assert!(processor.runs.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn run_now_is_synchronous() {
        let processor = Arc::new(CountingProcessor::default());
        let (ticker, _ticks) = ManualTicker::new();
        let handle = TrainingScheduler::new(processor.clone())
            .spawn("scheduler-manual-test", ticker)
            .unwrap();

        let response = handle.run_now();

        assert!(response.success);
        assert_eq!(processor.runs.load(Ordering::SeqCst), 1);
        handle.shutdown();
    }

    #[test]
    fn shutdown_returns_promptly() {
        let (ticker, _ticks) = ManualTicker::new();
        let handle = TrainingScheduler::new(CountingProcessor::default())
            .spawn("scheduler-shutdown-test", ticker)
            .unwrap();

        let started = Instant::now();
        handle.shutdown();
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
