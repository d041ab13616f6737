//! Background thread draining the mutation feed into a [`ChangeWatcher`].

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use agritrain_events::{EntryMutation, EventBus, Subscription, TaskEnqueued};

use super::ChangeWatcher;
use crate::tasks::TaskStore;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to stop and join a running watcher thread.
#[derive(Debug)]
pub struct WatcherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    /// Request graceful shutdown and wait for the thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl<S, B> ChangeWatcher<S, B>
where
    S: TaskStore + 'static,
    B: EventBus<TaskEnqueued> + 'static,
{
    /// Subscribe to `feed` and handle every mutation on a dedicated thread.
    ///
    /// Mutations published before this call are not seen. Handler failures
    /// are logged and the loop keeps going.
    pub fn spawn<F>(self, name: &str, feed: &F) -> io::Result<WatcherHandle>
    where
        F: EventBus<EntryMutation> + ?Sized,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let subscription = feed.subscribe();
        let thread_name = name.to_string();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.drain(&thread_name, subscription, shutdown_rx))?;

        Ok(WatcherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    fn drain(
        &self,
        name: &str,
        subscription: Subscription<EntryMutation>,
        shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!(worker = name, "change watcher started");

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match subscription.recv_timeout(POLL_INTERVAL) {
                Ok(mutation) => {
                    if let Err(err) = self.handle(&mutation) {
                        warn!(
                            worker = name,
                            entry_id = %mutation.entry_id,
                            error = %err,
                            "change watcher failed to handle mutation"
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(worker = name, "change watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use agritrain_core::{EntryId, EntryKind, KnowledgeEntry};
    use agritrain_events::InMemoryEventBus;

    use super::*;
    use crate::tasks::InMemoryTaskStore;

    #[test]
    fn spawned_watcher_enqueues_from_the_feed() {
        let store = InMemoryTaskStore::arc();
        let feed: Arc<InMemoryEventBus<EntryMutation>> = Arc::new(InMemoryEventBus::new());
        let announcements: Arc<InMemoryEventBus<TaskEnqueued>> = Arc::new(InMemoryEventBus::new());
        let enqueued = announcements.subscribe();

        let handle = ChangeWatcher::new(store.clone(), announcements)
            .spawn("watcher-test", &feed)
            .unwrap();

        let entry = KnowledgeEntry::new(EntryId::new("sheath-blight").unwrap(), EntryKind::Disease, "sheath blight")
            .with_images(["sb/1.jpg"]);
        feed.publish(EntryMutation::created(entry)).unwrap();

        let announced = enqueued.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(announced.subject_id.as_str(), "sheath-blight");

        let started = Instant::now();
        handle.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(store.stats().unwrap().pending, 1);
    }
}
