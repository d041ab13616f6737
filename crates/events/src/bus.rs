//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus carries mutation-feed messages from the CRUD layer to the change
//! watcher, and `TaskEnqueued` announcements from the watcher to whoever wants
//! to react early (the scheduler's trigger hook, tests).
//!
//! - **Transport-agnostic**: in-memory channels here, a hosted trigger feed in production
//! - **At-least-once delivery**: consumers must tolerate duplicates
//! - **No persistence**: the task store is the source of truth, not the bus

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics). Subscriptions are meant to be drained by a
/// single thread.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(mutation) => watcher.handle(&mutation)?,
///         Err(RecvTimeoutError::Timeout) => continue, // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic pub/sub bus.
///
/// `publish()` may fail (closed transport, poisoned lock); callers decide
/// whether that is fatal. Implementations must be shareable across threads.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
