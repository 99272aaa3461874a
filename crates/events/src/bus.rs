//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes lifecycle notifications (job started, stopped,
//! message appended, ...) to any number of consumers: log forwarders,
//! dashboards, metrics bridges. It is intentionally lightweight:
//!
//! - **Transport-agnostic**: in-memory channels here, a broker elsewhere.
//! - **Fire-and-forget**: the engine never blocks on consumers and requires
//!   no backpressure handling.
//! - **At-least-once acceptable**: consumers must tolerate duplicates; job
//!   state lives in the repository, the bus only carries notifications.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to a notification stream.
///
/// Each subscription receives a copy of every message published after it was
/// created (broadcast semantics). Designed for single-threaded consumption;
/// poll with [`Subscription::recv_timeout`] so shutdown checks can interleave.
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

/// Publish/subscribe bus for lifecycle notifications.
///
/// Implementations must be safe to share across threads; multiple publishers
/// may call [`EventBus::publish`] concurrently. Publish failures are surfaced
/// to the caller, which for lifecycle notifications typically means "log and
/// move on": messages are advisory, the repository is the source of truth.
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
