//! Lifecycle notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use jobward_core::JobId;
use jobward_events::EventBus;

use crate::message::Level;

/// Lifecycle state reported in a [`JobEvent::StateChanged`] notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Started,
    StillAlive,
    Restarted,
    Skipped,
    Dead,
    Stopped,
}

/// Notification emitted by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    StateChanged {
        job_id: JobId,
        job_type: String,
        state: JobState,
        at: DateTime<Utc>,
    },
    Message {
        job_id: JobId,
        level: Level,
        text: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn state_changed(
        job_id: JobId,
        job_type: impl Into<String>,
        state: JobState,
        at: DateTime<Utc>,
    ) -> Self {
        Self::StateChanged {
            job_id,
            job_type: job_type.into(),
            state,
            at,
        }
    }

    pub fn message(job_id: JobId, level: Level, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::Message {
            job_id,
            level,
            text: text.into(),
            at,
        }
    }
}

/// Sink for lifecycle notifications.
///
/// Fire-and-forget: the engine never blocks on consumers and a failing sink
/// must not fail the operation that produced the notification.
pub trait JobEventPublisher: Send + Sync {
    fn publish(&self, event: JobEvent);
}

/// Publisher that drops every notification (tests, wiring without consumers).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJobEventPublisher;

impl JobEventPublisher for NullJobEventPublisher {
    fn publish(&self, _event: JobEvent) {}
}

/// Adapter publishing notifications onto an [`EventBus`].
///
/// Publish failures are logged and swallowed; notifications are advisory.
#[derive(Debug)]
pub struct BusJobEventPublisher<B> {
    bus: B,
}

impl<B> BusJobEventPublisher<B>
where
    B: EventBus<JobEvent>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> JobEventPublisher for BusJobEventPublisher<B>
where
    B: EventBus<JobEvent>,
{
    fn publish(&self, event: JobEvent) {
        if let Err(err) = self.bus.publish(event) {
            warn!(error = ?err, "failed to publish job event");
        }
    }
}
