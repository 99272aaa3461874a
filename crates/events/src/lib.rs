//! `jobward-events` — pub/sub mechanics for lifecycle notifications.
//!
//! Domain-agnostic transport: the job domain defines *what* gets published
//! (see `jobward-jobs`), this crate defines *how* messages move between the
//! engine and its consumers.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
