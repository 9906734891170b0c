//! Event abstractions for the lifecycle log.
//!
//! Events are the system of record: every state change to a stock lot or
//! food item is an immutable, append-only fact. This crate holds the
//! domain-agnostic mechanics (trait, envelope, bus); the domain crates
//! define the concrete event types.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
