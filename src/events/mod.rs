//! Decoupled communication between the strategy, risk and order components.
//!
//! Components publish events by type tag on a shared [`EventBus`] and never
//! hold references to each other. The bus is in-memory and single-process.
pub mod bus;
pub mod types;

pub use bus::{handler, EventBus, Handler, Payload, Predicate, SubscriptionId};
pub use types::EventType;
