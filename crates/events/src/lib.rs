//! Pipeline events and pub/sub mechanics.
//!
//! - `EntryMutation`: the mutation feed delivered by the CRUD layer
//! - `TaskEnqueued`: announced by the change watcher for every new task
//! - `EventBus`: transport-agnostic fan-out used to move both around

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod mutation;
pub mod task;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use mutation::{EntryMutation, MutationKind};
pub use task::TaskEnqueued;
