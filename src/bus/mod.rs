pub mod queue;

pub use queue::{EventBus, EventSender};
