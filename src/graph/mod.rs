//! Orchestration graph: node routing, progress events and the turn driver.

pub mod events;
pub mod orchestrator;
pub mod routing;

pub use events::{CallbackSink, ChannelSink, CollectingSink, EventKind, EventSink, NoopSink, ProgressEvent};
pub use orchestrator::Orchestrator;
pub use routing::{next_node, Node};
