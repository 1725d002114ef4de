//! Concurrency limits and batched event emission.

mod events;
mod pool;

pub use events::{
    BatchDispatcher, ChannelDispatcher, DispatchReport, DispatchedEvent, EventDispatcher,
    LeadBatch, PRESCREEN_EVENT, RESEARCH_EVENT,
};
pub use pool::BoundedPool;
