//! Persistence seam and the in-memory implementation.

mod memory;
mod traits;

pub use memory::{MemoryStore, Snapshot};
pub use traits::{LeadFilter, Store};
