//! C4/C9 — fan-out delivery: inline and queued.

pub mod engine;
pub mod queue;

pub use engine::FanoutEngine;
pub use queue::{FanoutMessage, FanoutQueue, ProducerTriple, spawn_consumer};
