//! C3 — per-stream subscription actor and its registry.

pub mod actor;
pub mod registry;

pub use registry::SubscriptionRegistry;
