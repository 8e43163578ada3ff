//! Collaborators owned by the host
//!
//! Batches consult the change tracker, the permission backend and a clock, and report ref
//! updates to listeners. Each concern is a `Send + Sync` trait shared as `Arc<dyn Trait>`,
//! with an in-memory implementation for embedders and tests.

pub mod changes;
pub mod clock;
pub mod events;
pub mod identity;
pub mod permissions;
