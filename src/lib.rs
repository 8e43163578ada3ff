//! Batches of patch sets merged, reviewed and submitted as one unit
//!
//! A batch merges independent patch sets onto their destination branches without touching
//! the branches themselves. The resulting merge tips are recorded in a versioned store and can
//! later be published as download refs, submitted to the real branches, or discarded.
//!
//! - `areas`: repositories, refs, the batch store and ref updates
//! - `artifacts`: git objects, ref names, merging and the batch data model
//! - `commands`: batch operations on [`commands::BatchService`]
//! - `services`: collaborators provided by the host
//! - `config`, `errors`

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod config;
pub mod errors;
pub mod services;
