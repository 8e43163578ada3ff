//! Value types and algorithms
//!
//! - `objects`: git objects (blob, tree, commit) and their ids
//! - `branch`: ref names and revision expressions
//! - `merge`: ancestry, tree and content merges, merge commits
//! - `batch`: the batch data model and dependency ordering

pub mod batch;
pub mod branch;
pub mod merge;
pub mod objects;
