//! Merging
//!
//! - `bca_finder`: ancestry tests and best common ancestors
//! - `strategy`: merge strategies and fast-forward modes
//! - `tree_merge`, `content_merge`: in-core three-way merge of trees and file contents
//! - `merge_builder`: fast-forward decisions and merge commits
//! - `merge_branch`: merging a revision into a branch

pub mod bca_finder;
pub mod content_merge;
pub mod merge_branch;
pub mod merge_builder;
pub mod strategy;
pub mod tree_merge;
