//! Error taxonomy for batch operations
//!
//! Storage areas (object database, refs) report failures through `anyhow` with context
//! messages. Everything callers act on is lifted into [`BatchError`] so they can match on
//! the failure kind instead of parsing messages.

use crate::areas::refs::RefUpdateResult;
use crate::artifacts::batch::patch_set::PatchSetId;
use thiserror::Error;

/// Errors surfaced by batch construction, storage and lifecycle operations
#[derive(Error, Debug)]
pub enum BatchError {
    /// No record exists for the batch id, or the record cannot be decoded
    #[error("no such batch: {id}")]
    NoSuchBatch { id: String },

    /// The requested transition is not valid from the batch's current state
    #[error("invalid batch operation: {0}")]
    InvalidBatchOperation(String),

    /// The in-memory batch was already persisted, or the record moved underneath us
    #[error("concurrent modification of batch {id}")]
    ConcurrentModification { id: String },

    /// A destination branch does not exist
    #[error("no such ref: {name}")]
    NoSuchRef { name: String },

    /// A ref or revision string does not resolve to a commit
    #[error("invalid revision: {revision}")]
    InvalidRevision { revision: String },

    /// The three-way merge left conflicting paths
    #[error("merge conflict in {}", .paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    /// A fast-forward-only merge was requested for diverged commits
    #[error("merge aborted, not a fast-forward")]
    MergeAborted,

    /// None of an item's parents is reachable from its destination branch
    #[error("no parent of {item} is on its destination branch ({branch})")]
    UnresolvableDependency { item: String, branch: String },

    /// The low-level ref update reported a non-accepted result
    #[error("failed to update {name}: {result}")]
    RefUpdateRejected { name: String, result: RefUpdateResult },

    /// The acting identity lacks a required right
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The change tracker does not know the change
    #[error("no such change: {0}")]
    NoSuchChange(u32),

    /// A patch set was given that is not the latest of its change
    #[error("patch set {0} is not the latest patch set")]
    NotLatestPatchSet(PatchSetId),

    /// A textual patch set id was malformed
    #[error("invalid patch set: {0}")]
    InvalidPatchSet(String),

    /// Submitting stopped at a destination; earlier destinations were updated
    #[error("submit failed at {destination}: {source}")]
    SubmitFailed {
        destination: String,
        #[source]
        source: Box<BatchError>,
    },

    /// One or more download refs could not be deleted
    #[error("failed to delete download refs: {}", .failures.join("; "))]
    DownloadRefCleanup { failures: Vec<String> },

    /// Configuration could not be loaded or parsed
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Record (de)serialization failure
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Low-level object or ref storage failure
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;

impl BatchError {
    /// The ref update result code carried by this error, looking through submit wrappers
    pub fn ref_update_result(&self) -> Option<RefUpdateResult> {
        match self {
            BatchError::RefUpdateRejected { result, .. } => Some(*result),
            BatchError::SubmitFailed { source, .. } => source.ref_update_result(),
            _ => None,
        }
    }
}
