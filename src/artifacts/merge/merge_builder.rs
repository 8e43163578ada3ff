//! Merge commit construction
//!
//! Given the current tip (`base1`) and an incoming commit (`base2`), the builder decides
//! between doing nothing, fast-forwarding and writing a merge commit:
//!
//! 1. `base2` already reachable from `base1`: the tip is kept
//! 2. `base1` reachable from `base2`: fast-forward to `base2`, unless [`FastForwardMode::NoFf`]
//! 3. [`FastForwardMode::FfOnly`]: abort
//! 4. otherwise the trees are merged in core and a commit with parents `[base1, base2]` written

use crate::areas::repository::Repository;
use crate::artifacts::merge::strategy::{FastForwardMode, MergeStrategy};
use crate::artifacts::merge::tree_merge::{TreeMerge, TreeMergeOutcome};
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{BatchError, BatchResult};
use tracing::{debug, info};

pub struct MergeBuilder<'r> {
    repository: &'r Repository,
    strategy: MergeStrategy,
    ff_mode: FastForwardMode,
    author: Author,
    committer: Author,
    message: Option<String>,
}

impl<'r> MergeBuilder<'r> {
    pub fn new(
        repository: &'r Repository,
        strategy: MergeStrategy,
        ff_mode: FastForwardMode,
        author: Author,
        committer: Author,
    ) -> Self {
        MergeBuilder {
            repository,
            strategy,
            ff_mode,
            author,
            committer,
            message: None,
        }
    }

    /// Commit message for merge commits, instead of `Merge "<subject of base2>"`
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// Merge `base2` into `base1`, returning the resulting tip
    pub fn merge(&self, base1: &ObjectId, base2: &ObjectId) -> BatchResult<ObjectId> {
        if self.repository.is_ancestor(base2, base1)? {
            debug!(tip = %base1, incoming = %base2, "already merged");
            return Ok(base1.clone());
        }

        if self.ff_mode != FastForwardMode::NoFf && self.repository.is_ancestor(base1, base2)? {
            debug!(tip = %base1, incoming = %base2, "fast-forward");
            return Ok(base2.clone());
        }

        if self.ff_mode == FastForwardMode::FfOnly {
            return Err(BatchError::MergeAborted);
        }

        let ours = self.repository.load_commit(base1)?;
        let theirs = self.repository.load_commit(base2)?;
        let base_tree = match self.repository.merge_base(base1, base2)? {
            Some(base) => Some(self.repository.load_commit(&base)?.tree_oid().clone()),
            None => None,
        };

        let outcome = TreeMerge::new(self.repository.database(), self.strategy).merge(
            base_tree.as_ref(),
            ours.tree_oid(),
            theirs.tree_oid(),
        )?;

        let tree = match outcome {
            TreeMergeOutcome::Clean(tree) => tree,
            TreeMergeOutcome::Conflicted(paths) => {
                return Err(BatchError::MergeConflict { paths });
            }
        };

        let message = match &self.message {
            Some(message) => message.clone(),
            None => format!("Merge \"{}\"", theirs.short_message()),
        };
        let commit = Commit::new(
            vec![base1.clone(), base2.clone()],
            tree,
            self.author.clone(),
            self.committer.clone(),
            message,
        );
        let merge_oid = self.repository.write_commit(&commit)?;

        info!(
            project = %self.repository.name(),
            strategy = %self.strategy,
            merge = %merge_oid,
            "created merge commit"
        );
        Ok(merge_oid)
    }
}
