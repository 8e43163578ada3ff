use crate::areas::repository::Repository;
use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::merge::merge_builder::MergeBuilder;
use crate::artifacts::merge::strategy::{FastForwardMode, MergeStrategy};
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{BatchError, BatchResult};

/// Merge a revision into a branch without touching the branch ref
///
/// The destination ref must exist. Its tip is the merge base side unless `expected_tip` is given,
/// so a caller folding several sources can thread each result into the next merge.
pub struct MergeBranch<'r> {
    pub repository: &'r Repository,
    pub destination: RefName,
    pub expected_tip: Option<ObjectId>,
    pub source: String,
    pub strategy: MergeStrategy,
    pub ff_mode: FastForwardMode,
    pub message: Option<String>,
    pub author: Author,
    pub committer: Author,
}

impl MergeBranch<'_> {
    pub fn call(self) -> BatchResult<ObjectId> {
        let current = self
            .repository
            .read_ref(&self.destination)?
            .ok_or_else(|| BatchError::NoSuchRef {
                name: self.destination.to_string(),
            })?;
        let tip = self.expected_tip.unwrap_or(current);
        let source = self.repository.resolve_revision(&self.source)?;

        MergeBuilder::new(
            self.repository,
            self.strategy,
            self.ff_mode,
            self.author,
            self.committer,
        )
        .with_message(self.message)
        .merge(&tip, &source)
    }
}
