use crate::areas::repository::Repository;
use crate::artifacts::batch::patch_set::PatchSetId;
use crate::artifacts::batch::resolver::{self, PendingMerge};
use crate::artifacts::batch::{Batch, BranchKey};
use crate::artifacts::merge::merge_branch::MergeBranch;
use crate::artifacts::merge::strategy::{FastForwardMode, MergeStrategy};
use crate::commands::BatchService;
use crate::errors::{BatchError, BatchResult};
use crate::services::identity::Account;
use std::collections::HashMap;
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
pub struct MergeChangeOptions {
    /// Overrides the destination project's default strategy
    pub strategy: Option<MergeStrategy>,
    pub ff_mode: FastForwardMode,
    pub message: Option<String>,
    /// Close the batch right after building it
    pub close: bool,
}

impl BatchService {
    /// Build and persist a new batch merging `patch_sets` onto their destination branches
    ///
    /// Nothing is persisted unless every patch set merges.
    pub fn merge_change(
        &self,
        patch_sets: &[PatchSetId],
        owner: &Account,
        options: &MergeChangeOptions,
    ) -> BatchResult<Batch> {
        let mut repositories: HashMap<String, Repository> = HashMap::new();
        let mut pending = Vec::new();
        let mut tips = HashMap::new();

        for id in Self::distinct(patch_sets) {
            let change = self
                .changes
                .change(id.change)?
                .ok_or(BatchError::NoSuchChange(id.change))?;
            if change.current_patch_set != id.patch_set {
                return Err(BatchError::NotLatestPatchSet(id));
            }
            let patch_set = self
                .changes
                .patch_set(&id)?
                .ok_or_else(|| BatchError::InvalidPatchSet(id.to_string()))?;

            if !repositories.contains_key(&change.project) {
                let repository = self.repositories.open(&change.project)?;
                repositories.insert(change.project.clone(), repository);
            }
            let repository = &repositories[&change.project];

            let destination = BranchKey::new(change.project.clone(), change.branch.clone());
            if !tips.contains_key(&destination) {
                let tip = repository
                    .read_ref(&destination.ref_name)?
                    .ok_or_else(|| BatchError::NoSuchRef {
                        name: destination.to_string(),
                    })?;
                tips.insert(destination.clone(), tip);
            }

            let parents = repository.load_commit(&patch_set.revision)?.parents().to_vec();
            pending.push(PendingMerge::new(destination, patch_set.revision, parents, id));
        }

        let ordered = resolver::resolve(pending, &tips, |destination, commit, tip| {
            let repository = &repositories[&destination.project];
            Ok(repository.is_ancestor(commit, tip)?)
        })?;

        let now = self.clock.now();
        let mut batch = Batch::new(owner.id);

        for item in ordered {
            let repository = &repositories[&item.destination.project];

            let tip = MergeBranch {
                repository,
                destination: item.destination.ref_name.clone(),
                expected_tip: batch
                    .destination(&item.destination)
                    .and_then(|destination| destination.sha1.clone()),
                source: item.commit.to_string(),
                strategy: options
                    .strategy
                    .unwrap_or_else(|| self.config.strategy_for(&item.destination.project)),
                ff_mode: options.ff_mode,
                message: options.message.clone(),
                author: owner.ident_at(now),
                committer: self.server_ident.ident_at(now),
            }
            .call()
            .inspect_err(|err| {
                error!(batch = %batch.id, patch_set = %item.payload, error = %err, "could not merge patch set");
            })?;

            let destination = batch.destination_mut(&item.destination);
            destination.sha1 = Some(tip);
            destination.add(item.payload);
        }

        if options.close {
            self.close(&mut batch, owner)?;
        } else {
            self.store.save(&mut batch)?;
        }

        info!(
            batch = %batch.id,
            owner = %owner.id,
            destinations = batch.destinations.len(),
            "created batch"
        );
        Ok(batch)
    }

    /// Patch sets in first-mention order, repeats dropped
    fn distinct(patch_sets: &[PatchSetId]) -> Vec<PatchSetId> {
        let mut seen = Vec::with_capacity(patch_sets.len());
        for id in patch_sets {
            if !seen.contains(id) {
                seen.push(*id);
            }
        }
        seen
    }
}
