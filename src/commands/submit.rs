//! Submitting a batch
//!
//! Submission runs in stages so a failure leaves as little behind as possible:
//!
//! 1. permissions for every destination are checked before anything is written
//! 2. every destination branch is force-updated to its batch tip
//! 3. only then are the changes marked merged
//! 4. the batch is removed
//!
//! Re-running a failed submit is safe: refs already at their tip report `NO_CHANGE` and
//! changes already merged are skipped.

use crate::artifacts::batch::{Batch, BatchState, Destination};
use crate::commands::BatchService;
use crate::errors::{BatchError, BatchResult};
use crate::services::identity::Account;
use tracing::{error, info, warn};

impl BatchService {
    pub fn submit(&self, id: &str, caller: &Account) -> BatchResult<Batch> {
        let mut batch = self.store.read(id)?;
        if batch.state == BatchState::Open {
            return Err(BatchError::InvalidBatchOperation(format!(
                "cannot submit batch {} in state {}",
                batch.id, batch.state
            )));
        }

        for destination in &batch.destinations {
            if !self
                .permissions
                .can_force_update(caller, &destination.project, &destination.ref_name)
            {
                return Err(BatchError::PermissionDenied(format!(
                    "force update not permitted on {}",
                    destination.key()
                )));
            }
        }

        for destination in &batch.destinations {
            self.update_destination(destination, caller)
                .map_err(|source| {
                    error!(batch = %batch.id, destination = %destination.key(), error = %source, "submit failed");
                    BatchError::SubmitFailed {
                        destination: destination.key().to_string(),
                        source: Box::new(source),
                    }
                })?;
        }

        for destination in &batch.destinations {
            self.close_changes(destination, caller)?;
        }

        self.remove(&mut batch, Some(caller))?;
        info!(batch = %batch.id, caller = %caller.id, "submitted batch");

        Ok(batch)
    }

    fn update_destination(&self, destination: &Destination, caller: &Account) -> BatchResult<()> {
        let tip = destination.tip()?;
        let result = self.ref_updater.force_update(
            &destination.project,
            &destination.ref_name,
            tip,
            Some(caller),
        )?;
        info!(project = %destination.project, r#ref = %destination.ref_name, %tip, %result, "updated destination");
        Ok(())
    }

    fn close_changes(&self, destination: &Destination, caller: &Account) -> BatchResult<()> {
        let tip = destination.tip()?;

        for id in &destination.changes {
            let Some(change) = self.changes.change(id.change)? else {
                warn!(patch_set = %id, "change is missing, not marking it merged");
                continue;
            };
            if self.changes.patch_set(id)?.is_none() {
                warn!(patch_set = %id, "patch set is missing, not marking it merged");
                continue;
            }
            if change.status.is_closed() {
                continue;
            }

            self.changes
                .mark_merged(id, &destination.ref_name, tip, caller)?;
        }

        Ok(())
    }
}
