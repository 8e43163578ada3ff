use crate::artifacts::batch::{Batch, BatchState};
use crate::commands::BatchService;
use crate::errors::{BatchError, BatchResult};
use crate::services::identity::Account;
use tracing::{info, warn};

impl BatchService {
    /// Read a batch and remove it
    pub fn delete(&self, id: &str, caller: &Account) -> BatchResult<Batch> {
        let mut batch = self.store.read(id)?;
        self.remove(&mut batch, Some(caller))?;
        Ok(batch)
    }

    /// Delete the download refs and the record of a closed batch
    pub fn remove(&self, batch: &mut Batch, actor: Option<&Account>) -> BatchResult<()> {
        if batch.state == BatchState::Open {
            return Err(BatchError::InvalidBatchOperation(format!(
                "cannot remove batch {} in state {}",
                batch.id, batch.state
            )));
        }
        self.discard(batch, actor)
    }

    /// Remove a batch in any state, for the cleaner and administrators
    pub fn expire(&self, batch: &mut Batch) -> BatchResult<()> {
        self.discard(batch, None)
    }

    fn discard(&self, batch: &mut Batch, actor: Option<&Account>) -> BatchResult<()> {
        let mut failures = Vec::new();

        for destination in &batch.destinations {
            let Some(download_ref) = &destination.download_ref else {
                continue;
            };
            if let Err(err) = self
                .ref_updater
                .delete(&destination.project, download_ref, actor)
            {
                warn!(batch = %batch.id, project = %destination.project, r#ref = %download_ref, error = %err, "could not delete download ref");
                failures.push(format!("{} {download_ref}: {err}", destination.project));
            }
        }

        if !failures.is_empty() {
            return Err(BatchError::DownloadRefCleanup { failures });
        }

        batch.state = BatchState::Deleted;
        self.store.save(batch)?;
        info!(batch = %batch.id, "removed batch");

        Ok(())
    }
}
