use crate::artifacts::batch::{Batch, BatchState};
use crate::artifacts::branch::ref_name::RefName;
use crate::commands::BatchService;
use crate::errors::{BatchError, BatchResult};
use crate::services::identity::Account;
use tracing::{debug, info, warn};

const DOWNLOAD_REF_PREFIX: &str = "refs/batch";

impl BatchService {
    /// Publish a download ref per destination and freeze the batch
    pub fn close(&self, batch: &mut Batch, owner: &Account) -> BatchResult<()> {
        if batch.state != BatchState::Open {
            return Err(BatchError::InvalidBatchOperation(format!(
                "cannot close batch {} in state {}",
                batch.id, batch.state
            )));
        }

        if batch.version != Some(0) {
            return Err(BatchError::ConcurrentModification {
                id: batch.id.clone(),
            });
        }

        let namespace = Self::download_namespace(batch, owner)?;
        let mut created = Vec::new();
        let published = self.publish_download_refs(batch, owner, &namespace, &mut created);

        match published.and_then(|()| {
            batch.state = BatchState::Closed;
            self.store.save(batch)
        }) {
            Ok(()) => {
                info!(batch = %batch.id, "closed batch");
                Ok(())
            }
            Err(err) => {
                self.unpublish_download_refs(batch, owner, &created);
                Err(err)
            }
        }
    }

    fn publish_download_refs(
        &self,
        batch: &mut Batch,
        owner: &Account,
        namespace: &RefName,
        created: &mut Vec<(String, RefName)>,
    ) -> BatchResult<()> {
        for destination in &mut batch.destinations {
            let download_ref = namespace.join(destination.ref_name.as_ref())?;
            let tip = destination.tip()?.clone();

            self.ref_updater
                .create(&destination.project, &download_ref, &tip, Some(owner))?;
            debug!(batch = %batch.id, project = %destination.project, r#ref = %download_ref, "created download ref");
            created.push((destination.project.clone(), download_ref.clone()));
            destination.download_ref = Some(download_ref);
        }

        Ok(())
    }

    /// Best effort: a ref that cannot be removed is logged and left behind
    fn unpublish_download_refs(
        &self,
        batch: &mut Batch,
        owner: &Account,
        created: &[(String, RefName)],
    ) {
        for (project, download_ref) in created {
            if let Err(err) = self.ref_updater.delete(project, download_ref, Some(owner)) {
                warn!(batch = %batch.id, %project, r#ref = %download_ref, error = %err, "failed to remove download ref");
            }
        }

        for destination in &mut batch.destinations {
            destination.download_ref = None;
        }
        batch.state = BatchState::Open;
    }

    /// `refs/batch/users/<username>/<id>`, or `refs/batch/accounts/<account>/<id>` for
    /// accounts without a username
    fn download_namespace(batch: &Batch, owner: &Account) -> BatchResult<RefName> {
        let namespace = match &owner.username {
            Some(username) => format!("{DOWNLOAD_REF_PREFIX}/users/{username}/{}", batch.id),
            None => format!("{DOWNLOAD_REF_PREFIX}/accounts/{}/{}", owner.id, batch.id),
        };
        Ok(RefName::try_parse(namespace)?)
    }
}
