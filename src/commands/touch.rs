use crate::artifacts::batch::Batch;
use crate::commands::BatchService;
use crate::errors::BatchResult;
use crate::services::identity::Account;

impl BatchService {
    /// Refresh the last-modified time of a batch the caller owns, postponing its expiry
    pub fn touch(&self, id: &str, caller: &Account) -> BatchResult<Batch> {
        let batch = self.store.read(id)?;
        Self::ensure_owner(&batch, caller)?;

        self.store.touch(id)
    }
}
