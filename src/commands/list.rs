use crate::artifacts::batch::BatchSummary;
use crate::artifacts::batch::filters::{BatchFilter, Hydration};
use crate::commands::BatchService;
use crate::errors::BatchResult;

impl BatchService {
    /// Stored batches accepted by `filter`, with their last-modified time on request
    pub fn list(
        &self,
        hydration: Hydration,
        filter: &BatchFilter<'_>,
        include_last_modified: bool,
    ) -> BatchResult<Vec<BatchSummary>> {
        let mut summaries = self.store.find(hydration, filter)?;

        if !include_last_modified {
            for summary in &mut summaries {
                summary.last_modified = None;
            }
        }

        Ok(summaries)
    }
}
