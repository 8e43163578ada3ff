//! Typed predicates for batch listings

use crate::artifacts::batch::{BatchState, BatchSummary};
use crate::services::identity::AccountId;
use chrono::{DateTime, Utc};

/// How much of each record a listing loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hydration {
    /// Id and last-modified time, read from the record commit alone
    #[default]
    Summary,
    /// Also the deserialized batch
    Detail,
}

pub type BatchFilter<'f> = dyn Fn(&BatchSummary) -> bool + 'f;

pub fn all() -> impl Fn(&BatchSummary) -> bool {
    |_| true
}

/// Batches last modified strictly before `cutoff`
pub fn expired_before(cutoff: DateTime<Utc>) -> impl Fn(&BatchSummary) -> bool {
    move |summary| summary.last_modified.is_some_and(|modified| modified < cutoff)
}

/// Needs [`Hydration::Detail`]
pub fn owned_by(owner: AccountId) -> impl Fn(&BatchSummary) -> bool {
    move |summary| {
        summary
            .batch
            .as_ref()
            .is_some_and(|batch| batch.owner == owner)
    }
}

/// Needs [`Hydration::Detail`]
pub fn in_state(state: BatchState) -> impl Fn(&BatchSummary) -> bool {
    move |summary| {
        summary
            .batch
            .as_ref()
            .is_some_and(|batch| batch.state == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::batch::Batch;
    use chrono::{Duration, TimeZone};

    fn summary(modified: Option<DateTime<Utc>>, batch: Option<Batch>) -> BatchSummary {
        BatchSummary {
            id: "b".into(),
            last_modified: modified,
            batch,
        }
    }

    #[test]
    fn expiry_is_strictly_before_the_cutoff() {
        let cutoff = Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap();
        let expired = expired_before(cutoff);

        assert!(expired(&summary(Some(cutoff - Duration::seconds(1)), None)));
        assert!(!expired(&summary(Some(cutoff), None)));
        assert!(!expired(&summary(None, None)));
    }

    #[test]
    fn detail_filters_skip_summaries_without_a_batch() {
        let batch = Batch::with_id("b", AccountId(3));

        assert!(owned_by(AccountId(3))(&summary(None, Some(batch.clone()))));
        assert!(!owned_by(AccountId(4))(&summary(None, Some(batch.clone()))));
        assert!(in_state(BatchState::Open)(&summary(None, Some(batch))));
        assert!(!in_state(BatchState::Open)(&summary(None, None)));
        assert!(all()(&summary(None, None)));
    }
}
