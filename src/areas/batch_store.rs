//! Batch records
//!
//! Batches are stored in a dedicated project, one ref per batch under `refs/meta/batches/`.
//! Each persisted revision is a commit whose tree holds a single `batch.json` blob and whose
//! parent is the previous revision:
//!
//! ```text
//! refs/meta/batches/<id> -> commit "Update batch <id>"
//!                             tree: batch.json
//!                             parent: commit "Create batch <id>"
//! ```
//!
//! Every write is a compare-and-swap against the revision the batch was read from, so of two
//! writers racing on one batch only the first succeeds; the other gets
//! [`BatchError::ConcurrentModification`].

use crate::areas::refs::{ExpectedOld, RefUpdate, RefUpdateResult};
use crate::areas::repository::Repository;
use crate::areas::repository_manager::RepositoryManager;
use crate::artifacts::batch::filters::{BatchFilter, Hydration};
use crate::artifacts::batch::{Batch, BatchState, BatchSummary};
use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeEntry};
use crate::errors::{BatchError, BatchResult};
use crate::services::clock::Clock;
use crate::services::identity::ServerIdent;
use anyhow::Context;
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const BATCHES_REF_PREFIX: &str = "refs/meta/batches/";
const RECORD_FILE: &str = "batch.json";

#[derive(Clone)]
pub struct BatchStore {
    repositories: RepositoryManager,
    project: String,
    server_ident: ServerIdent,
    clock: Arc<dyn Clock>,
}

impl BatchStore {
    pub fn new(
        repositories: RepositoryManager,
        project: impl Into<String>,
        server_ident: ServerIdent,
        clock: Arc<dyn Clock>,
    ) -> Self {
        BatchStore {
            repositories,
            project: project.into(),
            server_ident,
            clock,
        }
    }

    /// Project holding the records
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Persist `batch`, or delete its record once it is DELETED
    ///
    /// Only a batch with version 0 can be saved; a successful save bumps the in-memory
    /// version, so saving the same value twice fails.
    pub fn save(&self, batch: &mut Batch) -> BatchResult<()> {
        let repository = self.repositories.open_or_create(&self.project)?;
        let record_ref = Self::record_ref(&batch.id)?;

        if batch.state == BatchState::Deleted {
            return self.delete_record(&repository, batch, record_ref);
        }

        if batch.version != Some(0) {
            return Err(BatchError::ConcurrentModification {
                id: batch.id.clone(),
            });
        }

        let now = self.clock.now().trunc_subsecs(0);
        batch.last_modified = Some(now);
        let json = batch.to_json()?;

        let blob_oid = repository.database().store(&Blob::new(json))?;
        let mut tree = Tree::default();
        tree.insert(
            RECORD_FILE,
            TreeEntry::new(blob_oid, EntryMode::File(FileMode::Regular)),
        );
        let tree_oid = repository.database().store(&tree)?;

        let ident = self.server_ident.ident_at(now);
        let message = match batch.record {
            Some(_) => format!("Update batch {}", batch.id),
            None => format!("Create batch {}", batch.id),
        };
        let commit = Commit::new(
            batch.record.iter().cloned().collect(),
            tree_oid,
            ident.clone(),
            ident.clone(),
            message.clone(),
        );
        let commit_oid = repository.write_commit(&commit)?;

        let expected_old = match &batch.record {
            Some(record) => ExpectedOld::Value(record.clone()),
            None => ExpectedOld::Absent,
        };
        let update = RefUpdate::new(record_ref.clone(), expected_old, Some(commit_oid.clone()), false)
            .with_reflog(ident, message);

        match repository.update_ref(&update).result {
            RefUpdateResult::New | RefUpdateResult::FastForward | RefUpdateResult::NoChange => {}
            RefUpdateResult::LockFailure => {
                warn!(batch = %batch.id, "record changed since it was read");
                return Err(BatchError::ConcurrentModification {
                    id: batch.id.clone(),
                });
            }
            result => {
                return Err(BatchError::RefUpdateRejected {
                    name: record_ref.to_string(),
                    result,
                });
            }
        }

        batch.version = batch.version.map(|version| version + 1);
        batch.record = Some(commit_oid);
        debug!(batch = %batch.id, state = %batch.state, "saved batch");

        Ok(())
    }

    fn delete_record(&self, repository: &Repository, batch: &Batch, record_ref: RefName) -> BatchResult<()> {
        let expected_old = match &batch.record {
            Some(record) => ExpectedOld::Value(record.clone()),
            None => ExpectedOld::Any,
        };
        let update = RefUpdate::new(record_ref.clone(), expected_old, None, true);

        match repository.update_ref(&update).result {
            RefUpdateResult::Forced | RefUpdateResult::NoChange => {
                info!(batch = %batch.id, "deleted batch record");
                Ok(())
            }
            RefUpdateResult::LockFailure => Err(BatchError::ConcurrentModification {
                id: batch.id.clone(),
            }),
            result => Err(BatchError::RefUpdateRejected {
                name: record_ref.to_string(),
                result,
            }),
        }
    }

    /// Load a batch; it can be saved once
    pub fn read(&self, id: &str) -> BatchResult<Batch> {
        let no_such_batch = || BatchError::NoSuchBatch { id: id.to_string() };

        let record_ref = Self::record_ref(id).map_err(|_| no_such_batch())?;
        let repository = self.repositories.open_or_create(&self.project)?;
        let record = repository
            .read_ref(&record_ref)?
            .ok_or_else(no_such_batch)?;

        Self::load_record(&repository, &record).map_err(|err| {
            warn!(batch = id, error = %err, "unreadable batch record");
            no_such_batch()
        })
    }

    /// Summaries of every stored batch accepted by `filter`, ordered by id
    ///
    /// With [`Hydration::Summary`] only the record commit is read and `last_modified` is its
    /// commit time; [`Hydration::Detail`] also decodes each batch. Unreadable records are
    /// skipped.
    pub fn find(&self, hydration: Hydration, filter: &BatchFilter<'_>) -> BatchResult<Vec<BatchSummary>> {
        let repository = self.repositories.open_or_create(&self.project)?;
        let mut summaries = Vec::new();

        for (name, record) in repository.refs().list_refs(BATCHES_REF_PREFIX)? {
            let Some(id) = name.as_ref().strip_prefix(BATCHES_REF_PREFIX) else {
                continue;
            };

            let summary = match hydration {
                Hydration::Summary => repository.load_commit(&record).map(|commit| BatchSummary {
                    id: id.to_string(),
                    last_modified: Some(commit.timestamp().with_timezone(&Utc)),
                    batch: None,
                }),
                Hydration::Detail => Self::load_record(&repository, &record).map(|batch| BatchSummary {
                    id: id.to_string(),
                    last_modified: batch.last_modified,
                    batch: Some(batch),
                }),
            };

            match summary {
                Ok(summary) if filter(&summary) => summaries.push(summary),
                Ok(_) => {}
                Err(err) => warn!(batch = id, error = %err, "skipping unreadable batch record"),
            }
        }

        Ok(summaries)
    }

    /// Rewrite a batch unchanged apart from a fresh last-modified time
    pub fn touch(&self, id: &str) -> BatchResult<Batch> {
        let mut batch = self.read(id)?;
        self.save(&mut batch)?;
        info!(batch = id, "touched batch");
        Ok(batch)
    }

    fn record_ref(id: &str) -> BatchResult<RefName> {
        if id.is_empty() || id.contains('/') {
            return Err(BatchError::NoSuchBatch { id: id.to_string() });
        }

        Ok(RefName::try_parse(format!("{BATCHES_REF_PREFIX}{id}"))?)
    }

    fn load_record(repository: &Repository, record: &ObjectId) -> anyhow::Result<Batch> {
        let commit = repository.load_commit(record)?;
        let tree = repository.database().parse_object_as_tree(commit.tree_oid())?;
        let entry = tree
            .get(RECORD_FILE)
            .with_context(|| format!("record {record} has no {RECORD_FILE}"))?;
        let blob = repository.database().parse_object_as_blob(&entry.oid)?;
        let json = blob
            .as_text()
            .with_context(|| format!("record {record} is not text"))?;

        let mut batch = Batch::from_json(json)
            .with_context(|| format!("record {record} is not a batch"))?;
        batch.record = Some(record.clone());
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::batch::filters;
    use crate::artifacts::batch::patch_set::PatchSetId;
    use crate::artifacts::batch::BranchKey;
    use crate::services::clock::FixedClock;
    use crate::services::identity::AccountId;
    use assert_fs::TempDir;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    struct Fixture {
        _dir: TempDir,
        clock: Arc<FixedClock>,
        store: BatchStore,
    }

    #[fixture]
    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 12, 44).unwrap() + Duration::milliseconds(250),
        ));
        let store = BatchStore::new(
            RepositoryManager::new(dir.path()),
            "All-Projects",
            ServerIdent::default(),
            clock.clone(),
        );

        Fixture {
            _dir: dir,
            clock,
            store,
        }
    }

    fn open_batch(id: &str) -> Batch {
        let mut batch = Batch::with_id(id, AccountId(1000001));
        let key = BranchKey::new("app", RefName::branch("main").unwrap());
        batch.destination_mut(&key).add(PatchSetId::new(7, 2).unwrap());
        batch
    }

    #[rstest]
    fn saved_batches_read_back_with_a_fresh_guard(fixture: Fixture) {
        let mut batch = open_batch("b1");
        fixture.store.save(&mut batch).unwrap();

        assert_eq!(batch.version, Some(1));
        assert_eq!(
            batch.last_modified,
            Some(Utc.with_ymd_and_hms(2026, 10, 18, 9, 12, 44).unwrap())
        );

        let read = fixture.store.read("b1").unwrap();
        assert_eq!(read.version, Some(0));
        assert_eq!(read.destinations, batch.destinations);
        assert_eq!(read.record(), batch.record());
    }

    #[rstest]
    fn saving_twice_is_a_concurrent_modification(fixture: Fixture) {
        let mut batch = open_batch("b1");
        fixture.store.save(&mut batch).unwrap();

        assert!(matches!(
            fixture.store.save(&mut batch),
            Err(BatchError::ConcurrentModification { .. })
        ));
    }

    #[rstest]
    fn stale_readers_lose_the_race(fixture: Fixture) {
        fixture.store.save(&mut open_batch("b1")).unwrap();
        let mut first = fixture.store.read("b1").unwrap();
        let mut second = fixture.store.read("b1").unwrap();

        first.state = BatchState::Closed;
        fixture.store.save(&mut first).unwrap();

        assert!(matches!(
            fixture.store.save(&mut second),
            Err(BatchError::ConcurrentModification { .. })
        ));
        assert_eq!(fixture.store.read("b1").unwrap().state, BatchState::Closed);
    }

    #[rstest]
    fn record_history_is_kept(fixture: Fixture) {
        fixture.store.save(&mut open_batch("b1")).unwrap();
        let created = fixture.store.read("b1").unwrap();
        let updated = fixture.store.touch("b1").unwrap();

        let repository = fixture.store.repositories.open("All-Projects").unwrap();
        let commit = repository.load_commit(updated.record().unwrap()).unwrap();
        assert_eq!(commit.parents(), &[created.record().unwrap().clone()]);
        assert_eq!(commit.short_message(), "Update batch b1");
    }

    #[rstest]
    #[case::unknown("missing")]
    #[case::not_a_ref_name("../b1")]
    #[case::empty("")]
    fn unknown_ids_are_no_such_batch(fixture: Fixture, #[case] id: &str) {
        assert!(matches!(
            fixture.store.read(id),
            Err(BatchError::NoSuchBatch { .. })
        ));
    }

    #[rstest]
    fn deleted_batches_lose_their_record(fixture: Fixture) {
        fixture.store.save(&mut open_batch("b1")).unwrap();
        let mut batch = fixture.store.read("b1").unwrap();
        batch.state = BatchState::Deleted;
        fixture.store.save(&mut batch).unwrap();

        assert!(matches!(
            fixture.store.read("b1"),
            Err(BatchError::NoSuchBatch { .. })
        ));
        assert!(fixture.store.find(Hydration::Summary, &filters::all()).unwrap().is_empty());
    }

    #[rstest]
    fn touch_moves_last_modified_only(fixture: Fixture) {
        fixture.store.save(&mut open_batch("b1")).unwrap();
        let before = fixture.store.read("b1").unwrap();

        fixture.clock.advance(Duration::days(2));
        let touched = fixture.store.touch("b1").unwrap();

        assert_eq!(
            touched.last_modified,
            before.last_modified.map(|modified| modified + Duration::days(2))
        );
        assert_eq!(touched.destinations, before.destinations);
        assert_eq!(touched.state, before.state);
    }

    #[rstest]
    fn find_reads_summaries_or_details(fixture: Fixture) {
        fixture.store.save(&mut open_batch("b1")).unwrap();
        fixture.clock.advance(Duration::days(4));
        let mut other = Batch::with_id("b2", AccountId(5));
        other.state = BatchState::Closed;
        fixture.store.save(&mut other).unwrap();

        let cutoff = fixture.clock.now() - Duration::days(3);
        let expired = fixture
            .store
            .find(Hydration::Summary, &filters::expired_before(cutoff))
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "b1");
        assert!(expired[0].batch.is_none());

        let owned = fixture
            .store
            .find(Hydration::Detail, &filters::owned_by(AccountId(5)))
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].batch.as_ref().unwrap().state, BatchState::Closed);
        assert!(owned[0].batch.as_ref().unwrap().record().is_some());
    }
}
