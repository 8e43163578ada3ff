//! Ref updates on behalf of batch operations
//!
//! Every ref write made by a lifecycle command goes through [`RefUpdater`]: it opens the
//! project, applies the compare-and-swap and decides whether the low-level result counts as
//! success. `New`, `FastForward` and `NoChange` always do; `Forced` only for deletes and
//! forced updates. Anything else becomes [`BatchError::RefUpdateRejected`] carrying the code.
//!
//! Accepted updates notify the registered listeners.

use crate::areas::refs::{ExpectedOld, RefUpdate, RefUpdateResult};
use crate::areas::repository_manager::RepositoryManager;
use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{BatchError, BatchResult};
use crate::services::clock::Clock;
use crate::services::events::{FastForward, RefUpdateListener, RefUpdatedEvent};
use crate::services::identity::{Account, ServerIdent};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RefUpdater {
    repositories: RepositoryManager,
    server_ident: ServerIdent,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn RefUpdateListener>>,
}

impl RefUpdater {
    pub fn new(
        repositories: RepositoryManager,
        server_ident: ServerIdent,
        clock: Arc<dyn Clock>,
    ) -> Self {
        RefUpdater {
            repositories,
            server_ident,
            clock,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn RefUpdateListener>) {
        self.listeners.push(listener);
    }

    /// Move `branch` to `new`, optionally checking its current value first
    pub fn update(
        &self,
        project: &str,
        branch: &RefName,
        expected_old: Option<&ObjectId>,
        new: &ObjectId,
        force: bool,
        message: &str,
        actor: Option<&Account>,
    ) -> BatchResult<RefUpdateResult> {
        let expected_old = match expected_old {
            Some(old) => ExpectedOld::Value(old.clone()),
            None => ExpectedOld::Any,
        };
        let update = RefUpdate::new(branch.clone(), expected_old, Some(new.clone()), force);
        self.apply(project, update, message, actor)
    }

    /// Point `branch` at `new` whatever it holds now
    pub fn force_update(
        &self,
        project: &str,
        branch: &RefName,
        new: &ObjectId,
        actor: Option<&Account>,
    ) -> BatchResult<RefUpdateResult> {
        self.update(project, branch, None, new, true, "batch: force update", actor)
    }

    /// Create or overwrite `name`, for refs the batch owns outright
    pub fn create(
        &self,
        project: &str,
        name: &RefName,
        new: &ObjectId,
        actor: Option<&Account>,
    ) -> BatchResult<RefUpdateResult> {
        self.update(project, name, None, new, true, "batch: create", actor)
    }

    pub fn delete(
        &self,
        project: &str,
        name: &RefName,
        actor: Option<&Account>,
    ) -> BatchResult<RefUpdateResult> {
        let update = RefUpdate::new(name.clone(), ExpectedOld::Any, None, true);
        self.apply(project, update, "batch: delete", actor)
    }

    fn apply(
        &self,
        project: &str,
        update: RefUpdate,
        message: &str,
        actor: Option<&Account>,
    ) -> BatchResult<RefUpdateResult> {
        let repository = self.repositories.open(project)?;
        let now = self.clock.now();
        let who = match actor {
            Some(account) => account.ident_at(now),
            None => self.server_ident.ident_at(now),
        };
        let update = update.with_reflog(who, message);

        let outcome = repository.update_ref(&update);
        let result = outcome.result;

        if !Self::is_accepted(result, &update) {
            warn!(project, r#ref = %update.name, %result, "ref update rejected");
            return Err(BatchError::RefUpdateRejected {
                name: update.name.to_string(),
                result,
            });
        }
        debug!(project, r#ref = %update.name, %result, "ref updated");

        if result == RefUpdateResult::FastForward
            && let (Some(old), Some(new)) = (&outcome.old_oid, &update.new_oid)
        {
            let fast_forward = FastForward::new(
                project.to_string(),
                update.name.clone(),
                old.clone(),
                new.clone(),
            );
            for listener in &self.listeners {
                listener.on_fast_forward(&fast_forward);
            }
        }

        if let Some(account) = actor {
            let event = RefUpdatedEvent::new(
                project.to_string(),
                update.name.clone(),
                outcome.old_oid.clone(),
                update.new_oid.clone(),
                account.id,
            );
            for listener in &self.listeners {
                listener.on_ref_updated(&event);
            }
        }

        Ok(result)
    }

    fn is_accepted(result: RefUpdateResult, update: &RefUpdate) -> bool {
        match result {
            RefUpdateResult::New | RefUpdateResult::FastForward | RefUpdateResult::NoChange => true,
            RefUpdateResult::Forced => update.is_delete() || update.force,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::{Author, Commit};
    use crate::artifacts::objects::tree::Tree;
    use crate::services::clock::FixedClock;
    use crate::services::events::RecordingListener;
    use crate::services::identity::AccountId;
    use assert_fs::TempDir;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    struct Fixture {
        _dir: TempDir,
        repositories: RepositoryManager,
        updater: RefUpdater,
        listener: Arc<RecordingListener>,
    }

    #[fixture]
    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let repositories = RepositoryManager::new(dir.path());
        repositories.open_or_create("app").unwrap();

        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()));
        let listener = Arc::new(RecordingListener::new());
        let mut updater = RefUpdater::new(repositories.clone(), ServerIdent::default(), clock);
        updater.add_listener(listener.clone());

        Fixture {
            _dir: dir,
            repositories,
            updater,
            listener,
        }
    }

    fn commit(fixture: &Fixture, parents: Vec<ObjectId>) -> ObjectId {
        let repository = fixture.repositories.open("app").unwrap();
        let tree = repository.database().store(&Tree::default()).unwrap();
        let ident = Author::new("Dev".into(), "dev@example.com".into());
        let message = format!("commit {}", parents.len());
        repository
            .write_commit(&Commit::new(parents, tree, ident.clone(), ident, message))
            .unwrap()
    }

    fn alice() -> Account {
        Account::new(AccountId(1000001), Some("alice".into()), "Alice".into(), "alice@example.com".into())
    }

    #[rstest]
    fn accepted_results_notify_listeners(fixture: Fixture) {
        let main = RefName::branch("main").unwrap();
        let base = commit(&fixture, vec![]);
        let next = commit(&fixture, vec![base.clone()]);

        let created = fixture
            .updater
            .update("app", &main, None, &base, false, "init", None)
            .unwrap();
        let advanced = fixture
            .updater
            .update("app", &main, Some(&base), &next, false, "advance", Some(&alice()))
            .unwrap();

        assert_eq!(created, RefUpdateResult::New);
        assert_eq!(advanced, RefUpdateResult::FastForward);
        assert_eq!(
            fixture.listener.fast_forwards(),
            vec![FastForward::new("app".into(), main.clone(), base.clone(), next.clone())]
        );
        // only the update made on behalf of an account is reported as an event
        assert_eq!(
            fixture.listener.events(),
            vec![RefUpdatedEvent::new("app".into(), main, Some(base), Some(next), AccountId(1000001))]
        );
    }

    #[rstest]
    fn rewinds_need_force(fixture: Fixture) {
        let main = RefName::branch("main").unwrap();
        let base = commit(&fixture, vec![]);
        let next = commit(&fixture, vec![base.clone()]);
        fixture.updater.force_update("app", &main, &next, None).unwrap();

        let err = fixture
            .updater
            .update("app", &main, None, &base, false, "rewind", None)
            .unwrap_err();
        assert_eq!(err.ref_update_result(), Some(RefUpdateResult::Rejected));

        let forced = fixture.updater.force_update("app", &main, &base, None).unwrap();
        assert_eq!(forced, RefUpdateResult::Forced);
        assert!(fixture.listener.fast_forwards().is_empty());
    }

    #[rstest]
    fn stale_expectations_keep_the_lock_failure_code(fixture: Fixture) {
        let main = RefName::branch("main").unwrap();
        let base = commit(&fixture, vec![]);
        let other = commit(&fixture, vec![]);
        fixture.updater.create("app", &main, &base, None).unwrap();

        let err = fixture
            .updater
            .update("app", &main, Some(&other), &other, true, "stale", None)
            .unwrap_err();

        match err {
            BatchError::RefUpdateRejected { name, result } => {
                assert_eq!(name, "refs/heads/main");
                assert_eq!(result, RefUpdateResult::LockFailure);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[rstest]
    fn deletes_are_accepted_and_idempotent(fixture: Fixture) {
        let download = RefName::try_parse("refs/batch/users/alice/b1/refs/heads/main".into()).unwrap();
        let base = commit(&fixture, vec![]);
        fixture.updater.create("app", &download, &base, Some(&alice())).unwrap();

        assert_eq!(
            fixture.updater.delete("app", &download, Some(&alice())).unwrap(),
            RefUpdateResult::Forced
        );
        assert_eq!(
            fixture.updater.delete("app", &download, None).unwrap(),
            RefUpdateResult::NoChange
        );
        assert_eq!(fixture.listener.events().len(), 2);
        assert_eq!(fixture.listener.events()[1].new, None);
    }

    #[rstest]
    fn missing_objects_are_rejected(fixture: Fixture) {
        let main = RefName::branch("main").unwrap();
        let unknown = ObjectId::try_parse("e".repeat(40)).unwrap();

        let err = fixture.updater.force_update("app", &main, &unknown, None).unwrap_err();
        assert_eq!(err.ref_update_result(), Some(RefUpdateResult::RejectedMissingObject));
    }

    #[rstest]
    fn reflog_names_the_acting_identity(fixture: Fixture) {
        let main = RefName::branch("main").unwrap();
        let base = commit(&fixture, vec![]);
        fixture.updater.create("app", &main, &base, Some(&alice())).unwrap();

        let reflog = fixture
            .repositories
            .open("app")
            .unwrap()
            .refs()
            .read_reflog(&main)
            .unwrap();
        assert_eq!(reflog.len(), 1);
        assert!(reflog[0].contains("Alice <alice@example.com>"));
        assert!(reflog[0].ends_with("batch: create"));
    }
}
