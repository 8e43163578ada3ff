use crate::common::repository::{branch_tip, commit_files, set_branch};
use crate::common::{init_tracing, redirect_temp_dir};
use assert_fs::TempDir;
use bit_batch::areas::repository::Repository;
use bit_batch::artifacts::batch::patch_set::PatchSetId;
use bit_batch::artifacts::branch::ref_name::RefName;
use bit_batch::artifacts::objects::object_id::ObjectId;
use bit_batch::commands::BatchService;
use bit_batch::config::BatchConfig;
use bit_batch::services::changes::InMemoryChangeTracker;
use bit_batch::services::clock::FixedClock;
use bit_batch::services::events::RecordingListener;
use bit_batch::services::identity::{Account, AccountId};
use bit_batch::services::permissions::{PermissionBackend, StaticPermissions};
use chrono::{TimeZone, Utc};
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use rstest::fixture;
use std::sync::Arc;

/// A batch service over temporary repositories, with in-memory collaborators
pub struct World {
    pub dir: TempDir,
    pub service: Arc<BatchService>,
    pub changes: Arc<InMemoryChangeTracker>,
    pub clock: Arc<FixedClock>,
    pub listener: Arc<RecordingListener>,
    pub alice: Account,
}

#[fixture]
pub fn world() -> World {
    World::new(StaticPermissions::allow_all())
}

pub fn account(id: u32, username: Option<&str>) -> Account {
    Account::new(
        AccountId(id),
        username.map(str::to_string),
        Name().fake(),
        SafeEmail().fake(),
    )
}

impl World {
    pub fn new(permissions: impl PermissionBackend + 'static) -> Self {
        init_tracing();
        redirect_temp_dir();
        let dir = TempDir::new().expect("Failed to create temp dir");

        let changes = Arc::new(InMemoryChangeTracker::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()));
        let listener = Arc::new(RecordingListener::new());

        let mut service = BatchService::new(
            BatchConfig::default(),
            dir.path(),
            changes.clone(),
            Arc::new(permissions),
            clock.clone(),
        );
        service.add_listener(listener.clone());

        World {
            dir,
            service: Arc::new(service),
            changes,
            clock,
            listener,
            alice: account(1000001, Some("alice")),
        }
    }

    pub fn repository(&self, project: &str) -> Repository {
        self.service
            .repositories()
            .open_or_create(project)
            .expect("Failed to open project")
    }

    /// Create `branch` in `project` with a single root commit holding `files`
    pub fn seed(&self, project: &str, branch: &str, files: &[(&str, &str)]) -> ObjectId {
        let repository = self.repository(project);
        let root = commit_files(&repository, &[], files, "Initial commit");
        set_branch(&repository, branch, &root);
        root
    }

    /// Upload patch set `id` for `branch`: a commit on `parent` holding `files`
    pub fn upload(
        &self,
        project: &str,
        branch: &str,
        id: (u32, u32),
        parent: &ObjectId,
        files: &[(&str, &str)],
        message: &str,
    ) -> (PatchSetId, ObjectId) {
        let repository = self.repository(project);
        let revision = commit_files(&repository, &[parent.clone()], files, message);
        let id = PatchSetId::new(id.0, id.1).unwrap();

        self.changes
            .add_patch_set(project, RefName::branch(branch).unwrap(), id, revision.clone());
        (id, revision)
    }

    pub fn tip(&self, project: &str, branch: &str) -> Option<ObjectId> {
        branch_tip(&self.repository(project), branch)
    }

    pub fn read_ref(&self, project: &str, name: &str) -> Option<ObjectId> {
        self.repository(project)
            .read_ref(&RefName::try_parse(name.to_string()).unwrap())
            .unwrap()
    }
}
