//! The change-tracking system, seen through the three calls batches need

use crate::artifacts::batch::patch_set::PatchSetId;
use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::BatchResult;
use crate::services::identity::Account;
use derive_new::new;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    New,
    Merged,
    Abandoned,
}

impl ChangeStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, ChangeStatus::Merged | ChangeStatus::Abandoned)
    }
}

/// A proposed change targeting one branch of one project
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ChangeInfo {
    pub number: u32,
    pub project: String,
    pub branch: RefName,
    pub status: ChangeStatus,
    pub current_patch_set: u32,
}

/// One revision of a change
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct PatchSetInfo {
    pub id: PatchSetId,
    pub revision: ObjectId,
}

pub trait ChangeTracker: Send + Sync {
    fn change(&self, number: u32) -> BatchResult<Option<ChangeInfo>>;

    fn patch_set(&self, id: &PatchSetId) -> BatchResult<Option<PatchSetInfo>>;

    /// Record that the patch set landed on `branch` as part of `tip`
    fn mark_merged(
        &self,
        id: &PatchSetId,
        branch: &RefName,
        tip: &ObjectId,
        actor: &Account,
    ) -> BatchResult<()>;
}

#[derive(Debug, Default)]
struct TrackedChanges {
    changes: HashMap<u32, ChangeInfo>,
    patch_sets: HashMap<PatchSetId, PatchSetInfo>,
    merged_at: HashMap<u32, ObjectId>,
}

/// A change tracker held in memory
#[derive(Debug, Default)]
pub struct InMemoryChangeTracker {
    state: Mutex<TrackedChanges>,
}

impl InMemoryChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a patch set, creating or advancing its change
    pub fn add_patch_set(&self, project: &str, branch: RefName, id: PatchSetId, revision: ObjectId) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let change = state.changes.entry(id.change).or_insert_with(|| {
            ChangeInfo::new(id.change, project.to_string(), branch, ChangeStatus::New, id.patch_set)
        });
        change.current_patch_set = change.current_patch_set.max(id.patch_set);
        state.patch_sets.insert(id, PatchSetInfo::new(id, revision));
    }

    pub fn set_status(&self, number: u32, status: ChangeStatus) {
        if let Some(change) = self.lock().changes.get_mut(&number) {
            change.status = status;
        }
    }

    pub fn status(&self, number: u32) -> Option<ChangeStatus> {
        self.lock().changes.get(&number).map(|change| change.status)
    }

    /// The tip a change was marked merged at
    pub fn merged_at(&self, number: u32) -> Option<ObjectId> {
        self.lock().merged_at.get(&number).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackedChanges> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ChangeTracker for InMemoryChangeTracker {
    fn change(&self, number: u32) -> BatchResult<Option<ChangeInfo>> {
        Ok(self.lock().changes.get(&number).cloned())
    }

    fn patch_set(&self, id: &PatchSetId) -> BatchResult<Option<PatchSetInfo>> {
        Ok(self.lock().patch_sets.get(id).cloned())
    }

    fn mark_merged(
        &self,
        id: &PatchSetId,
        _branch: &RefName,
        tip: &ObjectId,
        _actor: &Account,
    ) -> BatchResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(change) = state.changes.get_mut(&id.change) {
            change.status = ChangeStatus::Merged;
            state.merged_at.insert(id.change, tip.clone());
        }
        Ok(())
    }
}
