//! Batch records
//!
//! A batch groups patch sets merged onto one or more destination branches. Its JSON form is
//! the persisted record:
//!
//! ```json
//! {"id":"5d2f...","version":0,"owner":1000001,"state":"CLOSED",
//!  "lastModified":"2026-10-18T09:12:44Z",
//!  "destinations":[{"project":"app","ref":"refs/heads/main","sha1":"<40 hex>",
//!    "downloadRef":"refs/batch/users/alice/5d2f.../refs/heads/main",
//!    "changes":[{"number":7,"patchSet":2}]}]}
//! ```

pub mod filters;
pub mod patch_set;
pub mod resolver;

use crate::artifacts::batch::patch_set::PatchSetId;
use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{BatchError, BatchResult};
use crate::services::identity::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchState {
    Open,
    Closed,
    Deleted,
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BatchState::Open => "OPEN",
            BatchState::Closed => "CLOSED",
            BatchState::Deleted => "DELETED",
        };
        write!(f, "{name}")
    }
}

/// A branch of a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchKey {
    pub project: String,
    pub ref_name: RefName,
}

impl BranchKey {
    pub fn new(project: impl Into<String>, ref_name: RefName) -> Self {
        BranchKey {
            project: project.into(),
            ref_name,
        }
    }
}

impl std::fmt::Display for BranchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.project, self.ref_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub project: String,
    #[serde(rename = "ref")]
    pub ref_name: RefName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_ref: Option<RefName>,
    #[serde(default)]
    pub changes: Vec<PatchSetId>,
}

impl Destination {
    pub fn new(project: impl Into<String>, ref_name: RefName) -> Self {
        Destination {
            project: project.into(),
            ref_name,
            sha1: None,
            download_ref: None,
            changes: Vec::new(),
        }
    }

    pub fn key(&self) -> BranchKey {
        BranchKey::new(self.project.clone(), self.ref_name.clone())
    }

    /// The merge tip, which every lifecycle operation after construction relies on
    pub fn tip(&self) -> BatchResult<&ObjectId> {
        self.sha1.as_ref().ok_or_else(|| {
            BatchError::InvalidBatchOperation(format!("destination {} has no merge tip", self.key()))
        })
    }

    pub fn add(&mut self, patch_set: PatchSetId) {
        self.changes.push(patch_set);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    /// Write guard: a batch can be saved only while this is `Some(0)`
    pub version: Option<u32>,
    pub owner: AccountId,
    pub state: BatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    /// Record revision this batch was read from, `None` until first persisted
    #[serde(skip)]
    pub(crate) record: Option<ObjectId>,
}

impl Batch {
    /// A fresh open batch with a random id
    pub fn new(owner: AccountId) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), owner)
    }

    pub fn with_id(id: impl Into<String>, owner: AccountId) -> Self {
        Batch {
            id: id.into(),
            version: Some(0),
            owner,
            state: BatchState::Open,
            last_modified: None,
            destinations: Vec::new(),
            record: None,
        }
    }

    /// The destination for a branch, added in insertion order if new
    pub fn destination_mut(&mut self, key: &BranchKey) -> &mut Destination {
        let index = match self
            .destinations
            .iter()
            .position(|destination| destination.project == key.project && destination.ref_name == key.ref_name)
        {
            Some(index) => index,
            None => {
                self.destinations
                    .push(Destination::new(key.project.clone(), key.ref_name.clone()));
                self.destinations.len() - 1
            }
        };
        &mut self.destinations[index]
    }

    pub fn destination(&self, key: &BranchKey) -> Option<&Destination> {
        self.destinations
            .iter()
            .find(|destination| destination.project == key.project && destination.ref_name == key.ref_name)
    }

    pub fn record(&self) -> Option<&ObjectId> {
        self.record.as_ref()
    }

    /// Copy for output, without the write guard
    pub fn for_display(&self) -> Batch {
        Batch {
            version: None,
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> BatchResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> BatchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A batch as returned by listings: always the id, the rest on request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub batch: Option<Batch>,
}
