use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::services::identity::AccountId;
use derive_new::new;
use std::sync::Mutex;

/// Fired after an accepted ref update made on behalf of a known account
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RefUpdatedEvent {
    pub project: String,
    pub ref_name: RefName,
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
    pub actor: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct FastForward {
    pub project: String,
    pub ref_name: RefName,
    pub old: ObjectId,
    pub new: ObjectId,
}

/// Observer of ref updates; both hooks default to doing nothing
pub trait RefUpdateListener: Send + Sync {
    fn on_fast_forward(&self, _fast_forward: &FastForward) {}

    fn on_ref_updated(&self, _event: &RefUpdatedEvent) {}
}

/// Keeps every notification for later inspection
#[derive(Debug, Default)]
pub struct RecordingListener {
    fast_forwards: Mutex<Vec<FastForward>>,
    events: Mutex<Vec<RefUpdatedEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fast_forwards(&self) -> Vec<FastForward> {
        self.fast_forwards
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn events(&self) -> Vec<RefUpdatedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RefUpdateListener for RecordingListener {
    fn on_fast_forward(&self, fast_forward: &FastForward) {
        self.fast_forwards
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(fast_forward.clone());
    }

    fn on_ref_updated(&self, event: &RefUpdatedEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
