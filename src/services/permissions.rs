use crate::artifacts::branch::ref_name::RefName;
use crate::services::identity::{Account, AccountId};
use std::collections::HashSet;

/// Access decisions delegated to the host
pub trait PermissionBackend: Send + Sync {
    /// Whether `account` may rewind or replace `ref_name` in `project`
    fn can_force_update(&self, account: &Account, project: &str, ref_name: &RefName) -> bool;
}

/// A fixed grant table
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    allow_all: bool,
    force_update: HashSet<(AccountId, String, RefName)>,
}

impl StaticPermissions {
    pub fn allow_all() -> Self {
        StaticPermissions {
            allow_all: true,
            ..Default::default()
        }
    }

    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn grant_force_update(mut self, account: AccountId, project: &str, ref_name: RefName) -> Self {
        self.force_update
            .insert((account, project.to_string(), ref_name));
        self
    }
}

impl PermissionBackend for StaticPermissions {
    fn can_force_update(&self, account: &Account, project: &str, ref_name: &RefName) -> bool {
        self.allow_all
            || self
                .force_update
                .contains(&(account.id, project.to_string(), ref_name.clone()))
    }
}
