use crate::artifacts::objects::commit::Author;
use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

/// Numeric account id, as stored in the `owner` field of a batch record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u32);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user known to the host
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Account {
    pub id: AccountId,
    pub username: Option<String>,
    pub name: String,
    pub email: String,
}

impl Account {
    /// Identity stamped on commits and reflog lines written on behalf of this user
    pub fn ident_at(&self, when: DateTime<Utc>) -> Author {
        Author::new_with_timestamp(self.name.clone(), self.email.clone(), when.fixed_offset())
    }
}

/// Identity of the service itself, used as merge committer
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ServerIdent {
    pub name: String,
    pub email: String,
}

impl ServerIdent {
    pub fn ident_at(&self, when: DateTime<Utc>) -> Author {
        Author::new_with_timestamp(self.name.clone(), self.email.clone(), when.fixed_offset())
    }
}

impl Default for ServerIdent {
    fn default() -> Self {
        ServerIdent::new("Code Review".to_string(), "noreply@localhost".to_string())
    }
}
