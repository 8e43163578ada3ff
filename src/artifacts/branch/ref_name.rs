use crate::artifacts::branch::{HEADS_PREFIX, INVALID_REF_NAME_REGEX};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// A validated ref name
///
/// Full names start with `refs/` (or are `HEAD`). Short branch names are accepted by
/// [`RefName::branch`], which expands them under `refs/heads/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    pub fn try_parse(name: String) -> anyhow::Result<Self> {
        if name.is_empty() {
            anyhow::bail!("ref name cannot be empty");
        }

        let re = regex::Regex::new(INVALID_REF_NAME_REGEX)
            .with_context(|| format!("invalid ref name regex: {INVALID_REF_NAME_REGEX}"))?;

        if re.is_match(&name) {
            anyhow::bail!("invalid ref name: {}", name);
        }

        Ok(Self(name))
    }

    /// Expand a branch given as `main` or `refs/heads/main` to its full name
    pub fn branch(name: &str) -> anyhow::Result<Self> {
        if name.starts_with("refs/") || name == "HEAD" {
            Self::try_parse(name.to_string())
        } else {
            Self::try_parse(format!("{HEADS_PREFIX}{name}"))
        }
    }

    /// Join `suffix` under this name, as in `refs/batch/users/alice` + `refs/heads/main`
    pub fn join(&self, suffix: &str) -> anyhow::Result<Self> {
        Self::try_parse(format!("{}/{}", self.0, suffix))
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(HEADS_PREFIX)
    }

    /// Name with `refs/heads/` stripped, for messages
    pub fn short_name(&self) -> &str {
        self.0.strip_prefix(HEADS_PREFIX).unwrap_or(&self.0)
    }

    pub fn as_ref_path(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        Self::try_parse(value)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
