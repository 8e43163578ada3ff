use crate::errors::{BatchError, BatchResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const PATCH_SET_ID_REGEX: &str = r"^[1-9][0-9]*,[1-9][0-9]*$";

/// `(change number, patch set number)`, both strictly positive
///
/// Serialized as `{"number": <change>, "patchSet": <patch set>}` inside batch records and
/// written as `<change>,<patch set>` in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchSetId {
    #[serde(rename = "number")]
    pub change: u32,
    #[serde(rename = "patchSet")]
    pub patch_set: u32,
}

impl PatchSetId {
    pub fn new(change: u32, patch_set: u32) -> BatchResult<Self> {
        if change == 0 || patch_set == 0 {
            return Err(BatchError::InvalidPatchSet(format!("{change},{patch_set}")));
        }
        Ok(PatchSetId { change, patch_set })
    }
}

impl FromStr for PatchSetId {
    type Err = BatchError;

    fn from_str(token: &str) -> BatchResult<Self> {
        let invalid = || BatchError::InvalidPatchSet(format!("\"{token}\" is not a valid patch set"));

        let re = regex::Regex::new(PATCH_SET_ID_REGEX)
            .map_err(|err| BatchError::Storage(anyhow::Error::new(err)))?;
        if !re.is_match(token) {
            return Err(invalid());
        }

        let (change, patch_set) = token.split_once(',').ok_or_else(invalid)?;
        Self::new(
            change.parse().map_err(|_| invalid())?,
            patch_set.parse().map_err(|_| invalid())?,
        )
    }
}

impl std::fmt::Display for PatchSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.change, self.patch_set)
    }
}
