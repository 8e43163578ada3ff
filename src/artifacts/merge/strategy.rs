use crate::errors::{BatchError, BatchResult};
use std::str::FromStr;

/// How trees are combined when a merge commit is required
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// Keep the destination side's tree
    Ours,
    /// Keep the incoming side's tree
    Theirs,
    /// Path-level three-way merge; any path changed on both sides conflicts
    SimpleTwoWayInCore,
    /// Path-level three-way merge with line-level merging of files changed on both sides
    Resolve,
}

const STRATEGY_NAMES: phf::Map<&'static str, MergeStrategy> = phf::phf_map! {
    "ours" => MergeStrategy::Ours,
    "theirs" => MergeStrategy::Theirs,
    "simple" => MergeStrategy::SimpleTwoWayInCore,
    "simple-two-way-in-core" => MergeStrategy::SimpleTwoWayInCore,
    "resolve" => MergeStrategy::Resolve,
};

impl MergeStrategy {
    /// Strategy used for a project: content merge when enabled, path-level otherwise
    pub fn for_project(use_content_merge: bool) -> Self {
        if use_content_merge {
            MergeStrategy::Resolve
        } else {
            MergeStrategy::SimpleTwoWayInCore
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Ours => "ours",
            MergeStrategy::Theirs => "theirs",
            MergeStrategy::SimpleTwoWayInCore => "simple-two-way-in-core",
            MergeStrategy::Resolve => "resolve",
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = BatchError;

    fn from_str(name: &str) -> BatchResult<Self> {
        STRATEGY_NAMES
            .get(name.to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| BatchError::Config(format!("unknown merge strategy: {name}")))
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fast-forward policy of a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FastForwardMode {
    /// Fast-forward when possible, merge otherwise
    #[default]
    Ff,
    /// Always create a merge commit unless the incoming side is already merged
    NoFf,
    /// Fast-forward or fail
    FfOnly,
}

const FF_MODE_NAMES: phf::Map<&'static str, FastForwardMode> = phf::phf_map! {
    "ff" => FastForwardMode::Ff,
    "no-ff" => FastForwardMode::NoFf,
    "ff-only" => FastForwardMode::FfOnly,
};

impl FromStr for FastForwardMode {
    type Err = BatchError;

    fn from_str(name: &str) -> BatchResult<Self> {
        let normalized = name.to_ascii_lowercase().replace('_', "-");
        FF_MODE_NAMES
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| BatchError::Config(format!("unknown fast-forward mode: {name}")))
    }
}
