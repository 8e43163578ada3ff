//! References
//!
//! Refs are files under the repository directory holding a 40-character object id, or
//! `ref: <name>` for a symbolic ref such as `HEAD`.
//!
//! ## Updates
//!
//! Every write goes through a compare-and-swap:
//!
//! 1. `<ref>.lock` is created exclusively; if it already exists another writer holds the ref
//! 2. the current value is checked against the caller's expectation
//! 3. the new value is written to the lock file, which is renamed over the ref
//!
//! The outcome is reported as a [`RefUpdateResult`] rather than an error so callers can decide
//! which outcomes they accept. Accepted writes append a line to `logs/<ref>`.

use crate::artifacts::branch::REF_SEARCH_PATHS;
use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const SYMREF_PREFIX: &str = "ref: ";
const LOCK_SUFFIX: &str = ".lock";
const ZERO_ID: &str = "0000000000000000000000000000000000000000";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Outcome of a single ref update attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefUpdateResult {
    /// The ref did not exist and was created
    New,
    /// The new value descends from the old one
    FastForward,
    /// The ref already held the requested value
    NoChange,
    /// The ref was rewound or replaced, or deleted
    Forced,
    /// Not a fast-forward and force was not requested
    Rejected,
    /// The ref is locked by another writer, or its value did not match the expectation
    LockFailure,
    /// Reading or writing the ref failed
    IoFailure,
    NotAttempted,
    /// The new value names an object the repository does not have
    RejectedMissingObject,
    RejectedOtherReason,
    Renamed,
    RejectedCurrentBranch,
}

impl RefUpdateResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefUpdateResult::New => "NEW",
            RefUpdateResult::FastForward => "FAST_FORWARD",
            RefUpdateResult::NoChange => "NO_CHANGE",
            RefUpdateResult::Forced => "FORCED",
            RefUpdateResult::Rejected => "REJECTED",
            RefUpdateResult::LockFailure => "LOCK_FAILURE",
            RefUpdateResult::IoFailure => "IO_FAILURE",
            RefUpdateResult::NotAttempted => "NOT_ATTEMPTED",
            RefUpdateResult::RejectedMissingObject => "REJECTED_MISSING_OBJECT",
            RefUpdateResult::RejectedOtherReason => "REJECTED_OTHER_REASON",
            RefUpdateResult::Renamed => "RENAMED",
            RefUpdateResult::RejectedCurrentBranch => "REJECTED_CURRENT_BRANCH",
        }
    }
}

impl std::fmt::Display for RefUpdateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the caller believes the ref currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOld {
    /// No precondition
    Any,
    /// The ref must not exist
    Absent,
    /// The ref must hold exactly this id
    Value(ObjectId),
}

impl ExpectedOld {
    fn matches(&self, current: Option<&ObjectId>) -> bool {
        match self {
            ExpectedOld::Any => true,
            ExpectedOld::Absent => current.is_none(),
            ExpectedOld::Value(expected) => current == Some(expected),
        }
    }
}

/// A prepared compare-and-swap against one ref
///
/// `new_oid == None` deletes the ref.
#[derive(Debug, Clone, new)]
pub struct RefUpdate {
    pub name: RefName,
    pub expected_old: ExpectedOld,
    pub new_oid: Option<ObjectId>,
    pub force: bool,
    #[new(default)]
    pub reflog: Option<ReflogEntry>,
}

impl RefUpdate {
    pub fn with_reflog(mut self, who: Author, message: impl Into<String>) -> Self {
        self.reflog = Some(ReflogEntry::new(who, message.into()));
        self
    }

    pub fn is_delete(&self) -> bool {
        self.new_oid.is_none()
    }
}

#[derive(Debug, Clone, new)]
pub struct ReflogEntry {
    pub who: Author,
    pub message: String,
}

/// The old value observed under the lock and the outcome of the update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateOutcome {
    pub old_oid: Option<ObjectId>,
    pub result: RefUpdateResult,
}

/// Exclusive `<ref>.lock` file, removed on drop unless committed
struct RefLock {
    lock_path: PathBuf,
    committed: bool,
}

impl RefLock {
    fn acquire(ref_path: &Path) -> std::io::Result<(Self, std::fs::File)> {
        let mut lock_path = ref_path.as_os_str().to_owned();
        lock_path.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(lock_path);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)?;

        Ok((
            RefLock {
                lock_path,
                committed: false,
            },
            file,
        ))
    }

    fn commit(mut self, ref_path: &Path) -> std::io::Result<()> {
        std::fs::rename(&self.lock_path, ref_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

/// Ref storage of one repository
#[derive(Debug, new)]
pub struct Refs {
    /// Repository directory holding `HEAD`, `refs/` and `logs/`
    path: Box<Path>,
}

impl Refs {
    pub fn refs_path(&self) -> Box<Path> {
        self.path.join("refs").into_boxed_path()
    }

    pub fn head_path(&self) -> Box<Path> {
        self.path.join(HEAD_REF_NAME).into_boxed_path()
    }

    fn ref_path(&self, name: &RefName) -> PathBuf {
        self.path.join(name.as_ref_path())
    }

    fn log_path(&self, name: &RefName) -> PathBuf {
        self.path.join("logs").join(name.as_ref_path())
    }

    /// Point `HEAD` at a branch, creating it if needed
    pub fn set_head(&self, branch: &RefName) -> anyhow::Result<()> {
        std::fs::write(
            self.head_path(),
            format!("{SYMREF_PREFIX}{}\n", branch.as_ref_path()),
        )
        .context("Failed to write HEAD")
    }

    /// Read a ref, following symbolic refs
    pub fn read_ref(&self, name: &RefName) -> anyhow::Result<Option<ObjectId>> {
        self.read_symref(&self.ref_path(name), 0)
    }

    pub fn exists(&self, name: &RefName) -> bool {
        self.ref_path(name).is_file()
    }

    /// Resolve a short name the way git does: `<name>`, `refs/<name>`, `refs/tags/<name>`,
    /// `refs/heads/<name>`, first match wins
    pub fn find_ref(&self, short_name: &str) -> anyhow::Result<Option<(RefName, ObjectId)>> {
        for search_path in REF_SEARCH_PATHS {
            // the top level only holds full names and pseudo-refs such as HEAD
            if search_path.is_empty()
                && !short_name.starts_with("refs/")
                && !short_name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
            {
                continue;
            }
            let Ok(candidate) = RefName::try_parse(format!("{search_path}{short_name}")) else {
                continue;
            };
            if self.ref_path(&candidate).is_file()
                && let Some(oid) = self.read_ref(&candidate)?
            {
                return Ok(Some((candidate, oid)));
            }
        }

        Ok(None)
    }

    fn read_symref(&self, path: &Path, depth: usize) -> anyhow::Result<Option<ObjectId>> {
        if depth > 5 {
            anyhow::bail!("symbolic ref chain too deep at {}", path.display());
        }
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ref file at {:?}", path))?;
        let content = content.trim();

        if content.is_empty() {
            Ok(None)
        } else if let Some(target) = content.strip_prefix(SYMREF_PREFIX) {
            self.read_symref(&self.path.join(target), depth + 1)
        } else {
            Ok(Some(ObjectId::try_parse(content.to_string()).with_context(
                || format!("corrupt ref file at {:?}", path),
            )?))
        }
    }

    /// List every ref below `prefix` (a directory such as `refs/meta/batches/`) with its value
    pub fn list_refs(&self, prefix: &str) -> anyhow::Result<Vec<(RefName, ObjectId)>> {
        let root = self.path.join(prefix.trim_end_matches('/'));
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut refs = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to list refs under {prefix}"))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(self.path.as_ref())
                .with_context(|| format!("ref {:?} outside repository", entry.path()))?;
            let relative_path = relative_path.to_string_lossy().replace('\\', "/");
            if relative_path.ends_with(LOCK_SUFFIX) {
                continue;
            }

            let name = RefName::try_parse(relative_path)?;
            if let Some(oid) = self.read_ref(&name)? {
                refs.push((name, oid));
            }
        }

        Ok(refs)
    }

    /// Apply a compare-and-swap update
    ///
    /// `has_object` guards against refs pointing at objects the repository lacks and
    /// `is_ancestor(old, new)` decides between fast-forward and forced updates. I/O problems
    /// are logged and reported as [`RefUpdateResult::IoFailure`].
    pub fn compare_and_swap(
        &self,
        update: &RefUpdate,
        has_object: impl Fn(&ObjectId) -> bool,
        is_ancestor: impl FnOnce(&ObjectId, &ObjectId) -> anyhow::Result<bool>,
    ) -> RefUpdateOutcome {
        match self.try_compare_and_swap(update, has_object, is_ancestor) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(r#ref = %update.name, error = %err, "ref update failed");
                RefUpdateOutcome {
                    old_oid: None,
                    result: RefUpdateResult::IoFailure,
                }
            }
        }
    }

    fn try_compare_and_swap(
        &self,
        update: &RefUpdate,
        has_object: impl Fn(&ObjectId) -> bool,
        is_ancestor: impl FnOnce(&ObjectId, &ObjectId) -> anyhow::Result<bool>,
    ) -> anyhow::Result<RefUpdateOutcome> {
        let ref_path = self.ref_path(&update.name);
        std::fs::create_dir_all(ref_path.parent().with_context(|| {
            format!("failed to create parent directories for ref {}", update.name)
        })?)?;

        let (lock, mut lock_file) = match RefLock::acquire(&ref_path) {
            Ok(acquired) => acquired,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(RefUpdateOutcome {
                    old_oid: self.read_ref(&update.name).unwrap_or(None),
                    result: RefUpdateResult::LockFailure,
                });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to lock ref {}", update.name));
            }
        };

        let old_oid = self.read_direct(&ref_path)?;
        let outcome = |result| RefUpdateOutcome {
            old_oid: old_oid.clone(),
            result,
        };

        if !update.expected_old.matches(old_oid.as_ref()) {
            return Ok(outcome(RefUpdateResult::LockFailure));
        }

        let Some(new_oid) = &update.new_oid else {
            if old_oid.is_none() {
                return Ok(outcome(RefUpdateResult::NoChange));
            }

            std::fs::remove_file(&ref_path)
                .with_context(|| format!("failed to delete ref file at {:?}", ref_path))?;
            drop(lock);
            let log_path = self.log_path(&update.name);
            if log_path.is_file() {
                std::fs::remove_file(&log_path)?;
                self.prune_empty_parent_dirs(&log_path, &self.path.join("logs"))?;
            }
            self.prune_empty_parent_dirs(&ref_path, &self.refs_path())?;

            return Ok(outcome(RefUpdateResult::Forced));
        };

        if !has_object(new_oid) {
            return Ok(outcome(RefUpdateResult::RejectedMissingObject));
        }

        let result = match &old_oid {
            None => RefUpdateResult::New,
            Some(old) if old == new_oid => return Ok(outcome(RefUpdateResult::NoChange)),
            Some(old) if is_ancestor(old, new_oid)? => RefUpdateResult::FastForward,
            Some(_) if update.force => RefUpdateResult::Forced,
            Some(_) => return Ok(outcome(RefUpdateResult::Rejected)),
        };

        writeln!(lock_file, "{new_oid}")
            .with_context(|| format!("failed to write ref {}", update.name))?;
        lock_file.sync_all()?;
        drop(lock_file);
        lock.commit(&ref_path)
            .with_context(|| format!("failed to commit ref {}", update.name))?;

        if let Some(reflog) = &update.reflog {
            self.append_reflog(&update.name, old_oid.as_ref(), new_oid, reflog)?;
        }

        Ok(outcome(result))
    }

    fn read_direct(&self, ref_path: &Path) -> anyhow::Result<Option<ObjectId>> {
        if !ref_path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(ref_path)
            .with_context(|| format!("failed to read ref file at {:?}", ref_path))?;
        let content = content.trim();
        if content.starts_with(SYMREF_PREFIX) {
            anyhow::bail!("refusing to update symbolic ref at {:?}", ref_path);
        }
        if content.is_empty() {
            return Ok(None);
        }

        Ok(Some(ObjectId::try_parse(content.to_string())?))
    }

    fn append_reflog(
        &self,
        name: &RefName,
        old_oid: Option<&ObjectId>,
        new_oid: &ObjectId,
        entry: &ReflogEntry,
    ) -> anyhow::Result<()> {
        let log_path = self.log_path(name);
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open reflog at {:?}", log_path))?;

        writeln!(
            log_file,
            "{} {} {}\t{}",
            old_oid.map(|oid| oid.as_ref()).unwrap_or(ZERO_ID),
            new_oid,
            entry.who.display(),
            entry.message.lines().next().unwrap_or_default()
        )
        .with_context(|| format!("failed to append reflog at {:?}", log_path))
    }

    /// Reflog lines of a ref, oldest first
    pub fn read_reflog(&self, name: &RefName) -> anyhow::Result<Vec<String>> {
        let log_path = self.log_path(name);
        if !log_path.is_file() {
            return Ok(Vec::new());
        }

        Ok(std::fs::read_to_string(&log_path)?
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn prune_empty_parent_dirs(&self, path: &Path, stop_at: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && parent != stop_at
            && parent.starts_with(stop_at)
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent)
                .with_context(|| format!("failed to remove empty ref directory at {:?}", parent))?;
            self.prune_empty_parent_dirs(parent, stop_at)?;
        }

        Ok(())
    }
}
