//! In-core three-way tree merge
//!
//! Trees are flattened to `path -> entry` maps of files, merged path by path against the
//! base, and the result is written back as nested trees. Nothing touches a working tree.

use crate::areas::database::Database;
use crate::artifacts::merge::content_merge::merge_lines;
use crate::artifacts::merge::strategy::MergeStrategy;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeEntry};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

type FileMap = BTreeMap<String, TreeEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeMergeOutcome {
    Clean(ObjectId),
    Conflicted(Vec<String>),
}

pub struct TreeMerge<'r> {
    database: &'r Database,
    strategy: MergeStrategy,
}

impl<'r> TreeMerge<'r> {
    pub fn new(database: &'r Database, strategy: MergeStrategy) -> Self {
        TreeMerge { database, strategy }
    }

    /// Merge `ours` and `theirs`; `base == None` merges against the empty tree
    pub fn merge(
        &self,
        base: Option<&ObjectId>,
        ours: &ObjectId,
        theirs: &ObjectId,
    ) -> anyhow::Result<TreeMergeOutcome> {
        match self.strategy {
            MergeStrategy::Ours => return Ok(TreeMergeOutcome::Clean(ours.clone())),
            MergeStrategy::Theirs => return Ok(TreeMergeOutcome::Clean(theirs.clone())),
            MergeStrategy::SimpleTwoWayInCore | MergeStrategy::Resolve => {}
        }

        let base_files = match base {
            Some(base) => self.flatten(base)?,
            None => FileMap::new(),
        };
        let our_files = self.flatten(ours)?;
        let their_files = self.flatten(theirs)?;

        let paths = base_files
            .keys()
            .chain(our_files.keys())
            .chain(their_files.keys())
            .cloned()
            .collect::<BTreeSet<_>>();

        let mut merged = FileMap::new();
        let mut conflicts = Vec::new();

        for path in paths {
            let base_entry = base_files.get(&path);
            let our_entry = our_files.get(&path);
            let their_entry = their_files.get(&path);

            match self.merge_path(&path, base_entry, our_entry, their_entry)? {
                PathMerge::Keep(Some(entry)) => {
                    merged.insert(path, entry);
                }
                PathMerge::Keep(None) => {}
                PathMerge::Conflict => conflicts.push(path),
            }
        }

        conflicts.extend(Self::file_directory_collisions(&merged));

        if !conflicts.is_empty() {
            conflicts.sort();
            conflicts.dedup();
            debug!(count = conflicts.len(), "tree merge left conflicts");
            return Ok(TreeMergeOutcome::Conflicted(conflicts));
        }

        Ok(TreeMergeOutcome::Clean(self.write_tree(&merged)?))
    }

    fn merge_path(
        &self,
        path: &str,
        base: Option<&TreeEntry>,
        ours: Option<&TreeEntry>,
        theirs: Option<&TreeEntry>,
    ) -> anyhow::Result<PathMerge> {
        if ours == theirs || theirs == base {
            return Ok(PathMerge::Keep(ours.cloned()));
        }
        if ours == base {
            return Ok(PathMerge::Keep(theirs.cloned()));
        }

        // both sides changed the path in different ways
        match (self.strategy, ours, theirs) {
            (MergeStrategy::Resolve, Some(ours), Some(theirs)) => {
                self.merge_contents(path, base, ours, theirs)
            }
            _ => Ok(PathMerge::Conflict),
        }
    }

    fn merge_contents(
        &self,
        path: &str,
        base: Option<&TreeEntry>,
        ours: &TreeEntry,
        theirs: &TreeEntry,
    ) -> anyhow::Result<PathMerge> {
        let Some(mode) = Self::merge_modes(base.map(|entry| entry.mode), ours.mode, theirs.mode)
        else {
            return Ok(PathMerge::Conflict);
        };

        let base_blob = match base {
            Some(entry) => self.database.parse_object_as_blob(&entry.oid)?,
            None => Blob::new(""),
        };
        let our_blob = self.database.parse_object_as_blob(&ours.oid)?;
        let their_blob = self.database.parse_object_as_blob(&theirs.oid)?;

        let (Some(base_text), Some(our_text), Some(their_text)) =
            (base_blob.as_text(), our_blob.as_text(), their_blob.as_text())
        else {
            debug!(path, "binary content changed on both sides");
            return Ok(PathMerge::Conflict);
        };

        match merge_lines(base_text, our_text, their_text).merged_text() {
            Some(merged) => {
                let oid = self.database.store(&Blob::new(merged))?;
                Ok(PathMerge::Keep(Some(TreeEntry::new(oid, mode))))
            }
            None => Ok(PathMerge::Conflict),
        }
    }

    fn merge_modes(base: Option<EntryMode>, ours: EntryMode, theirs: EntryMode) -> Option<EntryMode> {
        if ours == theirs || Some(theirs) == base {
            Some(ours)
        } else if Some(ours) == base {
            Some(theirs)
        } else {
            None
        }
    }

    /// Paths kept as a file on one side while the other side put files below them
    fn file_directory_collisions(merged: &FileMap) -> Vec<String> {
        merged
            .keys()
            .filter(|path| {
                let dir_prefix = format!("{path}/");
                merged
                    .range(dir_prefix.clone()..)
                    .next()
                    .is_some_and(|(next, _)| next.starts_with(&dir_prefix))
            })
            .cloned()
            .collect()
    }

    fn flatten(&self, tree_oid: &ObjectId) -> anyhow::Result<FileMap> {
        let mut files = FileMap::new();
        self.flatten_into(tree_oid, "", &mut files)?;
        Ok(files)
    }

    fn flatten_into(&self, tree_oid: &ObjectId, prefix: &str, files: &mut FileMap) -> anyhow::Result<()> {
        let tree = self.database.parse_object_as_tree(tree_oid)?;

        for (name, entry) in tree.into_entries() {
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            if entry.mode.is_tree() {
                self.flatten_into(&entry.oid, &path, files)?;
            } else {
                files.insert(path, entry);
            }
        }

        Ok(())
    }

    fn write_tree(&self, files: &FileMap) -> anyhow::Result<ObjectId> {
        let mut tree = Tree::default();
        let mut subdirectories = BTreeMap::<&str, FileMap>::new();

        for (path, entry) in files {
            match path.split_once('/') {
                Some((directory, rest)) => {
                    subdirectories
                        .entry(directory)
                        .or_default()
                        .insert(rest.to_string(), entry.clone());
                }
                None => tree.insert(path.clone(), entry.clone()),
            }
        }

        for (directory, children) in subdirectories {
            let oid = self.write_tree(&children)?;
            tree.insert(directory, TreeEntry::new(oid, EntryMode::Directory));
        }

        self.database.store(&tree)
    }
}

enum PathMerge {
    Keep(Option<TreeEntry>),
    Conflict,
}
