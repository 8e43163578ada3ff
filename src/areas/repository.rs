use crate::areas::database::{CommitCache, Database};
use crate::areas::refs::{RefUpdate, RefUpdateOutcome, Refs};
use crate::artifacts::branch::ref_name::RefName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{BatchError, BatchResult};
use anyhow::Context;
use std::path::Path;

const DEFAULT_BRANCH: &str = "refs/heads/main";

/// A bare repository: `objects/`, `refs/`, `logs/` and `HEAD` directly under `path`
pub struct Repository {
    name: String,
    path: Box<Path>,
    database: Database,
    refs: Refs,
    commit_cache: CommitCache,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl Repository {
    /// Create the directory layout of an empty repository
    pub fn init(path: &Path, name: &str) -> anyhow::Result<Self> {
        for directory in ["objects", "refs/heads", "refs/tags"] {
            std::fs::create_dir_all(path.join(directory)).with_context(|| {
                format!("Unable to create {directory} in {}", path.display())
            })?;
        }

        let repository = Self::at(path, name);
        if !repository.refs.head_path().exists() {
            repository
                .refs
                .set_head(&RefName::try_parse(DEFAULT_BRANCH.to_string())?)?;
        }

        Ok(repository)
    }

    /// Open an existing repository
    pub fn open(path: &Path, name: &str) -> anyhow::Result<Self> {
        if !path.join("objects").is_dir() {
            anyhow::bail!("repository {} not found at {}", name, path.display());
        }

        Ok(Self::at(path, name))
    }

    fn at(path: &Path, name: &str) -> Self {
        Repository {
            name: name.to_string(),
            path: path.to_path_buf().into_boxed_path(),
            database: Database::new(path.join("objects").into_boxed_path()),
            refs: Refs::new(path.to_path_buf().into_boxed_path()),
            commit_cache: CommitCache::new(),
        }
    }

    /// Project name the repository was opened under
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn read_ref(&self, name: &RefName) -> anyhow::Result<Option<ObjectId>> {
        self.refs.read_ref(name)
    }

    /// Resolve a ref name or revision expression to a commit id
    pub fn resolve_revision(&self, revision: &str) -> BatchResult<ObjectId> {
        Revision::try_parse(revision)
            .and_then(|parsed| parsed.resolve(self))
            .map_err(|err| {
                tracing::debug!(project = %self.name, revision, error = %err, "unresolvable revision");
                BatchError::InvalidRevision {
                    revision: revision.to_string(),
                }
            })
    }

    pub fn load_commit(&self, oid: &ObjectId) -> anyhow::Result<Commit> {
        self.database.parse_object_as_commit(oid)
    }

    pub fn write_commit(&self, commit: &Commit) -> anyhow::Result<ObjectId> {
        self.database.store(commit)
    }

    /// Whether `ancestor` is `descendant` or reachable from it
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> anyhow::Result<bool> {
        self.bca_finder().is_ancestor(ancestor, descendant)
    }

    pub fn merge_base(&self, one: &ObjectId, other: &ObjectId) -> anyhow::Result<Option<ObjectId>> {
        self.bca_finder().find_best_common_ancestor(one, other)
    }

    fn bca_finder(&self) -> BCAFinder<impl Fn(&ObjectId) -> anyhow::Result<SlimCommit> + '_> {
        BCAFinder::new(|oid: &ObjectId| {
            self.commit_cache
                .get_or_load_slim_commit(&self.database, oid)
        })
    }

    /// Compare-and-swap a ref, classifying fast-forwards against this repository's history
    pub fn update_ref(&self, update: &RefUpdate) -> RefUpdateOutcome {
        self.refs.compare_and_swap(
            update,
            |oid| self.database.contains(oid),
            |old, new| self.is_ancestor(old, new),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::refs::{ExpectedOld, RefUpdateResult};
    use crate::artifacts::objects::commit::Author;
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn repository() -> (TempDir, Repository) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let repository = Repository::init(&dir.path().join("app.git"), "app").unwrap();
        (dir, repository)
    }

    fn commit(repository: &Repository, parents: Vec<ObjectId>, message: &str) -> ObjectId {
        let tree = repository.database().store(&Tree::default()).unwrap();
        let ident = Author::new("Dev".into(), "dev@example.com".into());
        repository
            .write_commit(&Commit::new(parents, tree, ident.clone(), ident, message.into()))
            .unwrap()
    }

    #[rstest]
    fn opening_requires_an_initialized_layout() {
        let dir = TempDir::new().unwrap();
        assert!(Repository::open(dir.path(), "missing").is_err());
        Repository::init(dir.path(), "present").unwrap();
        assert_eq!(Repository::open(dir.path(), "present").unwrap().name(), "present");
    }

    #[rstest]
    fn resolves_branches_parents_and_abbreviated_ids(repository: (TempDir, Repository)) {
        let (_dir, repository) = repository;
        let first = commit(&repository, vec![], "first");
        let second = commit(&repository, vec![first.clone()], "second");
        let main = RefName::branch("main").unwrap();
        let update = RefUpdate::new(main, ExpectedOld::Absent, Some(second.clone()), false);
        assert_eq!(repository.update_ref(&update).result, RefUpdateResult::New);

        assert_eq!(repository.resolve_revision("main").unwrap(), second);
        assert_eq!(repository.resolve_revision("refs/heads/main").unwrap(), second);
        assert_eq!(repository.resolve_revision("HEAD^").unwrap(), first);
        assert_eq!(repository.resolve_revision("@~1").unwrap(), first);
        assert_eq!(
            repository.resolve_revision(&second.to_short_oid()).unwrap(),
            second
        );
        assert!(matches!(
            repository.resolve_revision("main~2"),
            Err(BatchError::InvalidRevision { .. })
        ));
        assert!(matches!(
            repository.resolve_revision("nope"),
            Err(BatchError::InvalidRevision { .. })
        ));
    }

    #[rstest]
    fn fast_forwards_are_detected_through_history(repository: (TempDir, Repository)) {
        let (_dir, repository) = repository;
        let base = commit(&repository, vec![], "base");
        let left = commit(&repository, vec![base.clone()], "left");
        let right = commit(&repository, vec![base.clone()], "right");
        let main = RefName::branch("main").unwrap();

        let set = |oid: &ObjectId, force| {
            repository
                .update_ref(&RefUpdate::new(main.clone(), ExpectedOld::Any, Some(oid.clone()), force))
                .result
        };

        assert_eq!(set(&base, false), RefUpdateResult::New);
        assert_eq!(set(&left, false), RefUpdateResult::FastForward);
        assert_eq!(set(&right, false), RefUpdateResult::Rejected);
        assert_eq!(set(&right, true), RefUpdateResult::Forced);
        assert_eq!(repository.merge_base(&left, &right).unwrap(), Some(base));
    }
}
