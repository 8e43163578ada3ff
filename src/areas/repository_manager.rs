use crate::areas::repository::Repository;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Opens project repositories stored as `<base>/<project>.git`
///
/// Handles are opened per operation and dropped when it completes.
#[derive(Debug, Clone)]
pub struct RepositoryManager {
    base_path: PathBuf,
}

impl RepositoryManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        RepositoryManager {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn open(&self, project: &str) -> anyhow::Result<Repository> {
        Repository::open(&self.repository_path(project)?, project)
            .with_context(|| format!("Unable to open project {project}"))
    }

    /// Open a project, creating an empty repository if it does not exist yet
    pub fn open_or_create(&self, project: &str) -> anyhow::Result<Repository> {
        let path = self.repository_path(project)?;
        if path.join("objects").is_dir() {
            Repository::open(&path, project)
        } else {
            Repository::init(&path, project)
                .with_context(|| format!("Unable to create project {project}"))
        }
    }

    fn repository_path(&self, project: &str) -> anyhow::Result<PathBuf> {
        if project.is_empty()
            || project.starts_with('/')
            || project.split('/').any(|segment| segment.is_empty() || segment == "..")
        {
            anyhow::bail!("invalid project name {project:?}");
        }

        Ok(self.base_path.join(format!("{project}.git")))
    }
}
