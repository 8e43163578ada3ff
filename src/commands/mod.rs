//! Batch operations
//!
//! Every operation is a method on [`BatchService`], grouped by file:
//!
//! - `merge_change`: build a batch from patch sets
//! - `close`: publish download refs and freeze the batch
//! - `submit`: move the real branches to the batch tips
//! - `remove`: delete a batch with its download refs, or expire it
//! - `touch`: extend a batch's lifetime
//! - `list`: enumerate stored batches
//! - `cleaner`: periodic expiry of old batches

pub mod cleaner;
pub mod close;
pub mod list;
pub mod merge_change;
pub mod remove;
pub mod submit;
pub mod touch;

use crate::areas::batch_store::BatchStore;
use crate::areas::ref_updater::RefUpdater;
use crate::areas::repository_manager::RepositoryManager;
use crate::config::BatchConfig;
use crate::errors::{BatchError, BatchResult};
use crate::artifacts::batch::Batch;
use crate::services::changes::ChangeTracker;
use crate::services::clock::Clock;
use crate::services::events::RefUpdateListener;
use crate::services::identity::{Account, ServerIdent};
use crate::services::permissions::PermissionBackend;
use std::path::PathBuf;
use std::sync::Arc;

/// Entry point of the batch operations, shared between requests and the cleaner
pub struct BatchService {
    config: BatchConfig,
    repositories: RepositoryManager,
    store: BatchStore,
    ref_updater: RefUpdater,
    server_ident: ServerIdent,
    changes: Arc<dyn ChangeTracker>,
    permissions: Arc<dyn PermissionBackend>,
    clock: Arc<dyn Clock>,
}

impl BatchService {
    /// Serve the repositories found below `base_path`
    pub fn new(
        config: BatchConfig,
        base_path: impl Into<PathBuf>,
        changes: Arc<dyn ChangeTracker>,
        permissions: Arc<dyn PermissionBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let repositories = RepositoryManager::new(base_path);
        let server_ident = config.server_ident();
        let store = BatchStore::new(
            repositories.clone(),
            config.store.project.clone(),
            server_ident.clone(),
            clock.clone(),
        );
        let ref_updater = RefUpdater::new(repositories.clone(), server_ident.clone(), clock.clone());

        BatchService {
            config,
            repositories,
            store,
            ref_updater,
            server_ident,
            changes,
            permissions,
            clock,
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn RefUpdateListener>) {
        self.ref_updater.add_listener(listener);
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    pub fn store(&self) -> &BatchStore {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn ensure_owner(batch: &Batch, caller: &Account) -> BatchResult<()> {
        if batch.owner != caller.id {
            return Err(BatchError::PermissionDenied(format!(
                "account {} is not the owner of batch {}",
                caller.id, batch.id
            )));
        }
        Ok(())
    }
}
