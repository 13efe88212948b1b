//! Folder registration: the management surface the server exposes and the
//! glue between stored folders, OS watches and in-flight work.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::database::ports::FolderRepository;
use crate::error::{MediaError, Result};
use crate::scan::change_queue::ChangeQueue;
use crate::scan::fs_watch::FolderWatcher;
use crate::scan::orchestration::job::normalize_path;
use crate::scan::orchestration::orchestrator::Orchestrator;
use crate::types::{FolderID, FolderRoles, WatchedFolder};

/// Result of [`FolderManager::add_folder`]. `created` is false when the
/// folder was already registered.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddedFolder {
    pub folder: WatchedFolder,
    pub created: bool,
}

pub struct FolderManager {
    repo: Arc<dyn FolderRepository>,
    watcher: Arc<FolderWatcher>,
    changes: Arc<ChangeQueue>,
    orchestrator: Orchestrator,
    scan_on_add: bool,
    // Serializes add/remove so concurrent calls for one path cannot both insert.
    mutations: Mutex<()>,
}

impl fmt::Debug for FolderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderManager")
            .field("watcher", &self.watcher)
            .field("scan_on_add", &self.scan_on_add)
            .finish_non_exhaustive()
    }
}

impl FolderManager {
    pub fn new(
        repo: Arc<dyn FolderRepository>,
        watcher: Arc<FolderWatcher>,
        changes: Arc<ChangeQueue>,
        orchestrator: Orchestrator,
        scan_on_add: bool,
    ) -> Self {
        Self {
            repo,
            watcher,
            changes,
            orchestrator,
            scan_on_add,
            mutations: Mutex::new(()),
        }
    }

    pub async fn add_folder(&self, path: &Path, roles: FolderRoles) -> Result<AddedFolder> {
        let canonical = canonical_directory(path).await?;
        let _guard = self.mutations.lock().await;

        if let Some(existing) = self.repo.folder_by_path(&canonical).await? {
            info!(folder = %canonical.display(), "folder already registered");
            return Ok(AddedFolder {
                folder: existing,
                created: false,
            });
        }

        let folder = self
            .repo
            .insert_folder(WatchedFolder {
                id: FolderID::new(),
                path: canonical,
                roles,
                created_at: Utc::now(),
            })
            .await?;
        info!(folder = %folder.path.display(), watched = folder.roles.watched, "folder registered");

        self.activate(&folder).await?;
        Ok(AddedFolder {
            folder,
            created: true,
        })
    }

    /// Unregister a folder, stop its watch and drop every pending or running
    /// job for files inside it.
    pub async fn remove_folder(&self, path: &Path) -> Result<WatchedFolder> {
        let target = match tokio::fs::canonicalize(path).await {
            Ok(canonical) => canonical,
            // The directory may already be gone; match on the stored path.
            Err(_) => normalize_path(path),
        };
        let _guard = self.mutations.lock().await;

        let Some(folder) = self.repo.folder_by_path(&target).await? else {
            return Err(MediaError::NotFound(format!(
                "folder {} is not registered",
                path.display()
            )));
        };

        self.watcher.unwatch(&folder.path);
        let dropped = self.changes.remove_under(&folder.path);
        let cancelled = self.orchestrator.cancel_under(&folder.path).await;
        self.repo.delete_folder(&folder.path).await?;

        info!(folder = %folder.path.display(), dropped, cancelled, "folder removed");
        Ok(folder)
    }

    pub async fn list_folders(&self) -> Result<Vec<WatchedFolder>> {
        self.repo.list_folders().await
    }

    /// Re-establish watches for every stored folder. Called on startup.
    pub async fn restore(&self) -> Result<usize> {
        let folders = self.repo.list_folders().await?;
        let _guard = self.mutations.lock().await;
        for folder in &folders {
            self.activate(folder).await?;
        }
        Ok(folders.len())
    }

    async fn activate(&self, folder: &WatchedFolder) -> Result<()> {
        if !folder.roles.watched {
            return Ok(());
        }
        if !self.watcher.watch(&folder.path).await {
            warn!(folder = %folder.path.display(), "initial watch failed, retrying in background");
        }
        if self.scan_on_add {
            let found = self.watcher.scan(&folder.path).await?;
            let queued = found
                .iter()
                .filter(|path| self.changes.enqueue(path))
                .count();
            info!(folder = %folder.path.display(), found = found.len(), queued, "queued existing files");
        }
        Ok(())
    }
}

async fn canonical_directory(path: &Path) -> Result<PathBuf> {
    let canonical = tokio::fs::canonicalize(path).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            MediaError::NotFound(format!("folder {} does not exist", path.display()))
        } else {
            MediaError::Io(err)
        }
    })?;
    let metadata = tokio::fs::metadata(&canonical).await?;
    if !metadata.is_dir() {
        return Err(MediaError::InvalidMedia(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(canonical)
}
