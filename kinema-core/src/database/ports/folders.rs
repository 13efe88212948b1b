use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::WatchedFolder;

/// Registered folders, unique by canonical path.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    async fn list_folders(&self) -> Result<Vec<WatchedFolder>>;

    async fn folder_by_path(&self, path: &Path) -> Result<Option<WatchedFolder>>;

    /// Fails with `Conflict` if a folder with the same path exists.
    async fn insert_folder(&self, folder: WatchedFolder) -> Result<WatchedFolder>;

    async fn delete_folder(&self, path: &Path) -> Result<bool>;
}
