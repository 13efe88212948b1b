use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::FolderID;

/// Role flags carried by a registered folder. Only `watched` affects the
/// ingestion pipeline; the other two are stored for import tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRoles {
    pub source: bool,
    pub destination: bool,
    pub watched: bool,
}

impl Default for FolderRoles {
    fn default() -> Self {
        Self {
            source: true,
            destination: false,
            watched: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub id: FolderID,
    /// Canonical absolute path; unique across registered folders.
    pub path: PathBuf,
    pub roles: FolderRoles,
    pub created_at: DateTime<Utc>,
}
