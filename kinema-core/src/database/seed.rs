//! Known-hash catalog seeding.

use std::path::Path;

use tracing::info;

use crate::database::ports::KnownHashRepository;
use crate::error::{MediaError, Result};
use crate::types::{KnownHashEntry, KnownMedia, VideoHash};

/// Entries every fresh store starts with.
pub fn builtin_catalog() -> Result<Vec<KnownHashEntry>> {
    Ok(vec![KnownHashEntry {
        hash: VideoHash::parse("5d886780825db91bbc390f10f1b6c95c")?,
        media: KnownMedia::Movie { tmdb_id: 348 },
    }])
}

/// Insert the built-in catalog entries.
pub async fn seed_builtin(repo: &dyn KnownHashRepository) -> Result<usize> {
    let entries = builtin_catalog()?;
    let count = entries.len();
    for entry in entries {
        repo.insert_known(entry).await?;
    }
    Ok(count)
}

/// Load additional catalog entries from a JSON array of
/// `{"hash": "...", "media": {"kind": "movie", "tmdb_id": 348}}` objects.
pub async fn seed_from_file(
    repo: &dyn KnownHashRepository,
    path: &Path,
) -> Result<usize> {
    let raw = tokio::fs::read(path).await?;
    let entries: Vec<KnownHashEntry> =
        serde_json::from_slice(&raw).map_err(|err| {
            MediaError::InvalidMedia(format!(
                "catalog file {} is malformed: {err}",
                path.display()
            ))
        })?;
    let count = entries.len();
    for entry in entries {
        repo.insert_known(entry).await?;
    }
    info!(path = %path.display(), count, "loaded known-hash catalog entries");
    Ok(count)
}
