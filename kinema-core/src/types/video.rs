use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::VideoHash;

/// The four digests computed in a single read pass over a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDigests {
    pub ed2k: VideoHash,
    /// CRC32 as 8 lowercase hex characters.
    pub crc32: String,
    pub md5: String,
    pub sha1: String,
}

/// One stored row per unique content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub hash: VideoHash,
    pub crc32: String,
    pub md5: String,
    pub sha1: String,
    pub file_size: u64,
    /// Path the content was last observed at.
    pub last_path: PathBuf,
    /// True iff a cross reference for this hash exists.
    pub recognized: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn unrecognized(
        digests: ContentDigests,
        file_size: u64,
        path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            hash: digests.ed2k,
            crc32: digests.crc32,
            md5: digests.md5,
            sha1: digests.sha1,
            file_size,
            last_path: path,
            recognized: false,
            created_at: now,
            updated_at: now,
        }
    }
}
