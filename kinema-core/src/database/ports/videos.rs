use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CrossReference, MediaLink, VideoHash, VideoRecord};

/// Repository for hashed video content and the cross references that mark
/// it recognized.
///
/// Videos and cross references live behind one port because
/// [`VideoRepository::mark_recognized`] must update both atomically.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_video(&self, hash: &VideoHash) -> Result<Option<VideoRecord>>;

    /// Insert or refresh a video row keyed by hash. An existing row keeps its
    /// `recognized` flag and creation time; digests, size and last path are
    /// replaced. Returns the stored row.
    async fn upsert_video(&self, record: VideoRecord) -> Result<VideoRecord>;

    /// Remove the video and any cross reference pointing from it.
    async fn delete_video(&self, hash: &VideoHash) -> Result<bool>;

    async fn list_videos(&self) -> Result<Vec<VideoRecord>>;

    /// Create the cross reference for `hash` and flip `recognized` in one
    /// step. Calling it again for an already linked video returns the
    /// existing reference unchanged. Fails with `NotFound` when no video row
    /// exists for the hash.
    async fn mark_recognized(
        &self,
        hash: &VideoHash,
        media: MediaLink,
    ) -> Result<CrossReference>;

    async fn cross_reference(
        &self,
        hash: &VideoHash,
    ) -> Result<Option<CrossReference>>;
}
