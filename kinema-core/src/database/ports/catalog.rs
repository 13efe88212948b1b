use async_trait::async_trait;

use crate::error::Result;
use crate::types::{KnownHashEntry, VideoHash};

/// Read side of the curated hash catalog. Writes exist only for seeding.
#[async_trait]
pub trait KnownHashRepository: Send + Sync {
    async fn lookup(&self, hash: &VideoHash) -> Result<Option<KnownHashEntry>>;

    async fn insert_known(&self, entry: KnownHashEntry) -> Result<()>;

    async fn known_count(&self) -> Result<usize>;
}
