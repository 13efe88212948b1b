//! Content digests used to identify video files.

pub mod ed2k;

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use md5::Md5;
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

pub use ed2k::{ED2K_BLOCK_SIZE, Ed2kHasher};

use crate::error::{MediaError, Result};
use crate::types::{ContentDigests, VideoHash};

/// Below this chunk size the four digests are updated sequentially; fanning
/// out to the rayon pool costs more than it saves.
const PARALLEL_UPDATE_THRESHOLD: usize = 64 * 1024;

/// Computes [`ContentDigests`] for a file.
///
/// Implementations are blocking and are expected to be driven from
/// `spawn_blocking`. They must check `cancel` between reads and call
/// `progress(bytes_done, bytes_total)` as they advance.
pub trait ContentHasher: Send + Sync + fmt::Debug {
    fn hash_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<ContentDigests>;
}

/// ED2K, CRC32, MD5 and SHA1 accumulated side by side.
#[derive(Debug, Clone)]
pub struct DigestSet {
    ed2k: Ed2kHasher,
    crc32: crc32fast::Hasher,
    md5: Md5,
    sha1: Sha1,
}

impl Default for DigestSet {
    fn default() -> Self {
        Self::with_ed2k(Ed2kHasher::new())
    }
}

impl DigestSet {
    fn with_ed2k(ed2k: Ed2kHasher) -> Self {
        Self {
            ed2k,
            crc32: crc32fast::Hasher::new(),
            md5: Md5::new(),
            sha1: Sha1::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        let Self {
            ed2k,
            crc32,
            md5,
            sha1,
        } = self;

        if chunk.len() < PARALLEL_UPDATE_THRESHOLD {
            ed2k.update(chunk);
            crc32.update(chunk);
            Digest::update(md5, chunk);
            Digest::update(sha1, chunk);
            return;
        }

        rayon::join(
            || {
                rayon::join(|| ed2k.update(chunk), || crc32.update(chunk));
            },
            || {
                rayon::join(
                    || Digest::update(md5, chunk),
                    || Digest::update(sha1, chunk),
                );
            },
        );
    }

    pub fn finalize(self) -> ContentDigests {
        ContentDigests {
            ed2k: VideoHash::from_digest(self.ed2k.finalize()),
            crc32: format!("{:08x}", self.crc32.finalize()),
            md5: hex::encode(self.md5.finalize()),
            sha1: hex::encode(self.sha1.finalize()),
        }
    }
}

/// Default [`ContentHasher`]: one sequential read pass feeding all four
/// digests.
#[derive(Debug, Clone)]
pub struct MultiDigestHasher {
    read_buffer_bytes: usize,
    ed2k_block_size: usize,
}

impl MultiDigestHasher {
    pub fn new(read_buffer_bytes: usize) -> Self {
        Self {
            read_buffer_bytes: read_buffer_bytes.max(4096),
            ed2k_block_size: ED2K_BLOCK_SIZE,
        }
    }

    #[cfg(test)]
    fn with_block_size(mut self, block_size: usize) -> Self {
        self.ed2k_block_size = block_size;
        self
    }
}

impl Default for MultiDigestHasher {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl ContentHasher for MultiDigestHasher {
    fn hash_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<ContentDigests> {
        let mut file = File::open(path)?;
        let total = file.metadata()?.len();
        let mut digests =
            DigestSet::with_ed2k(Ed2kHasher::with_block_size(self.ed2k_block_size));
        let mut buffer = vec![0u8; self.read_buffer_bytes];
        let mut done: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(MediaError::Cancelled(format!(
                    "hashing {} cancelled after {done} bytes",
                    path.display()
                )));
            }

            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            digests.update(&buffer[..read]);
            done += read as u64;
            progress(done, total.max(done));
        }

        if done == 0 {
            progress(0, 0);
        }

        Ok(digests.finalize())
    }
}
