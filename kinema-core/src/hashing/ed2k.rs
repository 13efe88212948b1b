use md4::{Digest, Md4};

/// ED2K block size in bytes.
pub const ED2K_BLOCK_SIZE: usize = 9_728_000;

/// Incremental ED2K digest.
///
/// Input is cut into fixed blocks; each block is MD4 hashed. A single block
/// (or empty input) yields that block's digest directly, otherwise the result
/// is MD4 over the concatenated block digests. Input that ends exactly on a
/// block boundary does not get an extra empty block appended.
#[derive(Debug, Clone)]
pub struct Ed2kHasher {
    block_size: usize,
    current: Md4,
    filled: usize,
    block_digests: Vec<[u8; 16]>,
}

impl Default for Ed2kHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Ed2kHasher {
    pub fn new() -> Self {
        Self::with_block_size(ED2K_BLOCK_SIZE)
    }

    /// Smaller block sizes only make sense in tests.
    pub(crate) fn with_block_size(block_size: usize) -> Self {
        debug_assert!(block_size > 0);
        Self {
            block_size,
            current: Md4::new(),
            filled: 0,
            block_digests: Vec::new(),
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = self.block_size - self.filled;
            let take = room.min(data.len());
            self.current.update(&data[..take]);
            self.filled += take;
            data = &data[take..];

            if self.filled == self.block_size {
                let block = std::mem::replace(&mut self.current, Md4::new());
                self.block_digests.push(block.finalize().into());
                self.filled = 0;
            }
        }
    }

    pub fn finalize(mut self) -> [u8; 16] {
        if self.filled > 0 || self.block_digests.is_empty() {
            self.block_digests.push(self.current.finalize().into());
        }

        if self.block_digests.len() == 1 {
            return self.block_digests[0];
        }

        let mut outer = Md4::new();
        for digest in &self.block_digests {
            outer.update(digest);
        }
        outer.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md4_hex(data: &[u8]) -> String {
        hex::encode(Md4::digest(data))
    }

    fn ed2k_hex(block_size: usize, data: &[u8]) -> String {
        let mut hasher = Ed2kHasher::with_block_size(block_size);
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    #[test]
    fn empty_input_is_md4_of_nothing() {
        let hasher = Ed2kHasher::new();
        assert_eq!(
            hex::encode(hasher.finalize()),
            "31d6cfe0d16ae931b73c59d7e0c089c0"
        );
    }

    #[test]
    fn single_block_is_plain_md4() {
        let mut hasher = Ed2kHasher::new();
        hasher.update(b"abc");
        assert_eq!(
            hex::encode(hasher.finalize()),
            "a448017aaf21d8525fc10ae87aa6729d"
        );
    }

    #[test]
    fn exact_single_block_is_plain_md4() {
        assert_eq!(ed2k_hex(4, b"abcd"), md4_hex(b"abcd"));
    }

    #[test]
    fn multiple_blocks_hash_the_block_digests() {
        let mut concat = Vec::new();
        concat.extend_from_slice(&Md4::digest(b"abcd"));
        concat.extend_from_slice(&Md4::digest(b"efgh"));
        concat.extend_from_slice(&Md4::digest(b"ij"));
        assert_eq!(ed2k_hex(4, b"abcdefghij"), md4_hex(&concat));
    }

    #[test]
    fn boundary_input_has_no_trailing_empty_block() {
        let mut concat = Vec::new();
        concat.extend_from_slice(&Md4::digest(b"abcd"));
        concat.extend_from_slice(&Md4::digest(b"efgh"));
        assert_eq!(ed2k_hex(4, b"abcdefgh"), md4_hex(&concat));
    }

    #[test]
    fn chunking_does_not_change_result() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let whole = ed2k_hex(64, &data);

        let mut hasher = Ed2kHasher::with_block_size(64);
        for chunk in data.chunks(7) {
            hasher.update(chunk);
        }
        assert_eq!(hex::encode(hasher.finalize()), whole);
    }
}
