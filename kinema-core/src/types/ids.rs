use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MediaError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Strongly typed ID for stored movie rows
    MovieID
);
uuid_id!(
    /// Strongly typed ID for stored TV show rows
    SeriesID
);
uuid_id!(
    /// Strongly typed ID for stored TV episode rows
    EpisodeID
);
uuid_id!(
    /// Strongly typed ID for registered folders
    FolderID
);

/// Lowercase hex ED2K digest identifying a piece of video content
/// independent of where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoHash(String);

impl VideoHash {
    pub const HEX_LEN: usize = 32;

    pub fn parse(raw: &str) -> Result<Self, MediaError> {
        let trimmed = raw.trim();
        if trimmed.len() != Self::HEX_LEN
            || !trimmed.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(MediaError::InvalidMedia(format!(
                "'{raw}' is not a 32 character hex ED2K digest"
            )));
        }
        Ok(VideoHash(trimmed.to_ascii_lowercase()))
    }

    pub fn from_digest(digest: [u8; 16]) -> Self {
        VideoHash(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VideoHash {
    type Error = MediaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VideoHash::parse(&value)
    }
}

impl From<VideoHash> for String {
    fn from(value: VideoHash) -> Self {
        value.0
    }
}

impl fmt::Display for VideoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_hash_normalizes_case() {
        let hash = VideoHash::parse("5D886780825DB91BBC390F10F1B6C95C").unwrap();
        assert_eq!(hash.as_str(), "5d886780825db91bbc390f10f1b6c95c");
    }

    #[test]
    fn video_hash_rejects_bad_input() {
        assert!(VideoHash::parse("abc").is_err());
        assert!(VideoHash::parse("zz886780825db91bbc390f10f1b6c95c").is_err());
    }

    #[test]
    fn video_hash_serde_is_plain_string() {
        let hash = VideoHash::parse("31d6cfe0d16ae931b73c59d7e0c089c0").unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"31d6cfe0d16ae931b73c59d7e0c089c0\"");
        let back: VideoHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
