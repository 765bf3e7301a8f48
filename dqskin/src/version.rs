//! Persisted skin format version.

/// Leading bytes of a binary skin file.
pub const SKIN_FORMAT_MAGIC: [u8; 4] = *b"DQSK";

/// Bumped whenever the JSON or binary skin layout changes.
pub const SKIN_FORMAT_VERSION: u32 = 1;
