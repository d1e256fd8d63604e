//! Composite segment keys.
//!
//! Keys are compared by the store as raw bytes, so the encoding must make
//! byte order equal to (series id, first timestamp) order:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ series id: 16 bytes (BE)     │ timestamp ^ 1<<63: 8 bytes BE │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Flipping the sign bit maps `i64::MIN..=i64::MAX` onto `0..=u64::MAX`, so
//! negative timestamps sort before positive ones.

use crate::error::{Result, StrataError};
use crate::segment::{SeriesId, Timestamp};

/// Size of an encoded segment key in bytes.
pub const KEY_SIZE: usize = 24;

const SERIES_SIZE: usize = 16;
const SIGN_BIT: u64 = 1 << 63;

/// Store key of a segment: its series and the timestamp of its first point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    /// Series the segment belongs to.
    pub series: SeriesId,
    /// Timestamp of the first point in the segment.
    pub timestamp: Timestamp,
}

impl SegmentKey {
    /// Creates a key.
    pub fn new(series: SeriesId, timestamp: Timestamp) -> Self {
        Self { series, timestamp }
    }

    /// The smallest possible key of `series`.
    pub fn lowest(series: SeriesId) -> Self {
        Self::new(series, Timestamp::MIN)
    }

    /// The greatest possible key of `series`.
    pub fn highest(series: SeriesId) -> Self {
        Self::new(series, Timestamp::MAX)
    }

    /// Encodes the key into its ordered byte form.
    pub fn encode(&self) -> [u8; KEY_SIZE] {
        let mut bytes = [0u8; KEY_SIZE];
        bytes[..SERIES_SIZE].copy_from_slice(self.series.as_bytes());
        bytes[SERIES_SIZE..].copy_from_slice(&((self.timestamp as u64) ^ SIGN_BIT).to_be_bytes());
        bytes
    }

    /// Decodes a key produced by [`SegmentKey::encode`].
    ///
    /// # Errors
    ///
    /// Returns `StrataError::InvalidKey` if `bytes` is not `KEY_SIZE` long.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StrataError::InvalidKey(bytes.len()));
        }
        let mut series = [0u8; SERIES_SIZE];
        series.copy_from_slice(&bytes[..SERIES_SIZE]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[SERIES_SIZE..]);

        Ok(Self {
            series: SeriesId::from_bytes(series),
            timestamp: (u64::from_be_bytes(timestamp) ^ SIGN_BIT) as i64,
        })
    }

    /// Returns true if the encoded key belongs to `series`.
    pub fn has_series(bytes: &[u8], series: &SeriesId) -> bool {
        bytes.len() == KEY_SIZE && &bytes[..SERIES_SIZE] == series.as_bytes()
    }
}
