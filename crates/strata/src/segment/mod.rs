//! Segment data model: points, keys and the in-memory segment buffer.
//!
//! A time series is stored as a run of segments. Each segment is a
//! fixed-capacity, timestamp-ordered array of points persisted as a single
//! record in the underlying store, keyed by the series id and the timestamp
//! of its first point.
//!
//! ```text
//! key   = series id (16 bytes, big-endian) | first timestamp (8 bytes, order preserving)
//! value = count (u32 LE) | point record * count
//! ```

pub mod buffer;
pub mod key;

pub use buffer::{InsertOutcome, Segment};
pub use key::{SegmentKey, KEY_SIZE};

use std::fmt::Debug;
use uuid::Uuid;

/// Timestamp in ticks. Only the ordering is interpreted by the engine.
pub type Timestamp = i64;

/// Series identifier, supplied by the caller.
pub type SeriesId = Uuid;

/// A fixed-size point that can be stored in a segment.
///
/// Implementations must encode to exactly [`Point::ENCODED_SIZE`] bytes and
/// decode any such buffer back to an equal point.
pub trait Point: Copy + Debug + PartialEq {
    /// Size in bytes of one encoded point record.
    const ENCODED_SIZE: usize;

    /// Returns the timestamp that orders this point within its series.
    fn timestamp(&self) -> Timestamp;

    /// Writes the point record into `buf`, which is exactly `ENCODED_SIZE` long.
    fn encode_into(&self, buf: &mut [u8]);

    /// Reads a point record from `buf`, which is exactly `ENCODED_SIZE` long.
    fn decode_from(buf: &[u8]) -> Self;
}

/// The default point: a timestamp, a quality/flags word and a value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeseriesPoint {
    /// Timestamp of the point.
    pub timestamp: Timestamp,
    /// Quality or flag bits attached to the value.
    pub flags: u64,
    /// The measured value.
    pub value: f64,
}

impl TimeseriesPoint {
    /// Creates a new point.
    pub fn new(timestamp: Timestamp, flags: u64, value: f64) -> Self {
        Self {
            timestamp,
            flags,
            value,
        }
    }

    /// Returns the flags of the point.
    pub fn flags(&self) -> u64 {
        self.flags
    }

    /// Returns the value of the point.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Point for TimeseriesPoint {
    const ENCODED_SIZE: usize = 24;

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[8..16].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..24].copy_from_slice(&self.value.to_le_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        let mut timestamp = [0u8; 8];
        let mut flags = [0u8; 8];
        let mut value = [0u8; 8];
        timestamp.copy_from_slice(&buf[0..8]);
        flags.copy_from_slice(&buf[8..16]);
        value.copy_from_slice(&buf[16..24]);
        Self {
            timestamp: i64::from_le_bytes(timestamp),
            flags: u64::from_le_bytes(flags),
            value: f64::from_le_bytes(value),
        }
    }
}

/// How a found position relates to a requested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    /// Positioned on the greatest timestamp strictly less than the target.
    Less,
    /// Positioned on a point with exactly the target timestamp.
    Equal,
    /// No point at or before the target exists.
    Greater,
}

impl CompareResult {
    /// Returns true for [`CompareResult::Less`].
    pub fn is_less(&self) -> bool {
        matches!(self, CompareResult::Less)
    }

    /// Returns true for [`CompareResult::Equal`].
    pub fn is_equal(&self) -> bool {
        matches!(self, CompareResult::Equal)
    }

    /// Returns true for [`CompareResult::Greater`].
    pub fn is_greater(&self) -> bool {
        matches!(self, CompareResult::Greater)
    }
}

/// Result of searching inside a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSearch {
    /// Relation of the point at `index` to the target.
    pub result: CompareResult,
    /// Index of the found point (0 for `Greater`).
    pub index: usize,
}
