//! In-memory segment buffer.
//!
//! A [`Segment`] holds at most `capacity` points in strictly ascending
//! timestamp order. It never drops data: inserting a new timestamp into a
//! full segment is reported as [`InsertOutcome::Full`] and the caller decides
//! how to split.
//!
//! ## Record Layout
//!
//! ```text
//! ┌──────────────────┬───────────────────────────────────────┐
//! │ count: u32 (LE)  │ count * P::ENCODED_SIZE point records │
//! └──────────────────┴───────────────────────────────────────┘
//! ```

use crate::error::{Result, StrataError};
use crate::segment::{CompareResult, Point, SegmentSearch, Timestamp};

/// Size of the point count that prefixes a serialized segment.
pub const COUNT_SIZE: usize = 4;

/// Outcome of [`Segment::insert`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsertOutcome<P> {
    /// The point was added at the given index.
    Inserted(usize),
    /// A point with the same timestamp at the given index was overwritten.
    Replaced(usize),
    /// The segment is full and the timestamp is new; the point is handed back.
    Full(P),
}

/// A fixed-capacity, timestamp-ordered run of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<P: Point> {
    points: Vec<P>,
    capacity: usize,
}

impl<P: Point> Segment<P> {
    /// Creates an empty segment that holds up to `capacity` points.
    ///
    /// Storage grows with the points inserted, not with `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            points: Vec::new(),
            capacity,
        }
    }

    /// Builds a segment from points that are already strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::CorruptSegment` if the points exceed `capacity`
    /// or are not strictly ascending by timestamp.
    pub fn from_points(points: Vec<P>, capacity: usize) -> Result<Self> {
        if points.len() > capacity {
            return Err(StrataError::CorruptSegment(format!(
                "{} points exceed capacity {}",
                points.len(),
                capacity
            )));
        }
        if let Some(pos) = points
            .windows(2)
            .position(|pair| pair[0].timestamp() >= pair[1].timestamp())
        {
            return Err(StrataError::CorruptSegment(format!(
                "timestamps not ascending at index {}",
                pos + 1
            )));
        }
        Ok(Self { points, capacity })
    }

    /// Maximum number of points.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the segment holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns true if no new timestamp fits.
    pub fn is_full(&self) -> bool {
        self.points.len() >= self.capacity
    }

    /// Timestamp of the first point.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.points.first().map(Point::timestamp)
    }

    /// Timestamp of the last point.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.points.last().map(Point::timestamp)
    }

    /// Returns the point at `index`.
    pub fn get(&self, index: usize) -> Option<&P> {
        self.points.get(index)
    }

    /// Returns the points in timestamp order.
    pub fn points(&self) -> &[P] {
        &self.points
    }

    /// Returns true if `timestamp` lies within `[first, last]`.
    pub fn spans(&self, timestamp: Timestamp) -> bool {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => first <= timestamp && timestamp <= last,
            _ => false,
        }
    }

    /// Removes all points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    fn find(&self, timestamp: Timestamp) -> std::result::Result<usize, usize> {
        self.points
            .binary_search_by(|point| point.timestamp().cmp(&timestamp))
    }

    /// Finds the greatest point at or before `timestamp`.
    ///
    /// Returns `None` for an empty segment. `Greater` means every point in the
    /// segment is after `timestamp`; its index is 0.
    pub fn search(&self, timestamp: Timestamp) -> Option<SegmentSearch> {
        let last = self.points.last()?;
        if last.timestamp() < timestamp {
            return Some(SegmentSearch {
                result: CompareResult::Less,
                index: self.points.len() - 1,
            });
        }

        let found = match self.find(timestamp) {
            Ok(index) => SegmentSearch {
                result: CompareResult::Equal,
                index,
            },
            Err(0) => SegmentSearch {
                result: CompareResult::Greater,
                index: 0,
            },
            Err(index) => SegmentSearch {
                result: CompareResult::Less,
                index: index - 1,
            },
        };
        Some(found)
    }

    /// Inserts `point`, overwriting any point with the same timestamp.
    pub fn insert(&mut self, point: P) -> InsertOutcome<P> {
        let timestamp = point.timestamp();

        // Appends skip the binary search.
        if self.last_timestamp().map_or(true, |last| last < timestamp) {
            if self.is_full() {
                return InsertOutcome::Full(point);
            }
            self.points.push(point);
            return InsertOutcome::Inserted(self.points.len() - 1);
        }

        match self.find(timestamp) {
            Ok(index) => {
                self.points[index] = point;
                InsertOutcome::Replaced(index)
            }
            Err(_) if self.is_full() => InsertOutcome::Full(point),
            Err(index) => {
                self.points.insert(index, point);
                InsertOutcome::Inserted(index)
            }
        }
    }

    /// Splits the segment at `at`, returning the points `[at..]` as a new
    /// segment with the same capacity.
    pub fn split_off(&mut self, at: usize) -> Segment<P> {
        Segment {
            points: self.points.split_off(at),
            capacity: self.capacity,
        }
    }

    /// Size of the serialized form in bytes.
    pub fn encoded_len(&self) -> usize {
        COUNT_SIZE + self.points.len() * P::ENCODED_SIZE
    }

    /// Serializes the segment into its record layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.encoded_len()];
        bytes[..COUNT_SIZE].copy_from_slice(&(self.points.len() as u32).to_le_bytes());
        for (point, record) in self
            .points
            .iter()
            .zip(bytes[COUNT_SIZE..].chunks_exact_mut(P::ENCODED_SIZE))
        {
            point.encode_into(record);
        }
        bytes
    }

    /// Deserializes a segment record.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::CorruptSegment` if the record is truncated, its
    /// body is not a whole number of point records, the count disagrees with
    /// the body, the segment is empty or over capacity, or the timestamps are
    /// not strictly ascending.
    pub fn deserialize(bytes: &[u8], capacity: usize) -> Result<Self> {
        if bytes.len() < COUNT_SIZE {
            return Err(StrataError::CorruptSegment(format!(
                "record of {} bytes has no point count",
                bytes.len()
            )));
        }
        let body = &bytes[COUNT_SIZE..];
        if body.len() % P::ENCODED_SIZE != 0 {
            return Err(StrataError::CorruptSegment(format!(
                "body of {} bytes is not a multiple of the {} byte point record",
                body.len(),
                P::ENCODED_SIZE
            )));
        }

        let mut count = [0u8; COUNT_SIZE];
        count.copy_from_slice(&bytes[..COUNT_SIZE]);
        let count = u32::from_le_bytes(count) as usize;
        let records = body.len() / P::ENCODED_SIZE;
        if count != records {
            return Err(StrataError::CorruptSegment(format!(
                "count {count} does not match {records} stored records"
            )));
        }
        if count == 0 {
            return Err(StrataError::CorruptSegment("empty segment".to_string()));
        }

        let points = body
            .chunks_exact(P::ENCODED_SIZE)
            .map(P::decode_from)
            .collect();
        Self::from_points(points, capacity)
    }
}
