//! Per-series write buffer shared by every cursor of a transaction.
//!
//! A read-write [`Transaction`] keeps at most one [`PendingSegment`] per
//! series: the segment the most recent insert into that series landed in.
//! All cursors insert through it, so two cursors writing the same series
//! modify the same in-memory segment instead of overwriting each other's
//! copies. The buffer is written through before any store lookup of its
//! series and on commit.
//!
//! [`Transaction`]: crate::engine::Transaction

use crate::engine::transaction::SegmentBatch;
use crate::segment::{Point, Segment, SeriesId, Timestamp};

/// The segment receiving inserts for one series.
#[derive(Debug)]
pub(crate) struct PendingSegment<P: Point> {
    pub(crate) segment: Segment<P>,
    /// Key the segment is stored under, `None` if never written.
    pub(crate) stored_key: Option<Timestamp>,
    pub(crate) dirty: bool,
    /// The segment is known to be the last one of its series.
    pub(crate) tail: bool,
}

impl<P: Point> PendingSegment<P> {
    /// A segment read from the store under `key`.
    pub(crate) fn loaded(key: Timestamp, segment: Segment<P>, tail: bool) -> Self {
        Self {
            segment,
            stored_key: Some(key),
            dirty: false,
            tail,
        }
    }

    /// A segment that does not exist in the store yet.
    pub(crate) fn fresh(segment: Segment<P>, tail: bool) -> Self {
        let dirty = !segment.is_empty();
        Self {
            segment,
            stored_key: None,
            dirty,
            tail,
        }
    }

    /// Returns true if an insert at `timestamp` belongs in this segment.
    pub(crate) fn owns(&self, timestamp: Timestamp) -> bool {
        match self.segment.last_timestamp() {
            Some(last) => self.segment.spans(timestamp) || (timestamp > last && self.tail),
            None => false,
        }
    }

    /// Returns the point stored at exactly `timestamp`.
    pub(crate) fn point_at(&self, timestamp: Timestamp) -> Option<P> {
        exact_point(&self.segment, timestamp)
    }

    /// Builds the write that stores the segment under its first timestamp,
    /// dropping a stale key. Returns `None` when nothing needs writing.
    pub(crate) fn write_back_batch(&self, series: SeriesId) -> Option<SegmentBatch> {
        if !self.dirty {
            return None;
        }
        let first = self.segment.first_timestamp()?;
        let mut batch = SegmentBatch::new(series);
        if let Some(stale) = self.stored_key.filter(|&key| key != first) {
            batch.delete(stale);
        }
        batch.put(&self.segment);
        Some(batch)
    }

    /// Records a successful write-back.
    pub(crate) fn mark_stored(&mut self) {
        if let Some(first) = self.segment.first_timestamp() {
            self.stored_key = Some(first);
        }
        self.dirty = false;
    }
}

/// Returns the point of `segment` stored at exactly `timestamp`.
pub(crate) fn exact_point<P: Point>(segment: &Segment<P>, timestamp: Timestamp) -> Option<P> {
    segment
        .search(timestamp)
        .filter(|found| found.result.is_equal())
        .and_then(|found| segment.get(found.index).copied())
}
