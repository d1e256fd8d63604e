//! Per-series cursor: navigation, search and inserts.
//!
//! A cursor presents one series as an ordered sequence of points. It keeps
//! a read copy of the segment holding its current point and crosses segment
//! boundaries by seeking the store for the neighbouring key.
//!
//! # State Machine
//!
//! ```text
//! Unbound ──change_timeseries──► Bound ──move/search/insert──► Positioned
//!    │                             ▲                              │
//!    │                             └──────change_timeseries───────┘
//!    └──────────────────────────── close ─────────────────────────► Closed
//! ```
//!
//! # Writes
//!
//! Inserts go to the transaction, which buffers one pending segment per
//! series for all of its cursors. A cursor's copy is reloaded around its
//! current point whenever any insert happened since it was read, so every
//! cursor sees every write of its transaction.

use tracing::{debug, warn};

use crate::engine::transaction::Transaction;
use crate::error::{Result, StrataError};
use crate::segment::{CompareResult, Point, Segment, SeriesId, TimeseriesPoint, Timestamp};

/// Lifecycle state of a [`TimeseriesCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No series selected.
    Unbound,
    /// A series is selected but the cursor has no current point.
    Bound,
    /// The cursor is on a point of the selected series.
    Positioned,
    /// The cursor has been closed.
    Closed,
}

/// A positionable view over the points of one series.
///
/// Created by [`Transaction::cursor`] or [`Transaction::open_timeseries`].
/// Any number of cursors of one transaction may read and write the same
/// series.
pub struct TimeseriesCursor<'t, 'e, P: Point> {
    txn: &'t Transaction<'e, P>,
    state: CursorState,
    series: Option<SeriesId>,
    /// Copy of the segment holding the current point.
    segment: Segment<P>,
    /// Transaction generation `segment` was read at, `None` if not loaded.
    loaded_at: Option<u64>,
    position: usize,
    /// Timestamp of the current point.
    at: Timestamp,
}

impl<'t, 'e, P: Point> TimeseriesCursor<'t, 'e, P> {
    pub(crate) fn new(txn: &'t Transaction<'e, P>) -> Self {
        Self {
            txn,
            state: CursorState::Unbound,
            series: None,
            segment: Segment::new(txn.segment_capacity()),
            loaded_at: None,
            position: 0,
            at: 0,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Returns the series the cursor is bound to.
    pub fn timeseries(&self) -> Option<SeriesId> {
        self.series
    }

    /// Binds the cursor to `series`, flushing pending writes of the previous
    /// series first.
    ///
    /// The cursor ends up bound without a position. The series does not need
    /// to have any data.
    pub fn change_timeseries(&mut self, series: SeriesId) -> Result<()> {
        self.ensure_open()?;
        if let Some(previous) = self.series {
            self.txn.flush_series(previous)?;
        }
        self.unload();
        self.series = Some(series);
        self.state = CursorState::Bound;
        Ok(())
    }

    /// Inserts `point`, replacing any point with the same timestamp.
    ///
    /// The cursor is left on the inserted point.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::ReadOnlyViolation` in a read-only transaction,
    /// `StrataError::CursorUnbound` without a series and
    /// `StrataError::CursorClosed` after close.
    pub fn insert(&mut self, point: P) -> Result<()> {
        let series = self.bound_series()?;
        self.txn.insert(series, point)?;
        self.at = point.timestamp();
        self.loaded_at = None;
        self.state = CursorState::Positioned;
        Ok(())
    }

    /// Moves to the first point of the series.
    ///
    /// Returns false, leaving the cursor bound without a position, if the
    /// series has no data.
    pub fn move_first(&mut self) -> Result<bool> {
        let series = self.bound_series()?;
        match self.txn.first_segment(series)? {
            Some((_, segment)) => {
                self.load(segment);
                self.settle(0);
                Ok(true)
            }
            None => {
                self.unload();
                Ok(false)
            }
        }
    }

    /// Moves to the last point of the series.
    ///
    /// Returns false, leaving the cursor bound without a position, if the
    /// series has no data.
    pub fn move_last(&mut self) -> Result<bool> {
        let series = self.bound_series()?;
        match self.txn.last_segment(series)? {
            Some((_, segment)) => {
                self.load(segment);
                self.settle(self.segment.len().saturating_sub(1));
                Ok(true)
            }
            None => {
                self.unload();
                Ok(false)
            }
        }
    }

    /// Moves to the next point.
    ///
    /// Without a position this is [`move_first`](Self::move_first). At the
    /// last point it returns false and the cursor stays where it is.
    pub fn move_next(&mut self) -> Result<bool> {
        let series = self.bound_series()?;
        self.sync(series)?;
        if self.state != CursorState::Positioned {
            return self.move_first();
        }
        if self.position + 1 < self.segment.len() {
            self.settle(self.position + 1);
            return Ok(true);
        }
        self.load_next(series)
    }

    /// Moves to the previous point.
    ///
    /// Without a position this is [`move_last`](Self::move_last). At the
    /// first point it returns false and the cursor stays where it is.
    pub fn move_previous(&mut self) -> Result<bool> {
        let series = self.bound_series()?;
        self.sync(series)?;
        if self.state != CursorState::Positioned {
            return self.move_last();
        }
        if self.position > 0 {
            self.settle(self.position - 1);
            return Ok(true);
        }
        self.load_previous(series)
    }

    /// Returns the point the cursor is on.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NotPositioned` unless the cursor is positioned
    /// and `StrataError::CursorClosed` after close.
    pub fn current(&self) -> Result<P> {
        self.ensure_open()?;
        if self.state != CursorState::Positioned {
            return Err(StrataError::NotPositioned);
        }
        if self.is_current() {
            return self
                .segment
                .get(self.position)
                .copied()
                .ok_or(StrataError::NotPositioned);
        }
        let series = self.bound_series()?;
        self.txn
            .point_at(series, self.at)?
            .ok_or(StrataError::NotPositioned)
    }

    /// Positions the cursor on the greatest point at or before `timestamp`.
    ///
    /// Returns `Equal` or `Less` for the point found. `Greater` means no
    /// point at or before `timestamp` exists; the cursor is then left on the
    /// first point of the series, or bound without a position if the series
    /// is empty.
    pub fn search(&mut self, timestamp: Timestamp) -> Result<CompareResult> {
        let series = self.bound_series()?;

        // An up-to-date copy is authoritative for timestamps it spans.
        if self.is_current() && self.segment.spans(timestamp) {
            if let Some(found) = self.segment.search(timestamp) {
                self.settle(found.index);
                return Ok(found.result);
            }
        }

        if let Some((_, segment)) = self.txn.floor_segment(series, timestamp)? {
            self.load(segment);
            if let Some(found) = self.segment.search(timestamp) {
                self.settle(found.index);
                return Ok(found.result);
            }
        }

        self.move_first()?;
        Ok(CompareResult::Greater)
    }

    /// Writes the pending writes of the bound series through to the store.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        match self.series {
            Some(series) => self.txn.flush_series(series),
            None => Ok(()),
        }
    }

    /// Flushes and closes the cursor.
    ///
    /// Every later operation fails with `StrataError::CursorClosed`. The
    /// cursor is closed even if the flush fails.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        let flushed = self.flush();
        self.segment.clear();
        self.loaded_at = None;
        self.state = CursorState::Closed;
        flushed
    }

    /// Visits every point of the series in order.
    ///
    /// Returns the number of points visited; the cursor is left on the last.
    pub fn for_each<F: FnMut(&P)>(&mut self, mut f: F) -> Result<usize> {
        if !self.move_first()? {
            return Ok(0);
        }
        self.visit(None, &mut f)
    }

    /// Visits points in order starting at the point in effect at `start`.
    ///
    /// The first point visited is the one [`search`](Self::search) finds for
    /// `start`, or the first point of the series if nothing precedes `start`.
    pub fn for_each_from<F: FnMut(&P)>(&mut self, start: Timestamp, mut f: F) -> Result<usize> {
        self.search(start)?;
        if self.state != CursorState::Positioned {
            return Ok(0);
        }
        self.visit(None, &mut f)
    }

    /// Like [`for_each_from`](Self::for_each_from), stopping before the
    /// first point at or after `end`.
    pub fn for_each_range<F: FnMut(&P)>(
        &mut self,
        start: Timestamp,
        end: Timestamp,
        mut f: F,
    ) -> Result<usize> {
        self.search(start)?;
        if self.state != CursorState::Positioned {
            return Ok(0);
        }
        self.visit(Some(end), &mut f)
    }

    /// Logs the cursor state and the stored segments of its series at debug
    /// level.
    pub fn dump(&mut self) -> Result<()> {
        let series = self.bound_series()?;
        debug!(
            %series,
            state = ?self.state,
            position = self.position,
            at = self.at,
            loaded_first = ?self.segment.first_timestamp(),
            "Cursor"
        );
        for info in self.txn.segments(series)? {
            debug!(
                %series,
                key = info.key,
                count = info.count,
                first = info.first,
                last = info.last,
                "Segment"
            );
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == CursorState::Closed {
            Err(StrataError::CursorClosed)
        } else {
            Ok(())
        }
    }

    fn bound_series(&self) -> Result<SeriesId> {
        self.ensure_open()?;
        self.series.ok_or(StrataError::CursorUnbound)
    }

    /// Returns true if the loaded copy reflects every insert so far.
    fn is_current(&self) -> bool {
        self.loaded_at == Some(self.txn.generation())
    }

    fn settle(&mut self, index: usize) {
        self.position = index;
        if let Some(point) = self.segment.get(index) {
            self.at = point.timestamp();
        }
        self.state = CursorState::Positioned;
    }

    fn load(&mut self, segment: Segment<P>) {
        self.segment = segment;
        self.loaded_at = Some(self.txn.generation());
    }

    fn unload(&mut self) {
        self.segment.clear();
        self.loaded_at = None;
        self.position = 0;
        if self.state == CursorState::Positioned {
            self.state = CursorState::Bound;
        }
    }

    /// Re-reads the segment holding the current point if inserts happened
    /// since it was loaded.
    fn sync(&mut self, series: SeriesId) -> Result<()> {
        if self.state != CursorState::Positioned || self.is_current() {
            return Ok(());
        }
        match self.txn.floor_segment(series, self.at)? {
            Some((_, segment)) => {
                self.load(segment);
                match self.segment.search(self.at) {
                    Some(found) => self.settle(found.index),
                    None => self.unload(),
                }
            }
            None => self.unload(),
        }
        Ok(())
    }

    fn load_next(&mut self, series: SeriesId) -> Result<bool> {
        let Some(anchor) = self.segment.first_timestamp() else {
            return Ok(false);
        };
        match self.txn.next_segment(series, anchor)? {
            Some((_, segment)) => {
                self.load(segment);
                self.settle(0);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load_previous(&mut self, series: SeriesId) -> Result<bool> {
        let Some(anchor) = self.segment.first_timestamp() else {
            return Ok(false);
        };
        match self.txn.previous_segment(series, anchor)? {
            Some((_, segment)) => {
                self.load(segment);
                self.settle(self.segment.len().saturating_sub(1));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Visits points from the current position onwards, crossing segments,
    /// until `end` (exclusive) or the end of the series.
    fn visit<F: FnMut(&P)>(&mut self, end: Option<Timestamp>, f: &mut F) -> Result<usize> {
        let series = self.bound_series()?;
        self.sync(series)?;
        let mut count = 0;
        loop {
            let start = self.position;
            for (index, point) in self.segment.points().iter().enumerate().skip(start) {
                if end.is_some_and(|end| point.timestamp() >= end) {
                    return Ok(count);
                }
                f(point);
                count += 1;
                self.position = index;
                self.at = point.timestamp();
            }
            if !self.load_next(series)? {
                return Ok(count);
            }
        }
    }
}

impl TimeseriesCursor<'_, '_, TimeseriesPoint> {
    /// Inserts a point with the given timestamp and value and no flags.
    pub fn insert_value(&mut self, timestamp: Timestamp, value: f64) -> Result<()> {
        self.insert(TimeseriesPoint::new(timestamp, 0, value))
    }
}

impl<P: Point> Drop for TimeseriesCursor<'_, '_, P> {
    fn drop(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        if let Some(series) = self.series {
            if let Err(e) = self.txn.flush_series(series) {
                warn!("Failed to flush cursor on drop: {:?}", e);
            }
        }
    }
}
