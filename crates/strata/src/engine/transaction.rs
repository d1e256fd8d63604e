//! Transactions over the segment store.
//!
//! A [`Transaction`] wraps one LMDB transaction and hands out cursors that
//! borrow it. Cursors reach the store only through the primitives defined
//! here: floor/first/next/previous segment lookups and inserts.
//!
//! ```text
//! Transaction ──► TxnHandle::Read(RoTxn) ──► segment lookups
//!             └─► TxnHandle::Write(RwTxn) ─► lookups + batch writes
//!                   ▲
//!                   └── pending: one PendingSegment per series
//! ```
//!
//! # Write Buffering
//!
//! Inserts from every cursor of a read-write transaction land in the
//! series' [`PendingSegment`]. It is written back (and re-keyed if its first
//! timestamp changed) when an insert needs a different segment, before any
//! lookup of its series, on cursor flush and on commit. A full segment
//! either spills into a fresh segment (when the new timestamp lies after
//! the last or before the first point) or splits in half (when it lies
//! between its points).
//!
//! A transaction is confined to the thread that began it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Bound;

use heed::{RoTxn, RwTxn};
use tracing::debug;

use crate::engine::cursor::TimeseriesCursor;
use crate::engine::pending::{exact_point, PendingSegment};
use crate::engine::{Engine, RawDatabase};
use crate::error::{Result, StrataError};
use crate::segment::{InsertOutcome, Point, Segment, SegmentKey, SeriesId, Timestamp};

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Reads and writes; changes become durable on commit.
    #[default]
    ReadWrite,
    /// Reads only; ended with close.
    ReadOnly,
}

/// Summary of one stored segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Timestamp the segment is keyed by.
    pub key: Timestamp,
    /// Number of points in the segment.
    pub count: usize,
    /// Timestamp of the first point.
    pub first: Timestamp,
    /// Timestamp of the last point.
    pub last: Timestamp,
}

/// Ordered set of segment writes for one series, applied together.
#[derive(Debug)]
pub(crate) struct SegmentBatch {
    series: SeriesId,
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
enum BatchOp {
    Delete(Timestamp),
    Put(Timestamp, Vec<u8>),
}

impl SegmentBatch {
    pub(crate) fn new(series: SeriesId) -> Self {
        Self {
            series,
            ops: Vec::with_capacity(3),
        }
    }

    /// Removes the segment stored under `key`.
    pub(crate) fn delete(&mut self, key: Timestamp) {
        self.ops.push(BatchOp::Delete(key));
    }

    /// Stores `segment` under its first timestamp. Empty segments are skipped.
    pub(crate) fn put<P: Point>(&mut self, segment: &Segment<P>) {
        if let Some(first) = segment.first_timestamp() {
            self.ops.push(BatchOp::Put(first, segment.serialize()));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }
}

enum TxnHandle<'e> {
    Read(RoTxn<'e>),
    Write(RwTxn<'e>),
}

impl<'e> TxnHandle<'e> {
    fn reader(&self) -> &RoTxn<'e> {
        match self {
            TxnHandle::Read(txn) => txn,
            TxnHandle::Write(txn) => &**txn,
        }
    }
}

/// A unit of work against an [`Engine`].
///
/// Read-write transactions are made durable with [`Transaction::commit`] and
/// abandoned with [`Transaction::close`]; dropping an open transaction
/// closes it. Read-only transactions are ended with `close`.
pub struct Transaction<'e, P: Point> {
    engine: &'e Engine<P>,
    mode: TransactionMode,
    handle: RefCell<Option<TxnHandle<'e>>>,
    pending: RefCell<HashMap<SeriesId, PendingSegment<P>>>,
    /// Bumped by every insert; cursors reload their copies when it moves.
    generation: Cell<u64>,
}

pub(crate) type Located<P> = Option<(Timestamp, Segment<P>)>;

impl<'e, P: Point> Transaction<'e, P> {
    pub(crate) fn begin(engine: &'e Engine<P>, mode: TransactionMode) -> Result<Self> {
        let handle = match mode {
            TransactionMode::ReadOnly => TxnHandle::Read(engine.env().read_txn()?),
            TransactionMode::ReadWrite => TxnHandle::Write(engine.env().write_txn()?),
        };
        debug!(?mode, "Transaction started");
        Ok(Self {
            engine,
            mode,
            handle: RefCell::new(Some(handle)),
            pending: RefCell::new(HashMap::new()),
            generation: Cell::new(0),
        })
    }

    /// Returns the access mode.
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns true for a read-only transaction.
    pub fn is_read_only(&self) -> bool {
        self.mode == TransactionMode::ReadOnly
    }

    /// Returns true until the transaction is committed or closed.
    pub fn is_open(&self) -> bool {
        self.handle.borrow().is_some()
    }

    /// Maximum number of points per segment in this store.
    pub fn segment_capacity(&self) -> usize {
        self.engine.segment_capacity()
    }

    /// Creates a cursor that is not yet bound to a series.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::TransactionClosed` after commit or close.
    pub fn cursor(&self) -> Result<TimeseriesCursor<'_, 'e, P>> {
        self.ensure_open()?;
        Ok(TimeseriesCursor::new(self))
    }

    /// Creates a cursor bound to `series`. The series does not need to exist.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::TransactionClosed` after commit or close.
    pub fn open_timeseries(&self, series: SeriesId) -> Result<TimeseriesCursor<'_, 'e, P>> {
        let mut cursor = self.cursor()?;
        cursor.change_timeseries(series)?;
        Ok(cursor)
    }

    /// Writes back every pending segment, makes all writes durable and ends
    /// the transaction.
    ///
    /// Cursors borrow the transaction, so they are closed or dropped before
    /// commit can be called.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::TransactionModeViolation` for a read-only
    /// transaction, which stays open, and `StrataError::TransactionClosed` if
    /// the transaction already ended.
    pub fn commit(&mut self) -> Result<()> {
        match self.handle.get_mut() {
            Some(TxnHandle::Write(_)) => {}
            Some(TxnHandle::Read(_)) => return Err(StrataError::TransactionModeViolation),
            None => return Err(StrataError::TransactionClosed),
        }

        self.flush_all()?;
        self.pending.get_mut().clear();
        if let Some(TxnHandle::Write(txn)) = self.handle.get_mut().take() {
            txn.commit()?;
            debug!("Transaction committed");
        }
        Ok(())
    }

    /// Ends the transaction, discarding uncommitted writes.
    ///
    /// Closing an already ended transaction does nothing.
    pub fn close(&mut self) {
        self.pending.get_mut().clear();
        match self.handle.get_mut().take() {
            Some(TxnHandle::Write(txn)) => {
                txn.abort();
                debug!("Transaction rolled back");
            }
            Some(TxnHandle::Read(txn)) => {
                drop(txn);
                debug!("Read transaction closed");
            }
            None => {}
        }
    }

    /// Lists the stored segments of `series` in key order.
    pub fn segments(&self, series: SeriesId) -> Result<Vec<SegmentInfo>> {
        self.flush_series(series)?;
        let lower = SegmentKey::lowest(series).encode();
        let upper = SegmentKey::highest(series).encode();
        let capacity = self.segment_capacity();

        self.read(|txn, db| {
            let bounds = (Bound::Included(&lower[..]), Bound::Included(&upper[..]));
            let mut infos = Vec::new();
            for entry in db.range(txn, &bounds)? {
                let (raw_key, value) = entry?;
                let key = SegmentKey::decode(raw_key)?;
                let segment = Segment::<P>::deserialize(value, capacity)?;
                infos.push(SegmentInfo {
                    key: key.timestamp,
                    count: segment.len(),
                    first: segment.first_timestamp().unwrap_or(key.timestamp),
                    last: segment.last_timestamp().unwrap_or(key.timestamp),
                });
            }
            Ok(infos)
        })
    }

    /// Lists every series with at least one stored segment, in id order.
    pub fn timeseries(&self) -> Result<Vec<SeriesId>> {
        self.flush_all()?;
        self.read(|txn, db| {
            let mut series_ids = Vec::new();
            let mut next = db.first(txn)?;
            while let Some((raw_key, _)) = next {
                let series = SegmentKey::decode(raw_key)?.series;
                series_ids.push(series);
                let skip = SegmentKey::highest(series).encode();
                next = db.get_greater_than(txn, &skip[..])?;
            }
            Ok(series_ids)
        })
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StrataError::TransactionClosed)
        }
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        match self.handle.borrow().as_ref() {
            Some(TxnHandle::Write(_)) => Ok(()),
            Some(TxnHandle::Read(_)) => Err(StrataError::ReadOnlyViolation),
            None => Err(StrataError::TransactionClosed),
        }
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RoTxn<'e>, RawDatabase) -> Result<T>,
    {
        let guard = self.handle.borrow();
        let handle = guard.as_ref().ok_or(StrataError::TransactionClosed)?;
        f(handle.reader(), self.engine.segments_db())
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RwTxn<'e>, RawDatabase) -> Result<T>,
    {
        let mut guard = self.handle.borrow_mut();
        match guard.as_mut() {
            Some(TxnHandle::Write(txn)) => f(txn, self.engine.segments_db()),
            Some(TxnHandle::Read(_)) => Err(StrataError::ReadOnlyViolation),
            None => Err(StrataError::TransactionClosed),
        }
    }

    /// Segment with the greatest key at or before `timestamp`.
    pub(crate) fn floor_segment(&self, series: SeriesId, timestamp: Timestamp) -> Result<Located<P>> {
        self.flush_series(series)?;
        let key = SegmentKey::new(series, timestamp).encode();
        let capacity = self.segment_capacity();
        self.read(|txn, db| {
            let entry = db.get_lower_than_or_equal_to(txn, &key[..])?;
            decode_entry(series, entry, capacity)
        })
    }

    /// First segment of `series`.
    pub(crate) fn first_segment(&self, series: SeriesId) -> Result<Located<P>> {
        self.flush_series(series)?;
        let key = SegmentKey::lowest(series).encode();
        let capacity = self.segment_capacity();
        self.read(|txn, db| {
            let entry = db.get_greater_than_or_equal_to(txn, &key[..])?;
            decode_entry(series, entry, capacity)
        })
    }

    /// Last segment of `series`.
    pub(crate) fn last_segment(&self, series: SeriesId) -> Result<Located<P>> {
        self.floor_segment(series, Timestamp::MAX)
    }

    /// Segment following the one keyed `after`.
    pub(crate) fn next_segment(&self, series: SeriesId, after: Timestamp) -> Result<Located<P>> {
        self.flush_series(series)?;
        let key = SegmentKey::new(series, after).encode();
        let capacity = self.segment_capacity();
        self.read(|txn, db| {
            let entry = db.get_greater_than(txn, &key[..])?;
            decode_entry(series, entry, capacity)
        })
    }

    /// Segment preceding the one keyed `before`.
    pub(crate) fn previous_segment(&self, series: SeriesId, before: Timestamp) -> Result<Located<P>> {
        self.flush_series(series)?;
        let key = SegmentKey::new(series, before).encode();
        let capacity = self.segment_capacity();
        self.read(|txn, db| {
            let entry = db.get_lower_than(txn, &key[..])?;
            decode_entry(series, entry, capacity)
        })
    }

    /// Key of the segment following the one keyed `after`, without loading it.
    pub(crate) fn next_key(&self, series: SeriesId, after: Timestamp) -> Result<Option<Timestamp>> {
        self.flush_series(series)?;
        let key = SegmentKey::new(series, after).encode();
        self.read(|txn, db| match db.get_greater_than(txn, &key[..])? {
            Some((raw_key, _)) if SegmentKey::has_series(raw_key, &series) => {
                Ok(Some(SegmentKey::decode(raw_key)?.timestamp))
            }
            _ => Ok(None),
        })
    }

    /// Counter of inserts made through this transaction.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Returns the point of `series` stored at exactly `timestamp`, looking at
    /// the pending segment before the store.
    pub(crate) fn point_at(&self, series: SeriesId, timestamp: Timestamp) -> Result<Option<P>> {
        let buffered = self
            .pending
            .borrow()
            .get(&series)
            .and_then(|pending| pending.point_at(timestamp));
        if buffered.is_some() {
            return Ok(buffered);
        }
        let located = self.floor_segment(series, timestamp)?;
        Ok(located.and_then(|(_, segment)| exact_point(&segment, timestamp)))
    }

    /// Inserts `point` into `series`, replacing any point with the same
    /// timestamp.
    pub(crate) fn insert(&self, series: SeriesId, point: P) -> Result<()> {
        self.ensure_writable()?;
        self.generation.set(self.generation.get().wrapping_add(1));

        let timestamp = point.timestamp();
        let cached = self.pending.borrow_mut().remove(&series);
        let mut pending = match cached {
            Some(pending) if pending.owns(timestamp) => pending,
            cached => {
                if let Some(mut stale) = cached {
                    self.write_back(series, &mut stale)?;
                }
                self.locate(series, timestamp)?
            }
        };

        match pending.segment.insert(point) {
            InsertOutcome::Inserted(_) | InsertOutcome::Replaced(_) => pending.dirty = true,
            InsertOutcome::Full(point) => self.overflow(series, &mut pending, point)?,
        }
        self.pending.borrow_mut().insert(series, pending);
        Ok(())
    }

    /// Writes the pending segment of `series` through to the store.
    pub(crate) fn flush_series(&self, series: SeriesId) -> Result<()> {
        let dirty = self
            .pending
            .borrow()
            .get(&series)
            .is_some_and(|pending| pending.dirty);
        if !dirty {
            return Ok(());
        }
        let Some(mut pending) = self.pending.borrow_mut().remove(&series) else {
            return Ok(());
        };
        let flushed = self.write_back(series, &mut pending);
        self.pending.borrow_mut().insert(series, pending);
        flushed
    }

    fn flush_all(&self) -> Result<()> {
        let dirty: Vec<SeriesId> = self
            .pending
            .borrow()
            .iter()
            .filter(|(_, pending)| pending.dirty)
            .map(|(series, _)| *series)
            .collect();
        for series in dirty {
            self.flush_series(series)?;
        }
        Ok(())
    }

    fn write_back(&self, series: SeriesId, pending: &mut PendingSegment<P>) -> Result<()> {
        let Some(batch) = pending.write_back_batch(series) else {
            pending.dirty = false;
            return Ok(());
        };
        if let (Some(stale), Some(first)) = (pending.stored_key, pending.segment.first_timestamp()) {
            if stale != first {
                debug!(%series, old_key = stale, new_key = first, "Re-keying segment");
            }
        }
        self.apply(batch)?;
        pending.mark_stored();
        Ok(())
    }

    /// Loads the segment an insert at `timestamp` belongs to.
    fn locate(&self, series: SeriesId, timestamp: Timestamp) -> Result<PendingSegment<P>> {
        if let Some((key, segment)) = self.floor_segment(series, timestamp)? {
            let tail = self.next_key(series, key)?.is_none();
            return Ok(PendingSegment::loaded(key, segment, tail));
        }

        // Before all data: join the first segment while it has room.
        let capacity = self.segment_capacity();
        match self.first_segment(series)? {
            Some((key, segment)) if !segment.is_full() => {
                let tail = self.next_key(series, key)?.is_none();
                Ok(PendingSegment::loaded(key, segment, tail))
            }
            Some(_) => Ok(PendingSegment::fresh(Segment::new(capacity), false)),
            None => Ok(PendingSegment::fresh(Segment::new(capacity), true)),
        }
    }

    /// Places a point that did not fit into the full pending segment.
    fn overflow(&self, series: SeriesId, pending: &mut PendingSegment<P>, point: P) -> Result<()> {
        let timestamp = point.timestamp();
        let (Some(first), Some(last)) =
            (pending.segment.first_timestamp(), pending.segment.last_timestamp())
        else {
            return Err(StrataError::CorruptSegment(
                "full segment without points".to_string(),
            ));
        };

        if timestamp > last || timestamp < first {
            let tail = pending.tail && timestamp > last;
            self.write_back(series, pending)?;
            debug!(%series, timestamp, full_key = first, "Segment full, starting new segment");
            let segment = Segment::from_points(vec![point], self.segment_capacity())?;
            *pending = PendingSegment::fresh(segment, tail);
            return Ok(());
        }

        self.split(series, pending, point)
    }

    /// Splits the full pending segment in half and inserts `point` into the
    /// half covering it. Both halves are written in one batch and the half
    /// holding `point` stays pending.
    fn split(&self, series: SeriesId, pending: &mut PendingSegment<P>, point: P) -> Result<()> {
        let timestamp = point.timestamp();
        let mut upper = pending.segment.split_off(pending.segment.len() / 2);
        let (Some(lower_key), Some(upper_key)) =
            (pending.segment.first_timestamp(), upper.first_timestamp())
        else {
            return Err(StrataError::CorruptSegment(
                "split produced an empty half".to_string(),
            ));
        };

        let into_upper = timestamp > upper_key;
        if into_upper {
            ensure_inserted(upper.insert(point))?;
        } else {
            ensure_inserted(pending.segment.insert(point))?;
        }

        let mut batch = SegmentBatch::new(series);
        if let Some(stale) = pending.stored_key.filter(|&key| key != lower_key) {
            batch.delete(stale);
        }
        batch.put(&pending.segment);
        batch.put(&upper);
        self.apply(batch)?;

        debug!(
            %series,
            timestamp,
            lower_key,
            upper_key,
            lower_len = pending.segment.len(),
            upper_len = upper.len(),
            "Split full segment"
        );

        if into_upper {
            *pending = PendingSegment::loaded(upper_key, upper, pending.tail);
        } else {
            pending.stored_key = Some(lower_key);
            pending.dirty = false;
            pending.tail = false;
        }
        Ok(())
    }

    /// Applies a batch of segment writes in order.
    pub(crate) fn apply(&self, batch: SegmentBatch) -> Result<()> {
        let series = batch.series;
        self.write(|txn, db| {
            for op in &batch.ops {
                match op {
                    BatchOp::Delete(timestamp) => {
                        let key = SegmentKey::new(series, *timestamp).encode();
                        db.delete(txn, &key[..])?;
                    }
                    BatchOp::Put(timestamp, bytes) => {
                        let key = SegmentKey::new(series, *timestamp).encode();
                        db.put(txn, &key[..], bytes.as_slice())?;
                    }
                }
            }
            Ok(())
        })
    }
}

impl<P: Point> Drop for Transaction<'_, P> {
    fn drop(&mut self) {
        self.close();
    }
}

fn ensure_inserted<P>(outcome: InsertOutcome<P>) -> Result<()> {
    match outcome {
        InsertOutcome::Inserted(_) | InsertOutcome::Replaced(_) => Ok(()),
        InsertOutcome::Full(_) => Err(StrataError::CorruptSegment(
            "split half has no room".to_string(),
        )),
    }
}

fn decode_entry<P: Point>(
    series: SeriesId,
    entry: Option<(&[u8], &[u8])>,
    capacity: usize,
) -> Result<Located<P>> {
    match entry {
        Some((raw_key, value)) if SegmentKey::has_series(raw_key, &series) => {
            let key = SegmentKey::decode(raw_key)?;
            let segment = Segment::deserialize(value, capacity)?;
            Ok(Some((key.timestamp, segment)))
        }
        _ => Ok(None),
    }
}
