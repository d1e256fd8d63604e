//! Strata - Alopex Segmented Time Series Store
//!
//! This crate stores ordered points for many independent series inside an
//! LMDB environment. Each series is cut into fixed-capacity segments, one
//! store record per segment, keyed by series id and first timestamp.
//!
//! # Components
//!
//! - [`Engine`]: Owns the store and begins transactions
//! - [`Transaction`]: Read-write or read-only unit of work
//! - [`TimeseriesCursor`]: Navigation, search and inserts for one series
//! - [`Segment`]: Fixed-capacity, timestamp-ordered point buffer
//!
//! # Example
//!
//! ```rust,no_run
//! use alopex_strata::{CompareResult, Engine, EngineOptions};
//! use uuid::Uuid;
//!
//! # fn main() -> alopex_strata::Result<()> {
//! let engine: Engine = Engine::open(EngineOptions::new("/var/lib/strata", true))?;
//! let series = Uuid::from_u128(1);
//!
//! let mut txn = engine.begin_write()?;
//! {
//!     let mut cursor = txn.open_timeseries(series)?;
//!     for ts in (10..=100).step_by(10) {
//!         cursor.insert_value(ts, ts as f64)?;
//!     }
//!     assert_eq!(cursor.search(45)?, CompareResult::Less);
//!     assert_eq!(cursor.current()?.timestamp, 40);
//!     cursor.close()?;
//! }
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod engine;
pub mod error;
pub mod segment;

pub use engine::{
    CursorState, Engine, EngineOptions, SegmentInfo, TimeseriesCursor, Transaction,
    TransactionMode,
};
pub use error::{Result, StrataError};
pub use segment::{
    CompareResult, Point, Segment, SegmentKey, SeriesId, TimeseriesPoint, Timestamp,
};
