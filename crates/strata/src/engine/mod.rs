//! Engine, transactions and cursors over an LMDB environment.
//!
//! # Architecture
//!
//! ```text
//! Engine (owns heed::Env)
//!   └─ Transaction (owns RoTxn / RwTxn and one pending segment per series)
//!        └─ TimeseriesCursor (reads a copy of one segment)
//! ```
//!
//! Segments live in the `segments` database keyed by [`SegmentKey`]; the
//! `meta` database holds the [`StoreHeader`] that pins the segment layout.
//!
//! [`SegmentKey`]: crate::segment::SegmentKey
//! [`StoreHeader`]: header::StoreHeader

pub mod cursor;
pub mod header;
mod pending;
pub mod transaction;

pub use cursor::{CursorState, TimeseriesCursor};
pub use transaction::{SegmentInfo, Transaction, TransactionMode};

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::{info, instrument};

use crate::error::{Result, StrataError};
use crate::segment::{Point, TimeseriesPoint};
use header::{StoreHeader, HEADER_KEY};

/// Default maximum size of the LMDB memory map (10 GiB).
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_MAX_DATABASE_SIZE: usize = 10 * 1024 * 1024 * 1024;

/// Default maximum size of the LMDB memory map (1 GiB on 32-bit targets).
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_MAX_DATABASE_SIZE: usize = 1024 * 1024 * 1024;

/// Default number of points per segment.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 8100;

/// Largest accepted number of points per segment.
pub const MAX_SEGMENT_CAPACITY: usize = 1 << 20;

/// Number of named LMDB databases used by the engine.
const MAX_DATABASES: u32 = 2;

const SEGMENTS_TABLE: &str = "segments";
const META_TABLE: &str = "meta";

/// LMDB data file, present once a store has been created.
const DATA_FILE: &str = "data.mdb";

/// Raw byte table as seen by the engine.
pub(crate) type RawDatabase = Database<Bytes, Bytes>;

/// Configuration for opening or creating an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Directory holding the LMDB environment.
    pub database_directory: PathBuf,

    /// Create a new store instead of opening an existing one.
    ///
    /// Creating fails if the directory already holds a store; opening fails
    /// if it does not.
    pub create: bool,

    /// Maximum size of the memory map in bytes. Default: 10 GiB.
    pub max_database_size: usize,

    /// Maximum number of points per segment. Default: 8100.
    ///
    /// Fixed when the store is created; reopening with a different value fails.
    pub segment_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            database_directory: PathBuf::new(),
            create: false,
            max_database_size: DEFAULT_MAX_DATABASE_SIZE,
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
        }
    }
}

impl EngineOptions {
    /// Creates options for `database_directory` with default sizes.
    pub fn new(database_directory: impl Into<PathBuf>, create: bool) -> Self {
        Self {
            database_directory: database_directory.into(),
            create,
            ..Self::default()
        }
    }

    /// Sets the maximum memory map size.
    pub fn with_max_database_size(mut self, max_database_size: usize) -> Self {
        self.max_database_size = max_database_size;
        self
    }

    /// Sets the segment capacity.
    pub fn with_segment_capacity(mut self, segment_capacity: usize) -> Self {
        self.segment_capacity = segment_capacity;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::InvalidConfig` for an empty directory path, a
    /// zero map size, or a segment capacity outside
    /// `1..=MAX_SEGMENT_CAPACITY`.
    pub fn validate(&self) -> Result<()> {
        if self.database_directory.as_os_str().is_empty() {
            return Err(StrataError::InvalidConfig(
                "database directory is empty".to_string(),
            ));
        }
        if self.max_database_size == 0 {
            return Err(StrataError::InvalidConfig(
                "max database size must be positive".to_string(),
            ));
        }
        if self.segment_capacity == 0 || self.segment_capacity > MAX_SEGMENT_CAPACITY {
            return Err(StrataError::InvalidConfig(format!(
                "segment capacity {} is outside 1..={}",
                self.segment_capacity, MAX_SEGMENT_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Time series storage engine over one LMDB environment.
///
/// The engine owns the environment for its lifetime; dropping it closes the
/// store. Engines on different directories are independent.
pub struct Engine<P: Point = TimeseriesPoint> {
    env: Env,
    segments: RawDatabase,
    options: EngineOptions,
    _point: PhantomData<fn() -> P>,
}

impl<P: Point> Engine<P> {
    /// Opens or creates a store according to `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - `create` is set and a store already exists (`AlreadyExists`)
    /// - `create` is unset and no store exists (`NotFound`)
    /// - The stored layout differs from the options or point type
    /// - LMDB fails to open the environment
    #[instrument(skip(options), fields(
        path = %options.database_directory.display(),
        create = options.create,
        segment_capacity = options.segment_capacity
    ))]
    pub fn open(options: EngineOptions) -> Result<Self> {
        options.validate()?;
        let directory = options.database_directory.clone();
        let exists = directory.join(DATA_FILE).is_file();

        if options.create {
            if exists {
                return Err(StrataError::AlreadyExists(directory));
            }
            fs::create_dir_all(&directory)?;
        } else if !exists {
            return Err(StrataError::NotFound(directory));
        }

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.max_database_size)
                .max_dbs(MAX_DATABASES)
                .open(&directory)?
        };

        let header = StoreHeader::new(options.segment_capacity as u32, P::ENCODED_SIZE as u32);
        let segments = if options.create {
            info!("Creating timeseries store");
            Self::create_tables(&env, &header)?
        } else {
            info!("Opening timeseries store");
            Self::open_tables(&env, &directory, &header)?
        };

        Ok(Self {
            env,
            segments,
            options,
            _point: PhantomData,
        })
    }

    fn create_tables(env: &Env, header: &StoreHeader) -> Result<RawDatabase> {
        let mut wtxn = env.write_txn()?;
        let segments: RawDatabase = env.create_database(&mut wtxn, Some(SEGMENTS_TABLE))?;
        let meta: RawDatabase = env.create_database(&mut wtxn, Some(META_TABLE))?;
        let bytes = header.to_bytes();
        meta.put(&mut wtxn, HEADER_KEY, &bytes[..])?;
        wtxn.commit()?;
        Ok(segments)
    }

    fn open_tables(env: &Env, directory: &Path, expected: &StoreHeader) -> Result<RawDatabase> {
        let rtxn = env.read_txn()?;
        let segments: Option<RawDatabase> = env.open_database(&rtxn, Some(SEGMENTS_TABLE))?;
        let meta: Option<RawDatabase> = env.open_database(&rtxn, Some(META_TABLE))?;
        let (Some(segments), Some(meta)) = (segments, meta) else {
            return Err(StrataError::NotFound(directory.to_path_buf()));
        };

        let stored = match meta.get(&rtxn, HEADER_KEY)? {
            Some(bytes) => StoreHeader::from_bytes(bytes)?,
            None => return Err(StrataError::NotFound(directory.to_path_buf())),
        };
        stored.ensure_layout(expected.segment_capacity, expected.point_size)?;

        rtxn.commit()?;
        Ok(segments)
    }

    /// Begins a transaction in the given mode.
    ///
    /// Only one read-write transaction can be open at a time; LMDB blocks a
    /// second writer until the first ends.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Storage` if LMDB cannot start the transaction.
    pub fn begin_transaction(&self, mode: TransactionMode) -> Result<Transaction<'_, P>> {
        Transaction::begin(self, mode)
    }

    /// Begins a read-write transaction.
    pub fn begin_write(&self) -> Result<Transaction<'_, P>> {
        self.begin_transaction(TransactionMode::ReadWrite)
    }

    /// Begins a read-only transaction.
    pub fn begin_read(&self) -> Result<Transaction<'_, P>> {
        self.begin_transaction(TransactionMode::ReadOnly)
    }

    /// Returns the options the engine was opened with.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        &self.options.database_directory
    }

    /// Returns the maximum number of points per segment.
    pub fn segment_capacity(&self) -> usize {
        self.options.segment_capacity
    }

    pub(crate) fn env(&self) -> &Env {
        &self.env
    }

    pub(crate) fn segments_db(&self) -> RawDatabase {
        self.segments
    }
}
