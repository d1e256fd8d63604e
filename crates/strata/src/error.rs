//! Error and Result types for Strata engine operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

/// The error type for engine, transaction and cursor operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// A write was attempted through a read-only transaction.
    #[error("Write attempted on a read-only transaction")]
    ReadOnlyViolation,

    /// The cursor has no current point.
    #[error("Cursor is not positioned on a point")]
    NotPositioned,

    /// The cursor has been closed.
    #[error("Cursor is closed")]
    CursorClosed,

    /// The cursor is not bound to a time series.
    #[error("Cursor is not bound to a time series")]
    CursorUnbound,

    /// Commit was called on a read-only transaction.
    #[error("Commit is not valid for a read-only transaction, use close instead")]
    TransactionModeViolation,

    /// The transaction has already been committed or closed.
    #[error("Transaction is closed")]
    TransactionClosed,

    /// A stored segment failed validation while being decoded.
    #[error("Corrupt segment: {0}")]
    CorruptSegment(String),

    /// A stored segment key has an unexpected length.
    #[error("Invalid segment key length: {0}")]
    InvalidKey(usize),

    /// A store already exists where a new one was to be created.
    #[error("Store already exists: {0}")]
    AlreadyExists(PathBuf),

    /// No store exists where an existing one was to be opened.
    #[error("Store not found: {0}")]
    NotFound(PathBuf),

    /// The store header record has an unexpected length.
    #[error("Invalid store header length: {0}")]
    InvalidHeader(usize),

    /// Invalid magic bytes in the store header.
    #[error("Invalid magic bytes: expected ASTR, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported store format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Store header checksum does not match the stored value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// The store was created with a different segment capacity.
    #[error("Segment capacity mismatch: store uses {stored}, options request {requested}")]
    CapacityMismatch {
        /// Capacity recorded in the store header.
        stored: u32,
        /// Capacity requested by the engine options.
        requested: u32,
    },

    /// The store was created for a point type with a different record size.
    #[error("Point record size mismatch: store uses {stored} bytes, point type uses {requested}")]
    PointSizeMismatch {
        /// Record size recorded in the store header.
        stored: u32,
        /// Record size of the point type in use.
        requested: u32,
    },

    /// Engine options failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error reported by the underlying LMDB store.
    #[error("Storage error: {0}")]
    Storage(#[from] heed::Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
