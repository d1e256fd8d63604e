//! Store header recorded in the `meta` database.
//!
//! The header pins the segment layout a store was created with, so a store
//! is never read with a different capacity or point record size.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Magic: "ASTR" (4 bytes)              │
//! │ Version: u16 (2 bytes) = 1           │
//! │ Reserved: 2 bytes                    │
//! │ Segment capacity: u32 (4 bytes)      │
//! │ Point record size: u32 (4 bytes)     │
//! │ CRC32 of the 16 bytes above (4)      │
//! └──────────────────────────────────────┘
//! ```

use crate::error::{Result, StrataError};

/// Magic bytes of the store header: "ASTR"
pub const STORE_MAGIC: [u8; 4] = *b"ASTR";

/// Current store format version.
pub const STORE_VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 20;

/// Key of the header record in the `meta` database.
pub const HEADER_KEY: &[u8] = b"header";

/// Layout parameters a store was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    /// Format version.
    pub version: u16,
    /// Maximum points per segment.
    pub segment_capacity: u32,
    /// Size of one encoded point record.
    pub point_size: u32,
}

impl StoreHeader {
    /// Creates a header for the current format version.
    pub fn new(segment_capacity: u32, point_size: u32) -> Self {
        Self {
            version: STORE_VERSION,
            segment_capacity,
            point_size,
        }
    }

    /// Encodes the header using little-endian byte order.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&STORE_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        // Reserved (2 bytes)
        buf[8..12].copy_from_slice(&self.segment_capacity.to_le_bytes());
        buf[12..16].copy_from_slice(&self.point_size.to_le_bytes());
        let crc = crc32fast::hash(&buf[..16]);
        buf[16..20].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and verifies a header.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::InvalidHeader` for a record of the wrong size,
    /// `StrataError::InvalidMagic` if the magic bytes don't match,
    /// `StrataError::UnsupportedVersion` for a newer format, and
    /// `StrataError::ChecksumMismatch` if the CRC does not match.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_SIZE {
            return Err(StrataError::InvalidHeader(buf.len()));
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != STORE_MAGIC {
            return Err(StrataError::InvalidMagic(magic));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version > STORE_VERSION {
            return Err(StrataError::UnsupportedVersion(version));
        }

        let expected = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);
        let actual = crc32fast::hash(&buf[..16]);
        if expected != actual {
            return Err(StrataError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            version,
            segment_capacity: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            point_size: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Checks that the store layout matches the requested one.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::CapacityMismatch` or
    /// `StrataError::PointSizeMismatch` on disagreement.
    pub fn ensure_layout(&self, segment_capacity: u32, point_size: u32) -> Result<()> {
        if self.segment_capacity != segment_capacity {
            return Err(StrataError::CapacityMismatch {
                stored: self.segment_capacity,
                requested: segment_capacity,
            });
        }
        if self.point_size != point_size {
            return Err(StrataError::PointSizeMismatch {
                stored: self.point_size,
                requested: point_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_write_read() {
        let header = StoreHeader::new(8100, 24);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"ASTR");
        assert_eq!(StoreHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_truncated_header() {
        let bytes = StoreHeader::new(3, 24).to_bytes();
        assert!(matches!(
            StoreHeader::from_bytes(&bytes[..12]),
            Err(StrataError::InvalidHeader(12))
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = StoreHeader::new(3, 24).to_bytes();
        bytes[0..4].copy_from_slice(b"XXXX");
        match StoreHeader::from_bytes(&bytes) {
            Err(StrataError::InvalidMagic(magic)) => assert_eq!(&magic, b"XXXX"),
            other => panic!("expected InvalidMagic, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = StoreHeader::new(3, 24).to_bytes();
        bytes[4..6].copy_from_slice(&(STORE_VERSION + 1).to_le_bytes());
        assert!(matches!(
            StoreHeader::from_bytes(&bytes),
            Err(StrataError::UnsupportedVersion(v)) if v == STORE_VERSION + 1
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = StoreHeader::new(3, 24).to_bytes();
        bytes[8] ^= 0xFF;
        assert!(matches!(
            StoreHeader::from_bytes(&bytes),
            Err(StrataError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_layout_mismatch() {
        let header = StoreHeader::new(3, 24);
        assert!(header.ensure_layout(3, 24).is_ok());
        assert!(matches!(
            header.ensure_layout(4, 24),
            Err(StrataError::CapacityMismatch { stored: 3, requested: 4 })
        ));
        assert!(matches!(
            header.ensure_layout(3, 16),
            Err(StrataError::PointSizeMismatch { stored: 24, requested: 16 })
        ));
    }
}
