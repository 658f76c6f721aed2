//! Table record encoding.

use crate::error::{CoreError, CoreResult};

/// Computes a CRC32 (IEEE polynomial) checksum.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

/// Flag marking a delete.
const FLAG_TOMBSTONE: u8 = 0x01;

/// One entry in a table's log.
///
/// ```text
/// | record_len (4) | flags (1) | version (8) | key_len (2) | key | payload | crc32 (4) |
/// ```
///
/// `record_len` counts the whole record, itself and the checksum included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    /// Row key.
    pub key: Vec<u8>,
    /// Row version after this write.
    pub version: u64,
    /// Whether this record deletes the row.
    pub tombstone: bool,
    /// Row value (empty for tombstones).
    pub payload: Vec<u8>,
}

impl TableRecord {
    /// Bytes before the key.
    pub const HEADER_SIZE: usize = 15;
    /// Trailing checksum size.
    pub const CRC_SIZE: usize = 4;

    /// Creates a put record.
    #[must_use]
    pub fn put(key: Vec<u8>, version: u64, payload: Vec<u8>) -> Self {
        Self {
            key,
            version,
            tombstone: false,
            payload,
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(key: Vec<u8>, version: u64) -> Self {
        Self {
            key,
            version,
            tombstone: true,
            payload: Vec::new(),
        }
    }

    /// Encodes the record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the key is longer than
    /// `u16::MAX` bytes or the record would exceed `u32::MAX` bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let key_len = u16::try_from(self.key.len())
            .map_err(|_| CoreError::invalid_argument("table key too long"))?;
        let total = Self::HEADER_SIZE + self.key.len() + self.payload.len() + Self::CRC_SIZE;
        let record_len =
            u32::try_from(total).map_err(|_| CoreError::invalid_argument("table record too large"))?;

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.push(if self.tombstone { FLAG_TOMBSTONE } else { 0 });
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Reads the `record_len` prefix.
    #[must_use]
    pub fn peek_len(prefix: [u8; 4]) -> usize {
        u32::from_le_bytes(prefix) as usize
    }

    /// Decodes a complete record (including its length prefix).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChecksumMismatch`] if the checksum fails, or a
    /// corruption error if the layout is inconsistent.
    pub fn decode(table: &str, data: &[u8]) -> CoreResult<Self> {
        if data.len() < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(CoreError::table_corruption(table, "record too short"));
        }

        let record_len = Self::peek_len([data[0], data[1], data[2], data[3]]);
        if record_len != data.len() {
            return Err(CoreError::table_corruption(table, "record length mismatch"));
        }

        let body_end = record_len - Self::CRC_SIZE;
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[body_end..]);
        let stored_crc = u32::from_le_bytes(crc);
        let computed_crc = compute_crc32(&data[..body_end]);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let flags = data[4];
        let mut version = [0u8; 8];
        version.copy_from_slice(&data[5..13]);
        let key_len = u16::from_le_bytes([data[13], data[14]]) as usize;
        let key_end = Self::HEADER_SIZE + key_len;
        if key_end > body_end {
            return Err(CoreError::table_corruption(table, "key extends past record"));
        }

        Ok(Self {
            key: data[Self::HEADER_SIZE..key_end].to_vec(),
            version: u64::from_le_bytes(version),
            tombstone: flags & FLAG_TOMBSTONE != 0,
            payload: data[key_end..body_end].to_vec(),
        })
    }
}
