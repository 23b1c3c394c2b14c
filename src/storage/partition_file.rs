use std::fs;
use std::path::Path;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::write_atomic;

/// Partition file header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionHeader {
    pub version: u32,     // Format version
    pub row_count: u32,   // Live rows in the partition
    pub checksum: u32,    // CRC32 of the stored payload
    pub compression: CompressionType,
    pub payload_len: u64, // Stored (possibly compressed) payload bytes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Lz4,
}

impl PartitionHeader {
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 24; // Fixed header size

    pub fn new(row_count: u32) -> Self {
        PartitionHeader {
            version: Self::VERSION,
            row_count,
            checksum: 0,
            compression: CompressionType::Lz4,
            payload_len: 0,
        }
    }
}

// [ HEADER (version, row_count, checksum, compression, payload_len) ] <- byte 0
// [ PAYLOAD (lz4 bincode) ]
pub fn write_partition_file<T: Serialize>(path: &Path, row_count: u32, payload: &T) -> Result<PartitionHeader> {
    let data = bincode::serialize(payload)?;
    let compressed = lz4_flex::compress_prepend_size(&data);

    let mut header = PartitionHeader::new(row_count);
    header.checksum = crc32fast::hash(&compressed);
    header.payload_len = compressed.len() as u64;

    let mut bytes = bincode::serialize(&header)?;
    debug_assert_eq!(bytes.len(), PartitionHeader::SIZE);
    bytes.extend_from_slice(&compressed);

    write_atomic(path, &bytes)?;
    Ok(header)
}

pub fn read_partition_file<T: DeserializeOwned>(path: &Path) -> Result<(PartitionHeader, T)> {
    let bytes = fs::read(path)?;
    if bytes.len() < PartitionHeader::SIZE {
        return Err(corrupted(path, "truncated header"));
    }

    let header: PartitionHeader = bincode::deserialize(&bytes[..PartitionHeader::SIZE])?;
    if header.version != PartitionHeader::VERSION {
        return Err(corrupted(path, &format!("incompatible version {}", header.version)));
    }

    let stored = &bytes[PartitionHeader::SIZE..];
    if stored.len() as u64 != header.payload_len {
        return Err(corrupted(path, "payload length mismatch"));
    }
    if crc32fast::hash(stored) != header.checksum {
        return Err(corrupted(path, "checksum mismatch"));
    }

    let data = match header.compression {
        CompressionType::None => stored.to_vec(),
        CompressionType::Lz4 => lz4_flex::decompress_size_prepended(stored)
            .map_err(|e| corrupted(path, &e.to_string()))?,
    };

    let payload = bincode::deserialize(&data)?;
    Ok((header, payload))
}

fn corrupted(path: &Path, reason: &str) -> Error {
    Error::new(ErrorKind::Corrupted, format!("{}: {reason}", path.display()))
}
