//! Transparent gzip handling for feed bodies
//!
//! Guide feeds are frequently published as `.xml.gz`, and some servers send the
//! compressed bytes without a `Content-Encoding` header.

use flate2::read::GzDecoder;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Uncompressed,
}

pub struct DecompressionService;

impl DecompressionService {
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        if data.len() >= 2 && data[..2] == GZIP_MAGIC {
            CompressionFormat::Gzip
        } else {
            CompressionFormat::Uncompressed
        }
    }

    /// Decompress data based on detected format
    pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
        match Self::detect_compression_format(data) {
            CompressionFormat::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut decompressed = Vec::new();
                decoder.read_to_end(&mut decompressed)?;
                Ok(decompressed)
            }
            CompressionFormat::Uncompressed => Ok(data.to_vec()),
        }
    }
}
