//! Utility modules shared across the ingestion pipeline
//!
//! - `utils::time` for XMLTV datetime parsing
//! - `utils::url` for url shape checks and log-safe url rendering
//! - `utils::decompression` for gzip-compressed feed bodies

pub mod decompression;
pub mod time;
pub mod url;

pub use decompression::{CompressionFormat, DecompressionService};
