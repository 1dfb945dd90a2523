//! Centralized error handling for the catalog core
//!
//! # Error Categories
//!
//! - **Storage Errors**: durable key/value reads and writes
//! - **Source Errors**: feed fetching and user source validation
//! - **Guide Errors**: XMLTV parsing and guide artifact handling
//!
//! # Usage
//!
//! ```rust
//! use iptv_catalog::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Storage Results
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience type alias for Guide Results
pub type GuideResult<T> = Result<T, GuideError>;
