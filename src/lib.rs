pub mod cache;
pub mod config;
pub mod errors;
pub mod guide;
pub mod ingestor;
pub mod models;
pub mod service;
pub mod sources;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use errors::{AppError, AppResult};
pub use service::{CatalogEvent, CatalogService, CatalogSnapshot, CatalogStatus, RefreshTimer};
