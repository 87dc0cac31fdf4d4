//! Local filesystem storage for the Podcaster pipeline.
//!
//! This crate provides:
//! - Directory layout for uploads, processed outputs and the outputs bucket
//! - Fail-fast validation of the storage roots at startup
//! - Size-bounded streaming ingestion with atomic commit
//! - Listing, opening and removal of stored artifacts

pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod layout;

pub use catalog::{OutputFile, ProcessedEntry, SessionSummary};
pub use config::{StorageConfig, UploadLimit};
pub use error::{StorageError, StorageResult};
pub use ingest::Ingestor;
pub use layout::StorageLayout;
