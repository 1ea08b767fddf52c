//! # RPM Repodata Updater
//!
//! Incremental maintenance of RPM repository metadata over pluggable
//! storage. Packages are parsed concurrently, accumulated into an update
//! session and published in one finalize step that keeps the repository
//! consistent for readers at every point: documents first, the
//! `repomd.xml` manifest last.
//!
//! ## Features
//!
//! - Async storage abstraction with local-filesystem and in-memory backends
//! - Bounded concurrent package parsing with submission-order results
//! - Incremental updates that merge with already published documents
//! - Per-repository finalize exclusion within the process
//! - Content-addressed selective copying between storages
//!
//! ## Example
//!
//! ```rust
//! use rpm_repodata::{MemoryStorage, RepoUpdater};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(MemoryStorage::new());
//! let mut updater = RepoUpdater::new(storage);
//! // updater.process_next("packages/nginx.rpm", &bytes)?;
//! let manifest = updater.complete("repo").await?;
//! assert_eq!(manifest.entries().count(), 3);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod copier;
pub mod error;
pub mod storage;
pub mod updater;

pub use config::{CompressionConfig, DocumentSet, UpdateConfig};
pub use copier::{ByDigestCopy, CopyReport};
pub use error::{RepodataError, RepodataResult};
pub use storage::{join_key, LocalStorage, MemoryStorage, Storage};
pub use updater::{BatchReport, RepoUpdater, UpdaterState};
