//! # Kinema Core
//!
//! File ingestion and identification pipeline for the Kinema media server.
//!
//! ## Overview
//!
//! Video files dropped into watched folders travel through a chain of jobs:
//!
//! - **Watching**: [`scan::FolderWatcher`] turns OS notifications into
//!   `Added`/`Removed` events and restarts failed watches
//! - **Settling**: [`scan::ChangeQueue`] collapses bursts of events and the
//!   [`scan::ReadinessGate`] waits until a file has stopped changing
//! - **Hashing**: one read pass computes ED2K, CRC32, MD5 and SHA1
//! - **Identification**: the ED2K hash is looked up in the known-hash catalog
//! - **Resolution**: the matching movie or episode is fetched from the
//!   metadata provider, persisted and cross-referenced to the video
//!
//! [`service::IngestService`] wires the pieces together and owns their
//! lifecycle.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use kinema_core::{
//!     config::IngestConfig,
//!     database::{InMemoryStore, Repositories},
//!     providers::TmdbProvider,
//!     service::IngestService,
//!     types::FolderRoles,
//! };
//!
//! async fn ingest() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::default();
//!     let provider = TmdbProvider::new(&config.provider)?;
//!     let service = IngestService::builder()
//!         .with_repositories(Repositories::in_memory(Arc::new(InMemoryStore::new())))
//!         .with_provider(Arc::new(provider))
//!         .with_config(config)
//!         .build()?;
//!
//!     service.start().await?;
//!     service
//!         .add_folder(Path::new("/srv/media/incoming"), FolderRoles::default())
//!         .await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Pipeline configuration with serde defaults
pub mod config;

/// Storage ports and the in-memory reference store
pub mod database;

/// Error types and error handling utilities
pub mod error;

/// Folder registration and removal
pub mod folders;

/// Multi-digest content hashing
pub mod hashing;

/// Per-job hashing progress
pub mod progress;

/// External metadata providers (TMDB integration)
pub mod providers;

/// Watching, readiness, job scheduling and pipeline stages
pub mod scan;

/// Assembled ingestion service
pub mod service;

/// Domain types shared by the pipeline and the server
pub mod types;

pub use error::{MediaError, Result};
