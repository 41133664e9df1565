//! adam — accelerated, resumable file downloads.
//!
//! The engine probes a server's byte-range support, partitions the
//! resource across N concurrent workers with append-only temp files,
//! checkpoints fine-grained progress to a session library, replaces
//! persistently slow workers mid-transfer, and merges the finished
//! parts into the final artifact.
//!
//! The library is written so the CLI is a thin consumer; the same
//! primitives can drive a download from other programs:
//!
//! ```no_run
//! # async {
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = adam::config::DownloadConfig::default();
//! let library = adam::Library::default_location();
//! let client = adam::coordinator::build_client().unwrap();
//! let state = adam::create_session(
//!     &client, &config, &library, std::path::Path::new("."),
//!     "https://example.com/big.iso".into(), "big.iso".into(),
//! ).await.unwrap();
//! adam::run_download(
//!     &config, state, &library, std::path::Path::new("."), client,
//!     Arc::new(adam::progress::ProgressBus::new()),
//!     adam::events::EventBus::default(),
//!     Arc::new(adam::pause::PauseGate::new()),
//!     CancellationToken::new(),
//! ).await.unwrap();
//! # };
//! ```

pub mod args;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod library;
pub mod merge;
pub mod pause;
pub mod probe;
pub mod progress;
pub mod sampler;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod ui;
pub mod util;
pub mod worker;

pub use coordinator::{create_session, run_download, DownloadOutcome};
pub use error::{DownloadError, Result};
pub use state::{DownloadState, Part};
pub use store::Library;
