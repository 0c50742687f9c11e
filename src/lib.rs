//! # borg-support
//!
//! Drives the BorgBackup executable through its command line and turns its
//! textual and JSON-lines output into typed values.
//!
//! ## Features
//!
//! - **Progress Tracking**: `--log-json` streams decoded into [`borg::log_line::LogLine`]s
//! - **Lock Detection**: tells a locked repository apart from other failures
//! - **Existence Checks**: tells a missing repository apart from other failures
//! - **Repository Management**: init, list, info, check, prune, compact and delete
//! - **Atomic Restore**: replaces a live file or directory with its archived copy
//!   through a private staging directory and a recoverable rename protocol
//!
//! ## Quick Start
//!
//! ```no_run
//! use borg_support::borg::borg_config::BorgConfig;
//! use borg_support::borg::restoration::ArchiveRestoration;
//!
//! let config = BorgConfig::load("config.yml")?;
//! let repository = config.repository()?;
//! let archive = repository.archives()?.pop().expect("no archives");
//!
//! let mut restoration = ArchiveRestoration::builder()
//!     .archive(archive)
//!     .path("/srv/app/config.yml")
//!     .staging_root(config.staging_root.clone())
//!     .build()?;
//! restoration.replace()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod borg;
