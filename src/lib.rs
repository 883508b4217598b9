//! # mergeq
//!
//! An autonomous merge-queue controller for GitHub pull requests. Every
//! invocation picks at most one labeled pull request per repository,
//! checks that it is ready (milestone, reviews, CI, mergeability),
//! brings its branch up to date when required, merges it, and encodes
//! all intermediate state in the PR's label set:
//!
//! - GitHub API integration behind mockable operation traits
//! - A single-PR-per-cycle decision engine with retry/escalation policy
//! - Git subprocess execution for fast-forward merges and branch updates
//! - Configuration, logging and an HTTP trigger server
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mergeq::config::Config;
//! use mergeq::core::runner;
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(Path::new("mergeq.toml"))?;
//! runner::run_once(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod git;
pub mod logging;
pub mod models;
pub mod server;

// Re-export commonly used types for convenience
pub use api::GitHubClient;
pub use config::Config;
pub use core::Outcome;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git hash of the build, exported by the build script.
pub const GIT_HASH: &str = env!("GIT_HASH");
