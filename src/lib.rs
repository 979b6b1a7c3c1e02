//! # OpenOperator
//!
//! A sandboxed Python execution service with LLM-assisted optimization.
//!
//! ## Features
//!
//! - **Disposable Sandboxes:** Every job runs in a freshly provisioned remote
//!   sandbox that is torn down on every exit path
//! - **LLM Rewrites:** Uploaded scripts are optimized by a chat completions
//!   model before execution
//! - **Stage Timeline:** Each run produces an ordered, structured record of
//!   upload, install, rewrite, execution, and collection
//! - **Artifact Harvesting:** Plots and documents generated by the script are
//!   collected and base64-encoded into the result
//! - **Fleet Reaper:** A standalone sweep kills every live sandbox the fleet
//!   still reports

pub mod artifacts;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reaper;
pub mod rewriter;
pub mod sandbox;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
