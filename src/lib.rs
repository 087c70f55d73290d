//! Stage-graph workflow engine.
//!
//! Definitions are validated into immutable [`core::workflow::WorkflowSnapshot`]s;
//! instances move between views through the
//! [`core::workflow::TransitionCoordinator`], which appends to an
//! optimistic-concurrency ledger and asks an injected policy who acts next.

pub mod cli;
pub mod core;
pub mod logging;

/// Current crate version string exposed for CLI and tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Result<T> = std::result::Result<T, anyhow::Error>;
