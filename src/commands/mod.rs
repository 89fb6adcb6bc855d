//! CLI command handlers.
//!
//! This module contains the implementation for each CLI subcommand,
//! delegating to the sync runtime.

mod watch;

pub use watch::run_watch;
