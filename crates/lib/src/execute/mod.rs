//! Execution primitives: commands, checked fetches and archive handling.
//!
//! These are the building blocks provisioning and the release driver are made
//! of. None of them retry: a failure is returned exactly as it happened.

pub mod actions;
pub mod types;

pub use actions::{FetchedArchive, copy_tree, execute_cmd, execute_fetch, unpack_archive};
pub use types::{ExecuteConfig, ExecuteError, OutputMode, parse_source_date_epoch, source_date_epoch};
