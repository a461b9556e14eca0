//! Action implementations.

pub mod cmd;
pub mod fetch;
pub mod unpack;

pub use cmd::execute_cmd;
pub use fetch::{FetchedArchive, execute_fetch};
pub use unpack::{copy_tree, unpack_archive};
