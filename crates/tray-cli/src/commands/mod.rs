//! Command implementations for the CLI.

mod collect;
mod scan;

pub use collect::{cmd_collect, open_output, run_collection};
pub use scan::cmd_scan;
