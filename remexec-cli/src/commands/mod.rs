//! Command implementations for the remexec CLI

pub mod detect;
pub mod exec;

// Re-export main dispatcher functions for flat access from main.rs
pub use detect::run_detect;
pub use exec::{run_args, run_run};
