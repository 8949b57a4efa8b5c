//! HostCare library crate.
//!
//! Re-exports the modules so that integration tests can reach them. The
//! binary entry point is in `main.rs`.

pub mod core;
pub mod diag;
pub mod exec;
pub mod export;
pub mod tasks;
pub mod util;
