//! Read-only machine diagnostics.

pub mod health;
