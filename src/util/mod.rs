//! Cross-cutting helpers: constants, errors, time formatting, cancellation,
//! configuration, platform shims and text normalisation.

pub mod cancel;
pub mod config;
pub mod constants;
pub mod elevation;
pub mod error;
pub mod text;
pub mod time;
