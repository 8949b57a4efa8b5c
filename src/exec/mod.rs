//! External command execution: spawning, raw capture, decoding and
//! classification of results.

pub mod classifier;
pub mod decoder;
pub mod executor;
pub mod oem;

pub use classifier::{classify, Classification};
pub use decoder::ByteDecoder;
pub use executor::{execute, CommandResult, CommandRunner, CommandSpec, ProcessRunner};
