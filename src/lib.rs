//! A tiny, embeddable command-line assembly and process invocation library.
//!
//! This crate provides a minimal set of building blocks to compose an argument
//! list for an external program and then launch that program under a timeout.
//! It is intentionally small and easy to read, suitable for embedding in
//! higher-level pipelines (for example an image-conversion service) that need
//! deterministic control over the exact argv a child process receives.
//!
//! The main entry points are [`ArgsBuilder`], which accumulates argument
//! entries with positional and phase metadata and renders them either as a
//! debug string or as an argv vector, and [`run`], which spawns a child
//! process with such a vector, enforces a wall-clock deadline, and captures
//! its output and exit status.

mod builder;
mod exec;
mod split;
mod store;

pub use builder::{ArgsBuilder, escape};
pub use exec::{
    RunContext, RunOutput, RunStatus, TIMEOUT_EXIT_CODE, WAIT_FAILED_EXIT_CODE, find_program, run,
};
pub use split::split_tokens;
pub use store::{ArgEntry, Phase, Position, TokenStore};
