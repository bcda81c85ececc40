//! mvn-sync: command line front end for the `mvn-sync-core` engine.
//!
//! Exposes the CLI definition and its async entrypoint so integration tests
//! can drive it without spawning the binary.

pub mod cli;
pub mod collect;
pub mod load_config;
pub mod s3;

pub use cli::{run, Cli, Commands};
