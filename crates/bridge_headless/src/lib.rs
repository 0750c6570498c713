//! Headless runner for driving remote agents against a sandbox engine.
//!
//! This crate provides:
//!
//! - **[`sandbox`]**: A deterministic in-process engine implementing the
//!   core's engine adapter, with a few built-in maps
//! - **[`runner`]**: Runs one configured match and streams `observe()`
//!   snapshots as JSON lines
//!
//! # Output
//!
//! - **stdout**: One observation per line (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # List sandbox maps
//! cargo run -p bridge_headless -- maps
//!
//! # Play a configured match against the agents in run.ron
//! cargo run -p bridge_headless -- run --config run.ron --frames 500
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod maps;
pub mod runner;
pub mod sandbox;
pub mod world;

pub use runner::{HeadlessError, HeadlessRunner, RunnerOptions};
pub use sandbox::{SandboxConfig, SandboxEngine};
