//! reactd daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `reactd` is used as a binary (main.rs).

pub mod cli;
pub mod executor;
pub mod journal;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod pid;
pub mod source;
pub mod tail;
