//! Runtime glue that wires configuration, transfer hooks, telemetry, and
//! runner orchestration.

pub mod config;
pub mod hooks;
pub mod runner;
pub mod telemetry;
