//! Runtime glue that wires configs, collaborator contracts, progress
//! tracking, telemetry, and runner orchestration.

pub mod config;
pub mod contracts;
pub mod progress;
pub mod runner;
pub mod telemetry;
