//! dynapsim CLI crate
//!
//! The binary (src/main.rs) wires up logging and argument parsing and calls
//! [`DynapSimCli::execute`]. Commands and the configuration format are also
//! exposed as a library so they can be driven from tests without spawning a
//! process.
//!
//! Commands (see [commands]):
//! - simulate: TOML config -> network -> evolve -> spike counts, optional JSON
//!   report with spike times and state traces.
//! - bias: get / find / table over the coarse-fine bias generator.

pub mod commands;
pub mod config;
pub mod error;

pub use commands::DynapSimCli;
