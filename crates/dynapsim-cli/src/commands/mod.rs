//! CLI command implementations for dynapsim

use clap::{Parser, Subcommand};

use crate::error::CliResult;

pub mod bias;
pub mod simulate;

/// dynapsim - Dynap-SE analog circuit simulator
#[derive(Parser, Debug)]
#[command(
    name = "dynapsim",
    version,
    about = "Dynap-SE analog circuit simulator",
    long_about = "Simulates the DPI synapses and AdExp-LIF membranes of Dynap-SE \
                  neuromorphic cores in the current domain, and converts between \
                  bias currents and the chip's coarse/fine bias registers."
)]
pub struct DynapSimCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a network described by a TOML configuration
    #[command(alias = "run")]
    Simulate(simulate::SimulateCommand),

    /// Bias generator register conversions
    Bias(bias::BiasCommand),
}

impl DynapSimCli {
    /// Execute the CLI command
    pub fn execute(self) -> CliResult<()> {
        match self.command {
            Commands::Simulate(cmd) => cmd.execute(),
            Commands::Bias(cmd) => cmd.execute(),
        }
    }
}
