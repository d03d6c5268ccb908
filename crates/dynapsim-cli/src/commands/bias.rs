//! Bias generator commands

use clap::{Args, Subcommand};
use dynapsim_core::BiasQuantizer;
use tracing::{debug, info};

use crate::error::{CliError, CliResult};

/// Convert between bias currents and coarse/fine registers
#[derive(Args, Debug)]
pub struct BiasCommand {
    #[command(subcommand)]
    pub action: BiasAction,
}

/// Bias subcommands
#[derive(Subcommand, Debug)]
pub enum BiasAction {
    /// Current produced by a register pair
    Get {
        /// Coarse value (0-7)
        coarse: u8,
        /// Fine value (0-255)
        fine: u8,
    },

    /// Register pair producing a current
    Find {
        /// Target current (A)
        current: f64,
        /// Prefer the largest coarse value among the candidates
        #[arg(long)]
        largest_coarse: bool,
        /// Accept pairs that only approximate the current
        #[arg(long)]
        approximate: bool,
    },

    /// Print the deduplicated lookup table
    Table {
        /// Print at most this many entries
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl BiasCommand {
    pub fn execute(self) -> CliResult<()> {
        match self.action {
            BiasAction::Get { coarse, fine } => {
                let current = BiasQuantizer::get_bias(coarse, fine)?;
                let linear = BiasQuantizer::get_linear(coarse, fine)?;
                debug!("({}, {}) -> {:e} A", coarse, fine, current);
                println!("{:e} A (linear {})", current, linear);
            }
            BiasAction::Find {
                current,
                largest_coarse,
                approximate,
            } => {
                let register =
                    BiasQuantizer::get_coarse_fine(current, !largest_coarse, !approximate)
                        .ok_or_else(|| {
                            CliError::invalid_args(format!(
                                "no register pair produces {:e} A",
                                current
                            ))
                        })?;
                let actual = BiasQuantizer::current(register);
                println!("{} = {:e} A", register, actual);
            }
            BiasAction::Table { limit } => {
                let quantizer = BiasQuantizer::new();
                let table = quantizer.get_lookup_table();
                info!("Lookup table has {} entries", table.len());
                for entry in table.iter().take(limit.unwrap_or(table.len())) {
                    println!(
                        "{}\t{}\t{:e}",
                        entry.register.coarse, entry.register.fine, entry.current
                    );
                }
            }
        }
        Ok(())
    }
}
