//! Network simulation command

use anyhow::Context;
use clap::Args;
use dynapsim_core::EvolveResult;
use ndarray::Axis;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::config::SimulationConfig;
use crate::error::{CliError, CliResult};

/// Run a simulation from a configuration file
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// Simulation configuration (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the number of time steps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Write spikes (and traces) as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Record state traces
    #[arg(long)]
    pub record: bool,
}

/// JSON report of one run
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub steps: usize,
    pub dt: f64,
    pub n_neurons: usize,
    /// Spike count per neuron
    pub spike_counts: Vec<f64>,
    /// Mean rate per neuron (Hz)
    pub firing_rates: Vec<f64>,
    /// Spike steps of each neuron
    pub spike_times: Vec<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Traces>,
}

/// Recorded state, indexed `[step][neuron]`
#[derive(Debug, Serialize)]
pub struct Traces {
    pub isyn: Vec<Vec<[f64; 4]>>,
    pub iahp: Vec<Vec<f64>>,
    pub imem: Vec<Vec<f64>>,
    pub vmem: Vec<Vec<f64>>,
}

impl SimulationReport {
    fn new(result: &EvolveResult, dt: f64) -> Self {
        let spike_times = result
            .spikes
            .axis_iter(Axis(1))
            .map(|column| {
                column
                    .iter()
                    .enumerate()
                    .filter(|&(_, &s)| s > 0.0)
                    .map(|(t, _)| t)
                    .collect()
            })
            .collect();

        let rows = |a: &ndarray::Array2<f64>| -> Vec<Vec<f64>> {
            a.outer_iter().map(|row| row.to_vec()).collect()
        };
        let traces = result.record.as_ref().map(|record| Traces {
            isyn: record
                .isyn
                .outer_iter()
                .map(|step| {
                    step.outer_iter()
                        .map(|k| [k[0], k[1], k[2], k[3]])
                        .collect()
                })
                .collect(),
            iahp: rows(&record.iahp),
            imem: rows(&record.imem),
            vmem: rows(&record.vmem),
        });

        Self {
            steps: result.steps(),
            dt,
            n_neurons: result.spikes.ncols(),
            spike_counts: result.spike_counts().to_vec(),
            firing_rates: result.firing_rates(dt).to_vec(),
            spike_times,
            traces,
        }
    }
}

impl SimulateCommand {
    pub fn execute(self) -> CliResult<()> {
        if !self.config.exists() {
            return Err(CliError::config(format!(
                "{} does not exist",
                self.config.display()
            )));
        }
        let config = SimulationConfig::load_from_file(&self.config)?;
        let steps = self.steps.unwrap_or(config.simulation.steps);
        let dt = config.simulation.params.dt;

        let mut sim = config.build()?;
        let input = config.input(steps)?;
        info!(
            "Simulating {} neurons for {} steps ({} s)",
            sim.n_neurons(),
            steps,
            steps as f64 * dt
        );

        let result = sim.evolve(&input, self.record)?;
        let report = SimulationReport::new(&result, dt);
        for (j, (count, rate)) in report
            .spike_counts
            .iter()
            .zip(&report.firing_rates)
            .enumerate()
        {
            info!("neuron {}: {} spikes ({:.1} Hz)", j, count, rate);
        }

        match &self.output {
            Some(path) => {
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Wrote results to {}", path.display());
            }
            None => println!("total spikes: {}", result.total_spikes()),
        }
        Ok(())
    }
}
