//! Simulation configuration files
//!
//! A configuration is a TOML document with `[layout]`, `[core]`,
//! `[simulation]` and `[network]` tables plus any number of `[[stimulus]]`
//! entries. Every table is optional and falls back to the chip defaults.

use std::collections::HashMap;
use std::path::Path;

use dynapsim_core::{
    BaseWeights, CircuitParameters, CoreSpecification, DynapSim, LayoutConstants,
    SimulationParams, SpikeEvent, Stimulus, SynapseType, WeightComposer, WeightTensor,
    DEFAULT_FILL_RATE, NUM_SYNAPSES,
};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// Complete description of one simulation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Process constants
    pub layout: LayoutConstants,
    /// Core-wide time constants, gains and currents
    pub core: CoreSpecification,
    /// Solver settings
    pub simulation: RunConfig,
    /// Population and connectivity
    pub network: NetworkConfig,
    /// Input spike sources, summed into one raster
    pub stimulus: Vec<StimulusConfig>,
}

/// Solver settings and run length
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of time steps
    pub steps: usize,
    /// Time step, pulse increment and spike mode
    #[serde(flatten)]
    pub params: SimulationParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: 1000,
            params: SimulationParams::default(),
        }
    }
}

/// Base weights of one `(source_core, dest_core)` pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorePairWeights {
    /// Presynaptic core
    pub source_core: u16,
    /// Postsynaptic core
    pub dest_core: u16,
    /// `Iw_0..Iw_3` (A)
    pub weights: BaseWeights,
}

/// One recurrent connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Presynaptic neuron
    pub pre: usize,
    /// Postsynaptic neuron
    pub post: usize,
    /// Target channel
    pub synapse: SynapseType,
    /// 4-bit selection of base weights
    pub mask: u8,
}

/// Randomly drawn connectivity on one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomConnectivity {
    /// Target channel
    pub synapse: SynapseType,
    /// Per-bit probability
    #[serde(default = "default_fill_rate")]
    pub fill_rate: [f64; 4],
    /// RNG seed
    #[serde(default)]
    pub seed: u64,
}

fn default_fill_rate() -> [f64; 4] {
    DEFAULT_FILL_RATE
}

/// Frozen device mismatch applied to the circuit parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MismatchConfig {
    /// Relative standard deviation (`0.05` for 5%)
    pub percent: f64,
    /// RNG seed
    #[serde(default)]
    pub seed: u64,
}

/// Population and connectivity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of neurons
    pub n_neurons: usize,
    /// Core of each neuron; all on core 0 when empty
    pub cores: Vec<u16>,
    /// Base weights per core pair
    pub base_weights: Vec<CorePairWeights>,
    /// Explicit connections
    pub connections: Vec<ConnectionConfig>,
    /// Random connections added on top of the explicit ones
    pub random: Option<RandomConnectivity>,
    /// Device mismatch; none when absent
    pub mismatch: Option<MismatchConfig>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            n_neurons: 1,
            cores: Vec::new(),
            base_weights: Vec::new(),
            connections: Vec::new(),
            random: None,
            mismatch: None,
        }
    }
}

/// One input spike source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StimulusConfig {
    /// Frozen Poisson spikes
    Poisson {
        /// Target channel
        synapse: SynapseType,
        /// Rate (Hz)
        rate: f64,
        /// RNG seed
        #[serde(default)]
        seed: u64,
        /// Target neurons; every neuron when absent
        #[serde(default)]
        neurons: Option<Vec<usize>>,
    },
    /// Explicit events
    Events {
        /// `(step, neuron, synapse)` triples
        events: Vec<SpikeEvent>,
    },
}

impl SimulationConfig {
    /// Load configuration from file, or the defaults when it does not exist
    pub fn load_from_file(path: &Path) -> CliResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            tracing::warn!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Core assignment of every neuron
    pub fn cores(&self) -> CliResult<Vec<u16>> {
        let n = self.network.n_neurons;
        if self.network.cores.is_empty() {
            return Ok(vec![0; n]);
        }
        if self.network.cores.len() != n {
            return Err(CliError::config(format!(
                "network.cores lists {} neurons, expected {}",
                self.network.cores.len(),
                n
            )));
        }
        Ok(self.network.cores.clone())
    }

    /// Decode the configured masks into weight currents
    pub fn weights(&self) -> CliResult<WeightTensor> {
        let n = self.network.n_neurons;
        let base: HashMap<(u16, u16), BaseWeights> = self
            .network
            .base_weights
            .iter()
            .map(|pair| ((pair.source_core, pair.dest_core), pair.weights))
            .collect();
        let composer = WeightComposer::recurrent(base, self.cores()?)?;

        let mut masks = Array3::<u8>::zeros((n, n, NUM_SYNAPSES));
        if let Some(random) = &self.network.random {
            let drawn = dynapsim_core::random_masks(n, n, random.fill_rate, random.seed)?;
            masks
                .index_axis_mut(Axis(2), random.synapse.index())
                .assign(&drawn);
        }
        for conn in &self.network.connections {
            if conn.pre >= n || conn.post >= n {
                return Err(CliError::config(format!(
                    "connection {} -> {} is outside a network of {} neurons",
                    conn.pre, conn.post, n
                )));
            }
            masks[[conn.pre, conn.post, conn.synapse.index()]] = conn.mask;
        }
        Ok(composer.compose(&masks)?)
    }

    /// Sum every stimulus into one `(steps, n, 4)` raster
    pub fn input(&self, steps: usize) -> CliResult<Array3<f64>> {
        let n = self.network.n_neurons;
        let dt = self.simulation.params.dt;
        let mut input = Stimulus::silent(steps, n);
        for stimulus in &self.stimulus {
            match stimulus {
                StimulusConfig::Poisson {
                    synapse,
                    rate,
                    seed,
                    neurons,
                } => {
                    let mut raster = Stimulus::poisson(steps, n, *synapse, *rate, dt, *seed)?;
                    if let Some(targets) = neurons {
                        if let Some(&bad) = targets.iter().find(|&&j| j >= n) {
                            return Err(CliError::config(format!(
                                "stimulus targets neuron {} of {}",
                                bad, n
                            )));
                        }
                        for j in (0..n).filter(|j| !targets.contains(j)) {
                            raster.index_axis_mut(Axis(1), j).fill(0.0);
                        }
                    }
                    input += &raster;
                }
                StimulusConfig::Events { events } => {
                    input += &Stimulus::custom(steps, n, events)?;
                }
            }
        }
        Ok(input)
    }

    /// Build the simulator
    pub fn build(&self) -> CliResult<DynapSim> {
        let n = self.network.n_neurons;
        let mut params = CircuitParameters::from_specification(n, &self.core, &self.layout)?;
        if let Some(mismatch) = self.network.mismatch {
            params = params.with_mismatch(mismatch.percent, mismatch.seed, &self.layout)?;
        }
        let sim = DynapSim::new(
            self.layout,
            params,
            self.weights()?,
            self.simulation.params,
        )?;
        Ok(sim)
    }
}
