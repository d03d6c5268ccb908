//! Input spike rasters
//!
//! Inputs to [`crate::DynapSim::evolve`] are spike counts of shape `(T, N, K)`:
//! step, target neuron and synapse channel.

use crate::error::*;
use crate::synapse::{SynapseType, NUM_SYNAPSES};
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One input spike delivered to a neuron's synapse
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpikeEvent {
    /// Time step
    pub step: usize,
    /// Target neuron
    pub neuron: usize,
    /// Target channel
    pub synapse: SynapseType,
}

/// Builders for input rasters
#[derive(Debug, Clone, Copy)]
pub struct Stimulus;

impl Stimulus {
    /// Frozen Poisson raster at `rate` Hz on one channel of every neuron
    pub fn poisson(
        steps: usize,
        n_neurons: usize,
        synapse: SynapseType,
        rate: f64,
        dt: f64,
        seed: u64,
    ) -> Result<Array3<f64>> {
        require_non_negative("rate", rate)?;
        require_positive("dt", dt)?;
        let p = rate * dt;
        if p > 1.0 {
            return Err(SimError::invalid_parameter(
                "rate",
                format!("{} (with dt={})", rate, dt),
                "rate * dt <= 1",
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut input = Array3::zeros((steps, n_neurons, NUM_SYNAPSES));
        let k = synapse.index();
        for t in 0..steps {
            for j in 0..n_neurons {
                if rng.gen::<f64>() < p {
                    input[[t, j, k]] = 1.0;
                }
            }
        }
        log::debug!(
            "Generated Poisson input: {} Hz on {} for {} neurons over {} steps",
            rate,
            synapse.name(),
            n_neurons,
            steps
        );
        Ok(input)
    }

    /// Raster from explicit events; coincident events accumulate
    pub fn custom(steps: usize, n_neurons: usize, events: &[SpikeEvent]) -> Result<Array3<f64>> {
        let mut input = Array3::zeros((steps, n_neurons, NUM_SYNAPSES));
        for event in events {
            if event.step >= steps || event.neuron >= n_neurons {
                return Err(SimError::shape_mismatch(
                    "spike event",
                    (steps, n_neurons),
                    (event.step, event.neuron),
                ));
            }
            input[[event.step, event.neuron, event.synapse.index()]] += 1.0;
        }
        Ok(input)
    }

    /// Empty raster
    pub fn silent(steps: usize, n_neurons: usize) -> Array3<f64> {
        Array3::zeros((steps, n_neurons, NUM_SYNAPSES))
    }
}
