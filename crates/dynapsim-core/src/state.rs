//! Per-neuron circuit state

use crate::synapse::{SynapseType, NUM_SYNAPSES};

/// Dynamic state of one neuron, mutated once per time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeuronCircuitState {
    /// Synapse currents in channel order
    pub isyn: [f64; NUM_SYNAPSES],
    /// Adaptation current
    pub iahp: f64,
    /// Membrane current
    pub imem: f64,
    /// Membrane voltage
    pub vmem: f64,
    /// Spikes emitted on the last step
    pub spike: f64,
    /// Refractory time left (s)
    pub refractory: f64,
}

impl NeuronCircuitState {
    /// Resting state with every current at the dark current
    pub fn resting(io: f64) -> Self {
        Self {
            isyn: [io; NUM_SYNAPSES],
            iahp: io,
            imem: io,
            vmem: 0.0,
            spike: 0.0,
            refractory: 0.0,
        }
    }

    /// Current of one synapse channel
    pub fn synapse(&self, syn: SynapseType) -> f64 {
        self.isyn[syn.index()]
    }

    /// Whether the neuron is in its refractory period
    pub fn is_refractory(&self) -> bool {
        self.refractory > 0.0
    }

    /// Whether every current sits at or above `io`
    pub fn respects_floor(&self, io: f64) -> bool {
        self.isyn.iter().all(|&i| i >= io) && self.iahp >= io && self.imem >= io
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resting_state() {
        let state = NeuronCircuitState::resting(5e-13);
        assert!(state.respects_floor(5e-13));
        assert!(!state.is_refractory());
        assert_eq!(state.synapse(SynapseType::Nmda), 5e-13);
        assert_eq!(state.vmem, 0.0);
    }

    #[test]
    fn test_floor_violation() {
        let mut state = NeuronCircuitState::resting(5e-13);
        state.isyn[SynapseType::Shunt.index()] = 1e-14;
        assert!(!state.respects_floor(5e-13));
    }
}
