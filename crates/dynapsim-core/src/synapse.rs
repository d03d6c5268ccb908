//! DPI synapse dynamics
//!
//! Each neuron carries four Differential Pair Integrator synapses plus the
//! spike-frequency adaptation block, which shares the same circuit. A DPI
//! charges towards `Isyn_inf` while its pulse extender is active and leaks
//! with a time constant that itself depends on the synaptic current.

use crate::layout::LayoutConstants;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of synapse channels per neuron, excluding adaptation
pub const NUM_SYNAPSES: usize = 4;

/// Synapse channel, in the fixed index order used by weights, inputs and records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SynapseType {
    /// Fast excitatory
    Ampa,
    /// Subtractive inhibitory (GABA_B)
    Gaba,
    /// Slow voltage-gated excitatory
    Nmda,
    /// Shunting inhibitory (GABA_A), adds to the membrane leak
    Shunt,
}

impl SynapseType {
    /// All channels in index order
    pub const ALL: [SynapseType; NUM_SYNAPSES] = [
        SynapseType::Ampa,
        SynapseType::Gaba,
        SynapseType::Nmda,
        SynapseType::Shunt,
    ];

    /// Position of the channel along the synapse axis
    pub fn index(self) -> usize {
        match self {
            SynapseType::Ampa => 0,
            SynapseType::Gaba => 1,
            SynapseType::Nmda => 2,
            SynapseType::Shunt => 3,
        }
    }

    /// Lowercase channel name
    pub fn name(self) -> &'static str {
        match self {
            SynapseType::Ampa => "ampa",
            SynapseType::Gaba => "gaba",
            SynapseType::Nmda => "nmda",
            SynapseType::Shunt => "shunt",
        }
    }

    /// Synapse capacitance of the channel
    pub fn capacitance(self, layout: &LayoutConstants) -> f64 {
        match self {
            SynapseType::Ampa => layout.c_ampa,
            SynapseType::Gaba => layout.c_gaba,
            SynapseType::Nmda => layout.c_nmda,
            SynapseType::Shunt => layout.c_shunt,
        }
    }
}

impl std::str::FromStr for SynapseType {
    type Err = crate::error::SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ampa" => Ok(SynapseType::Ampa),
            "gaba" => Ok(SynapseType::Gaba),
            "nmda" => Ok(SynapseType::Nmda),
            "shunt" => Ok(SynapseType::Shunt),
            other => Err(crate::error::SimError::invalid_parameter(
                "synapse",
                other,
                "one of ampa, gaba, nmda, shunt",
            )),
        }
    }
}

/// How coincident input pulses within one step extend the pulse width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PulseIncrement {
    /// `t_pw = n * t_pulse`
    #[default]
    Linear,
    /// `t_pw = dt * (1 - exp(-n * t_pulse / dt))`, saturating at `dt`
    Logarithmic,
}

impl PulseIncrement {
    /// Effective pulse width of `count` pulses of width `t_pulse`
    #[inline]
    pub fn pulse_width(self, count: f64, t_pulse: f64, dt: f64) -> f64 {
        let count = count.max(0.0);
        match self {
            PulseIncrement::Linear => count * t_pulse,
            PulseIncrement::Logarithmic => dt * (1.0 - (-count * t_pulse / dt).exp()),
        }
    }
}

/// Bias currents of one DPI circuit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DpiBias {
    /// Leakage current
    pub itau: f64,
    /// Gain ratio `Ith / Itau`
    pub f_gain: f64,
    /// Weight current
    pub iw: f64,
}

/// Advance one DPI current by `dt` given the active pulse width.
///
/// The result never drops below `io`.
#[inline]
pub fn dpi_step(isyn: f64, bias: DpiBias, f_tau: f64, pulse_width: f64, dt: f64, io: f64) -> f64 {
    let itau = bias.itau.max(io);
    let ith = itau * bias.f_gain;
    let isyn_inf = (bias.f_gain * bias.iw - ith).max(0.0);
    let tau_prime = f_tau / itau * (1.0 + ith / isyn.max(io));

    let charge = 1.0 - (-pulse_width / tau_prime).exp();
    let discharge = (-dt / tau_prime).exp();

    (isyn * discharge + charge * isyn_inf).max(io)
}

/// The four DPI synapses of a neuron population
#[derive(Debug, Clone)]
pub struct SynapseBank {
    f_tau: [f64; NUM_SYNAPSES],
    increment: PulseIncrement,
    io: f64,
}

impl SynapseBank {
    /// Build the bank for a layout
    pub fn new(layout: &LayoutConstants, increment: PulseIncrement) -> Self {
        let f_tau = SynapseType::ALL.map(|syn| layout.f_tau(syn.capacitance(layout)));
        Self {
            f_tau,
            increment,
            io: layout.io,
        }
    }

    /// Time-constant factor of each channel
    pub fn f_tau(&self) -> &[f64; NUM_SYNAPSES] {
        &self.f_tau
    }

    /// Update all channels of one neuron.
    ///
    /// `drive[k]` is the number of pulses arriving on channel `k` during this step.
    #[inline]
    pub fn update(
        &self,
        isyn: &mut [f64; NUM_SYNAPSES],
        biases: &[DpiBias; NUM_SYNAPSES],
        drive: &[f64; NUM_SYNAPSES],
        t_pulse: f64,
        dt: f64,
    ) {
        for k in 0..NUM_SYNAPSES {
            let t_pw = self.increment.pulse_width(drive[k], t_pulse, dt);
            isyn[k] = dpi_step(isyn[k], biases[k], self.f_tau[k], t_pw, dt, self.io);
        }
    }
}

/// Spike-frequency adaptation driven by the neuron's own spikes
#[derive(Debug, Clone)]
pub struct AdaptationBlock {
    f_tau: f64,
    increment: PulseIncrement,
    io: f64,
}

impl AdaptationBlock {
    /// Build the block for a layout
    pub fn new(layout: &LayoutConstants, increment: PulseIncrement) -> Self {
        Self {
            f_tau: layout.f_tau(layout.c_ahp),
            increment,
            io: layout.io,
        }
    }

    /// Advance `iahp` given the spike count emitted on the previous step
    #[inline]
    pub fn update(&self, iahp: f64, bias: DpiBias, spike: f64, t_pulse_ahp: f64, dt: f64) -> f64 {
        let t_pw = self.increment.pulse_width(spike, t_pulse_ahp, dt);
        dpi_step(iahp, bias, self.f_tau, t_pw, dt, self.io)
    }
}
