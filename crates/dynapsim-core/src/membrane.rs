//! Current-mode AdExp-LIF membrane

use crate::layout::LayoutConstants;
use crate::synapse::{SynapseType, NUM_SYNAPSES};

/// Largest exponent fed to the positive feedback exponential
const MAX_FEEDBACK_EXPONENT: f64 = 80.0;

/// Membrane biases of one neuron
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembraneBias {
    /// Leakage current
    pub itau: f64,
    /// Gain ratio `Ith / Itau`
    pub f_gain: f64,
    /// Constant injected current
    pub idc: f64,
    /// NMDA gating threshold current
    pub if_nmda: f64,
}

/// Membrane state produced by one integration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembraneOutput {
    /// Membrane current
    pub imem: f64,
    /// Membrane voltage
    pub vmem: f64,
}

/// Integrates synaptic currents into the membrane current
#[derive(Debug, Clone)]
pub struct MembraneIntegrator {
    f_tau: f64,
    feedback_gain: f64,
    ut_over_kappa: f64,
    io: f64,
}

impl MembraneIntegrator {
    /// Build the integrator for a layout
    pub fn new(layout: &LayoutConstants) -> Self {
        Self {
            f_tau: layout.f_tau(layout.c_mem),
            feedback_gain: layout.feedback_gain(),
            ut_over_kappa: layout.ut / layout.kappa(),
            io: layout.io,
        }
    }

    /// Membrane voltage for a membrane current
    #[inline]
    pub fn voltage(&self, imem: f64) -> f64 {
        self.ut_over_kappa * (imem.max(self.io) / self.io).ln()
    }

    /// One forward-Euler step of the membrane.
    ///
    /// `refractory` gates the input current to the floor while positive.
    #[inline]
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        imem: f64,
        vmem: f64,
        isyn: &[f64; NUM_SYNAPSES],
        iahp: f64,
        refractory: f64,
        bias: MembraneBias,
        dt: f64,
    ) -> MembraneOutput {
        let io = self.io;
        let imem_c = imem.max(io);
        let iampa = isyn[SynapseType::Ampa.index()];
        let igaba = isyn[SynapseType::Gaba.index()];
        let inmda = isyn[SynapseType::Nmda.index()];
        let ishunt = isyn[SynapseType::Shunt.index()];

        let i_nmda_dp = inmda / (1.0 + bias.if_nmda / imem_c);

        let iin = if refractory > 0.0 {
            io
        } else {
            (i_nmda_dp + iampa - igaba + bias.idc).max(io)
        };

        let itau = bias.itau.max(io);
        let ith = itau * bias.f_gain;
        let ileak = itau + ishunt.max(0.0);
        let tau_prime = self.f_tau / ileak * (1.0 + ith / imem_c);

        let imem_inf = bias.f_gain * (iin - iahp - ileak);

        let exponent = (self.feedback_gain * vmem).min(MAX_FEEDBACK_EXPONENT);
        let ifb = io * exponent.exp();
        let f_imem = ifb / ileak * (imem_c + ith);

        let d_imem = dt / tau_prime * (imem_inf + f_imem - imem_c * (1.0 + iahp / ileak));
        let imem = (imem_c + d_imem).max(io);

        MembraneOutput {
            imem,
            vmem: self.voltage(imem),
        }
    }
}
