//! Physical layout constants of the Dynap-SE neuron circuit

use crate::error::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Silicon layout and process constants shared by every neuron of a run
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LayoutConstants {
    /// Thermal voltage (V)
    pub ut: f64,
    /// Subthreshold slope factor of n-type transistors
    pub kappa_n: f64,
    /// Subthreshold slope factor of p-type transistors
    pub kappa_p: f64,
    /// Dark current, the floor for every simulated current (A)
    pub io: f64,
    /// Pulse extender threshold voltage (V)
    pub vth: f64,
    /// AHP block capacitance (F)
    pub c_ahp: f64,
    /// AMPA synapse capacitance (F)
    pub c_ampa: f64,
    /// GABA synapse capacitance (F)
    pub c_gaba: f64,
    /// NMDA synapse capacitance (F)
    pub c_nmda: f64,
    /// Shunting synapse capacitance (F)
    pub c_shunt: f64,
    /// Membrane capacitance (F)
    pub c_mem: f64,
    /// Synaptic pulse extender capacitance (F)
    pub c_pulse: f64,
    /// AHP pulse extender capacitance (F)
    pub c_pulse_ahp: f64,
    /// Refractory period capacitance (F)
    pub c_ref: f64,
}

impl Default for LayoutConstants {
    fn default() -> Self {
        Self {
            ut: 25e-3,
            kappa_n: 0.75,
            kappa_p: 0.66,
            io: 5e-13,
            vth: 0.7,
            c_ahp: 40e-12,
            c_ampa: 24.5e-12,
            c_gaba: 25e-12,
            c_nmda: 25e-12,
            c_shunt: 24.5e-12,
            c_mem: 3e-12,
            c_pulse: 0.5e-12,
            c_pulse_ahp: 0.5e-12,
            c_ref: 1.5e-12,
        }
    }
}

impl LayoutConstants {
    /// Check that every constant is finite and strictly positive
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("ut", self.ut),
            ("kappa_n", self.kappa_n),
            ("kappa_p", self.kappa_p),
            ("io", self.io),
            ("vth", self.vth),
            ("c_ahp", self.c_ahp),
            ("c_ampa", self.c_ampa),
            ("c_gaba", self.c_gaba),
            ("c_nmda", self.c_nmda),
            ("c_shunt", self.c_shunt),
            ("c_mem", self.c_mem),
            ("c_pulse", self.c_pulse),
            ("c_pulse_ahp", self.c_pulse_ahp),
            ("c_ref", self.c_ref),
        ];
        for (name, value) in fields {
            require_positive(name, value)?;
        }
        Ok(())
    }

    /// Mean subthreshold slope factor
    pub fn kappa(&self) -> f64 {
        (self.kappa_n + self.kappa_p) / 2.0
    }

    /// Time-constant factor of a DPI block with capacitance `capacitance`.
    ///
    /// The block time constant is `f_tau / Itau`.
    pub fn f_tau(&self, capacitance: f64) -> f64 {
        self.ut / self.kappa() * capacitance
    }

    /// Convert a time constant into the leakage current producing it
    pub fn tau_to_current(&self, capacitance: f64, tau: f64) -> f64 {
        self.f_tau(capacitance) / tau
    }

    /// Convert a leakage current into the time constant it produces
    pub fn current_to_tau(&self, capacitance: f64, current: f64) -> f64 {
        self.f_tau(capacitance) / current.max(self.io)
    }

    /// Pulse extender width for a given bias current, `t = vth * C / I`
    pub fn pulse_width(&self, capacitance: f64, current: f64) -> f64 {
        self.vth * capacitance / current.max(self.io)
    }

    /// Bias current producing a given pulse width, `I = vth * C / t`
    pub fn pulse_current(&self, capacitance: f64, width: f64) -> f64 {
        self.vth * capacitance / width
    }

    /// Exponent factor of the membrane positive feedback, `kappa^2 / (kappa + 1) / Ut`
    pub fn feedback_gain(&self) -> f64 {
        let kappa = self.kappa();
        kappa * kappa / (kappa + 1.0) / self.ut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        let layout = LayoutConstants::default();
        assert!(layout.validate().is_ok());
        assert!((layout.kappa() - 0.705).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_layout() {
        let layout = LayoutConstants {
            io: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(SimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_tau_current_conversion_is_symmetric() {
        let layout = LayoutConstants::default();
        let itau = layout.tau_to_current(layout.c_ampa, 10e-3);
        let tau = layout.current_to_tau(layout.c_ampa, itau);
        assert!((tau - 10e-3).abs() / 10e-3 < 1e-12);
    }

    #[test]
    fn test_pulse_width_relation() {
        let layout = LayoutConstants::default();
        let current = layout.pulse_current(layout.c_pulse, 10e-6);
        assert!((layout.pulse_width(layout.c_pulse, current) - 10e-6).abs() < 1e-18);
    }
}
