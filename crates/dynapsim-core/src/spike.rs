//! Spike generation with a surrogate gradient
//!
//! The forward pass thresholds the membrane current. The backward pass is
//! exposed as a plain function so that any training loop can wire it into
//! its own differentiation machinery.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Forward/backward contract of a differentiable spike nonlinearity
pub trait SpikeFunction: Send + Sync {
    /// Spike count emitted for membrane current `imem`
    fn forward(&self, imem: f64, ispkthr: f64, ireset: f64) -> f64;

    /// Gradient of the loss with respect to `imem`, given the upstream gradient
    fn backward(&self, grad_out: f64, imem: f64, ispkthr: f64, ireset: f64) -> f64;

    /// Gradients with respect to `(imem, ispkthr, ireset)`
    fn backward_all(&self, grad_out: f64, imem: f64, ispkthr: f64, ireset: f64) -> (f64, f64, f64) {
        (self.backward(grad_out, imem, ispkthr, ireset), 0.0, 0.0)
    }
}

/// How the forward pass counts spikes within one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SpikeMode {
    /// At most one spike per step, `Imem > Ispkthr`
    #[default]
    Binary,
    /// `max(0, floor(Imem - Ispkthr) + 1)` spikes per step
    Multi,
}

/// Heaviside step with a piecewise-linear surrogate derivative.
///
/// The threshold and reset currents receive no gradient.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepPwl {
    /// Forward counting rule
    pub mode: SpikeMode,
}

impl StepPwl {
    /// Create a step function with the given counting rule
    pub fn new(mode: SpikeMode) -> Self {
        Self { mode }
    }
}

impl SpikeFunction for StepPwl {
    #[inline]
    fn forward(&self, imem: f64, ispkthr: f64, _ireset: f64) -> f64 {
        match self.mode {
            SpikeMode::Binary => {
                if imem > ispkthr {
                    1.0
                } else {
                    0.0
                }
            }
            SpikeMode::Multi => ((imem - ispkthr).floor() + 1.0).max(0.0),
        }
    }

    #[inline]
    fn backward(&self, grad_out: f64, imem: f64, ispkthr: f64, ireset: f64) -> f64 {
        if imem > ireset {
            grad_out * (ispkthr - ireset)
        } else {
            0.0
        }
    }
}

/// Result of thresholding one neuron
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeOutcome {
    /// Spikes emitted this step
    pub spike: f64,
    /// Membrane current after a possible reset
    pub imem: f64,
    /// Refractory time left after this step
    pub refractory: f64,
}

/// Applies the spike state machine: threshold, reset and refractory timer
#[derive(Debug, Clone, Copy)]
pub struct SpikeGenerator<F: SpikeFunction = StepPwl> {
    function: F,
}

impl Default for SpikeGenerator<StepPwl> {
    fn default() -> Self {
        Self::new(StepPwl::default())
    }
}

impl<F: SpikeFunction> SpikeGenerator<F> {
    /// Wrap a spike function
    pub fn new(function: F) -> Self {
        Self { function }
    }

    /// The wrapped spike function
    pub fn function(&self) -> &F {
        &self.function
    }

    /// Threshold `imem`, resetting it and arming the refractory timer on a spike.
    ///
    /// Without a spike the timer counts down by `dt`. Residues below a
    /// millionth of `dt` are snapped to zero so that a refractory period of
    /// `t_ref` gates exactly `round(t_ref / dt)` steps.
    #[inline]
    pub fn fire(
        &self,
        imem: f64,
        refractory: f64,
        ispkthr: f64,
        ireset: f64,
        t_ref: f64,
        dt: f64,
    ) -> SpikeOutcome {
        let spike = self.function.forward(imem, ispkthr, ireset);
        if spike > 0.0 {
            SpikeOutcome {
                spike,
                imem: ireset,
                refractory: t_ref.max(0.0),
            }
        } else {
            let mut remaining = (refractory - dt).max(0.0);
            if remaining <= dt * 1e-6 {
                remaining = 0.0;
            }
            SpikeOutcome {
                spike,
                imem,
                refractory: remaining,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THR: f64 = 1e-6;
    const RESET: f64 = 5e-13;

    #[test]
    fn test_binary_forward() {
        let step = StepPwl::new(SpikeMode::Binary);
        assert_eq!(step.forward(2e-6, THR, RESET), 1.0);
        assert_eq!(step.forward(1e-6, THR, RESET), 0.0);
        assert_eq!(step.forward(1e-9, THR, RESET), 0.0);
    }

    #[test]
    fn test_multi_forward() {
        let step = StepPwl::new(SpikeMode::Multi);
        assert_eq!(step.forward(2e-6, THR, RESET), 1.0);
        assert_eq!(step.forward(1e-9, THR, RESET), 0.0);
        // the floor rule emits one spike per unit above threshold
        assert_eq!(step.forward(2.5, 0.0, RESET), 3.0);
    }

    #[test]
    fn test_surrogate_gradient() {
        let step = StepPwl::default();
        let g = step.backward(2.0, 1e-7, THR, RESET);
        assert!((g - 2.0 * (THR - RESET)).abs() < 1e-24);
        assert_eq!(step.backward(2.0, RESET, THR, RESET), 0.0);

        let (_, d_thr, d_reset) = step.backward_all(1.0, 1e-7, THR, RESET);
        assert_eq!(d_thr, 0.0);
        assert_eq!(d_reset, 0.0);
    }

    #[test]
    fn test_fire_resets_and_arms_timer() {
        let gen = SpikeGenerator::default();
        let out = gen.fire(5e-6, 0.0, THR, RESET, 2e-3, 1e-3);
        assert_eq!(out.spike, 1.0);
        assert_eq!(out.imem, RESET);
        assert_eq!(out.refractory, 2e-3);
    }

    #[test]
    fn test_refractory_countdown() {
        let gen = SpikeGenerator::default();
        let mut timer = 50e-3;
        let mut steps = 0;
        while timer > 0.0 {
            timer = gen.fire(1e-9, timer, THR, RESET, 50e-3, 1e-3).refractory;
            steps += 1;
            assert!(timer >= 0.0);
        }
        assert_eq!(steps, 50);
    }
}
