//! Time-stepped evolution of a Dynap-SE population

use crate::{
    error::*,
    layout::LayoutConstants,
    membrane::MembraneIntegrator,
    params::{CircuitParameters, CoreSpecification},
    spike::{SpikeGenerator, SpikeMode, StepPwl},
    state::NeuronCircuitState,
    synapse::{AdaptationBlock, PulseIncrement, SynapseBank, NUM_SYNAPSES},
    weights::WeightTensor,
};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Simulation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationParams {
    /// Time step (s)
    pub dt: f64,
    /// Pulse width rule for coincident input spikes
    pub pulse_increment: PulseIncrement,
    /// Spike counting rule
    pub spike_mode: SpikeMode,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            pulse_increment: PulseIncrement::Linear,
            spike_mode: SpikeMode::Binary,
        }
    }
}

impl SimulationParams {
    /// Create new simulation parameters with validation
    pub fn new(dt: f64) -> Result<Self> {
        require_positive("dt", dt)?;
        Ok(Self {
            dt,
            ..Default::default()
        })
    }

    /// Set the pulse width rule
    pub fn with_pulse_increment(mut self, increment: PulseIncrement) -> Self {
        self.pulse_increment = increment;
        self
    }

    /// Set the spike counting rule
    pub fn with_spike_mode(mut self, mode: SpikeMode) -> Self {
        self.spike_mode = mode;
        self
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.dt)?;
        Ok(())
    }
}

/// Per-step state traces
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Synapse currents `(T, N, K)`
    pub isyn: Array3<f64>,
    /// Adaptation currents `(T, N)`
    pub iahp: Array2<f64>,
    /// Membrane currents `(T, N)`
    pub imem: Array2<f64>,
    /// Membrane voltages `(T, N)`
    pub vmem: Array2<f64>,
}

impl Record {
    fn new(steps: usize, n: usize) -> Self {
        Self {
            isyn: Array3::zeros((steps, n, NUM_SYNAPSES)),
            iahp: Array2::zeros((steps, n)),
            imem: Array2::zeros((steps, n)),
            vmem: Array2::zeros((steps, n)),
        }
    }

    fn store(&mut self, t: usize, state: &[NeuronCircuitState]) {
        for (j, s) in state.iter().enumerate() {
            for (k, &i) in s.isyn.iter().enumerate() {
                self.isyn[[t, j, k]] = i;
            }
            self.iahp[[t, j]] = s.iahp;
            self.imem[[t, j]] = s.imem;
            self.vmem[[t, j]] = s.vmem;
        }
    }
}

/// Output of [`DynapSim::evolve`]
#[derive(Debug, Clone, PartialEq)]
pub struct EvolveResult {
    /// Spike raster `(T, N)`
    pub spikes: Array2<f64>,
    /// State traces, when requested
    pub record: Option<Record>,
}

impl EvolveResult {
    /// Number of simulated steps
    pub fn steps(&self) -> usize {
        self.spikes.nrows()
    }

    /// Spike count of every neuron
    pub fn spike_counts(&self) -> Array1<f64> {
        self.spikes.sum_axis(Axis(0))
    }

    /// Total spike count
    pub fn total_spikes(&self) -> f64 {
        self.spikes.sum()
    }

    /// Firing rate of every neuron (Hz)
    pub fn firing_rates(&self, dt: f64) -> Array1<f64> {
        let duration = self.steps() as f64 * dt;
        if duration > 0.0 {
            self.spike_counts() / duration
        } else {
            Array1::zeros(self.spikes.ncols())
        }
    }
}

/// Dynap-SE population simulator.
///
/// Each call to [`DynapSim::step`] advances the synapses, the adaptation
/// block, the membrane and the spike generator of every neuron by one time
/// step. Spikes emitted on step `t` reach their postsynaptic targets through
/// the recurrent weights on step `t + 1`.
#[derive(Debug, Clone)]
pub struct DynapSim {
    layout: LayoutConstants,
    params: CircuitParameters,
    weights: WeightTensor,
    sim: SimulationParams,
    synapses: SynapseBank,
    adaptation: AdaptationBlock,
    membrane: MembraneIntegrator,
    spike_gen: SpikeGenerator<StepPwl>,
    state: Vec<NeuronCircuitState>,
}

impl DynapSim {
    /// Create a simulator, checking every shape up front
    pub fn new(
        layout: LayoutConstants,
        params: CircuitParameters,
        weights: WeightTensor,
        sim: SimulationParams,
    ) -> Result<Self> {
        layout.validate()?;
        params.validate()?;
        sim.validate()?;

        let n = params.n_neurons();
        Self::check_weights(&weights, n)?;

        let io = layout.io;
        Ok(Self {
            synapses: SynapseBank::new(&layout, sim.pulse_increment),
            adaptation: AdaptationBlock::new(&layout, sim.pulse_increment),
            membrane: MembraneIntegrator::new(&layout),
            spike_gen: SpikeGenerator::new(StepPwl::new(sim.spike_mode)),
            state: vec![NeuronCircuitState::resting(io); n],
            layout,
            params,
            weights,
            sim,
        })
    }

    /// Create `n` unconnected neurons from a core specification
    pub fn from_specification(
        n: usize,
        spec: &CoreSpecification,
        layout: LayoutConstants,
        sim: SimulationParams,
    ) -> Result<Self> {
        let params = CircuitParameters::from_specification(n, spec, &layout)?;
        Self::new(layout, params, WeightTensor::zeros(n, n), sim)
    }

    fn check_weights(weights: &WeightTensor, n: usize) -> Result<()> {
        if weights.dim() != (n, n, NUM_SYNAPSES) {
            return Err(SimError::shape_mismatch(
                "recurrent weights",
                (n, n, NUM_SYNAPSES),
                weights.dim(),
            ));
        }
        Ok(())
    }

    /// Number of neurons
    pub fn n_neurons(&self) -> usize {
        self.state.len()
    }

    /// Layout constants
    pub fn layout(&self) -> &LayoutConstants {
        &self.layout
    }

    /// Circuit parameters
    pub fn params(&self) -> &CircuitParameters {
        &self.params
    }

    /// Simulation parameters
    pub fn sim_params(&self) -> &SimulationParams {
        &self.sim
    }

    /// Recurrent weights
    pub fn weights(&self) -> &WeightTensor {
        &self.weights
    }

    /// Current state of every neuron
    pub fn state(&self) -> &[NeuronCircuitState] {
        &self.state
    }

    /// Replace the recurrent weights
    pub fn set_weights(&mut self, weights: WeightTensor) -> Result<()> {
        Self::check_weights(&weights, self.n_neurons())?;
        self.weights = weights;
        Ok(())
    }

    /// Restore every neuron to rest
    pub fn reset_state(&mut self) {
        let resting = NeuronCircuitState::resting(self.layout.io);
        self.state.iter_mut().for_each(|s| *s = resting);
    }

    /// Pulse counts arriving on every `(neuron, channel)` this step.
    ///
    /// Recurrent weight currents are expressed in multiples of the
    /// postsynaptic unit weight current.
    fn synaptic_drive(&self, external: ArrayView2<f64>) -> Array2<f64> {
        let mut recurrent = Array2::<f64>::zeros((self.n_neurons(), NUM_SYNAPSES));
        let w = self.weights.as_array();
        for (i, s) in self.state.iter().enumerate() {
            if s.spike > 0.0 {
                recurrent.scaled_add(s.spike, &w.index_axis(Axis(0), i));
            }
        }

        let io = self.layout.io;
        let iw = &self.params.iw_syn;
        for ((j, k), drive) in recurrent.indexed_iter_mut() {
            if *drive > 0.0 {
                *drive /= iw[[k, j]].max(io);
            }
        }
        recurrent + &external
    }

    /// Advance every neuron by one step.
    ///
    /// `external` holds input spike counts of shape `(N, K)`. Returns the
    /// spikes emitted on this step. A step that produces a non-finite current
    /// fails with [`SimError::NumericalError`] and leaves the state as it was
    /// before the call.
    pub fn step(&mut self, external: ArrayView2<f64>) -> Result<Array1<f64>> {
        let n = self.n_neurons();
        if external.dim() != (n, NUM_SYNAPSES) {
            return Err(SimError::shape_mismatch(
                "external input",
                (n, NUM_SYNAPSES),
                external.dim(),
            ));
        }
        if let Err(j) = self.checked_advance(external) {
            return Err(SimError::numerical_error(format!(
                "non-finite current in neuron {}",
                j
            )));
        }
        Ok(self.state.iter().map(|s| s.spike).collect())
    }

    fn advance(&mut self, external: ArrayView2<f64>) {
        let drive = self.synaptic_drive(external);
        let dt = self.sim.dt;
        let params = &self.params;
        let synapses = &self.synapses;
        let adaptation = &self.adaptation;
        let membrane = &self.membrane;
        let spike_gen = &self.spike_gen;

        let update = |(j, s): (usize, &mut NeuronCircuitState)| {
            let row = drive.row(j);
            let pulses = [row[0], row[1], row[2], row[3]];
            synapses.update(
                &mut s.isyn,
                &params.synapse_biases(j),
                &pulses,
                params.t_pulse[j],
                dt,
            );

            // adaptation is driven by the spike of the previous step
            s.iahp = adaptation.update(s.iahp, params.ahp_bias(j), s.spike, params.t_pulse_ahp[j], dt);

            let out = membrane.update(
                s.imem,
                s.vmem,
                &s.isyn,
                s.iahp,
                s.refractory,
                params.membrane_bias(j),
                dt,
            );

            let fired = spike_gen.fire(
                out.imem,
                s.refractory,
                params.ispkthr[j],
                params.ireset[j],
                params.t_ref[j],
                dt,
            );
            s.imem = fired.imem;
            s.vmem = if fired.spike > 0.0 {
                membrane.voltage(fired.imem)
            } else {
                out.vmem
            };
            s.spike = fired.spike;
            s.refractory = fired.refractory;
        };

        #[cfg(feature = "parallel")]
        self.state.par_iter_mut().enumerate().for_each(update);

        #[cfg(not(feature = "parallel"))]
        self.state.iter_mut().enumerate().for_each(update);
    }

    /// Advance one step, rolling back to the previous state if any neuron
    /// ends up non-finite. The error carries the first such neuron.
    fn checked_advance(&mut self, external: ArrayView2<f64>) -> std::result::Result<(), usize> {
        let previous = self.state.clone();
        self.advance(external);
        match self.first_non_finite() {
            Some(j) => {
                self.state = previous;
                Err(j)
            }
            None => Ok(()),
        }
    }

    fn first_non_finite(&self) -> Option<usize> {
        self.state.iter().position(|s| {
            !(s.imem.is_finite() && s.iahp.is_finite() && s.isyn.iter().all(|i| i.is_finite()))
        })
    }

    /// Run over an input raster of shape `(T, N, K)`.
    ///
    /// Evolution continues from the current state; call
    /// [`DynapSim::reset_state`] first for an independent run. On a
    /// non-finite step the state is left at the last finite step.
    pub fn evolve(&mut self, input: &Array3<f64>, record: bool) -> Result<EvolveResult> {
        let (steps, n, k) = input.dim();
        if (n, k) != (self.n_neurons(), NUM_SYNAPSES) {
            return Err(SimError::shape_mismatch(
                "input raster",
                (steps, self.n_neurons(), NUM_SYNAPSES),
                input.dim(),
            ));
        }
        if let Some(bad) = input.iter().find(|v| !v.is_finite()) {
            return Err(SimError::invalid_parameter(
                "input",
                bad.to_string(),
                "finite spike counts",
            ));
        }

        log::info!(
            "Starting evolution: {} neurons, {} steps of {} s",
            n,
            steps,
            self.sim.dt
        );

        let mut spikes = Array2::zeros((steps, n));
        let mut trace = record.then(|| Record::new(steps, n));

        for t in 0..steps {
            if let Err(j) = self.checked_advance(input.index_axis(Axis(0), t)) {
                return Err(SimError::numerical_error(format!(
                    "non-finite current in neuron {} at step {}",
                    j, t
                )));
            }

            for (j, s) in self.state.iter().enumerate() {
                spikes[[t, j]] = s.spike;
            }
            if let Some(trace) = trace.as_mut() {
                trace.store(t, &self.state);
            }

            if t % (steps / 10).max(1) == 0 {
                let progress = (t as f64 / steps as f64) * 100.0;
                log::debug!("Evolution progress: {:.1}%", progress);
            }
        }

        let result = EvolveResult {
            spikes,
            record: trace,
        };
        log::info!(
            "Evolution completed: {} spikes in {} steps",
            result.total_spikes(),
            steps
        );
        Ok(result)
    }

    /// Evolve independent instances, each from rest, over their own inputs
    pub fn evolve_batch(&self, inputs: &[Array3<f64>], record: bool) -> Result<Vec<EvolveResult>> {
        let run = |input: &Array3<f64>| {
            let mut instance = self.clone();
            instance.reset_state();
            instance.evolve(input, record)
        };

        #[cfg(feature = "parallel")]
        let results: Result<Vec<EvolveResult>> = inputs.par_iter().map(run).collect();

        #[cfg(not(feature = "parallel"))]
        let results: Result<Vec<EvolveResult>> = inputs.iter().map(run).collect();

        results
    }
}
