//! Circuit parameters
//!
//! Parameters are stored as flat arrays indexed by synapse channel and neuron
//! so that every neuron can be updated independently. They are built either
//! from a high-level [`CoreSpecification`] of time constants and gain ratios
//! or from the bias registers read back from a device.

use crate::biasgen::{BiasQuantizer, BiasRegister};
use crate::error::*;
use crate::layout::LayoutConstants;
use crate::membrane::MembraneBias;
use crate::synapse::{DpiBias, SynapseType, NUM_SYNAPSES};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dynap-SE1 bias names of the membrane block
pub mod bias_names {
    /// Membrane leakage
    pub const IF_TAU1_N: &str = "IF_TAU1_N";
    /// Membrane gain
    pub const IF_THR_N: &str = "IF_THR_N";
    /// Refractory period
    pub const IF_RFR_N: &str = "IF_RFR_N";
    /// Synaptic pulse width
    pub const PULSE_PWLK_P: &str = "PULSE_PWLK_P";
    /// Constant injection
    pub const IF_DC_P: &str = "IF_DC_P";
    /// NMDA gating threshold
    pub const IF_NMDA_N: &str = "IF_NMDA_N";
    /// AHP leakage
    pub const IF_AHTAU_N: &str = "IF_AHTAU_N";
    /// AHP gain
    pub const IF_AHTHR_N: &str = "IF_AHTHR_N";
    /// AHP weight
    pub const IF_AHW_P: &str = "IF_AHW_P";
    /// Secondary leakage, kept at its maximum
    pub const IF_TAU2_N: &str = "IF_TAU2_N";
    /// Membrane voltage readout buffer
    pub const IF_BUF_P: &str = "IF_BUF_P";
    /// AHP cascode, kept at the dark current
    pub const IF_CASC_N: &str = "IF_CASC_N";
}

/// Dynap-SE1 `(tau, threshold, weight)` bias names of a synapse channel
pub fn synapse_bias_names(syn: SynapseType) -> (&'static str, &'static str, &'static str) {
    match syn {
        SynapseType::Ampa => ("NPDPIE_TAU_F_P", "NPDPIE_THR_F_P", "PS_WEIGHT_EXC_F_N"),
        SynapseType::Nmda => ("NPDPIE_TAU_S_P", "NPDPIE_THR_S_P", "PS_WEIGHT_EXC_S_N"),
        SynapseType::Gaba => ("NPDPII_TAU_F_P", "NPDPII_THR_F_P", "PS_WEIGHT_INH_F_N"),
        SynapseType::Shunt => ("NPDPII_TAU_S_P", "NPDPII_THR_S_P", "PS_WEIGHT_INH_S_N"),
    }
}

/// High-level description of a core in time constants and gain ratios
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CoreSpecification {
    /// AHP time constant (s)
    pub tau_ahp: f64,
    /// AMPA time constant (s)
    pub tau_ampa: f64,
    /// GABA time constant (s)
    pub tau_gaba: f64,
    /// NMDA time constant (s)
    pub tau_nmda: f64,
    /// Shunting time constant (s)
    pub tau_shunt: f64,
    /// Membrane time constant (s)
    pub tau_mem: f64,
    /// AHP gain ratio `Ith / Itau`
    pub r_gain_ahp: f64,
    /// AMPA gain ratio
    pub r_gain_ampa: f64,
    /// GABA gain ratio
    pub r_gain_gaba: f64,
    /// NMDA gain ratio
    pub r_gain_nmda: f64,
    /// Shunting gain ratio
    pub r_gain_shunt: f64,
    /// Membrane gain ratio
    pub r_gain_mem: f64,
    /// Synaptic pulse width (s)
    pub t_pulse: f64,
    /// AHP pulse width (s)
    pub t_pulse_ahp: f64,
    /// Refractory period (s)
    pub t_ref: f64,
    /// Spiking threshold current (A)
    pub ispkthr: f64,
    /// Reset current, the dark current when unset (A)
    pub ireset: Option<f64>,
    /// Constant injection current, the dark current when unset (A)
    pub idc: Option<f64>,
    /// NMDA gating current, the dark current when unset (A)
    pub if_nmda: Option<f64>,
    /// AHP weight current (A)
    pub iw_ahp: f64,
    /// AMPA unit weight current (A)
    pub iw_ampa: f64,
    /// GABA unit weight current (A)
    pub iw_gaba: f64,
    /// NMDA unit weight current (A)
    pub iw_nmda: f64,
    /// Shunting unit weight current (A)
    pub iw_shunt: f64,
}

impl Default for CoreSpecification {
    fn default() -> Self {
        Self {
            tau_ahp: 50e-3,
            tau_ampa: 10e-3,
            tau_gaba: 100e-3,
            tau_nmda: 100e-3,
            tau_shunt: 10e-3,
            tau_mem: 20e-3,
            r_gain_ahp: 4.0,
            r_gain_ampa: 4.0,
            r_gain_gaba: 4.0,
            r_gain_nmda: 4.0,
            r_gain_shunt: 4.0,
            r_gain_mem: 2.0,
            t_pulse: 10e-6,
            t_pulse_ahp: 1e-6,
            t_ref: 2e-3,
            ispkthr: 1e-6,
            ireset: None,
            idc: None,
            if_nmda: None,
            iw_ahp: 1e-6,
            iw_ampa: 1e-6,
            iw_gaba: 1e-6,
            iw_nmda: 1e-6,
            iw_shunt: 1e-6,
        }
    }
}

impl CoreSpecification {
    /// Time constant of a synapse channel
    pub fn tau(&self, syn: SynapseType) -> f64 {
        match syn {
            SynapseType::Ampa => self.tau_ampa,
            SynapseType::Gaba => self.tau_gaba,
            SynapseType::Nmda => self.tau_nmda,
            SynapseType::Shunt => self.tau_shunt,
        }
    }

    /// Gain ratio of a synapse channel
    pub fn r_gain(&self, syn: SynapseType) -> f64 {
        match syn {
            SynapseType::Ampa => self.r_gain_ampa,
            SynapseType::Gaba => self.r_gain_gaba,
            SynapseType::Nmda => self.r_gain_nmda,
            SynapseType::Shunt => self.r_gain_shunt,
        }
    }

    /// Unit weight current of a synapse channel
    pub fn iw(&self, syn: SynapseType) -> f64 {
        match syn {
            SynapseType::Ampa => self.iw_ampa,
            SynapseType::Gaba => self.iw_gaba,
            SynapseType::Nmda => self.iw_nmda,
            SynapseType::Shunt => self.iw_shunt,
        }
    }

    /// Set the constant injection current
    pub fn with_idc(mut self, idc: f64) -> Self {
        self.idc = Some(idc);
        self
    }

    /// Set the refractory period
    pub fn with_refractory(mut self, t_ref: f64) -> Self {
        self.t_ref = t_ref;
        self
    }

    /// Validate the specification
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("tau_ahp", self.tau_ahp),
            ("tau_ampa", self.tau_ampa),
            ("tau_gaba", self.tau_gaba),
            ("tau_nmda", self.tau_nmda),
            ("tau_shunt", self.tau_shunt),
            ("tau_mem", self.tau_mem),
            ("r_gain_ahp", self.r_gain_ahp),
            ("r_gain_ampa", self.r_gain_ampa),
            ("r_gain_gaba", self.r_gain_gaba),
            ("r_gain_nmda", self.r_gain_nmda),
            ("r_gain_shunt", self.r_gain_shunt),
            ("r_gain_mem", self.r_gain_mem),
            ("ispkthr", self.ispkthr),
        ];
        for (name, value) in positive {
            require_positive(name, value)?;
        }

        let non_negative = [
            ("t_pulse", self.t_pulse),
            ("t_pulse_ahp", self.t_pulse_ahp),
            ("t_ref", self.t_ref),
            ("iw_ahp", self.iw_ahp),
            ("iw_ampa", self.iw_ampa),
            ("iw_gaba", self.iw_gaba),
            ("iw_nmda", self.iw_nmda),
            ("iw_shunt", self.iw_shunt),
        ];
        for (name, value) in non_negative {
            require_non_negative(name, value)?;
        }

        for (name, value) in [
            ("ireset", self.ireset),
            ("idc", self.idc),
            ("if_nmda", self.if_nmda),
        ] {
            if let Some(v) = value {
                require_non_negative(name, v)?;
            }
        }
        Ok(())
    }
}

/// Time constants projected back from leakage currents
#[derive(Debug, Clone, PartialEq)]
pub struct TimeConstants {
    /// Synapse time constants `(K, N)`
    pub tau_syn: Array2<f64>,
    /// AHP time constants `(N)`
    pub tau_ahp: Array1<f64>,
    /// Membrane time constants `(N)`
    pub tau_mem: Array1<f64>,
}

/// Gain ratios `Ith / Itau` of every block
#[derive(Debug, Clone, PartialEq)]
pub struct GainRatios {
    /// Synapse gain ratios `(K, N)`
    pub r_gain_syn: Array2<f64>,
    /// AHP gain ratios `(N)`
    pub r_gain_ahp: Array1<f64>,
    /// Membrane gain ratios `(N)`
    pub r_gain_mem: Array1<f64>,
}

/// Per-neuron circuit currents and timings, static during a run
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitParameters {
    /// Synapse leakage currents `(K, N)`
    pub itau_syn: Array2<f64>,
    /// Synapse gain ratios `(K, N)`
    pub f_gain_syn: Array2<f64>,
    /// Synapse unit weight currents `(K, N)`
    pub iw_syn: Array2<f64>,
    /// AHP leakage currents
    pub itau_ahp: Array1<f64>,
    /// AHP gain ratios
    pub f_gain_ahp: Array1<f64>,
    /// AHP weight currents
    pub iw_ahp: Array1<f64>,
    /// Membrane leakage currents
    pub itau_mem: Array1<f64>,
    /// Membrane gain ratios
    pub f_gain_mem: Array1<f64>,
    /// Constant injection currents
    pub idc: Array1<f64>,
    /// NMDA gating currents
    pub if_nmda: Array1<f64>,
    /// Spiking threshold currents
    pub ispkthr: Array1<f64>,
    /// Reset currents
    pub ireset: Array1<f64>,
    /// Refractory periods (s)
    pub t_ref: Array1<f64>,
    /// Synaptic pulse widths (s)
    pub t_pulse: Array1<f64>,
    /// AHP pulse widths (s)
    pub t_pulse_ahp: Array1<f64>,
}

impl CircuitParameters {
    /// Derive the currents of `n` identical neurons from a specification
    pub fn from_specification(
        n: usize,
        spec: &CoreSpecification,
        layout: &LayoutConstants,
    ) -> Result<Self> {
        if n == 0 {
            return Err(SimError::invalid_parameter("n_neurons", "0", "> 0"));
        }
        layout.validate()?;
        spec.validate()?;

        let io = layout.io;
        let leak = |name: &str, capacitance: f64, tau: f64| -> Result<f64> {
            let itau = layout.tau_to_current(capacitance, tau);
            if itau < io {
                return Err(SimError::invalid_parameter(
                    name,
                    tau.to_string(),
                    format!("a time constant whose leakage current is >= Io ({:e} A)", io),
                ));
            }
            Ok(itau)
        };

        let mut itau_syn = Array2::zeros((NUM_SYNAPSES, n));
        let mut f_gain_syn = Array2::zeros((NUM_SYNAPSES, n));
        let mut iw_syn = Array2::zeros((NUM_SYNAPSES, n));
        for syn in SynapseType::ALL {
            let k = syn.index();
            let name = format!("tau_{}", syn.name());
            itau_syn
                .row_mut(k)
                .fill(leak(&name, syn.capacitance(layout), spec.tau(syn))?);
            f_gain_syn.row_mut(k).fill(spec.r_gain(syn));
            iw_syn.row_mut(k).fill(spec.iw(syn));
        }

        let itau_ahp = leak("tau_ahp", layout.c_ahp, spec.tau_ahp)?;
        let itau_mem = leak("tau_mem", layout.c_mem, spec.tau_mem)?;

        log::debug!(
            "Derived currents for {} neurons: Itau_mem={:e} A, Itau_ampa={:e} A",
            n,
            itau_mem,
            itau_syn[[SynapseType::Ampa.index(), 0]]
        );

        Ok(Self {
            itau_syn,
            f_gain_syn,
            iw_syn,
            itau_ahp: Array1::from_elem(n, itau_ahp),
            f_gain_ahp: Array1::from_elem(n, spec.r_gain_ahp),
            iw_ahp: Array1::from_elem(n, spec.iw_ahp),
            itau_mem: Array1::from_elem(n, itau_mem),
            f_gain_mem: Array1::from_elem(n, spec.r_gain_mem),
            idc: Array1::from_elem(n, spec.idc.unwrap_or(io)),
            if_nmda: Array1::from_elem(n, spec.if_nmda.unwrap_or(io)),
            ispkthr: Array1::from_elem(n, spec.ispkthr),
            ireset: Array1::from_elem(n, spec.ireset.unwrap_or(io)),
            t_ref: Array1::from_elem(n, spec.t_ref),
            t_pulse: Array1::from_elem(n, spec.t_pulse),
            t_pulse_ahp: Array1::from_elem(n, spec.t_pulse_ahp),
        })
    }

    /// Build parameters of `n` neurons sharing one core's device bias registers.
    ///
    /// Values without a register on the device (spiking threshold, reset
    /// current, AHP pulse width) come from `fallback`.
    pub fn from_registers(
        n: usize,
        registers: &HashMap<String, BiasRegister>,
        fallback: &CoreSpecification,
        layout: &LayoutConstants,
    ) -> Result<Self> {
        use self::bias_names::*;

        let mut params = Self::from_specification(n, fallback, layout)?;
        let io = layout.io;
        let read = |name: &str| -> Result<f64> {
            let register = registers
                .get(name)
                .ok_or_else(|| SimError::missing_bias(name))?;
            let register = BiasRegister::new(register.coarse, register.fine)?;
            Ok(BiasQuantizer::current(register).max(io))
        };

        for syn in SynapseType::ALL {
            let (tau, thr, weight) = synapse_bias_names(syn);
            let itau = read(tau)?;
            let k = syn.index();
            params.itau_syn.row_mut(k).fill(itau);
            params.f_gain_syn.row_mut(k).fill(read(thr)? / itau);
            params.iw_syn.row_mut(k).fill(read(weight)?);
        }

        let itau_ahp = read(IF_AHTAU_N)?;
        params.itau_ahp.fill(itau_ahp);
        params.f_gain_ahp.fill(read(IF_AHTHR_N)? / itau_ahp);
        params.iw_ahp.fill(read(IF_AHW_P)?);

        let itau_mem = read(IF_TAU1_N)?;
        params.itau_mem.fill(itau_mem);
        params.f_gain_mem.fill(read(IF_THR_N)? / itau_mem);
        params.idc.fill(read(IF_DC_P)?);
        params.if_nmda.fill(read(IF_NMDA_N)?);
        params
            .t_ref
            .fill(layout.pulse_width(layout.c_ref, read(IF_RFR_N)?));
        params
            .t_pulse
            .fill(layout.pulse_width(layout.c_pulse, read(PULSE_PWLK_P)?));

        log::debug!("Read {} bias registers for {} neurons", registers.len(), n);
        Ok(params)
    }

    /// Quantize the currents of one neuron to the nearest device registers
    pub fn export_registers(
        &self,
        neuron: usize,
        quantizer: &BiasQuantizer,
        layout: &LayoutConstants,
    ) -> Result<BTreeMap<String, BiasRegister>> {
        use self::bias_names::*;

        let n = self.n_neurons();
        if neuron >= n {
            return Err(SimError::invalid_parameter(
                "neuron",
                neuron.to_string(),
                format!("< {}", n),
            ));
        }

        let mut currents: Vec<(&str, f64)> = Vec::with_capacity(24);
        for syn in SynapseType::ALL {
            let (tau, thr, weight) = synapse_bias_names(syn);
            let k = syn.index();
            let itau = self.itau_syn[[k, neuron]];
            currents.push((tau, itau));
            currents.push((thr, itau * self.f_gain_syn[[k, neuron]]));
            currents.push((weight, self.iw_syn[[k, neuron]]));
        }
        let itau_ahp = self.itau_ahp[neuron];
        currents.push((IF_AHTAU_N, itau_ahp));
        currents.push((IF_AHTHR_N, itau_ahp * self.f_gain_ahp[neuron]));
        currents.push((IF_AHW_P, self.iw_ahp[neuron]));

        let itau_mem = self.itau_mem[neuron];
        currents.push((IF_TAU1_N, itau_mem));
        currents.push((IF_THR_N, itau_mem * self.f_gain_mem[neuron]));
        currents.push((IF_DC_P, self.idc[neuron]));
        currents.push((IF_NMDA_N, self.if_nmda[neuron]));
        currents.push((
            IF_RFR_N,
            layout.pulse_current(layout.c_ref, self.t_ref[neuron].max(f64::MIN_POSITIVE)),
        ));
        currents.push((
            PULSE_PWLK_P,
            layout.pulse_current(layout.c_pulse, self.t_pulse[neuron].max(f64::MIN_POSITIVE)),
        ));

        let max_current = BiasQuantizer::max_current();
        let mut registers = BTreeMap::new();
        for (name, current) in currents {
            if current > max_current {
                log::warn!(
                    "{} current {:e} A exceeds the largest bias, saturating",
                    name,
                    current
                );
            }
            registers.insert(name.to_string(), quantizer.nearest(current).register);
        }
        registers.insert(IF_TAU2_N.to_string(), BiasRegister { coarse: 7, fine: 255 });
        registers.insert(IF_BUF_P.to_string(), BiasRegister { coarse: 4, fine: 80 });
        registers.insert(IF_CASC_N.to_string(), quantizer.nearest(layout.io).register);
        Ok(registers)
    }

    /// Number of neurons
    pub fn n_neurons(&self) -> usize {
        self.itau_mem.len()
    }

    /// Check array shapes and the positivity of leakage and gain
    pub fn validate(&self) -> Result<()> {
        let n = self.n_neurons();
        if n == 0 {
            return Err(SimError::invalid_parameter("n_neurons", "0", "> 0"));
        }
        for (name, arr) in [
            ("itau_syn", &self.itau_syn),
            ("f_gain_syn", &self.f_gain_syn),
            ("iw_syn", &self.iw_syn),
        ] {
            if arr.dim() != (NUM_SYNAPSES, n) {
                return Err(SimError::shape_mismatch(name, (NUM_SYNAPSES, n), arr.dim()));
            }
        }
        for (name, arr) in [
            ("itau_ahp", &self.itau_ahp),
            ("f_gain_ahp", &self.f_gain_ahp),
            ("iw_ahp", &self.iw_ahp),
            ("f_gain_mem", &self.f_gain_mem),
            ("idc", &self.idc),
            ("if_nmda", &self.if_nmda),
            ("ispkthr", &self.ispkthr),
            ("ireset", &self.ireset),
            ("t_ref", &self.t_ref),
            ("t_pulse", &self.t_pulse),
            ("t_pulse_ahp", &self.t_pulse_ahp),
        ] {
            if arr.len() != n {
                return Err(SimError::shape_mismatch(name, n, arr.len()));
            }
        }

        let positive = self
            .itau_syn
            .iter()
            .chain(self.f_gain_syn.iter())
            .chain(self.itau_ahp.iter())
            .chain(self.f_gain_ahp.iter())
            .chain(self.itau_mem.iter())
            .chain(self.f_gain_mem.iter())
            .chain(self.ispkthr.iter());
        for &value in positive {
            require_positive("leakage, gain or threshold current", value)?;
        }

        let non_negative = self
            .iw_syn
            .iter()
            .chain(self.iw_ahp.iter())
            .chain(self.idc.iter())
            .chain(self.if_nmda.iter())
            .chain(self.ireset.iter())
            .chain(self.t_ref.iter())
            .chain(self.t_pulse.iter())
            .chain(self.t_pulse_ahp.iter());
        for &value in non_negative {
            require_non_negative("weight current, injection or timing", value)?;
        }
        Ok(())
    }

    /// Synapse biases of one neuron, in channel order
    #[inline]
    pub fn synapse_biases(&self, neuron: usize) -> [DpiBias; NUM_SYNAPSES] {
        SynapseType::ALL.map(|syn| {
            let k = syn.index();
            DpiBias {
                itau: self.itau_syn[[k, neuron]],
                f_gain: self.f_gain_syn[[k, neuron]],
                iw: self.iw_syn[[k, neuron]],
            }
        })
    }

    /// AHP bias of one neuron
    #[inline]
    pub fn ahp_bias(&self, neuron: usize) -> DpiBias {
        DpiBias {
            itau: self.itau_ahp[neuron],
            f_gain: self.f_gain_ahp[neuron],
            iw: self.iw_ahp[neuron],
        }
    }

    /// Membrane bias of one neuron
    #[inline]
    pub fn membrane_bias(&self, neuron: usize) -> MembraneBias {
        MembraneBias {
            itau: self.itau_mem[neuron],
            f_gain: self.f_gain_mem[neuron],
            idc: self.idc[neuron],
            if_nmda: self.if_nmda[neuron],
        }
    }

    /// Synapse threshold currents `Ith = clip(Itau, Io) * f_gain`
    pub fn ith_syn(&self, layout: &LayoutConstants) -> Array2<f64> {
        self.itau_syn.mapv(|i| i.max(layout.io)) * &self.f_gain_syn
    }

    /// Project leakage currents back to time constants with `tau = f_tau / Itau`
    pub fn time_constants(&self, layout: &LayoutConstants) -> TimeConstants {
        let mut tau_syn = self.itau_syn.clone();
        for (k, mut row) in tau_syn.axis_iter_mut(Axis(0)).enumerate() {
            let capacitance = SynapseType::ALL[k].capacitance(layout);
            row.mapv_inplace(|i| layout.current_to_tau(capacitance, i));
        }
        TimeConstants {
            tau_syn,
            tau_ahp: self
                .itau_ahp
                .mapv(|i| layout.current_to_tau(layout.c_ahp, i)),
            tau_mem: self
                .itau_mem
                .mapv(|i| layout.current_to_tau(layout.c_mem, i)),
        }
    }

    /// Gain ratios of every block
    pub fn gain_ratios(&self) -> GainRatios {
        GainRatios {
            r_gain_syn: self.f_gain_syn.clone(),
            r_gain_ahp: self.f_gain_ahp.clone(),
            r_gain_mem: self.f_gain_mem.clone(),
        }
    }

    /// Apply frozen device mismatch.
    ///
    /// Every leakage, gain and weight current (synapses, AHP and membrane) is
    /// scaled by an independent factor drawn from `N(1, percent)`, where
    /// `percent` is a fraction (`0.05` for 5%). Results are floored at `Io`.
    /// The same seed always yields the same perturbation.
    pub fn with_mismatch(mut self, percent: f64, seed: u64, layout: &LayoutConstants) -> Result<Self> {
        require_non_negative("percent", percent)?;
        let normal = Normal::new(1.0, percent).map_err(|e| {
            SimError::invalid_parameter("percent", percent.to_string(), e.to_string())
        })?;
        let mut rng = StdRng::seed_from_u64(seed);
        let io = layout.io;
        let mut perturb = |value: &mut f64| {
            *value = (*value * normal.sample(&mut rng)).max(io);
        };

        self.itau_syn.iter_mut().for_each(&mut perturb);
        self.f_gain_syn.iter_mut().for_each(&mut perturb);
        self.iw_syn.iter_mut().for_each(&mut perturb);
        self.itau_ahp.iter_mut().for_each(&mut perturb);
        self.f_gain_ahp.iter_mut().for_each(&mut perturb);
        self.iw_ahp.iter_mut().for_each(&mut perturb);
        self.itau_mem.iter_mut().for_each(&mut perturb);
        self.f_gain_mem.iter_mut().for_each(&mut perturb);

        log::debug!(
            "Applied {:.1}% mismatch to {} neurons (seed {})",
            percent * 100.0,
            self.n_neurons(),
            seed
        );
        Ok(self)
    }

    /// Set the constant injection current of one neuron
    pub fn set_idc(&mut self, neuron: usize, idc: f64, layout: &LayoutConstants) -> Result<()> {
        require_non_negative("idc", idc)?;
        let n = self.n_neurons();
        let slot = self.idc.get_mut(neuron).ok_or_else(|| {
            SimError::invalid_parameter("neuron", neuron.to_string(), format!("< {}", n))
        })?;
        if idc < layout.io {
            log::warn!("Idc {:e} A of neuron {} is below Io and acts as Io", idc, neuron);
        }
        *slot = idc;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relative(a: f64, b: f64) -> f64 {
        (a - b).abs() / b.abs()
    }

    #[test]
    fn test_default_specification() {
        let spec = CoreSpecification::default();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.r_gain_mem, 2.0);
        assert_eq!(spec.tau(SynapseType::Gaba), 100e-3);
    }

    #[test]
    fn test_from_specification_shapes() {
        let layout = LayoutConstants::default();
        let params =
            CircuitParameters::from_specification(3, &CoreSpecification::default(), &layout)
                .unwrap();
        assert_eq!(params.n_neurons(), 3);
        assert_eq!(params.itau_syn.dim(), (4, 3));
        assert!(params.validate().is_ok());
        assert_eq!(params.idc[0], layout.io);
        assert_eq!(params.ireset[2], layout.io);
    }

    #[test]
    fn test_time_constants_round_trip() {
        let layout = LayoutConstants::default();
        let spec = CoreSpecification::default();
        let params = CircuitParameters::from_specification(2, &spec, &layout).unwrap();
        let taus = params.time_constants(&layout);
        for syn in SynapseType::ALL {
            assert!(relative(taus.tau_syn[[syn.index(), 1]], spec.tau(syn)) < 1e-12);
        }
        assert!(relative(taus.tau_mem[0], spec.tau_mem) < 1e-12);
        assert!(relative(taus.tau_ahp[0], spec.tau_ahp) < 1e-12);

        let gains = params.gain_ratios();
        assert_eq!(gains.r_gain_mem[1], 2.0);
        assert_eq!(gains.r_gain_syn[[0, 0]], 4.0);
    }

    #[test]
    fn test_slow_time_constant_rejected() {
        let layout = LayoutConstants::default();
        let spec = CoreSpecification {
            tau_mem: 10.0,
            ..Default::default()
        };
        let err = CircuitParameters::from_specification(1, &spec, &layout).unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { ref parameter, .. } if parameter == "tau_mem"));
    }

    #[test]
    fn test_invalid_specification() {
        let layout = LayoutConstants::default();
        let spec = CoreSpecification {
            r_gain_ampa: 0.0,
            ..Default::default()
        };
        assert!(CircuitParameters::from_specification(1, &spec, &layout).is_err());
        assert!(
            CircuitParameters::from_specification(0, &CoreSpecification::default(), &layout)
                .is_err()
        );
    }

    #[test]
    fn test_validate_detects_shape_mismatch() {
        let layout = LayoutConstants::default();
        let mut params =
            CircuitParameters::from_specification(3, &CoreSpecification::default(), &layout)
                .unwrap();
        params.t_ref = Array1::zeros(2);
        assert!(matches!(
            params.validate(),
            Err(SimError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_export_then_read_back() {
        let layout = LayoutConstants::default();
        let quantizer = BiasQuantizer::new();
        let spec = CoreSpecification::default();
        let params = CircuitParameters::from_specification(2, &spec, &layout).unwrap();

        let exported = params.export_registers(0, &quantizer, &layout).unwrap();
        let registers: HashMap<String, BiasRegister> = exported.into_iter().collect();
        let restored =
            CircuitParameters::from_registers(2, &registers, &spec, &layout).unwrap();

        // quantization keeps every current within a few percent
        for syn in SynapseType::ALL {
            let k = syn.index();
            assert!(relative(restored.itau_syn[[k, 1]], params.itau_syn[[k, 1]]) < 0.05);
            assert!(relative(restored.iw_syn[[k, 1]], params.iw_syn[[k, 1]]) < 0.05);
        }
        assert!(relative(restored.itau_mem[0], params.itau_mem[0]) < 0.05);
        assert!(relative(restored.t_ref[0], params.t_ref[0]) < 0.05);
        assert!(relative(restored.t_pulse[0], params.t_pulse[0]) < 0.05);
        assert_eq!(restored.ispkthr[0], spec.ispkthr);
    }

    #[test]
    fn test_missing_register() {
        let layout = LayoutConstants::default();
        let registers = HashMap::new();
        let err = CircuitParameters::from_registers(
            1,
            &registers,
            &CoreSpecification::default(),
            &layout,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::MissingBias { .. }));
    }

    #[test]
    fn test_export_out_of_range_neuron() {
        let layout = LayoutConstants::default();
        let params =
            CircuitParameters::from_specification(1, &CoreSpecification::default(), &layout)
                .unwrap();
        assert!(params
            .export_registers(5, &BiasQuantizer::new(), &layout)
            .is_err());
    }

    #[test]
    fn test_set_idc() {
        let layout = LayoutConstants::default();
        let mut params =
            CircuitParameters::from_specification(2, &CoreSpecification::default(), &layout)
                .unwrap();
        params.set_idc(1, 2e-11, &layout).unwrap();
        assert_eq!(params.idc[1], 2e-11);
        assert!(params.set_idc(2, 2e-11, &layout).is_err());
        assert!(params.set_idc(0, -1.0, &layout).is_err());
    }

    #[test]
    fn test_inhibitory_bias_names() {
        assert_eq!(synapse_bias_names(SynapseType::Gaba).0, "NPDPII_TAU_F_P");
        assert_eq!(synapse_bias_names(SynapseType::Gaba).2, "PS_WEIGHT_INH_F_N");
        assert_eq!(synapse_bias_names(SynapseType::Shunt).0, "NPDPII_TAU_S_P");
        assert_eq!(synapse_bias_names(SynapseType::Shunt).2, "PS_WEIGHT_INH_S_N");
    }

    #[test]
    fn test_subtractive_inhibition_reads_fast_group() {
        let layout = LayoutConstants::default();
        let quantizer = BiasQuantizer::new();
        let spec = CoreSpecification::default();
        let params = CircuitParameters::from_specification(1, &spec, &layout).unwrap();

        let mut registers: HashMap<String, BiasRegister> = params
            .export_registers(0, &quantizer, &layout)
            .unwrap()
            .into_iter()
            .collect();
        let distinct = BiasRegister { coarse: 3, fine: 200 };
        registers.insert("NPDPII_TAU_F_P".to_string(), distinct);

        let restored = CircuitParameters::from_registers(1, &registers, &spec, &layout).unwrap();
        let gaba = SynapseType::Gaba.index();
        let shunt = SynapseType::Shunt.index();
        assert_eq!(restored.itau_syn[[gaba, 0]], BiasQuantizer::current(distinct));
        assert!(relative(restored.itau_syn[[shunt, 0]], params.itau_syn[[shunt, 0]]) < 0.05);
    }

    #[test]
    fn test_export_fixed_registers() {
        let layout = LayoutConstants::default();
        let quantizer = BiasQuantizer::new();
        let params =
            CircuitParameters::from_specification(1, &CoreSpecification::default(), &layout)
                .unwrap();
        let registers = params.export_registers(0, &quantizer, &layout).unwrap();

        let casc = registers[bias_names::IF_CASC_N];
        assert!(relative(BiasQuantizer::current(casc), layout.io) < 0.1);
        assert_eq!(registers[bias_names::IF_TAU2_N], BiasRegister { coarse: 7, fine: 255 });
        assert_eq!(registers[bias_names::IF_BUF_P], BiasRegister { coarse: 4, fine: 80 });
    }

    #[test]
    fn test_mismatch_is_reproducible() {
        let layout = LayoutConstants::default();
        let base =
            CircuitParameters::from_specification(16, &CoreSpecification::default(), &layout)
                .unwrap();

        let a = base.clone().with_mismatch(0.05, 7, &layout).unwrap();
        let b = base.clone().with_mismatch(0.05, 7, &layout).unwrap();
        let c = base.clone().with_mismatch(0.05, 8, &layout).unwrap();
        assert_eq!(a.itau_syn, b.itau_syn);
        assert_eq!(a.iw_ahp, b.iw_ahp);
        assert_ne!(a.itau_syn, c.itau_syn);

        // neurons now differ from each other but stay close to nominal
        assert_ne!(a.itau_mem[0], a.itau_mem[1]);
        for (&perturbed, &nominal) in a.itau_syn.iter().zip(base.itau_syn.iter()) {
            assert!(relative(perturbed, nominal) < 0.5);
        }
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_mismatch_respects_floor() {
        let layout = LayoutConstants::default();
        let params =
            CircuitParameters::from_specification(32, &CoreSpecification::default(), &layout)
                .unwrap()
                .with_mismatch(2.0, 3, &layout)
                .unwrap();
        let io = layout.io;
        for arr in [&params.itau_syn, &params.f_gain_syn, &params.iw_syn] {
            assert!(arr.iter().all(|&v| v >= io));
        }
        for arr in [&params.itau_ahp, &params.iw_ahp, &params.itau_mem, &params.f_gain_mem] {
            assert!(arr.iter().all(|&v| v >= io));
        }
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_zero_mismatch_is_identity() {
        let layout = LayoutConstants::default();
        let base =
            CircuitParameters::from_specification(4, &CoreSpecification::default(), &layout)
                .unwrap();
        let same = base.clone().with_mismatch(0.0, 1, &layout).unwrap();
        assert_eq!(same, base);
        assert!(base.with_mismatch(-0.1, 1, &layout).is_err());
    }
}
