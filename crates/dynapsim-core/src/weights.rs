//! Weight bitmask decoding
//!
//! On the chip each connection selects a subset of four base weight currents
//! with a 4-bit mask. The base currents are configured per pair of source and
//! destination cores. [`WeightComposer`] turns masks into a dense tensor of
//! weight currents with shape `(Npre, Npost, K)`.

use crate::error::*;
use crate::synapse::{SynapseType, NUM_SYNAPSES};
use ndarray::{Array2, Array3, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Number of bits in a connection mask
pub const WEIGHT_BITS: usize = 4;

/// Largest valid connection mask
pub const MAX_MASK: u8 = (1 << WEIGHT_BITS) - 1;

/// Default probability of setting each mask bit in [`random_masks`]
pub const DEFAULT_FILL_RATE: [f64; WEIGHT_BITS] = [0.25, 0.2, 0.04, 0.06];

/// The four base weight currents `Iw_0..Iw_3` of a core pair (A)
pub type BaseWeights = [f64; WEIGHT_BITS];

/// Sum of the base currents whose bit is set in `mask`
#[inline]
pub fn decode_mask(mask: u8, base: &BaseWeights) -> f64 {
    base.iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, current)| current)
        .sum()
}

/// Dense weight currents indexed by `(pre, post, synapse)`
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTensor {
    data: Array3<f64>,
}

impl WeightTensor {
    /// Wrap an array of non-negative weight currents
    pub fn new(data: Array3<f64>) -> Result<Self> {
        let (_, _, k) = data.dim();
        if k != NUM_SYNAPSES {
            return Err(SimError::shape_mismatch(
                "weight tensor synapse axis",
                NUM_SYNAPSES,
                k,
            ));
        }
        if let Some(bad) = data.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
            return Err(SimError::invalid_parameter(
                "weight",
                bad.to_string(),
                "finite and >= 0.0",
            ));
        }
        Ok(Self { data })
    }

    /// All-zero weights
    pub fn zeros(n_pre: usize, n_post: usize) -> Self {
        Self {
            data: Array3::zeros((n_pre, n_post, NUM_SYNAPSES)),
        }
    }

    /// `(Npre, Npost, K)`
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of presynaptic neurons
    pub fn n_pre(&self) -> usize {
        self.data.dim().0
    }

    /// Number of postsynaptic neurons
    pub fn n_post(&self) -> usize {
        self.data.dim().1
    }

    /// Weight current of one connection and channel
    pub fn get(&self, pre: usize, post: usize, syn: SynapseType) -> f64 {
        self.data[[pre, post, syn.index()]]
    }

    /// Overwrite one weight current
    pub fn set(&mut self, pre: usize, post: usize, syn: SynapseType, current: f64) -> Result<()> {
        require_non_negative("weight", current)?;
        let (n_pre, n_post, _) = self.data.dim();
        if pre >= n_pre || post >= n_post {
            return Err(SimError::shape_mismatch(
                "weight index",
                (n_pre, n_post),
                (pre, post),
            ));
        }
        self.data[[pre, post, syn.index()]] = current;
        Ok(())
    }

    /// Underlying array
    pub fn as_array(&self) -> &Array3<f64> {
        &self.data
    }

    /// Consume into the underlying array
    pub fn into_inner(self) -> Array3<f64> {
        self.data
    }

    /// Number of non-zero weight entries
    pub fn nnz(&self) -> usize {
        self.data.iter().filter(|&&w| w > 0.0).count()
    }
}

/// Decodes connection masks into weight currents
#[derive(Debug, Clone)]
pub struct WeightComposer {
    base: HashMap<(u16, u16), BaseWeights>,
    pre_cores: Vec<u16>,
    post_cores: Vec<u16>,
}

impl WeightComposer {
    /// Create a composer with separate core assignments for the pre- and
    /// postsynaptic populations
    pub fn new(
        base: HashMap<(u16, u16), BaseWeights>,
        pre_cores: Vec<u16>,
        post_cores: Vec<u16>,
    ) -> Result<Self> {
        for (&(source_core, dest_core), weights) in &base {
            for &w in weights {
                if !(w.is_finite() && w >= 0.0) {
                    return Err(SimError::invalid_parameter(
                        format!("base weight ({}, {})", source_core, dest_core),
                        w.to_string(),
                        "finite and >= 0.0",
                    ));
                }
            }
        }
        Ok(Self {
            base,
            pre_cores,
            post_cores,
        })
    }

    /// Create a composer for a recurrent population with one core assignment
    pub fn recurrent(base: HashMap<(u16, u16), BaseWeights>, cores: Vec<u16>) -> Result<Self> {
        Self::new(base, cores.clone(), cores)
    }

    /// Base weights configured for a core pair
    pub fn base_weights(&self, source_core: u16, dest_core: u16) -> Option<&BaseWeights> {
        self.base.get(&(source_core, dest_core))
    }

    /// Decode per-channel masks of shape `(Npre, Npost, K)`.
    ///
    /// Connections with a zero mask need no base weights for their core pair.
    pub fn compose(&self, masks: &Array3<u8>) -> Result<WeightTensor> {
        let (n_pre, n_post, k) = masks.dim();
        let expected = (self.pre_cores.len(), self.post_cores.len(), NUM_SYNAPSES);
        if (n_pre, n_post, k) != expected {
            return Err(SimError::shape_mismatch("weight masks", expected, masks.dim()));
        }

        for ((pre, post, _), &mask) in masks.indexed_iter() {
            if mask > MAX_MASK {
                return Err(SimError::InvalidMask { pre, post, mask });
            }
            if mask != 0 {
                let (source_core, dest_core) = (self.pre_cores[pre], self.post_cores[post]);
                if !self.base.contains_key(&(source_core, dest_core)) {
                    return Err(SimError::MissingCoreWeights {
                        source_core,
                        dest_core,
                    });
                }
            }
        }

        let mut data = Array3::<f64>::zeros(masks.dim());
        let decode = |(pre, post, _): (usize, usize, usize), w: &mut f64, &mask: &u8| {
            if mask != 0 {
                if let Some(base) = self.base.get(&(self.pre_cores[pre], self.post_cores[post])) {
                    *w = decode_mask(mask, base);
                }
            }
        };

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut data).and(masks).par_for_each(decode);

        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut data).and(masks).for_each(decode);

        let tensor = WeightTensor { data };
        log::debug!(
            "Composed {}x{} weight tensor with {} non-zero entries",
            n_pre,
            n_post,
            tensor.nnz()
        );
        Ok(tensor)
    }

    /// Decode `(Npre, Npost)` masks onto a single synapse channel
    pub fn compose_single_channel(
        &self,
        masks: &Array2<u8>,
        syn: SynapseType,
    ) -> Result<WeightTensor> {
        let (n_pre, n_post) = masks.dim();
        let mut full = Array3::<u8>::zeros((n_pre, n_post, NUM_SYNAPSES));
        full.index_axis_mut(ndarray::Axis(2), syn.index())
            .assign(masks);
        self.compose(&full)
    }
}

/// Draw `(Npre, Npost)` connection masks, setting bit `b` with probability `fill_rate[b]`
pub fn random_masks(
    n_pre: usize,
    n_post: usize,
    fill_rate: [f64; WEIGHT_BITS],
    seed: u64,
) -> Result<Array2<u8>> {
    for (bit, &p) in fill_rate.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimError::invalid_parameter(
                format!("fill_rate[{}]", bit),
                p.to_string(),
                "within [0, 1]",
            ));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let masks = Array2::from_shape_simple_fn((n_pre, n_post), || {
        fill_rate
            .iter()
            .enumerate()
            .filter(|&(_, &p)| rng.gen_bool(p))
            .fold(0u8, |mask, (bit, _)| mask | (1 << bit))
    });
    Ok(masks)
}
