//! Coarse/fine bias generator quantization
//!
//! Every bias of a Dynap-SE chip is produced by a programmable current source
//! addressed with a coarse value in `[0, 7]` selecting an exponentially spaced
//! base current and a fine value in `[0, 255]` that subdivides it linearly.
//! Several register pairs can reach the same current; callers pick the
//! smallest or largest coarse value to disambiguate.

use crate::error::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Base currents (A) selected by the coarse value
pub const COARSE_BASE: [f64; 8] = [
    1.5e-11, 1.05e-10, 8.2e-10, 6.5e-9, 5e-8, 4e-7, 3.2e-6, 2.4e-5,
];

/// Largest fine value
pub const FINE_RANGE: u8 = 255;

/// Conversion factor from amperes to the chip's linear bias units
pub const LINEAR_SCALE: f64 = 1e14;

/// Relative margin below which consecutive table currents are merged
const TABLE_TOLERANCE: f64 = 1.00001;

/// A hardware bias register setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BiasRegister {
    /// Coarse value in `[0, 7]`
    pub coarse: u8,
    /// Fine value in `[0, 255]`
    pub fine: u8,
}

impl BiasRegister {
    /// Create a register pair, rejecting coarse values outside `[0, 7]`
    pub fn new(coarse: u8, fine: u8) -> Result<Self> {
        if coarse as usize >= COARSE_BASE.len() {
            return Err(SimError::InvalidRegister { coarse, fine });
        }
        Ok(Self { coarse, fine })
    }
}

impl std::fmt::Display for BiasRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.coarse, self.fine)
    }
}

/// One row of the bias lookup table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    /// Register producing the current
    pub register: BiasRegister,
    /// Produced current (A)
    pub current: f64,
}

/// Converts between register pairs and physical currents.
///
/// The deduplicated lookup table is built once on construction and shared
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct BiasQuantizer {
    table: Vec<TableEntry>,
}

impl Default for BiasQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl BiasQuantizer {
    /// Create a quantizer and build its lookup table
    pub fn new() -> Self {
        Self {
            table: Self::build_table(),
        }
    }

    /// Current produced by a register pair, `fine / 255 * coarse_base[coarse]`
    pub fn get_bias(coarse: u8, fine: u8) -> Result<f64> {
        let register = BiasRegister::new(coarse, fine)?;
        Ok(Self::current(register))
    }

    /// Current produced by an already validated register
    pub fn current(register: BiasRegister) -> f64 {
        let base = COARSE_BASE[register.coarse as usize];
        register.fine as f64 / FINE_RANGE as f64 * base
    }

    /// Linear bias value used by the chip's configuration software
    pub fn get_linear(coarse: u8, fine: u8) -> Result<u64> {
        let bias = Self::get_bias(coarse, fine)?;
        Ok((bias * LINEAR_SCALE).round() as u64)
    }

    /// Find a register pair producing `current`.
    ///
    /// Candidates are the coarse values whose range `[base / 256, base]`
    /// contains the current. With `exact` set, only pairs reproducing the
    /// current bit for bit survive. Returns `None` when nothing qualifies.
    pub fn get_coarse_fine(
        current: f64,
        prefer_smallest_coarse: bool,
        exact: bool,
    ) -> Option<BiasRegister> {
        if current == 0.0 {
            return Some(BiasRegister::default());
        }
        if !current.is_finite() || current < 0.0 {
            return None;
        }

        let mut candidates = COARSE_BASE
            .iter()
            .enumerate()
            .filter(|&(_, &base)| base / (FINE_RANGE as f64 + 1.0) <= current && current <= base)
            .filter_map(|(coarse, &base)| {
                let fine = (current * FINE_RANGE as f64 / base).round();
                let register = BiasRegister {
                    coarse: coarse as u8,
                    fine: fine.min(FINE_RANGE as f64) as u8,
                };
                if exact && Self::current(register) != current {
                    None
                } else {
                    Some(register)
                }
            });

        if prefer_smallest_coarse {
            candidates.next()
        } else {
            candidates.last()
        }
    }

    fn build_table() -> Vec<TableEntry> {
        let mut table: Vec<TableEntry> = Vec::with_capacity(COARSE_BASE.len() * 256);
        for coarse in 0..COARSE_BASE.len() as u8 {
            for fine in 0..=FINE_RANGE {
                let register = BiasRegister { coarse, fine };
                let current = Self::current(register);
                let keep = match table.last() {
                    Some(last) => current > last.current * TABLE_TOLERANCE,
                    None => true,
                };
                if keep {
                    table.push(TableEntry { register, current });
                }
            }
        }
        log::debug!("Bias lookup table built with {} entries", table.len());
        table
    }

    /// Deduplicated, strictly increasing table of reachable currents
    pub fn get_lookup_table(&self) -> &[TableEntry] {
        &self.table
    }

    /// Closest reachable table entry to `current`
    pub fn nearest(&self, current: f64) -> TableEntry {
        let idx = self.table.partition_point(|entry| entry.current < current);
        if idx == 0 {
            return self.table[0];
        }
        if idx >= self.table.len() {
            return self.table[self.table.len() - 1];
        }
        let below = self.table[idx - 1];
        let above = self.table[idx];
        if current - below.current <= above.current - current {
            below
        } else {
            above
        }
    }

    /// Largest current the generator can produce
    pub fn max_current() -> f64 {
        COARSE_BASE[COARSE_BASE.len() - 1]
    }
}
