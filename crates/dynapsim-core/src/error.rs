//! Error types for the circuit simulator

use thiserror::Error;

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while configuring or running the simulator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Invalid parameter value
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Array dimensions do not agree
    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// What was being checked
        what: String,
        /// Expected shape
        expected: String,
        /// Actual shape
        actual: String,
    },

    /// Coarse/fine pair outside the register range
    #[error("Invalid bias register: coarse={coarse} fine={fine} (expected coarse <= 7)")]
    InvalidRegister {
        /// Coarse value
        coarse: u8,
        /// Fine value
        fine: u8,
    },

    /// A device bias needed for readback is absent
    #[error("Missing bias register {name}")]
    MissingBias {
        /// Device parameter name
        name: String,
    },

    /// No base weight currents defined for a pair of cores
    #[error("No base weight currents for core pair ({source_core}, {dest_core})")]
    MissingCoreWeights {
        /// Presynaptic core
        source_core: u16,
        /// Postsynaptic core
        dest_core: u16,
    },

    /// A connection mask uses bits beyond the 4 weight bits
    #[error("Invalid weight mask {mask:#06b} at ({pre}, {post})")]
    InvalidMask {
        /// Presynaptic neuron index
        pre: usize,
        /// Postsynaptic neuron index
        post: usize,
        /// Offending mask
        mask: u8,
    },

    /// Numerical computation error
    #[error("Numerical error: {reason}")]
    NumericalError {
        /// Reason for numerical error
        reason: String,
    },

    /// Invalid simulation configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason for invalid configuration
        reason: String,
    },
}

impl SimError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            constraint: constraint.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(
        what: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    /// Create a missing bias error
    pub fn missing_bias(name: impl Into<String>) -> Self {
        Self::MissingBias { name: name.into() }
    }

    /// Create a numerical error
    pub fn numerical_error(reason: impl Into<String>) -> Self {
        Self::NumericalError {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Reject non-finite or non-positive values
pub(crate) fn require_positive(parameter: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(parameter, value.to_string(), "> 0.0"))
    }
}

/// Reject non-finite or negative values
pub(crate) fn require_non_negative(parameter: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::invalid_parameter(parameter, value.to_string(), ">= 0.0"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SimError::invalid_parameter("tau_mem", "0.0", "> 0.0");
        assert!(matches!(err, SimError::InvalidParameter { .. }));

        let err = SimError::shape_mismatch("weights", (2, 2, 4), (3, 2, 4));
        assert!(matches!(err, SimError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidRegister { coarse: 9, fine: 3 };
        let msg = format!("{}", err);
        assert!(msg.contains("coarse=9"));

        let err = SimError::InvalidMask { pre: 1, post: 2, mask: 0b1_0001 };
        assert!(err.to_string().contains("0b10001"));

        let err = SimError::shape_mismatch("input", (10, 2, 4), (10, 3, 4));
        assert!(err.to_string().contains("(10, 3, 4)"));
    }

    #[test]
    fn test_positive_checks() {
        assert!(require_positive("Io", 5e-13).is_ok());
        assert!(require_positive("Io", 0.0).is_err());
        assert!(require_positive("Io", f64::NAN).is_err());
        assert!(require_non_negative("Idc", 0.0).is_ok());
        assert!(require_non_negative("Idc", -1e-12).is_err());
    }
}
