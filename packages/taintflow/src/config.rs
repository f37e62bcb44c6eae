//! Scan configuration: analysis budgets and confidence tuning.

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Budgets and scoring knobs for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Per-function worklist iteration budget (1..=1_000_000). Exceeding
    /// it is NonConvergence: the function's summary becomes unknown.
    pub max_fixpoint_iterations: usize,

    /// Joint fixpoint round budget per strongly-connected component
    /// (1..=10_000).
    pub max_scc_rounds: usize,

    /// Path lengths above this ceiling take a mild confidence penalty.
    pub path_length_ceiling: usize,

    /// Branch-merge counts above this ceiling take the same penalty.
    pub merge_ceiling: usize,

    /// Multiplier applied when a path crossed an unknown-propagation edge
    /// (0.0..=1.0).
    pub unknown_propagation_penalty: f32,

    /// Multiplier applied when a path exceeds a ceiling (0.0..=1.0).
    pub long_path_penalty: f32,

    /// Additive bonus per extra independent path corroborating the same
    /// finding (>= 0.0); confidence is capped at 1.0.
    pub corroboration_bonus: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_fixpoint_iterations: 10_000,
            max_scc_rounds: 100,
            path_length_ceiling: 40,
            merge_ceiling: 12,
            unknown_propagation_penalty: 0.6,
            long_path_penalty: 0.85,
            corroboration_bonus: 0.1,
        }
    }
}

impl ScanConfig {
    /// Tighter budgets for quick scans of large programs.
    pub fn fast() -> Self {
        Self {
            max_fixpoint_iterations: 2_000,
            max_scc_rounds: 20,
            path_length_ceiling: 20,
            merge_ceiling: 6,
            ..Self::default()
        }
    }

    /// Generous budgets for overnight scans.
    pub fn thorough() -> Self {
        Self {
            max_fixpoint_iterations: 100_000,
            max_scc_rounds: 1_000,
            path_length_ceiling: 120,
            merge_ceiling: 40,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_fixpoint_iterations == 0 || self.max_fixpoint_iterations > 1_000_000 {
            return Err(EngineError::Config(format!(
                "max_fixpoint_iterations out of range: {}",
                self.max_fixpoint_iterations
            )));
        }
        if self.max_scc_rounds == 0 || self.max_scc_rounds > 10_000 {
            return Err(EngineError::Config(format!(
                "max_scc_rounds out of range: {}",
                self.max_scc_rounds
            )));
        }
        for (name, value) in [
            ("unknown_propagation_penalty", self.unknown_propagation_penalty),
            ("long_path_penalty", self.long_path_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be within 0.0..=1.0, got {}",
                    name, value
                )));
            }
        }
        if self.corroboration_bonus < 0.0 {
            return Err(EngineError::Config(format!(
                "corroboration_bonus must be non-negative, got {}",
                self.corroboration_bonus
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
        assert!(ScanConfig::fast().validate().is_ok());
        assert!(ScanConfig::thorough().validate().is_ok());
    }

    #[test]
    fn test_preset_consistency() {
        let fast = ScanConfig::fast();
        let default = ScanConfig::default();
        let thorough = ScanConfig::thorough();

        assert!(fast.max_fixpoint_iterations < default.max_fixpoint_iterations);
        assert!(thorough.max_fixpoint_iterations > default.max_fixpoint_iterations);
        assert!(fast.path_length_ceiling < thorough.path_length_ceiling);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut config = ScanConfig::default();
        config.max_fixpoint_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = ScanConfig::default();
        config.unknown_propagation_penalty = 1.5;
        assert!(config.validate().is_err());

        let mut config = ScanConfig::default();
        config.corroboration_bonus = -0.1;
        assert!(config.validate().is_err());
    }
}
