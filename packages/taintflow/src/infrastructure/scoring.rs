//! Path feasibility and confidence scoring.
//!
//! Scoring orders and deprioritizes; it never removes a finding. The score
//! starts at 1.0 and is multiplied down for unknown-propagation edges and
//! for very long or merge-heavy paths, then raised when independent paths
//! corroborate the same source-to-sink pair.

use crate::config::ScanConfig;

pub struct ConfidenceScorer<'a> {
    config: &'a ScanConfig,
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(config: &'a ScanConfig) -> Self {
        Self { config }
    }

    /// Score one flow. `merges` is the number of branch-merge points on
    /// the path, `corroborating_paths` the total number of independent
    /// paths (including this one) reaching the same sink from the same
    /// source.
    pub fn score(
        &self,
        path_len: usize,
        merges: usize,
        crossed_unknown: bool,
        corroborating_paths: usize,
    ) -> f32 {
        let mut confidence = 1.0f32;

        if crossed_unknown {
            confidence *= self.config.unknown_propagation_penalty;
        }
        if path_len > self.config.path_length_ceiling || merges > self.config.merge_ceiling {
            confidence *= self.config.long_path_penalty;
        }
        if corroborating_paths > 1 {
            let bonus = self.config.corroboration_bonus * (corroborating_paths - 1) as f32;
            confidence *= 1.0 + bonus;
        }

        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer(config: &ScanConfig) -> ConfidenceScorer<'_> {
        ConfidenceScorer::new(config)
    }

    #[test]
    fn test_clean_short_path_is_full_confidence() {
        let config = ScanConfig::default();
        assert_eq!(scorer(&config).score(3, 0, false, 1), 1.0);
    }

    #[test]
    fn test_unknown_edge_lowers_confidence() {
        let config = ScanConfig::default();
        let s = scorer(&config);
        assert!(s.score(3, 0, true, 1) < s.score(3, 0, false, 1));
        assert_eq!(s.score(3, 0, true, 1), config.unknown_propagation_penalty);
    }

    #[test]
    fn test_ceiling_penalty_is_mild_and_applies_once() {
        let config = ScanConfig::default();
        let s = scorer(&config);

        let long = s.score(config.path_length_ceiling + 1, 0, false, 1);
        let merged = s.score(3, config.merge_ceiling + 1, false, 1);
        let both = s.score(config.path_length_ceiling + 1, config.merge_ceiling + 1, false, 1);

        assert_eq!(long, config.long_path_penalty);
        assert_eq!(merged, config.long_path_penalty);
        assert_eq!(both, config.long_path_penalty);
    }

    #[test]
    fn test_corroboration_raises_capped_at_one() {
        let config = ScanConfig::default();
        let s = scorer(&config);

        // A penalized path recovers with corroboration.
        let alone = s.score(3, 0, true, 1);
        let backed = s.score(3, 0, true, 3);
        assert!(backed > alone);

        // Full confidence cannot exceed 1.0.
        assert_eq!(s.score(3, 0, false, 50), 1.0);
    }
}
