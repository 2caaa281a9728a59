use super::config::DetectorConfig;
use super::metrics::MetricSet;

/// Any single metric above its gate counts as a cut.
pub fn is_scene_change(metrics: &MetricSet, config: &DetectorConfig) -> bool {
    metrics.mean_abs_diff > config.diff_threshold
        || metrics.edge_score > config.edge_threshold
        || metrics.hist_distance > config.hist_threshold
}

impl MetricSet {
    /// Names of the gates this metric set exceeds, for diagnostics.
    pub fn exceeded(&self, config: &DetectorConfig) -> Vec<&'static str> {
        let mut gates = Vec::new();
        if self.mean_abs_diff > config.diff_threshold {
            gates.push("diff");
        }
        if self.edge_score > config.edge_threshold {
            gates.push("edge");
        }
        if self.hist_distance > config.hist_threshold {
            gates.push("hist");
        }
        gates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(diff: f64, edge: f64, hist: f64) -> MetricSet {
        MetricSet {
            mean_abs_diff: diff,
            edge_score: edge,
            hist_distance: hist,
        }
    }

    #[test]
    fn test_below_all_thresholds() {
        let config = DetectorConfig::default();
        assert!(!is_scene_change(&metrics(9.9, 49.0, 2999.0), &config));
        assert!(metrics(9.9, 49.0, 2999.0).exceeded(&config).is_empty());
    }

    #[test]
    fn test_any_single_gate_triggers() {
        let config = DetectorConfig::default();
        assert!(is_scene_change(&metrics(10.5, 0.0, 0.0), &config));
        assert!(is_scene_change(&metrics(0.0, 50.5, 0.0), &config));
        assert!(is_scene_change(&metrics(0.0, 0.0, 3000.5), &config));
    }

    #[test]
    fn test_threshold_is_strict() {
        let config = DetectorConfig::default();
        assert!(!is_scene_change(&metrics(10.0, 50.0, 3000.0), &config));
    }

    #[test]
    fn test_exceeded_lists_gates() {
        let config = DetectorConfig::default();
        assert_eq!(metrics(20.0, 0.0, 5000.0).exceeded(&config), vec!["diff", "hist"]);
    }
}
