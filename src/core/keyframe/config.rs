use super::error::KeyframeError;
use serde::{Deserialize, Serialize};

/// 场景切换检测参数
///
/// 阈值越小越敏感。`min_gap` 是两次选帧之间必须超过的帧数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Mean absolute pixel difference gate (0-255 scale).
    pub diff_threshold: f64,
    /// Mean absolute edge-map difference gate (0-255 scale).
    pub edge_threshold: f64,
    /// Chi-square histogram distance gate, in raw pixel counts.
    pub hist_threshold: f64,
    pub min_gap: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            diff_threshold: 10.0,
            edge_threshold: 50.0,
            hist_threshold: 3000.0,
            min_gap: 10,
        }
    }
}

impl DetectorConfig {
    pub fn new(
        diff_threshold: f64,
        edge_threshold: f64,
        hist_threshold: f64,
        min_gap: u32,
    ) -> Result<Self, KeyframeError> {
        let config = Self {
            diff_threshold,
            edge_threshold,
            hist_threshold,
            min_gap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON override; omitted fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, KeyframeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_diff_threshold(mut self, value: f64) -> Self {
        self.diff_threshold = value;
        self
    }

    pub fn with_edge_threshold(mut self, value: f64) -> Self {
        self.edge_threshold = value;
        self
    }

    pub fn with_hist_threshold(mut self, value: f64) -> Self {
        self.hist_threshold = value;
        self
    }

    pub fn with_min_gap(mut self, value: u32) -> Self {
        self.min_gap = value;
        self
    }

    pub fn validate(&self) -> Result<(), KeyframeError> {
        for (name, value) in [
            ("diff_threshold", self.diff_threshold),
            ("edge_threshold", self.edge_threshold),
            ("hist_threshold", self.hist_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(KeyframeError::InvalidConfiguration(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if self.min_gap == 0 {
            return Err(KeyframeError::InvalidConfiguration(
                "min_gap must be at least 1 frame".to_string(),
            ));
        }

        Ok(())
    }
}
