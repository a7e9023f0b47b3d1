use serde::{Deserialize, Serialize};
use steller::{MultilevelControl, SpringElectricalControl};

use crate::error::Result;

/// Which model produces the final coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutMode {
    /// Multilevel spring-electrical embedding.
    #[default]
    SpringElectrical,
    /// Stress model over the edge weights, started from the spring-electrical layout.
    StressMajorization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlapConfig {
    /// Minimum distance kept between neighbouring node boxes.
    pub gap: f64,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self { gap: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub dim: usize,
    pub mode: LayoutMode,
    pub spring: SpringElectricalControl,
    pub multilevel: MultilevelControl,
    pub stress_maxit: usize,
    pub stress_tol: f64,
    /// Remove node-box overlaps after layout; needs `dim >= 2`.
    pub overlap: Option<OverlapConfig>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dim: 2,
            mode: LayoutMode::SpringElectrical,
            spring: SpringElectricalControl::default(),
            multilevel: MultilevelControl::default(),
            stress_maxit: 200,
            stress_tol: 0.001,
            overlap: None,
        }
    }
}

impl LayoutConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use steller::Smoothing;

    #[test]
    fn empty_json_gives_the_defaults() {
        let cfg = LayoutConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, LayoutConfig::default());
        assert_eq!(cfg.dim, 2);
        assert!(cfg.overlap.is_none());
    }

    #[test]
    fn nested_controls_are_camel_case() {
        let cfg = LayoutConfig::from_json_str(
            r#"{
                "mode": "stressMajorization",
                "stressMaxit": 20,
                "spring": {"randomSeed": 7, "smoothing": "stressMajorizationAvgDist"},
                "multilevel": {"minsize": 10},
                "overlap": {"gap": 2.5}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.mode, LayoutMode::StressMajorization);
        assert_eq!(cfg.stress_maxit, 20);
        assert_eq!(cfg.stress_tol, 0.001);
        assert_eq!(cfg.spring.random_seed, 7);
        assert_eq!(cfg.spring.smoothing, Smoothing::StressMajorizationAvgDist);
        assert_eq!(cfg.multilevel.minsize, 10);
        assert_eq!(cfg.overlap, Some(OverlapConfig { gap: 2.5 }));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = LayoutConfig::from_json_str(r#"{"dim": "two"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
