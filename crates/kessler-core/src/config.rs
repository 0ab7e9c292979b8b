//! Simulation configuration.
//!
//! Everything here deserializes with sane defaults so a config file can
//! override a single field without restating the rest.

use serde::{Deserialize, Serialize};

use crate::constants::{
    AUTONAV_COMPRESSION_MULT, AUTONAV_COMPRESSION_VELOCITY, AUTONAV_RESET_DIST,
    AUTONAV_RESET_SHIELD, QUADTREE_MAX_DEPTH, QUADTREE_MAX_ELEMENTS,
};

/// Spatial index tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Elements a quadtree leaf holds before it splits.
    pub max_elements: usize,
    /// Maximum quadtree subdivision depth.
    pub max_depth: usize,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            max_elements: QUADTREE_MAX_ELEMENTS,
            max_depth: QUADTREE_MAX_DEPTH,
        }
    }
}

/// Autonav tuning. The compression fields shape time acceleration; the
/// reset fields decide when danger aborts a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonavConfig {
    /// Velocity that, divided by ship top speed, yields max compression.
    pub compression_velocity: f64,
    /// Hard cap on the compression multiplier; values below 1 disable it.
    pub compression_mult: f64,
    /// Shield fraction below the tick-start value that aborts autonav.
    pub reset_shield: f64,
    /// Hostile-within-distance that aborts autonav.
    pub reset_dist: f64,
}

impl Default for AutonavConfig {
    fn default() -> Self {
        Self {
            compression_velocity: AUTONAV_COMPRESSION_VELOCITY,
            compression_mult: AUTONAV_COMPRESSION_MULT,
            reset_shield: AUTONAV_RESET_SHIELD,
            reset_dist: AUTONAV_RESET_DIST,
        }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed. Two worlds with the same seed, config and input sequence
    /// produce identical state.
    pub seed: u64,
    pub spatial: SpatialConfig,
    pub autonav: AutonavConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            spatial: SpatialConfig::default(),
            autonav: AutonavConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: SimConfig = serde_json::from_str(r#"{"seed": 42}"#).unwrap();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.spatial.max_elements, QUADTREE_MAX_ELEMENTS);
        assert_eq!(cfg.autonav.reset_dist, AUTONAV_RESET_DIST);
    }

    #[test]
    fn test_nested_override() {
        let cfg: SimConfig =
            serde_json::from_str(r#"{"spatial": {"max_depth": 8}}"#).unwrap();
        assert_eq!(cfg.spatial.max_depth, 8);
        assert_eq!(cfg.spatial.max_elements, QUADTREE_MAX_ELEMENTS);
    }
}
