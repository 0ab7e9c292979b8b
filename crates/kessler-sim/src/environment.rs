//! Static system environment: asteroid fields, jump points, spobs,
//! interference, and the faction relation table.
//!
//! Everything here is input data describing the system the simulation runs
//! in. Only asteroids carry mutable state (they can be shot).

use std::collections::HashMap;

use glam::DVec2;
use kessler_core::constants::{EW_ASTEROID_DENSITY, EW_JUMP_STEALTH_DIST, EW_JUMP_STEALTH_MIN};
use kessler_core::types::FactionId;
use serde::{Deserialize, Serialize};

/// A single asteroid within a field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Asteroid {
    pub pos: DVec2,
    pub vel: DVec2,
    pub radius: f64,
    pub armour: f64,
    pub alive: bool,
}

/// A circular asteroid field. Density dampens sensors inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsteroidField {
    pub pos: DVec2,
    pub radius: f64,
    /// Dimensionless thickness used by the sensor damping curve.
    pub density: f64,
    pub asteroids: Vec<Asteroid>,
}

impl AsteroidField {
    pub fn contains(&self, pos: DVec2) -> bool {
        pos.distance_squared(self.pos) <= self.radius * self.radius
    }
}

/// A hyperspace jump point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JumpPoint {
    pub pos: DVec2,
    pub radius: f64,
    /// Hidden jumps require discovery and grant no stealth cover.
    pub hidden: bool,
    /// Exit-only jumps cannot be entered from this system.
    pub exit_only: bool,
}

impl JumpPoint {
    /// Whether a pilot can jump out through this point.
    pub fn usable(&self) -> bool {
        !self.exit_only
    }
}

/// A space object (planet or station) pilots may land on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spob {
    pub name: String,
    pub pos: DVec2,
    pub radius: f64,
    pub can_land: bool,
}

/// The system the simulation runs in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    /// System-wide sensor interference, in percent.
    pub interference: f64,
    pub asteroid_fields: Vec<AsteroidField>,
    pub jump_points: Vec<JumpPoint>,
    pub spobs: Vec<Spob>,
}

impl Environment {
    /// Sensor multiplier from system interference, in (0, 1].
    pub fn interference_mod(&self) -> f64 {
        1.0 / (1.0 + self.interference / 100.0)
    }

    /// Detection damping from asteroid cover at `pos`: 1 outside any field,
    /// shrinking with the densest containing field.
    pub fn asteroid_mod(&self, pos: DVec2) -> f64 {
        let mut density: f64 = 0.0;
        for field in &self.asteroid_fields {
            if field.contains(pos) {
                density = density.max(field.density);
            }
        }
        1.0 / (1.0 + EW_ASTEROID_DENSITY * density)
    }

    /// Stealth multiplier from loitering near a usable, non-hidden jump
    /// point: improves linearly from 1 at the cover distance down to
    /// [`EW_JUMP_STEALTH_MIN`] at the marker itself.
    pub fn jump_stealth_mod(&self, pos: DVec2) -> f64 {
        let mut best: f64 = 1.0;
        for jp in &self.jump_points {
            if jp.hidden || !jp.usable() {
                continue;
            }
            let d = pos.distance(jp.pos);
            if d < EW_JUMP_STEALTH_DIST {
                let m = EW_JUMP_STEALTH_MIN
                    + (1.0 - EW_JUMP_STEALTH_MIN) * d / EW_JUMP_STEALTH_DIST;
                best = best.min(m);
            }
        }
        best
    }
}

/// Pairwise standing between two factions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Ally,
    Neutral,
    Enemy,
}

/// Symmetric faction relation table. Unlisted pairs are neutral; a faction
/// is always its own ally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactionTable {
    relations: HashMap<(FactionId, FactionId), Relation>,
}

impl FactionTable {
    fn key(a: FactionId, b: FactionId) -> (FactionId, FactionId) {
        (a.min(b), a.max(b))
    }

    pub fn set(&mut self, a: FactionId, b: FactionId, rel: Relation) {
        self.relations.insert(Self::key(a, b), rel);
    }

    pub fn relation(&self, a: FactionId, b: FactionId) -> Relation {
        if a == b {
            return Relation::Ally;
        }
        self.relations
            .get(&Self::key(a, b))
            .copied()
            .unwrap_or(Relation::Neutral)
    }

    pub fn are_enemies(&self, a: FactionId, b: FactionId) -> bool {
        self.relation(a, b) == Relation::Enemy
    }

    pub fn are_allies(&self, a: FactionId, b: FactionId) -> bool {
        self.relation(a, b) == Relation::Ally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faction_relations_symmetric() {
        let mut t = FactionTable::default();
        t.set(1, 2, Relation::Enemy);
        t.set(1, 3, Relation::Ally);
        assert!(t.are_enemies(1, 2));
        assert!(t.are_enemies(2, 1));
        assert!(t.are_allies(3, 1));
        assert!(!t.are_enemies(2, 3));
        assert!(t.are_allies(2, 2));
    }

    #[test]
    fn test_asteroid_mod_inside_field() {
        let env = Environment {
            asteroid_fields: vec![AsteroidField {
                pos: DVec2::ZERO,
                radius: 1000.0,
                density: 2.0,
                asteroids: Vec::new(),
            }],
            ..Default::default()
        };
        assert!(env.asteroid_mod(DVec2::new(500.0, 0.0)) < 1.0);
        assert_eq!(env.asteroid_mod(DVec2::new(5000.0, 0.0)), 1.0);
    }

    #[test]
    fn test_jump_stealth_mod_shape() {
        let env = Environment {
            jump_points: vec![JumpPoint {
                pos: DVec2::ZERO,
                radius: 200.0,
                hidden: false,
                exit_only: false,
            }],
            ..Default::default()
        };
        assert!((env.jump_stealth_mod(DVec2::ZERO) - EW_JUMP_STEALTH_MIN).abs() < 1e-12);
        let mid = env.jump_stealth_mod(DVec2::new(EW_JUMP_STEALTH_DIST / 2.0, 0.0));
        assert!(mid > EW_JUMP_STEALTH_MIN && mid < 1.0);
        assert_eq!(env.jump_stealth_mod(DVec2::new(10_000.0, 0.0)), 1.0);
    }

    #[test]
    fn test_hidden_jump_gives_no_cover() {
        let env = Environment {
            jump_points: vec![JumpPoint {
                pos: DVec2::ZERO,
                radius: 200.0,
                hidden: true,
                exit_only: false,
            }],
            ..Default::default()
        };
        assert_eq!(env.jump_stealth_mod(DVec2::ZERO), 1.0);
    }
}
