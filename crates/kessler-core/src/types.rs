//! Fundamental identifier and geometric types.

use std::f64::consts::{PI, TAU};

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Unique pilot identifier. Monotonically assigned, never 0.
/// 0 is reserved to mean "no target" / "self".
pub type PilotId = u64;

/// Unique weapon (projectile/beam instance) identifier. Never 0.
pub type WeaponId = u64;

/// Faction identifier. Relations between factions are external input data.
pub type FactionId = u32;

/// Axis-aligned bounding box used by the spatial index and broad-phase
/// collision queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec2,
    pub max: DVec2,
}

impl Aabb {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// Box centered on `pos` extending `radius` in every direction.
    pub fn around(pos: DVec2, radius: f64) -> Self {
        Self {
            min: pos - DVec2::splat(radius),
            max: pos + DVec2::splat(radius),
        }
    }

    /// Smallest box containing the segment `a`-`b`, expanded by `radius`.
    pub fn from_segment(a: DVec2, b: DVec2, radius: f64) -> Self {
        Self {
            min: a.min(b) - DVec2::splat(radius),
            max: a.max(b) + DVec2::splat(radius),
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn half_size(&self) -> DVec2 {
        (self.max - self.min) * 0.5
    }
}

/// Wraps an angle into [0, 2π).
pub fn angle_wrap(a: f64) -> f64 {
    let mut na = a;
    if na.abs() >= TAU {
        na = na.rem_euclid(TAU);
    }
    if na < 0.0 {
        na += TAU;
    }
    if na >= TAU {
        na -= TAU;
    }
    na
}

/// Signed difference between two angles, in (-π, π].
pub fn angle_diff(reference: f64, a: f64) -> f64 {
    let mut d = angle_wrap(a) - angle_wrap(reference);
    if d > PI {
        d -= TAU;
    }
    if d <= -PI {
        d += TAU;
    }
    d
}

/// Unit vector pointing in direction `a` (radians).
pub fn unit(a: f64) -> DVec2 {
    DVec2::new(a.cos(), a.sin())
}

/// Angle of a vector, wrapped to [0, 2π). Zero vector maps to 0.
pub fn vec_angle(v: DVec2) -> f64 {
    angle_wrap(v.y.atan2(v.x))
}
