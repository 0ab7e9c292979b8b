//! Read-only outfit (weapon) definitions.
//!
//! Outfits are external input data: the simulation consumes their numbers
//! but never mutates them. Per-mount runtime state (heat, timers, ammo)
//! lives in the pilot's outfit slots. The weapon kind is a closed sum —
//! bolts, guided munitions and beams are the only projectile behaviors the
//! core implements; anything else degrades to an inert bolt.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::HEAT_ACCURACY_PENALTY;
use crate::damage::Damage;

/// Index into the world's outfit table. Outfit definitions are shared
/// read-only data; everything else refers to them by id.
pub type OutfitId = usize;

/// Gaussian-dispersed instant-velocity projectile.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BoltSpec {
    /// Muzzle speed added to the firer's velocity.
    pub speed: f64,
    /// Dispersion sigma in radians (before heat penalty).
    pub dispersion: f64,
}

/// Homing behavior of a launched munition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeekerSpec {
    /// Smart seekers use the bang-bang lead law; simple ones a proportional
    /// turn on the angle to target.
    pub smart: bool,
    /// Jam resistance subtracted from the target's jam stat.
    pub resist: f64,
    /// Lock-on radius factor: the munition only tracks (and can only be
    /// jammed) within `tracking * target_signature`.
    pub tracking: f64,
}

/// Self-propelled munition, optionally guided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LauncherSpec {
    /// Launch speed added to the firer's velocity.
    pub speed: f64,
    /// Top speed of the munition (soft cap).
    pub speed_max: f64,
    /// Acceleration of the munition.
    pub accel: f64,
    /// Turn rate (rad/s).
    pub turn: f64,
    /// Flight time in seconds.
    pub duration: f64,
    /// Lock-on delay gating the Locking -> Ok transition, scaled by the
    /// firer's launch-calibration stat.
    pub lockon: f64,
    /// Hit points of the munition; nonzero makes it point-defense-hittable.
    pub structure: f64,
    /// Homing behavior; `None` is a pure unguided rocket.
    pub seeker: Option<SeekerSpec>,
}

/// Continuous-damage beam. Not a moving projectile: its solid is re-pinned
/// to the mount every tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BeamSpec {
    /// Maximum firing duration in seconds.
    pub duration: f64,
    /// Grace period that can veto one early shutoff when the target leaves
    /// range.
    pub min_duration: f64,
    /// Damage scale applied per second of contact.
    pub fire_rate: f64,
}

/// The closed set of projectile behaviors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutfitKind {
    Bolt(BoltSpec),
    Launcher(LauncherSpec),
    Beam(BeamSpec),
}

/// Script hooks an outfit defines. The core only checks presence; dispatch
/// goes through the event sink.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OutfitHooks {
    pub on_impact: bool,
    pub on_miss: bool,
}

/// A weapon outfit definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outfit {
    pub name: String,
    pub kind: OutfitKind,
    pub damage: Damage,
    /// Maximum range in distance units.
    pub range: f64,
    /// Distance tail of `range` over which bolt strength ramps to zero.
    pub falloff: f64,
    /// Seconds between shots from one mount.
    pub delay: f64,
    /// Energy drained per shot (per second for beams).
    pub energy: f64,
    /// Ammo capacity; 0 means unlimited.
    pub ammo: u32,
    /// Lead tracking limits: full lead above `trackmax` target signature,
    /// none below `trackmin`.
    pub trackmin: f64,
    pub trackmax: f64,
    /// Maximum off-bore aiming angle (radians); 0 locks to the mount facing.
    pub swivel: f64,
    /// Turret mounts track the target freely (swivel still clamps beams).
    pub turret: bool,
    /// Collision radius of the projectile / beam width.
    pub radius: f64,
    /// Projectile mass, feeding the knockback impulse on impact.
    pub mass: f64,
    /// Heat added per shot; also scales the heat accuracy penalty.
    pub heat: f64,
    /// Point-defense weapons get a collision pass against hittable weapons.
    pub point_defense: bool,
    /// Cleared for munitions that should never collide with ships.
    pub hit_ships: bool,
    /// Explosive munitions deal area damage over this radius on impact.
    pub blast_radius: f64,
    pub hooks: OutfitHooks,
}

impl Outfit {
    /// Projectile lifetime in seconds, and the timer value at which the
    /// falloff ramp starts.
    pub fn bolt_lifetimes(&self) -> (f64, f64) {
        match self.kind {
            OutfitKind::Bolt(b) if b.speed > 0.0 => {
                (self.range / b.speed, self.falloff / b.speed)
            }
            _ => (0.0, 0.0),
        }
    }

    /// True when the outfit's projectile homes on its target.
    pub fn is_seeker(&self) -> bool {
        matches!(self.kind, OutfitKind::Launcher(l) if l.seeker.is_some())
    }

    /// Degrade an outfit with an unimplemented configuration to an inert
    /// non-homing bolt so bad data cannot abort the simulation.
    pub fn sanitize(mut self) -> Self {
        let degenerate = match self.kind {
            OutfitKind::Bolt(b) => b.speed <= 0.0,
            OutfitKind::Launcher(l) => l.speed_max <= 0.0 && l.accel <= 0.0,
            OutfitKind::Beam(b) => b.duration <= 0.0,
        };
        if degenerate {
            warn!(name = %self.name, "outfit has no usable projectile data, treating as inert bolt");
            self.kind = OutfitKind::Bolt(BoltSpec {
                speed: 100.0,
                dispersion: 0.0,
            });
            self.damage = Damage::default();
        }
        self
    }
}

/// Extra dispersion sigma (radians) contributed by slot heat in [0, 1].
///
/// Fixed curve: quadratic in heat so cool weapons stay precise and the
/// penalty bites hard near saturation.
pub fn heat_accuracy_penalty(heat: f64, heat_coefficient: f64) -> f64 {
    let h = heat.clamp(0.0, 1.0);
    h * h * heat_coefficient * HEAT_ACCURACY_PENALTY
}
