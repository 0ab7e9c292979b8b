//! Enumeration types used throughout the simulation.

use serde::{Deserialize, Serialize};

use crate::types::{PilotId, WeaponId};

/// What a weapon is homing on / designated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponTarget {
    /// Dumbfire; no designated target.
    #[default]
    None,
    /// A pilot, by weak ID. May dangle; re-validate on use.
    Pilot(PilotId),
    /// An asteroid: (field index, asteroid index within the field).
    Asteroid(usize, usize),
    /// Another weapon (point-defense engagements), by weak ID.
    Weapon(WeaponId),
}

/// Guided munition status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekerState {
    /// Launch lock-on delay still running; flying straight, accelerating.
    #[default]
    Locking,
    /// Locked and homing; jam checks apply.
    Ok,
    /// Jammed: flying blind (hard turn or straight), no homing.
    Jammed,
    /// Jammed into a reduced speed cap, still homing.
    JammedSlowed,
    /// Survived its jam check; homing, no further jam rolls.
    Unjammed,
}

/// Runtime state of an outfit slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    #[default]
    Off,
    On,
    /// Spooling up before becoming active.
    Warmup,
    /// Spooling down; cannot fire.
    Cooldown,
}

/// Result of a sensor range check between two pilots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeStatus {
    /// Hard detection: full information, targetable.
    InRange,
    /// Fuzzy detection: a blip, not targetable.
    Fuzzy,
    OutOfRange,
}

/// Physics integration scheme for a rigid body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationMethod {
    /// Symplectic Euler: cheap, used for projectiles.
    Euler,
    /// Substepped quasi-RK4 with soft speed cap: used for ships.
    #[default]
    RungeKutta,
}
