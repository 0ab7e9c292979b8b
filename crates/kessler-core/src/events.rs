//! Combat event notifications.
//!
//! The simulation reports state transitions through these plain-data
//! events rather than calling out to game logic directly. The sink trait
//! that receives them lives with the engine, where the pilot type is
//! available for the callbacks that may mutate their subject.

use serde::{Deserialize, Serialize};

use crate::types::{PilotId, WeaponId};

/// A notification-only combat event. Events carrying a mutable subject
/// (death, disable, direct hits) go through dedicated sink methods instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// `boarder` finished boarding `target` and looted `credits`.
    Board {
        boarder: PilotId,
        target: PilotId,
        credits: u64,
    },
    /// A pilot recovered from its disabled state.
    Undisable { pilot: PilotId },
    /// `scanner` completed an active scan of `target`.
    Scan { scanner: PilotId, target: PilotId },
    /// `target` learned it has been scanned by `scanner`.
    Scanned { target: PilotId, scanner: PilotId },
    /// A pilot entered stealth.
    Stealth { pilot: PilotId },
    /// A pilot's stealth broke; `forced` when an enemy uncovered it rather
    /// than the pilot dropping it voluntarily.
    Uncovered { pilot: PilotId, forced: bool },
    /// A pilot engaged its jump drive and left the system.
    Jump { pilot: PilotId },
    /// A pilot landed on a spob.
    Land { pilot: PilotId },
    /// A dying pilot's final explosion fired (area damage already applied).
    Exploded { pilot: PilotId },
    /// A projectile expired without hitting anything; only reported for
    /// outfits that declare a miss hook.
    Miss {
        weapon: WeaponId,
        shooter: PilotId,
    },
}
