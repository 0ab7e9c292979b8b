//! Error types for the command-level API.
//!
//! Per-tick simulation code never errors; bad references resolve to `None`
//! and bad data degrades with a warning. These errors surface only from
//! explicit commands issued against the world.

use thiserror::Error;

use crate::types::{PilotId, WeaponId};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("no pilot with id {0}")]
    UnknownPilot(PilotId),

    #[error("no weapon with id {0}")]
    UnknownWeapon(WeaponId),

    #[error("pilot {pilot} has no outfit slot {slot}")]
    UnknownSlot { pilot: PilotId, slot: usize },

    #[error("pilot {pilot} has no weapon set {set}")]
    UnknownWeaponSet { pilot: PilotId, set: usize },

    #[error("cannot board: {0}")]
    CannotBoard(&'static str),

    #[error("cannot engage autonav: {0}")]
    CannotAutonav(&'static str),

    #[error("cannot stealth: {0}")]
    CannotStealth(&'static str),

    #[error("bad configuration: {0}")]
    Config(#[from] serde_json::Error),
}
