//! Damage descriptors and the damage-type resolution table.
//!
//! Damage types split a raw hit into shield-bound and armour-bound
//! components plus a knockback coefficient. The table is external input
//! data; an unknown type falls back to the built-in `raw` type with a
//! warning rather than aborting.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Index into the damage-type table.
pub type DamageTypeId = usize;

/// A single hit's damage description, as defined by an outfit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Damage {
    /// Damage type, resolved through a [`DamageTypeTable`].
    pub kind: DamageTypeId,
    /// Raw damage amount.
    pub damage: f64,
    /// Raw disable (stress) damage amount.
    pub disable: f64,
    /// Armour penetration in [0, 1]; subtracts from the target's absorb.
    pub penetration: f64,
}

impl Default for Damage {
    fn default() -> Self {
        Self {
            kind: 0,
            damage: 0.0,
            disable: 0.0,
            penetration: 0.0,
        }
    }
}

/// How one damage type maps onto the health pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageType {
    pub name: String,
    /// Multiplier on the shield-bound component.
    pub shield_mod: f64,
    /// Multiplier on the armour-bound component.
    pub armour_mod: f64,
    /// Knockback coefficient.
    pub knockback: f64,
}

impl Default for DamageType {
    fn default() -> Self {
        Self {
            name: String::from("raw"),
            shield_mod: 1.0,
            armour_mod: 1.0,
            knockback: 0.0,
        }
    }
}

/// The damage-type registry. Index 0 is always the unmodified `raw` type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageTypeTable {
    types: Vec<DamageType>,
}

impl Default for DamageTypeTable {
    fn default() -> Self {
        Self {
            types: vec![DamageType::default()],
        }
    }
}

impl DamageTypeTable {
    /// Build a table from external definitions. `raw` is prepended at index 0.
    pub fn new(mut types: Vec<DamageType>) -> Self {
        let mut all = vec![DamageType::default()];
        all.append(&mut types);
        Self { types: all }
    }

    /// Look up a type id by name, if present.
    pub fn id_of(&self, name: &str) -> Option<DamageTypeId> {
        self.types.iter().position(|t| t.name == name)
    }

    fn get(&self, kind: DamageTypeId) -> &DamageType {
        match self.types.get(kind) {
            Some(t) => t,
            None => {
                warn!(kind, "unknown damage type, falling back to raw");
                &self.types[0]
            }
        }
    }

    /// Split a hit into (shield damage, armour damage, knockback).
    ///
    /// `absorb` is the effective absorption multiplier already combined with
    /// penetration, i.e. `1 - clamp01(target.absorb - dmg.penetration)`.
    pub fn resolve(&self, absorb: f64, dmg: &Damage) -> (f64, f64, f64) {
        let t = self.get(dmg.kind);
        let shield = t.shield_mod * dmg.damage * absorb;
        let armour = t.armour_mod * dmg.damage * absorb;
        (shield, armour, t.knockback)
    }
}
