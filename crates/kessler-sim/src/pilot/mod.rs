//! The pilot entity: physics body, health pools, outfit slots, targeting,
//! flags, and the registry that owns every live pilot.
//!
//! Damage resolution and the disable/death state machines live in
//! [`combat`]. Cross-pilot sensor math lives in the `ew` module; the range
//! predicates that compose it are here because targeting depends on them.

pub mod combat;

use glam::DVec2;
use kessler_core::constants::{HEAT_COOL_RATE, STRESS_DECAY_RATE};
use kessler_core::enums::{RangeStatus, SlotState};
use kessler_core::outfit::OutfitId;
use kessler_core::types::{FactionId, PilotId, WeaponId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::environment::FactionTable;
use crate::physics::Solid;

/// Per-ship stat multipliers, consumed as opaque input data. All default
/// to 1 (no effect).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipStats {
    /// Sensor strength: scales what the ship can see.
    pub ew_detect: f64,
    /// Weapon tracking quality: scales hard-detection range.
    pub ew_track: f64,
    /// Hull masking: shrinks own detection profile.
    pub ew_hide: f64,
    /// Emission control: shrinks own signature.
    pub ew_signature: f64,
    /// Stealth effectiveness: shrinks own stealth range.
    pub ew_stealth: f64,
    /// Scales how fast the stealth timer decays under observation.
    pub ew_stealth_timer: f64,
    /// Scales how long this ship takes to be scanned.
    pub ew_scanned_time: f64,
    /// Jamming strength rolled against incoming seekers.
    pub ew_jam: f64,
    /// Scales launcher lock-on delay.
    pub launch_calibration: f64,
    /// Scales credits looted when this pilot boards.
    pub loot_mod: f64,
}

impl Default for ShipStats {
    fn default() -> Self {
        Self {
            ew_detect: 1.0,
            ew_track: 1.0,
            ew_hide: 1.0,
            ew_signature: 1.0,
            ew_stealth: 1.0,
            ew_stealth_timer: 1.0,
            ew_scanned_time: 1.0,
            ew_jam: 0.0,
            launch_calibration: 1.0,
            loot_mod: 1.0,
        }
    }
}

/// Boolean pilot properties. Mutually compatible, not mutually exclusive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotFlags {
    pub disabled: bool,
    /// Forced disable: stress pinned to armour, cannot wake up from combat.
    pub disabled_perm: bool,
    /// Death sequence running; the pilot is beyond saving.
    pub dying: bool,
    /// Marked for the end-of-tick purge pass.
    pub delete: bool,
    /// Not simulated and not targetable.
    pub hidden: bool,
    pub invisible: bool,
    pub invincible: bool,
    /// Immune to the player's weapons specifically.
    pub invincible_player: bool,
    /// Armour is floored at 1 instead of dying.
    pub no_death: bool,
    pub stealth: bool,
    pub boarding: bool,
    /// Has already been boarded; cannot be boarded twice.
    pub boarded: bool,
    /// Scripted flight: AI tasks are only accepted while this is set.
    pub manual_control: bool,
    pub landing: bool,
    pub taking_off: bool,
    pub nontargetable: bool,
    /// Visible to everyone regardless of sensors.
    pub visible: bool,
    /// Visible to the player regardless of sensors.
    pub visplayer: bool,
    pub hailing: bool,
    pub braking: bool,
    pub hyperspace_prep: bool,
}

/// One outfit mount and its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutfitSlot {
    pub outfit: Option<OutfitId>,
    pub state: SlotState,
    /// Mount heat in [0, 1]; degrades accuracy, cools exponentially.
    pub heat: f64,
    /// Refire countdown; the slot can fire when it reaches zero.
    pub timer: f64,
    /// Remaining ammo. Ignored when the outfit's capacity is 0.
    pub ammo: u32,
    /// Live beam spawned from this slot, if any.
    pub beam: Option<WeaponId>,
}

impl OutfitSlot {
    pub fn new(outfit: OutfitId, ammo: u32) -> Self {
        Self {
            outfit: Some(outfit),
            state: SlotState::Off,
            heat: 0.0,
            timer: 0.0,
            ammo,
            beam: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            outfit: None,
            state: SlotState::Off,
            heat: 0.0,
            timer: 0.0,
            ammo: 0,
            beam: None,
        }
    }
}

/// AI task: a name plus opaque data the AI layer interprets. The core only
/// stores and sequences these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub data: serde_json::Value,
}

/// Sensor-derived state, recomputed every tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EwState {
    /// Mass curve, recomputed only when mass changes.
    pub mass_curve: f64,
    /// How far away this pilot can be hard-detected.
    pub detection: f64,
    /// Targeting profile; smaller is harder to track and scan.
    pub signature: f64,
    /// Radius inside which hostiles erode this pilot's stealth.
    pub stealth_range: f64,
    pub asteroid_mod: f64,
    pub jump_mod: f64,
    /// Active-scan countdown; fires once on crossing zero, re-arms only on
    /// a new target.
    pub scan_timer: f64,
    /// Stealth-break accumulator in (-inf, 1]; stealth breaks when it drops
    /// below zero.
    pub stealth_timer: f64,
}

impl Default for EwState {
    fn default() -> Self {
        Self {
            mass_curve: 0.0,
            detection: 0.0,
            signature: 0.0,
            stealth_range: 0.0,
            asteroid_mod: 1.0,
            jump_mod: 1.0,
            scan_timer: -1.0,
            stealth_timer: 0.0,
        }
    }
}

/// The central simulation entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pilot {
    pub id: PilotId,
    pub name: String,
    pub faction: FactionId,
    pub is_player: bool,
    pub solid: Solid,
    /// Bounding radius for collision and boarding checks.
    pub radius: f64,
    /// Convex collision hull in body space, counter-clockwise. Pilots
    /// without one fall back to the bounding circle.
    pub collision_poly: Option<Vec<DVec2>>,

    // Performance envelope; control inputs scale against these.
    pub accel_max: f64,
    pub turn_max: f64,
    pub base_speed: f64,

    // Health pools.
    pub shield: f64,
    pub shield_max: f64,
    pub shield_regen: f64,
    pub armour: f64,
    pub armour_max: f64,
    pub armour_regen: f64,
    pub energy: f64,
    pub energy_max: f64,
    pub energy_regen: f64,
    pub fuel: f64,
    pub fuel_max: f64,
    pub fuel_consumption: f64,
    /// Accumulated disable damage. Always in [0, armour].
    pub stress: f64,
    /// Fraction of incoming damage absorbed before penetration, in [0, 1].
    pub absorb: f64,

    pub credits: u64,
    pub stats: ShipStats,
    pub flags: PilotFlags,
    pub slots: Vec<OutfitSlot>,
    /// Weapon sets: groups of slot indices fired together.
    pub weapon_sets: Vec<Vec<usize>>,

    /// Current pilot target by weak id; 0 means none. Re-validated on use.
    pub target: PilotId,
    /// Asteroid target as (field, index); cleared by `set_target`.
    pub target_asteroid: Option<(usize, usize)>,

    pub ew: EwState,

    /// Parent (leader) pilot by weak id; 0 means none.
    pub parent: PilotId,
    pub escorts: Vec<PilotId>,

    pub tasks: Vec<Task>,

    /// Seeker munitions currently locked on this pilot.
    pub lockons: u32,

    // Disable bookkeeping.
    pub disable_timer: f64,
    pub disable_elapsed: f64,

    // Death sequence bookkeeping.
    pub death_timer: f64,
    pub death_puff_timer: f64,
    pub death_sound_played: bool,
    pub death_explosion_fired: bool,
    /// Who gets credit for the kill.
    pub killer: Option<PilotId>,

    // Boarding.
    pub board_timer: f64,
}

impl Pilot {
    /// Factory for a pilot from template-level numbers. The registry assigns
    /// the id on insertion.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        faction: FactionId,
        pos: DVec2,
        vel: DVec2,
        dir: f64,
        mass: f64,
        radius: f64,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            faction,
            is_player: false,
            solid: Solid::new(pos, vel, dir, mass),
            radius,
            collision_poly: None,
            accel_max: 200.0,
            turn_max: 2.0,
            base_speed: 150.0,
            shield: 100.0,
            shield_max: 100.0,
            shield_regen: 5.0,
            armour: 100.0,
            armour_max: 100.0,
            armour_regen: 0.0,
            energy: 100.0,
            energy_max: 100.0,
            energy_regen: 10.0,
            fuel: 100.0,
            fuel_max: 100.0,
            fuel_consumption: 100.0,
            stress: 0.0,
            absorb: 0.0,
            credits: 0,
            stats: ShipStats::default(),
            flags: PilotFlags::default(),
            slots: Vec::new(),
            weapon_sets: Vec::new(),
            target: 0,
            target_asteroid: None,
            ew: EwState::default(),
            parent: 0,
            escorts: Vec::new(),
            tasks: Vec::new(),
            lockons: 0,
            disable_timer: 0.0,
            disable_elapsed: 0.0,
            death_timer: 0.0,
            death_puff_timer: 0.0,
            death_sound_played: false,
            death_explosion_fired: false,
            killer: None,
            board_timer: 0.0,
        }
    }

    pub fn shield_fraction(&self) -> f64 {
        if self.shield_max > 0.0 {
            self.shield / self.shield_max
        } else {
            0.0
        }
    }

    pub fn armour_fraction(&self) -> f64 {
        if self.armour_max > 0.0 {
            self.armour / self.armour_max
        } else {
            0.0
        }
    }

    /// Set forward acceleration as a fraction of the envelope, in [-1, 1].
    pub fn set_accel(&mut self, frac: f64) {
        self.solid.accel = self.accel_max * frac.clamp(-1.0, 1.0);
        self.solid.speed_max = if frac > 0.0 { self.base_speed } else { -1.0 };
    }

    /// Set turn rate as a fraction of the envelope, in [-1, 1].
    pub fn set_turn(&mut self, frac: f64) {
        self.solid.dir_vel = self.turn_max * frac.clamp(-1.0, 1.0);
    }

    /// Closed-form top speed, used by planning code without running the
    /// integrator.
    pub fn max_speed(&self) -> f64 {
        Solid::max_speed(self.base_speed, self.accel_max, self.solid.drag)
    }

    /// Retarget. Clears the asteroid target and disarms the scan timer.
    /// Crate-internal: the world-level retarget is the public path, and it
    /// re-arms the timer from the target's stats.
    pub(crate) fn set_target(&mut self, id: PilotId) {
        if id != self.target {
            self.target = if id == self.id { 0 } else { id };
            self.ew.scan_timer = -1.0;
        }
        self.target_asteroid = None;
    }

    /// Whether this pilot can be someone's target at all.
    pub fn can_target(&self) -> bool {
        !self.flags.delete && !self.flags.dying && !self.flags.hidden && !self.flags.invisible
    }

    /// Push an AI task. Rejected unless the pilot is under manual control.
    pub fn push_task(&mut self, name: impl Into<String>, data: serde_json::Value) -> bool {
        if !self.flags.manual_control {
            warn!(pilot = self.id, "task push rejected: pilot not under manual control");
            return false;
        }
        self.tasks.push(Task {
            name: name.into(),
            data,
        });
        true
    }

    pub fn pop_task(&mut self) -> Option<Task> {
        self.tasks.pop()
    }

    pub fn clear_tasks(&mut self) {
        self.tasks.clear();
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.last()
    }

    /// Switch every slot off and cancel running beams. Used on disable,
    /// death, and stealth entry.
    pub fn shutdown_outfits(&mut self) -> Vec<WeaponId> {
        let mut beams = Vec::new();
        for slot in &mut self.slots {
            slot.state = SlotState::Off;
            if let Some(b) = slot.beam.take() {
                beams.push(b);
            }
        }
        beams
    }

    /// Per-tick housekeeping: pool regeneration, stress bleed-off, slot
    /// refire timers and heat cooling. Combat state machines run elsewhere.
    pub fn update_pools(&mut self, dt: f64) {
        if !self.flags.disabled && !self.flags.dying {
            self.shield = (self.shield + self.shield_regen * dt).min(self.shield_max);
            self.armour = (self.armour + self.armour_regen * dt).min(self.armour_max);
        }
        self.energy = (self.energy + self.energy_regen * dt).min(self.energy_max);

        if !self.flags.disabled && self.stress > 0.0 {
            self.stress = (self.stress - self.stress * STRESS_DECAY_RATE * dt).max(0.0);
        }

        for slot in &mut self.slots {
            if slot.timer > 0.0 {
                slot.timer -= dt;
            }
            if slot.heat > 0.0 {
                slot.heat = (slot.heat * (-HEAT_COOL_RATE * dt).exp()).max(0.0);
            }
        }
    }
}

/// Sensor range check from `observer` toward `target`.
///
/// Parent/visibility overrides short-circuit to in-range; stealth
/// short-circuits to out-of-range. Otherwise the hard-detection radius is
/// `observer_detect * observer_track * target_signature` and the fuzzy
/// radius `observer_detect * target_detection`.
pub fn in_range_pilot(observer: &Pilot, target: &Pilot) -> RangeStatus {
    if target.flags.visible
        || (observer.is_player && target.flags.visplayer)
        || target.parent == observer.id
    {
        return RangeStatus::InRange;
    }
    if target.flags.stealth {
        return RangeStatus::OutOfRange;
    }

    let d2 = observer.solid.pos.distance_squared(target.solid.pos);
    let hard = observer.stats.ew_detect * observer.stats.ew_track * target.ew.signature;
    if d2 < hard * hard {
        return RangeStatus::InRange;
    }
    let fuzzy = observer.stats.ew_detect * target.ew.detection;
    if d2 < fuzzy * fuzzy {
        return RangeStatus::Fuzzy;
    }
    RangeStatus::OutOfRange
}

/// Whether `target` is a shootable enemy of `observer` right now: alive,
/// targetable, hostile, and a hard sensor hit (fuzzy blips don't qualify).
pub fn valid_enemy(factions: &FactionTable, observer: &Pilot, target: &Pilot) -> bool {
    if target.flags.disabled
        || target.flags.invincible
        || target.flags.landing
        || target.flags.taking_off
        || target.flags.nontargetable
    {
        return false;
    }
    if !target.can_target() {
        return false;
    }
    if !factions.are_enemies(observer.faction, target.faction) {
        return false;
    }
    in_range_pilot(observer, target) == RangeStatus::InRange
}

/// Owns every live pilot, sorted by id for binary-search resolution.
/// Ids are monotonic and never 0.
#[derive(Debug, Default)]
pub struct PilotRegistry {
    pilots: Vec<Pilot>,
    next_id: PilotId,
}

impl PilotRegistry {
    pub fn new() -> Self {
        Self {
            pilots: Vec::new(),
            next_id: 1,
        }
    }

    /// Insert a pilot, assigning its id. Returns the id.
    pub fn spawn(&mut self, mut pilot: Pilot) -> PilotId {
        pilot.id = self.next_id;
        self.next_id += 1;
        self.pilots.push(pilot);
        self.pilots.last().map(|p| p.id).unwrap_or(0)
    }

    fn index_of(&self, id: PilotId) -> Option<usize> {
        if id == 0 {
            return None;
        }
        self.pilots.binary_search_by_key(&id, |p| p.id).ok()
    }

    /// Weak-reference resolution. `None` for 0, unknown, or purged ids.
    pub fn get(&self, id: PilotId) -> Option<&Pilot> {
        self.index_of(id).map(|i| &self.pilots[i])
    }

    pub fn get_mut(&mut self, id: PilotId) -> Option<&mut Pilot> {
        self.index_of(id).map(move |i| &mut self.pilots[i])
    }

    /// Resolve two distinct pilots mutably at once.
    pub fn pair_mut(&mut self, a: PilotId, b: PilotId) -> Option<(&mut Pilot, &mut Pilot)> {
        if a == b {
            return None;
        }
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        if ia < ib {
            let (lo, hi) = self.pilots.split_at_mut(ib);
            Some((&mut lo[ia], &mut hi[0]))
        } else {
            let (lo, hi) = self.pilots.split_at_mut(ia);
            Some((&mut hi[0], &mut lo[ib]))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pilot> {
        self.pilots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pilot> {
        self.pilots.iter_mut()
    }

    pub fn ids(&self) -> Vec<PilotId> {
        self.pilots.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.pilots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pilots.is_empty()
    }

    /// End-of-tick purge: drop everything marked for deletion and scrub
    /// dangling references to the removed ids.
    pub fn purge(&mut self) {
        if !self.pilots.iter().any(|p| p.flags.delete) {
            return;
        }
        let removed: Vec<PilotId> = self
            .pilots
            .iter()
            .filter(|p| p.flags.delete)
            .map(|p| p.id)
            .collect();
        self.pilots.retain(|p| !p.flags.delete);
        for p in &mut self.pilots {
            if removed.contains(&p.target) {
                p.target = 0;
                p.ew.scan_timer = -1.0;
            }
            if removed.contains(&p.parent) {
                p.parent = 0;
            }
            p.escorts.retain(|e| !removed.contains(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(reg: &mut PilotRegistry) -> PilotId {
        reg.spawn(Pilot::new(
            "test",
            1,
            DVec2::ZERO,
            DVec2::ZERO,
            0.0,
            100.0,
            20.0,
        ))
    }

    #[test]
    fn test_ids_monotonic_never_zero() {
        let mut reg = PilotRegistry::new();
        let a = spawn(&mut reg);
        let b = spawn(&mut reg);
        assert!(a > 0 && b > a);
    }

    #[test]
    fn test_target_round_trip_and_invalidation() {
        let mut reg = PilotRegistry::new();
        let a = spawn(&mut reg);
        let b = spawn(&mut reg);
        reg.get_mut(a).unwrap().set_target(b);
        assert_eq!(reg.get(a).unwrap().target, b);
        assert!(reg.get(reg.get(a).unwrap().target).is_some());

        reg.get_mut(b).unwrap().flags.delete = true;
        reg.purge();
        assert!(reg.get(b).is_none());
        // Target reference scrubbed without an explicit re-target.
        assert_eq!(reg.get(a).unwrap().target, 0);
    }

    #[test]
    fn test_pair_mut_rejects_same_id() {
        let mut reg = PilotRegistry::new();
        let a = spawn(&mut reg);
        let b = spawn(&mut reg);
        assert!(reg.pair_mut(a, a).is_none());
        let (pa, pb) = reg.pair_mut(a, b).unwrap();
        assert_eq!((pa.id, pb.id), (a, b));
        let (pb2, pa2) = reg.pair_mut(b, a).unwrap();
        assert_eq!((pb2.id, pa2.id), (b, a));
    }

    #[test]
    fn test_task_push_requires_manual_control() {
        let mut p = Pilot::new("t", 1, DVec2::ZERO, DVec2::ZERO, 0.0, 100.0, 20.0);
        assert!(!p.push_task("attack", serde_json::Value::Null));
        p.flags.manual_control = true;
        assert!(p.push_task("attack", serde_json::Value::Null));
        assert_eq!(p.current_task().unwrap().name, "attack");
    }

    #[test]
    fn test_range_overrides() {
        let mut obs = Pilot::new("o", 1, DVec2::ZERO, DVec2::ZERO, 0.0, 100.0, 20.0);
        obs.id = 1;
        let mut tgt = Pilot::new("t", 2, DVec2::new(1e9, 0.0), DVec2::ZERO, 0.0, 100.0, 20.0);
        tgt.id = 2;
        assert_eq!(in_range_pilot(&obs, &tgt), RangeStatus::OutOfRange);
        tgt.flags.visible = true;
        assert_eq!(in_range_pilot(&obs, &tgt), RangeStatus::InRange);
        tgt.flags.visible = false;
        tgt.parent = obs.id;
        assert_eq!(in_range_pilot(&obs, &tgt), RangeStatus::InRange);
        tgt.parent = 0;
        tgt.flags.visplayer = true;
        assert_eq!(in_range_pilot(&obs, &tgt), RangeStatus::OutOfRange);
        obs.is_player = true;
        assert_eq!(in_range_pilot(&obs, &tgt), RangeStatus::InRange);
    }

    #[test]
    fn test_stealth_blocks_detection() {
        let mut obs = Pilot::new("o", 1, DVec2::ZERO, DVec2::ZERO, 0.0, 100.0, 20.0);
        obs.id = 1;
        let mut tgt = Pilot::new("t", 2, DVec2::new(10.0, 0.0), DVec2::ZERO, 0.0, 100.0, 20.0);
        tgt.id = 2;
        tgt.ew.signature = 1000.0;
        tgt.ew.detection = 2000.0;
        assert_eq!(in_range_pilot(&obs, &tgt), RangeStatus::InRange);
        tgt.flags.stealth = true;
        assert_eq!(in_range_pilot(&obs, &tgt), RangeStatus::OutOfRange);
    }
}
