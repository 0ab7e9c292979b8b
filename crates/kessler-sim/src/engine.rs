//! The simulation world: owns the registries, the spatial indexes, the RNG,
//! and the per-tick pipeline.
//!
//! One tick advances sensors, pilots, autonav, weapons, collisions, and
//! finally the purge passes, in that order. All command-level entry points
//! (targeting, firing, autonav, boarding, stealth) live here and return
//! `Result`; per-tick simulation code never errors.

use glam::DVec2;
use kessler_core::config::SimConfig;
use kessler_core::constants::{
    DEATH_BLAST_DAMAGE_FACTOR, DEATH_BLAST_PENETRATION, DEATH_BLAST_RADIUS_FACTOR,
};
use kessler_core::damage::{Damage, DamageTypeTable};
use kessler_core::enums::WeaponTarget;
use kessler_core::error::SimError;
use kessler_core::events::CombatEvent;
use kessler_core::outfit::Outfit;
use kessler_core::types::{Aabb, PilotId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::autonav::{self, AutonavSession, AutonavState};
use crate::environment::{Environment, FactionTable};
use crate::events::CombatEventSink;
use crate::ew;
use crate::pilot::{combat, Pilot, PilotRegistry};
use crate::spatial::QuadTree;
use crate::weapon::{self, collision, AimTarget, WeaponRegistry};

/// Everything one simulated system needs.
pub struct SimWorld {
    pub config: SimConfig,
    pub env: Environment,
    pub factions: FactionTable,
    /// Shared read-only outfit table; weapons refer into it by index.
    pub outfits: Vec<Outfit>,
    pub damage_types: DamageTypeTable,
    pub pilots: PilotRegistry,
    pub weapons: WeaponRegistry,
    pilot_index: QuadTree,
    weapon_index: QuadTree,
    bounds: Aabb,
    rng: ChaCha8Rng,
    /// The player-controlled pilot; 0 when there is none.
    player: PilotId,
    autonav: Option<AutonavSession>,
}

impl SimWorld {
    pub fn new(
        config: SimConfig,
        env: Environment,
        factions: FactionTable,
        outfits: Vec<Outfit>,
        damage_types: DamageTypeTable,
        bounds: Aabb,
    ) -> Self {
        let outfits = outfits.into_iter().map(Outfit::sanitize).collect();
        Self {
            env,
            factions,
            outfits,
            damage_types,
            pilots: PilotRegistry::new(),
            weapons: WeaponRegistry::new(),
            pilot_index: QuadTree::new(bounds, &config.spatial),
            weapon_index: QuadTree::new(bounds, &config.spatial),
            bounds,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            player: 0,
            autonav: None,
            config,
        }
    }

    /// Spawn a pilot and index it for the current tick.
    pub fn spawn(&mut self, pilot: Pilot) -> PilotId {
        let id = self.pilots.spawn(pilot);
        if let Some(p) = self.pilots.get(id) {
            self.pilot_index.insert(id, Aabb::around(p.solid.pos, p.radius));
        }
        id
    }

    pub fn set_player(&mut self, id: PilotId) -> Result<(), SimError> {
        let p = self.pilots.get_mut(id).ok_or(SimError::UnknownPilot(id))?;
        p.is_player = true;
        self.player = id;
        Ok(())
    }

    pub fn player(&self) -> PilotId {
        self.player
    }

    /// Current time-compression factor; 1 unless an autonav session is
    /// ramped up.
    pub fn time_compression(&self) -> f64 {
        self.autonav.as_ref().map_or(1.0, |s| s.tc_mod)
    }

    pub fn autonav_status(&self) -> Option<&str> {
        self.autonav.as_ref().map(|s| s.status.as_str())
    }

    // --- Command API ---
    // These mirror the primitives an AI layer drives; the player input
    // layer calls the same ones.

    pub fn set_accel(&mut self, id: PilotId, frac: f64) -> Result<(), SimError> {
        let p = self.pilots.get_mut(id).ok_or(SimError::UnknownPilot(id))?;
        if !p.flags.disabled && !p.flags.dying {
            p.set_accel(frac);
        }
        Ok(())
    }

    pub fn set_turn(&mut self, id: PilotId, frac: f64) -> Result<(), SimError> {
        let p = self.pilots.get_mut(id).ok_or(SimError::UnknownPilot(id))?;
        if !p.flags.disabled && !p.flags.dying {
            p.set_turn(frac);
        }
        Ok(())
    }

    /// Retarget `id` onto `target` and arm the active-scan timer.
    pub fn set_target(&mut self, id: PilotId, target: PilotId) -> Result<(), SimError> {
        let scan = self.pilots.get(target).map(ew::scan_time);
        let p = self.pilots.get_mut(id).ok_or(SimError::UnknownPilot(id))?;
        p.set_target(target);
        if p.target != 0 {
            if let Some(t) = scan {
                p.ew.scan_timer = t;
            }
        }
        Ok(())
    }

    /// Fire every ready slot in one of the pilot's weapon sets at its
    /// current target. Returns how many weapons spawned. Firing drops
    /// stealth.
    pub fn shoot_weapon_set(
        &mut self,
        id: PilotId,
        set: usize,
        sink: &mut dyn CombatEventSink,
    ) -> Result<u32, SimError> {
        let (slots, target_id) = {
            let p = self.pilots.get(id).ok_or(SimError::UnknownPilot(id))?;
            if p.flags.disabled || p.flags.dying {
                return Ok(0);
            }
            let slots = p
                .weapon_sets
                .get(set)
                .ok_or(SimError::UnknownWeaponSet { pilot: id, set })?
                .clone();
            (slots, p.target)
        };
        let (aim, target_ref) = match self.pilots.get(target_id) {
            Some(t) if t.can_target() && !t.flags.stealth => {
                (Some(AimTarget::of(t)), WeaponTarget::Pilot(target_id))
            }
            _ => (None, WeaponTarget::None),
        };

        let mut fired = 0;
        for slot in slots {
            let spawned = {
                let p = match self.pilots.get_mut(id) {
                    Some(p) => p,
                    None => break,
                };
                weapon::fire_weapon(p, slot, aim, target_ref, &self.outfits, &mut self.rng)
            };
            let Some(w) = spawned else { continue };
            let beam = w.beam;
            let mount = w.mount_slot;
            let seeker = self.outfits.get(w.outfit).map_or(false, |o| o.is_seeker());
            let wid = self.weapons.insert(w);
            if beam {
                if let Some(p) = self.pilots.get_mut(id) {
                    if let Some(s) = p.slots.get_mut(mount) {
                        s.beam = Some(wid);
                    }
                }
            }
            if seeker {
                if let WeaponTarget::Pilot(tid) = target_ref {
                    if let Some(t) = self.pilots.get_mut(tid) {
                        t.lockons += 1;
                    }
                }
            }
            fired += 1;
        }
        if fired > 0 {
            if let Some(p) = self.pilots.get_mut(id) {
                ew::destealth(p, sink);
            }
        }
        Ok(fired)
    }

    pub fn try_stealth(
        &mut self,
        id: PilotId,
        sink: &mut dyn CombatEventSink,
    ) -> Result<(), SimError> {
        ew::try_stealth(&mut self.pilots, &self.factions, id, sink)
    }

    pub fn destealth(&mut self, id: PilotId, sink: &mut dyn CombatEventSink) -> Result<(), SimError> {
        let p = self.pilots.get_mut(id).ok_or(SimError::UnknownPilot(id))?;
        ew::destealth(p, sink);
        Ok(())
    }

    /// Begin boarding the pilot's current target directly (no autonav).
    pub fn board(&mut self, id: PilotId) -> Result<(), SimError> {
        let target = self
            .pilots
            .get(id)
            .ok_or(SimError::UnknownPilot(id))?
            .target;
        let (boarder, victim) = self
            .pilots
            .pair_mut(id, target)
            .ok_or(SimError::CannotBoard("no boarding target"))?;
        combat::try_board(boarder, victim)
    }

    // --- Autonav ---

    fn player_pilot(&self) -> Result<&Pilot, SimError> {
        self.pilots
            .get(self.player)
            .ok_or(SimError::CannotAutonav("no player pilot"))
    }

    pub fn autonav_pos(&mut self, pos: DVec2) -> Result<(), SimError> {
        let session = autonav::start_pos(self.player_pilot()?, pos, &self.config.autonav)?;
        self.autonav = Some(session);
        Ok(())
    }

    pub fn autonav_jump(&mut self, jump_idx: usize) -> Result<(), SimError> {
        let session =
            autonav::start_jump(self.player_pilot()?, &self.env, jump_idx, &self.config.autonav)?;
        self.autonav = Some(session);
        Ok(())
    }

    pub fn autonav_spob(&mut self, spob_idx: usize, land: bool) -> Result<(), SimError> {
        let session = autonav::start_spob(
            self.player_pilot()?,
            &self.env,
            spob_idx,
            land,
            &self.config.autonav,
        )?;
        self.autonav = Some(session);
        Ok(())
    }

    pub fn autonav_follow(&mut self, target: PilotId) -> Result<(), SimError> {
        let t = self
            .pilots
            .get(target)
            .ok_or(SimError::UnknownPilot(target))?;
        let session = autonav::start_follow(self.player_pilot()?, t, &self.config.autonav)?;
        self.autonav = Some(session);
        Ok(())
    }

    pub fn autonav_board(&mut self, target: PilotId) -> Result<(), SimError> {
        let t = self
            .pilots
            .get(target)
            .ok_or(SimError::UnknownPilot(target))?;
        let session = autonav::start_board(self.player_pilot()?, t, &self.config.autonav)?;
        self.autonav = Some(session);
        Ok(())
    }

    pub fn abort_autonav(&mut self) {
        if self.autonav.take().is_some() {
            if let Some(p) = self.pilots.get_mut(self.player) {
                p.set_accel(0.0);
                p.set_turn(0.0);
            }
        }
    }

    // --- The tick pipeline ---

    /// Advance the world by `dt` of wall time. Autonav time compression
    /// stretches the simulated step.
    pub fn update(&mut self, dt: f64, sink: &mut dyn CombatEventSink) {
        // Autonav drives controls on uncompressed time, then compression
        // scales the simulation step itself.
        if let Some(mut session) = self.autonav.take() {
            let state = autonav::update(
                &mut session,
                &mut self.pilots,
                self.player,
                &self.env,
                &self.factions,
                &self.config.autonav,
                dt,
                sink,
            );
            if state == AutonavState::Active {
                self.autonav = Some(session);
            } else {
                debug!(?state, "autonav session ended");
            }
        }
        let dt = dt * self.time_compression();

        for p in self.pilots.iter_mut() {
            if !p.flags.hidden {
                ew::update_sensors(p, &self.env);
            }
        }

        self.update_pilots(dt, sink);
        self.update_boardings(dt, sink);
        ew::update_scans(&mut self.pilots, dt, sink);
        ew::update_stealth(&mut self.pilots, &self.factions, dt, sink);

        weapon::update_weapons(
            &mut self.weapons,
            &mut self.pilots,
            &self.outfits,
            dt,
            &mut self.rng,
        );

        self.rebuild_indexes();
        collision::update_collisions(
            &mut self.weapons,
            &mut self.pilots,
            &mut self.env,
            &self.pilot_index,
            &self.weapon_index,
            &self.outfits,
            &self.damage_types,
            &self.factions,
            dt,
            sink,
        );

        self.purge_weapons(sink);
        self.pilots.purge();
    }

    fn update_pilots(&mut self, dt: f64, sink: &mut dyn CombatEventSink) {
        let ids = self.pilots.ids();
        // (pilot, position, blast radius, faction, damage) of every final
        // explosion this tick; applied after the iteration.
        let mut blasts = Vec::new();
        for id in ids {
            let rng = &mut self.rng;
            let p = match self.pilots.get_mut(id) {
                Some(p) => p,
                None => continue,
            };
            if p.flags.hidden {
                continue;
            }
            p.update_pools(dt);
            combat::update_disabled(p, dt, sink);
            if p.flags.dying {
                let tick = combat::update_dying(p, dt, rng);
                if tick.exploded {
                    blasts.push((
                        id,
                        p.solid.pos,
                        p.radius * DEATH_BLAST_RADIUS_FACTOR,
                        p.faction,
                        (p.armour_max + p.shield_max) * DEATH_BLAST_DAMAGE_FACTOR,
                    ));
                }
            }
            p.solid.update(dt);
        }

        for (id, pos, radius, faction, damage) in blasts {
            let dmg = Damage {
                kind: 0,
                damage,
                disable: 0.0,
                penetration: DEATH_BLAST_PENETRATION,
            };
            collision::explode(
                &mut self.pilots,
                &mut self.weapons,
                &mut self.env,
                &self.factions,
                &self.damage_types,
                pos,
                radius,
                &dmg,
                id,
                false,
                faction,
                None,
                sink,
            );
            sink.event(CombatEvent::Exploded { pilot: id });
        }
    }

    fn update_boardings(&mut self, dt: f64, sink: &mut dyn CombatEventSink) {
        let pairs: Vec<(PilotId, PilotId)> = self
            .pilots
            .iter()
            .filter(|p| p.flags.boarding && p.target != 0)
            .map(|p| (p.id, p.target))
            .collect();
        for (boarder, target) in pairs {
            match self.pilots.pair_mut(boarder, target) {
                Some((b, t)) => combat::update_boarding(b, t, dt, sink),
                None => {
                    // Target purged mid-boarding.
                    if let Some(b) = self.pilots.get_mut(boarder) {
                        b.flags.boarding = false;
                    }
                }
            }
        }
    }

    fn rebuild_indexes(&mut self) {
        self.pilot_index.clear(self.bounds);
        for p in self.pilots.iter() {
            if p.flags.hidden {
                continue;
            }
            self.pilot_index
                .insert(p.id, Aabb::around(p.solid.pos, p.radius));
        }
        self.weapon_index.clear(self.bounds);
        for w in self.weapons.iter() {
            let radius = self.outfits.get(w.outfit).map_or(1.0, |o| o.radius);
            self.weapon_index
                .insert(w.id, Aabb::around(w.solid.pos, radius));
        }
    }

    /// Remove destroyed weapons and settle their bookkeeping: lock-on
    /// counts, beam slot references, and miss hooks.
    fn purge_weapons(&mut self, sink: &mut dyn CombatEventSink) {
        for w in self.weapons.purge() {
            let outfit = self.outfits.get(w.outfit);
            if outfit.map_or(false, |o| o.is_seeker()) {
                if let WeaponTarget::Pilot(tid) = w.target {
                    if let Some(t) = self.pilots.get_mut(tid) {
                        t.lockons = t.lockons.saturating_sub(1);
                    }
                }
            }
            if w.beam {
                if let Some(p) = self.pilots.get_mut(w.owner) {
                    if let Some(slot) = p.slots.get_mut(w.mount_slot) {
                        if slot.beam == Some(w.id) {
                            slot.beam = None;
                        }
                    }
                }
            }
            if w.missed && outfit.map_or(false, |o| o.hooks.on_miss) {
                sink.event(CombatEvent::Miss {
                    weapon: w.id,
                    shooter: w.owner,
                });
            }
            if outfit.is_none() {
                warn!(weapon = w.id, outfit = w.outfit, "purged weapon with unknown outfit");
            }
        }
    }
}
