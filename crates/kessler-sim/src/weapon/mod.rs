//! Weapon instances: bolts, guided munitions, and beams.
//!
//! Spawning consumes the firing slot's resources and aims the projectile;
//! the per-tick update drives seeker AI, beam re-pinning, and lifetime
//! timers. Hit-testing lives in [`collision`]. Destruction is two-phase:
//! anything that dies sets `destroyed` and is removed in the end-of-tick
//! purge pass.

pub mod aim;
pub mod collision;
pub mod seeker;

use glam::DVec2;
use kessler_core::constants::HEAT_PER_SHOT;
use kessler_core::enums::{SeekerState, WeaponTarget};
use kessler_core::outfit::{Outfit, OutfitId, OutfitKind};
use kessler_core::types::{unit, vec_angle, FactionId, PilotId, WeaponId};
use rand::Rng;
use tracing::warn;

use crate::physics::Solid;
use crate::pilot::{Pilot, PilotRegistry};

/// A live projectile or beam.
#[derive(Debug, Clone)]
pub struct Weapon {
    pub id: WeaponId,
    pub outfit: OutfitId,
    /// Firing pilot, weak. May dangle; re-validate on use.
    pub owner: PilotId,
    pub owner_is_player: bool,
    pub faction: FactionId,
    pub target: WeaponTarget,
    pub solid: Solid,
    /// Remaining lifetime (beams: remaining firing duration).
    pub timer: f64,
    /// Timer value at which the damage falloff ramp begins.
    pub falloff_start: f64,
    /// Hit points for point-defense-destructible munitions; 0 = not
    /// hittable.
    pub armour: f64,
    pub status: SeekerState,
    /// Remaining lock-on delay while Locking.
    pub lockon: f64,
    /// Speed cap imposed by the JammedSlowed outcome.
    pub jam_speed_cap: f64,
    /// Slot index on the owner; beams re-pin through it.
    pub mount_slot: usize,
    /// Grace timer that can veto one early beam shutoff.
    pub beam_min_timer: f64,
    /// Countdown gating beam hit visuals to discrete pulses.
    pub beam_pulse: f64,
    pub beam: bool,
    pub destroyed: bool,
    /// Expired without hitting anything.
    pub missed: bool,
}

impl Weapon {
    /// Damage strength in [0, 1]: full until the falloff window, then a
    /// linear ramp to zero at end of life.
    pub fn strength(&self) -> f64 {
        if self.falloff_start <= 0.0 || self.timer > self.falloff_start {
            1.0
        } else {
            (self.timer / self.falloff_start).max(0.0)
        }
    }

    /// Whether point defense can shoot this down.
    pub fn hittable(&self) -> bool {
        self.armour > 0.0 && !self.beam
    }
}

/// What the aimer needs to know about the designated target.
#[derive(Debug, Clone, Copy)]
pub struct AimTarget {
    pub pos: DVec2,
    pub vel: DVec2,
    pub signature: f64,
}

impl AimTarget {
    pub fn of(pilot: &Pilot) -> Self {
        Self {
            pos: pilot.solid.pos,
            vel: pilot.solid.vel,
            signature: pilot.ew.signature,
        }
    }
}

/// Compute the fire direction for a mount: turret tracking or fixed facing,
/// lead blended by tracking quality, clamped to the swivel arc.
fn fire_direction(shooter: &Pilot, outfit: &Outfit, target: Option<AimTarget>, speed: f64) -> f64 {
    let facing = shooter.solid.dir;
    let t = match target {
        Some(t) => t,
        None => return facing,
    };
    let rel_pos = t.pos - shooter.solid.pos;
    if rel_pos.length_squared() < 1e-9 {
        return facing;
    }
    let rel_vel = t.vel - shooter.solid.vel;
    let bearing = vec_angle(rel_pos);
    let lead = if speed > 0.0 {
        aim::lead_angle(rel_pos, rel_vel, speed)
    } else {
        bearing
    };
    let desired = aim::blend_lead(bearing, lead, aim::track_quality(outfit, t.signature));

    if outfit.turret {
        desired
    } else if outfit.swivel > 0.0 {
        aim::clamp_swivel(facing, desired, outfit.swivel)
    } else {
        facing
    }
}

/// Fire one slot. Checks refire timer, energy and ammo; on success consumes
/// them, heats the mount, and returns the spawned weapon (id unassigned).
/// Beams drain energy continuously instead of per shot.
pub fn fire_weapon(
    shooter: &mut Pilot,
    slot_idx: usize,
    target: Option<AimTarget>,
    target_ref: WeaponTarget,
    outfits: &[Outfit],
    rng: &mut impl Rng,
) -> Option<Weapon> {
    let slot = shooter.slots.get(slot_idx)?;
    let outfit_id = slot.outfit?;
    let outfit = match outfits.get(outfit_id) {
        Some(o) => o,
        None => {
            warn!(outfit_id, "slot references unknown outfit");
            return None;
        }
    };
    if slot.timer > 0.0 || slot.beam.is_some() {
        return None;
    }
    if outfit.ammo > 0 && slot.ammo == 0 {
        return None;
    }
    let energy_cost = match outfit.kind {
        OutfitKind::Beam(_) => 0.0,
        _ => outfit.energy,
    };
    if shooter.energy < energy_cost {
        return None;
    }

    let heat = slot.heat;
    let mut weapon = Weapon {
        id: 0,
        outfit: outfit_id,
        owner: shooter.id,
        owner_is_player: shooter.is_player,
        faction: shooter.faction,
        target: target_ref,
        solid: Solid::projectile(shooter.solid.pos, shooter.solid.vel, shooter.solid.dir, outfit.mass),
        timer: 0.0,
        falloff_start: 0.0,
        armour: 0.0,
        status: SeekerState::Ok,
        lockon: 0.0,
        jam_speed_cap: -1.0,
        mount_slot: slot_idx,
        beam_min_timer: 0.0,
        beam_pulse: 0.0,
        beam: false,
        destroyed: false,
        missed: false,
    };

    match outfit.kind {
        OutfitKind::Bolt(b) => {
            let dir = fire_direction(shooter, outfit, target, b.speed);
            let dir = aim::disperse(dir, b.dispersion, heat, outfit, rng);
            weapon.solid.dir = dir;
            weapon.solid.vel = shooter.solid.vel + b.speed * unit(dir);
            let (life, falloff) = outfit.bolt_lifetimes();
            weapon.timer = life;
            weapon.falloff_start = falloff;
        }
        OutfitKind::Launcher(l) => {
            let dir = if l.accel > 0.0 && l.speed > 0.0 {
                match target {
                    Some(t) => aim::aim_correction(
                        t.pos - shooter.solid.pos,
                        t.vel - shooter.solid.vel,
                        l.speed,
                        l.accel,
                        l.speed_max,
                    ),
                    None => shooter.solid.dir,
                }
            } else {
                fire_direction(shooter, outfit, target, l.speed)
            };
            weapon.solid.dir = dir;
            weapon.solid.vel = shooter.solid.vel + l.speed * unit(dir);
            weapon.solid.accel = l.accel;
            weapon.solid.speed_max = l.speed_max;
            weapon.timer = l.duration;
            weapon.armour = l.structure;
            if l.seeker.is_some() {
                weapon.status = SeekerState::Locking;
                weapon.lockon = l.lockon * shooter.stats.launch_calibration;
            }
        }
        OutfitKind::Beam(b) => {
            let dir = fire_direction(shooter, outfit, target, 0.0);
            let dir = if outfit.swivel > 0.0 {
                aim::clamp_swivel(shooter.solid.dir, dir, outfit.swivel)
            } else {
                dir
            };
            weapon.solid.dir = dir;
            weapon.solid.vel = DVec2::ZERO;
            weapon.timer = b.duration;
            weapon.beam_min_timer = b.min_duration;
            weapon.beam = true;
        }
    }

    // Commit the slot costs only once the weapon exists.
    let slot = &mut shooter.slots[slot_idx];
    slot.timer = outfit.delay;
    if outfit.ammo > 0 {
        slot.ammo -= 1;
    }
    slot.heat = (slot.heat + outfit.heat * HEAT_PER_SHOT).min(1.0);
    shooter.energy -= energy_cost;

    Some(weapon)
}

/// Owns every live weapon. Same discipline as the pilot registry: sorted
/// monotonic ids, mark then purge.
#[derive(Debug, Default)]
pub struct WeaponRegistry {
    weapons: Vec<Weapon>,
    next_id: WeaponId,
}

impl WeaponRegistry {
    pub fn new() -> Self {
        Self {
            weapons: Vec::new(),
            next_id: 1,
        }
    }

    pub fn insert(&mut self, mut weapon: Weapon) -> WeaponId {
        weapon.id = self.next_id;
        self.next_id += 1;
        let id = weapon.id;
        self.weapons.push(weapon);
        id
    }

    fn index_of(&self, id: WeaponId) -> Option<usize> {
        if id == 0 {
            return None;
        }
        self.weapons.binary_search_by_key(&id, |w| w.id).ok()
    }

    pub fn get(&self, id: WeaponId) -> Option<&Weapon> {
        self.index_of(id).map(|i| &self.weapons[i])
    }

    pub fn get_mut(&mut self, id: WeaponId) -> Option<&mut Weapon> {
        self.index_of(id).map(move |i| &mut self.weapons[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Weapon> {
        self.weapons.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Weapon> {
        self.weapons.iter_mut()
    }

    pub fn ids(&self) -> Vec<WeaponId> {
        self.weapons.iter().map(|w| w.id).collect()
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }

    /// Remove everything marked destroyed and hand the corpses back for
    /// lock-on bookkeeping and miss hooks.
    pub fn purge(&mut self) -> Vec<Weapon> {
        if !self.weapons.iter().any(|w| w.destroyed) {
            return Vec::new();
        }
        let mut removed = Vec::new();
        self.weapons.retain(|w| {
            if w.destroyed {
                removed.push(w.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}

/// Advance every live weapon: seeker AI, motion, lifetime, beam re-pinning.
/// Collision runs separately after all motion is integrated.
pub fn update_weapons(
    weapons: &mut WeaponRegistry,
    pilots: &mut PilotRegistry,
    outfits: &[Outfit],
    dt: f64,
    rng: &mut impl Rng,
) {
    for w in weapons.iter_mut() {
        if w.destroyed {
            continue;
        }
        let outfit = match outfits.get(w.outfit) {
            Some(o) => o,
            None => {
                w.destroyed = true;
                continue;
            }
        };

        if w.beam {
            update_beam(w, outfit, pilots, dt);
            continue;
        }

        w.timer -= dt;
        if w.timer <= 0.0 {
            w.destroyed = true;
            w.missed = true;
            continue;
        }

        if let OutfitKind::Launcher(l) = outfit.kind {
            if let Some(s) = l.seeker {
                let target = match w.target {
                    WeaponTarget::Pilot(id) => pilots.get(id).and_then(|p| {
                        if p.can_target() && !p.flags.stealth {
                            Some(seeker::SeekerTarget {
                                pos: p.solid.pos,
                                vel: p.solid.vel,
                                signature: p.ew.signature,
                                jam: p.stats.ew_jam,
                            })
                        } else {
                            None
                        }
                    }),
                    _ => None,
                };
                seeker::think(w, &l, &s, target, dt, rng);
                if w.destroyed {
                    continue;
                }
            } else {
                // Unguided rocket: just keep accelerating straight.
                w.solid.accel = l.accel;
                w.solid.speed_max = l.speed_max;
            }
        }

        w.solid.update(dt);
    }
}

/// Beams are pinned to their mount and expire on duration, owner loss,
/// energy starvation, or (grace permitting) the target leaving range.
fn update_beam(w: &mut Weapon, outfit: &Outfit, pilots: &mut PilotRegistry, dt: f64) {
    let (owner_pos, owner_dir, owner_alive) = match pilots.get(w.owner) {
        Some(p) if !p.flags.dying => (p.solid.pos, p.solid.dir, true),
        _ => (DVec2::ZERO, 0.0, false),
    };
    if !owner_alive {
        w.destroyed = true;
        return;
    }

    w.timer -= dt;
    w.beam_min_timer -= dt;
    w.beam_pulse -= dt;
    if w.timer <= 0.0 {
        w.destroyed = true;
        return;
    }

    // Continuous energy drain.
    if let Some(p) = pilots.get_mut(w.owner) {
        p.energy -= outfit.energy * dt;
        if p.energy < 0.0 {
            p.energy = 0.0;
            w.destroyed = true;
            return;
        }
    }

    // Re-pin to the mount and re-aim.
    w.solid.pre_pos = w.solid.pos;
    w.solid.pos = owner_pos;
    let target = match w.target {
        WeaponTarget::Pilot(id) => pilots.get(id).filter(|p| p.can_target()),
        _ => None,
    };
    match target {
        Some(t) => {
            let desired = vec_angle(t.solid.pos - owner_pos);
            w.solid.dir = if outfit.turret {
                aim::clamp_swivel(owner_dir, desired, outfit.swivel.max(std::f64::consts::PI))
            } else {
                aim::clamp_swivel(owner_dir, desired, outfit.swivel)
            };
            // Target out of range ends the beam, unless the minimum-duration
            // grace window vetoes the shutoff.
            if owner_pos.distance(t.solid.pos) > outfit.range && w.beam_min_timer <= 0.0 {
                w.destroyed = true;
            }
        }
        None => {
            w.solid.dir = owner_dir;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use kessler_core::damage::Damage;
    use kessler_core::outfit::{BeamSpec, BoltSpec, LauncherSpec, OutfitHooks, SeekerSpec};
    use rand::SeedableRng;

    pub fn bolt_outfit(range: f64, speed: f64, falloff: f64) -> Outfit {
        Outfit {
            name: "test cannon".into(),
            kind: OutfitKind::Bolt(BoltSpec {
                speed,
                dispersion: 0.0,
            }),
            damage: Damage {
                kind: 0,
                damage: 10.0,
                disable: 0.0,
                penetration: 0.0,
            },
            range,
            falloff,
            delay: 0.5,
            energy: 5.0,
            ammo: 0,
            trackmin: 0.0,
            trackmax: 0.0,
            swivel: 0.0,
            turret: true,
            radius: 5.0,
            mass: 2.0,
            heat: 0.1,
            point_defense: false,
            hit_ships: true,
            blast_radius: 0.0,
            hooks: OutfitHooks::default(),
        }
    }

    pub fn launcher_outfit(smart: bool) -> Outfit {
        Outfit {
            name: "test launcher".into(),
            kind: OutfitKind::Launcher(LauncherSpec {
                speed: 50.0,
                speed_max: 400.0,
                accel: 300.0,
                turn: 3.0,
                duration: 20.0,
                lockon: 2.0,
                structure: 10.0,
                seeker: Some(SeekerSpec {
                    smart,
                    resist: 0.2,
                    tracking: 10.0,
                }),
            }),
            damage: Damage {
                kind: 0,
                damage: 40.0,
                disable: 0.0,
                penetration: 0.2,
            },
            range: 4000.0,
            falloff: 0.0,
            delay: 2.0,
            energy: 0.0,
            ammo: 10,
            trackmin: 0.0,
            trackmax: 0.0,
            swivel: 0.0,
            turret: false,
            radius: 6.0,
            mass: 8.0,
            heat: 0.0,
            point_defense: false,
            hit_ships: true,
            blast_radius: 0.0,
            hooks: OutfitHooks::default(),
        }
    }

    pub fn beam_outfit() -> Outfit {
        Outfit {
            name: "test beam".into(),
            kind: OutfitKind::Beam(BeamSpec {
                duration: 5.0,
                min_duration: 1.0,
                fire_rate: 1.0,
            }),
            damage: Damage {
                kind: 0,
                damage: 30.0, // per second
                disable: 0.0,
                penetration: 0.1,
            },
            range: 800.0,
            falloff: 0.0,
            delay: 6.0,
            energy: 4.0, // per second
            ammo: 0,
            trackmin: 0.0,
            trackmax: 0.0,
            swivel: 0.5,
            turret: false,
            radius: 4.0,
            mass: 0.0,
            heat: 0.0,
            point_defense: false,
            hit_ships: true,
            blast_radius: 0.0,
            hooks: OutfitHooks::default(),
        }
    }

    /// Bare launcher weapon for seeker unit tests, flying +x from origin.
    pub fn spawn_test_launcher(outfit: &Outfit, lockon: f64) -> Weapon {
        let l = match outfit.kind {
            OutfitKind::Launcher(l) => l,
            _ => panic!("not a launcher"),
        };
        Weapon {
            id: 1,
            outfit: 0,
            owner: 1,
            owner_is_player: false,
            faction: 1,
            target: WeaponTarget::None,
            solid: Solid::projectile(DVec2::ZERO, DVec2::new(l.speed, 0.0), 0.0, outfit.mass),
            timer: l.duration,
            falloff_start: 0.0,
            armour: l.structure,
            status: SeekerState::Locking,
            lockon,
            jam_speed_cap: -1.0,
            mount_slot: 0,
            beam_min_timer: 0.0,
            beam_pulse: 0.0,
            beam: false,
            destroyed: false,
            missed: false,
        }
    }

    fn shooter_with(outfits: &[Outfit]) -> Pilot {
        let mut p = Pilot::new("gunner", 1, DVec2::ZERO, DVec2::ZERO, 0.0, 100.0, 20.0);
        p.id = 1;
        for (i, o) in outfits.iter().enumerate() {
            p.slots.push(crate::pilot::OutfitSlot::new(i, o.ammo));
        }
        p
    }

    #[test]
    fn test_bolt_falloff_ramp() {
        let outfits = [bolt_outfit(1000.0, 500.0, 250.0)];
        let mut shooter = shooter_with(&outfits);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let mut w = fire_weapon(
            &mut shooter,
            0,
            None,
            WeaponTarget::None,
            &outfits,
            &mut rng,
        )
        .unwrap();
        assert!((w.timer - 2.0).abs() < 1e-12);
        assert_eq!(w.strength(), 1.0);
        w.timer = 0.6;
        assert_eq!(w.strength(), 1.0);
        w.timer = 0.25;
        assert!((w.strength() - 0.5).abs() < 1e-12);
        w.timer = 0.0;
        assert_eq!(w.strength(), 0.0);
    }

    #[test]
    fn test_fire_consumes_slot_resources() {
        let outfits = [bolt_outfit(1000.0, 500.0, 0.0)];
        let mut shooter = shooter_with(&outfits);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let energy = shooter.energy;
        assert!(fire_weapon(&mut shooter, 0, None, WeaponTarget::None, &outfits, &mut rng).is_some());
        assert_eq!(shooter.energy, energy - 5.0);
        assert!(shooter.slots[0].timer > 0.0);
        assert!(shooter.slots[0].heat > 0.0);
        // Refire blocked until the delay elapses.
        assert!(fire_weapon(&mut shooter, 0, None, WeaponTarget::None, &outfits, &mut rng).is_none());
    }

    #[test]
    fn test_launcher_ammo_depletes() {
        let outfits = [launcher_outfit(false)];
        let mut shooter = shooter_with(&outfits);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        for _ in 0..10 {
            shooter.slots[0].timer = 0.0;
            assert!(fire_weapon(&mut shooter, 0, None, WeaponTarget::None, &outfits, &mut rng)
                .is_some());
        }
        shooter.slots[0].timer = 0.0;
        assert!(
            fire_weapon(&mut shooter, 0, None, WeaponTarget::None, &outfits, &mut rng).is_none()
        );
        assert_eq!(shooter.slots[0].ammo, 0);
    }

    #[test]
    fn test_weapon_expires_and_purges() {
        let outfits = [bolt_outfit(1000.0, 500.0, 0.0)];
        let mut shooter = shooter_with(&outfits);
        let mut pilots = PilotRegistry::new();
        pilots.spawn(shooter.clone());
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let w = fire_weapon(&mut shooter, 0, None, WeaponTarget::None, &outfits, &mut rng).unwrap();
        let mut reg = WeaponRegistry::new();
        let id = reg.insert(w);
        for _ in 0..30 {
            update_weapons(&mut reg, &mut pilots, &outfits, 0.1, &mut rng);
        }
        assert!(reg.get(id).unwrap().destroyed);
        let removed = reg.purge();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].missed);
        assert!(reg.get(id).is_none());
    }

    #[test]
    fn test_beam_repins_to_moving_owner() {
        let outfits = [beam_outfit()];
        let mut pilots = PilotRegistry::new();
        let mut shooter = shooter_with(&outfits);
        shooter.solid.vel = DVec2::new(100.0, 0.0);
        let owner = pilots.spawn(shooter);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let mut reg = WeaponRegistry::new();
        let w = {
            let p = pilots.get_mut(owner).unwrap();
            fire_weapon(p, 0, None, WeaponTarget::None, &outfits, &mut rng).unwrap()
        };
        let id = reg.insert(w);
        for _ in 0..5 {
            pilots.get_mut(owner).unwrap().solid.update(0.1);
            update_weapons(&mut reg, &mut pilots, &outfits, 0.1, &mut rng);
        }
        let beam = reg.get(id).unwrap();
        assert!(!beam.destroyed);
        assert_eq!(beam.solid.pos, pilots.get(owner).unwrap().solid.pos);
    }

    #[test]
    fn test_beam_dies_with_owner() {
        let outfits = [beam_outfit()];
        let mut pilots = PilotRegistry::new();
        let owner = pilots.spawn(shooter_with(&outfits));
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let mut reg = WeaponRegistry::new();
        let w = {
            let p = pilots.get_mut(owner).unwrap();
            fire_weapon(p, 0, None, WeaponTarget::None, &outfits, &mut rng).unwrap()
        };
        let id = reg.insert(w);
        pilots.get_mut(owner).unwrap().flags.delete = true;
        pilots.purge();
        update_weapons(&mut reg, &mut pilots, &outfits, 0.1, &mut rng);
        assert!(reg.get(id).unwrap().destroyed);
    }
}
