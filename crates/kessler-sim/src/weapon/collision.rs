//! Weapon hit-testing and damage application.
//!
//! Runs after all motion is integrated. Phase one walks the live weapons
//! read-only and collects pending impacts (broad phase through the spatial
//! indexes, narrow phase on swept segments); phase two applies them,
//! mutating pilots, asteroids and weapons. Nothing is removed mid-pass;
//! casualties are marked and purged at end of tick.

use glam::DVec2;
use kessler_core::constants::BEAM_HIT_PULSE;
use kessler_core::damage::{Damage, DamageTypeTable};
use kessler_core::enums::{SeekerState, WeaponTarget};
use kessler_core::outfit::{Outfit, OutfitKind};
use kessler_core::types::{unit, Aabb, FactionId, PilotId, WeaponId};

use crate::environment::{Environment, FactionTable};
use crate::events::CombatEventSink;
use crate::pilot::{combat, Pilot, PilotRegistry};
use crate::spatial::QuadTree;
use crate::weapon::{Weapon, WeaponRegistry};

/// Earliest parameter t in [0, 1] at which the segment `a`->`b` touches the
/// circle at `c` with radius `r`, if any.
pub fn collide_segment_circle(a: DVec2, b: DVec2, c: DVec2, r: f64) -> Option<f64> {
    let d = b - a;
    let f = a - c;
    let qa = d.length_squared();
    if qa < 1e-12 {
        return if f.length_squared() <= r * r {
            Some(0.0)
        } else {
            None
        };
    }
    let qb = 2.0 * f.dot(d);
    let qc = f.length_squared() - r * r;
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let t1 = (-qb - sq) / (2.0 * qa);
    let t2 = (-qb + sq) / (2.0 * qa);
    if t1 >= 0.0 && t1 <= 1.0 {
        Some(t1)
    } else if t2 >= 0.0 && t2 <= 1.0 {
        // Started inside the circle.
        Some(0.0)
    } else {
        None
    }
}

fn point_in_convex(p: DVec2, poly: &[DVec2]) -> bool {
    let n = poly.len();
    for i in 0..n {
        let e = poly[(i + 1) % n] - poly[i];
        if e.perp_dot(p - poly[i]) < 0.0 {
            return false;
        }
    }
    true
}

/// Earliest t in [0, 1] at which the segment `a`->`b` enters the convex
/// polygon `poly` (counter-clockwise, world space).
pub fn collide_segment_polygon(a: DVec2, b: DVec2, poly: &[DVec2]) -> Option<f64> {
    if poly.len() < 3 {
        return None;
    }
    if point_in_convex(a, poly) {
        return Some(0.0);
    }
    let d = b - a;
    let mut best: Option<f64> = None;
    let n = poly.len();
    for i in 0..n {
        let p = poly[i];
        let e = poly[(i + 1) % n] - p;
        let denom = d.perp_dot(e);
        if denom.abs() < 1e-12 {
            continue;
        }
        let ap = p - a;
        let t = ap.perp_dot(e) / denom;
        let u = ap.perp_dot(d) / denom;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            best = Some(best.map_or(t, |b: f64| b.min(t)));
        }
    }
    best
}

/// Narrow-phase test of a swept weapon against a pilot: convex hull when
/// the pilot has one, bounding circle otherwise.
fn pilot_hit_t(pre: DVec2, pos: DVec2, w_radius: f64, pilot: &Pilot) -> Option<f64> {
    match &pilot.collision_poly {
        Some(poly) => {
            let rot = DVec2::from_angle(pilot.solid.dir);
            let world: Vec<DVec2> = poly
                .iter()
                .map(|v| pilot.solid.pos + rot.rotate(*v))
                .collect();
            collide_segment_polygon(pre, pos, &world)
        }
        None => collide_segment_circle(pre, pos, pilot.solid.pos, pilot.radius + w_radius),
    }
}

/// Faction and state rules deciding whether a weapon may damage a pilot.
///
/// Same faction is never hit unless explicitly targeted; player weapons hit
/// only the player's hostiles; everyone else hits faction enemies.
pub fn check_can_hit(
    owner: PilotId,
    owner_is_player: bool,
    faction: FactionId,
    explicit_target: Option<PilotId>,
    pilot: &Pilot,
    factions: &FactionTable,
) -> bool {
    if pilot.id == owner {
        return false;
    }
    if pilot.flags.invincible
        || pilot.flags.hidden
        || pilot.flags.invisible
        || pilot.flags.landing
        || pilot.flags.taking_off
        || pilot.flags.dying
    {
        return false;
    }
    if pilot.flags.invincible_player && owner_is_player {
        return false;
    }
    if explicit_target == Some(pilot.id) {
        return true;
    }
    if pilot.faction == faction {
        return false;
    }
    factions.are_enemies(faction, pilot.faction)
}

#[derive(Debug)]
enum HitTarget {
    Pilot(PilotId),
    Asteroid(usize, usize),
    Munition(WeaponId),
}

#[derive(Debug)]
struct Pending {
    weapon: WeaponId,
    target: HitTarget,
    pos: DVec2,
}

fn explicit_pilot_target(w: &Weapon) -> Option<PilotId> {
    match w.target {
        WeaponTarget::Pilot(id) => Some(id),
        _ => None,
    }
}

/// A homing seeker that still has its lock must only hit its designated
/// target; jammed ones hit whatever they blunder into.
fn seeker_locked(w: &Weapon, outfit: &Outfit) -> bool {
    matches!(outfit.kind, OutfitKind::Launcher(l) if matches!(l.seeker, Some(s) if s.smart))
        && matches!(
            w.status,
            SeekerState::Locking | SeekerState::Ok | SeekerState::Unjammed
        )
}

/// Run the full collision pipeline for one tick.
#[allow(clippy::too_many_arguments)]
pub fn update_collisions(
    weapons: &mut WeaponRegistry,
    pilots: &mut PilotRegistry,
    env: &mut Environment,
    pilot_index: &QuadTree,
    weapon_index: &QuadTree,
    outfits: &[Outfit],
    dtypes: &DamageTypeTable,
    factions: &FactionTable,
    dt: f64,
    sink: &mut dyn CombatEventSink,
) {
    let mut pending: Vec<Pending> = Vec::new();
    let mut candidates: Vec<u64> = Vec::new();

    for w in weapons.iter() {
        if w.destroyed {
            continue;
        }
        let outfit = match outfits.get(w.outfit) {
            Some(o) => o,
            None => continue,
        };

        let (seg_a, seg_b) = if w.beam {
            (w.solid.pos, w.solid.pos + outfit.range * unit(w.solid.dir))
        } else {
            (w.solid.pre_pos, w.solid.pos)
        };
        let sweep = Aabb::from_segment(seg_a, seg_b, outfit.radius);

        // Pilot pass.
        if outfit.hit_ships {
            pilot_index.query(&sweep, &mut candidates);
            let mut best: Option<(f64, PilotId)> = None;
            for &cid in &candidates {
                let p = match pilots.get(cid) {
                    Some(p) => p,
                    None => continue,
                };
                if seeker_locked(w, outfit) && explicit_pilot_target(w) != Some(p.id) {
                    continue;
                }
                if !check_can_hit(
                    w.owner,
                    w.owner_is_player,
                    w.faction,
                    explicit_pilot_target(w),
                    p,
                    factions,
                ) {
                    continue;
                }
                if let Some(t) = pilot_hit_t(seg_a, seg_b, outfit.radius, p) {
                    if best.map_or(true, |(bt, _)| t < bt) {
                        best = Some((t, p.id));
                    }
                }
            }
            if let Some((t, pid)) = best {
                pending.push(Pending {
                    weapon: w.id,
                    target: HitTarget::Pilot(pid),
                    pos: seg_a + (seg_b - seg_a) * t,
                });
                if !w.beam {
                    continue; // discrete projectiles stop at first impact
                }
            }
        }

        // Asteroid pass.
        let mut hit_rock = false;
        for (fi, field) in env.asteroid_fields.iter().enumerate() {
            let field_box = Aabb::around(field.pos, field.radius);
            if !sweep.intersects(&field_box) {
                continue;
            }
            for (ai, a) in field.asteroids.iter().enumerate() {
                if !a.alive {
                    continue;
                }
                if collide_segment_circle(seg_a, seg_b, a.pos, a.radius + outfit.radius)
                    .is_some()
                {
                    pending.push(Pending {
                        weapon: w.id,
                        target: HitTarget::Asteroid(fi, ai),
                        pos: a.pos,
                    });
                    hit_rock = true;
                    break;
                }
            }
            if hit_rock {
                break;
            }
        }
        if hit_rock && !w.beam {
            continue;
        }

        // Point-defense pass against hittable munitions.
        if outfit.point_defense {
            weapon_index.query(&sweep, &mut candidates);
            for &cid in &candidates {
                let other = match weapons.get(cid) {
                    Some(o) => o,
                    None => continue,
                };
                if other.id == w.id
                    || other.destroyed
                    || !other.hittable()
                    || other.faction == w.faction
                {
                    continue;
                }
                let other_radius = outfits.get(other.outfit).map_or(0.0, |o| o.radius);
                if let Some(t) = collide_segment_circle(
                    seg_a,
                    seg_b,
                    other.solid.pos,
                    other_radius + outfit.radius,
                ) {
                    pending.push(Pending {
                        weapon: w.id,
                        target: HitTarget::Munition(other.id),
                        pos: seg_a + (seg_b - seg_a) * t,
                    });
                    break;
                }
            }
        }
    }

    // Apply phase.
    for hit in pending {
        let (impact, dmg, owner, is_player, faction, explicit, blast, outfit_id) = {
            let w = match weapons.get(hit.weapon) {
                Some(w) if !w.destroyed || w.beam => w,
                _ => continue,
            };
            let outfit = match outfits.get(w.outfit) {
                Some(o) => o,
                None => continue,
            };
            let scale = if w.beam {
                // Beams deal damage continuously, scaled by contact time.
                dt * match outfit.kind {
                    OutfitKind::Beam(b) => b.fire_rate,
                    _ => 1.0,
                }
            } else {
                w.strength()
            };
            let dmg = Damage {
                kind: outfit.damage.kind,
                damage: outfit.damage.damage * scale,
                disable: outfit.damage.disable * scale,
                penetration: outfit.damage.penetration,
            };
            (
                w.solid,
                dmg,
                w.owner,
                w.owner_is_player,
                w.faction,
                explicit_pilot_target(w),
                outfit.blast_radius,
                w.outfit,
            )
        };

        match hit.target {
            HitTarget::Pilot(pid) => {
                if blast > 0.0 {
                    explode(
                        pilots, weapons, env, factions, dtypes, hit.pos, blast, &dmg, owner,
                        is_player, faction, explicit, sink,
                    );
                } else if let Some(p) = pilots.get_mut(pid) {
                    combat::hit(
                        p,
                        Some(&impact),
                        Some(owner),
                        &dmg,
                        outfits.get(outfit_id),
                        dtypes,
                        is_player,
                        sink,
                    );
                }
            }
            HitTarget::Asteroid(fi, ai) => {
                if blast > 0.0 {
                    explode(
                        pilots, weapons, env, factions, dtypes, hit.pos, blast, &dmg, owner,
                        is_player, faction, explicit, sink,
                    );
                } else if let Some(a) = env
                    .asteroid_fields
                    .get_mut(fi)
                    .and_then(|f| f.asteroids.get_mut(ai))
                {
                    a.armour -= dmg.damage;
                    if a.armour <= 0.0 {
                        a.alive = false;
                    }
                }
            }
            HitTarget::Munition(wid) => {
                if let Some(other) = weapons.get_mut(wid) {
                    other.armour -= dmg.damage;
                    if other.armour <= 0.0 {
                        other.destroyed = true;
                    }
                }
            }
        }

        if let Some(w) = weapons.get_mut(hit.weapon) {
            if w.beam {
                if w.beam_pulse <= 0.0 {
                    w.beam_pulse = BEAM_HIT_PULSE;
                }
            } else {
                w.destroyed = true;
            }
        }
    }
}

/// Area damage at `pos`: every qualifying pilot, asteroid and hittable
/// munition inside `radius` takes the damage scaled by a linear distance
/// falloff.
#[allow(clippy::too_many_arguments)]
pub fn explode(
    pilots: &mut PilotRegistry,
    weapons: &mut WeaponRegistry,
    env: &mut Environment,
    factions: &FactionTable,
    dtypes: &DamageTypeTable,
    pos: DVec2,
    radius: f64,
    dmg: &Damage,
    owner: PilotId,
    owner_is_player: bool,
    faction: FactionId,
    explicit_target: Option<PilotId>,
    sink: &mut dyn CombatEventSink,
) {
    let ids = pilots.ids();
    for id in ids {
        let (qualifies, factor) = match pilots.get(id) {
            Some(p) => {
                let d = p.solid.pos.distance(pos);
                if d > radius + p.radius {
                    (false, 0.0)
                } else {
                    (
                        check_can_hit(owner, owner_is_player, faction, explicit_target, p, factions),
                        1.0 - (d / (radius + p.radius)).min(1.0),
                    )
                }
            }
            None => (false, 0.0),
        };
        if !qualifies || factor <= 0.0 {
            continue;
        }
        let scaled = Damage {
            kind: dmg.kind,
            damage: dmg.damage * factor,
            disable: dmg.disable * factor,
            penetration: dmg.penetration,
        };
        if let Some(p) = pilots.get_mut(id) {
            combat::hit(p, None, Some(owner), &scaled, None, dtypes, owner_is_player, sink);
        }
    }

    for field in &mut env.asteroid_fields {
        for a in &mut field.asteroids {
            if !a.alive {
                continue;
            }
            let d = a.pos.distance(pos);
            if d > radius + a.radius {
                continue;
            }
            a.armour -= dmg.damage * (1.0 - d / (radius + a.radius));
            if a.armour <= 0.0 {
                a.alive = false;
            }
        }
    }

    for w in weapons.iter_mut() {
        if w.destroyed || !w.hittable() || w.faction == faction {
            continue;
        }
        let d = w.solid.pos.distance(pos);
        if d > radius {
            continue;
        }
        w.armour -= dmg.damage * (1.0 - d / radius);
        if w.armour <= 0.0 {
            w.destroyed = true;
        }
    }
}
