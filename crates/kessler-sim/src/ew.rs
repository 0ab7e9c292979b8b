//! Electronic warfare: detection, signature, stealth, and active scanning.
//!
//! All scores derive from the ship's mass curve, its EW stats, and the
//! environment (asteroid cover, interference, jump-point proximity).
//! Stealth is a continuous tug-of-war: a break timer recovers while nobody
//! is close and decays while hostiles are, breaking stealth when it runs
//! out.

use kessler_core::constants::{
    EW_MASS_EXP, EW_MASS_SCALE, EW_SCAN_TIME_FACTOR, EW_SIGNATURE_FACTOR, EW_STEALTH_DECAY_DIV,
    EW_STEALTH_FACTOR, EW_STEALTH_MIN_RANGE, EW_STEALTH_RECOVER_NUM,
};
use kessler_core::error::SimError;
use kessler_core::events::CombatEvent;
use kessler_core::types::PilotId;

use crate::environment::{Environment, FactionTable};
use crate::events::CombatEventSink;
use crate::pilot::{Pilot, PilotRegistry};

/// Mass contribution to all sensor scores. Sub-linear so capital ships are
/// not hopelessly visible.
pub fn ew_mass(mass: f64) -> f64 {
    mass.powf(1.0 / EW_MASS_EXP) * EW_MASS_SCALE
}

/// Recompute one pilot's derived sensor fields from its stats and the
/// environment. Runs every tick before any range predicate is consulted.
pub fn update_sensors(pilot: &mut Pilot, env: &Environment) {
    let interference = env.interference_mod();
    pilot.ew.mass_curve = ew_mass(pilot.solid.mass);
    pilot.ew.asteroid_mod = env.asteroid_mod(pilot.solid.pos);
    pilot.ew.jump_mod = if pilot.flags.stealth {
        env.jump_stealth_mod(pilot.solid.pos)
    } else {
        1.0
    };

    pilot.ew.detection = pilot.ew.mass_curve * pilot.ew.asteroid_mod * pilot.stats.ew_hide;
    pilot.ew.signature =
        pilot.ew.detection * EW_SIGNATURE_FACTOR * interference * pilot.stats.ew_signature;
    pilot.ew.stealth_range = (pilot.ew.mass_curve
        * pilot.stats.ew_hide
        * EW_STEALTH_FACTOR
        * pilot.stats.ew_stealth)
        .max(EW_STEALTH_MIN_RANGE)
        * pilot.ew.asteroid_mod
        * interference
        * pilot.ew.jump_mod;
}

/// Scan duration for `observer` working on `target`. Bigger and
/// better-masked targets take longer.
pub fn scan_time(target: &Pilot) -> f64 {
    target.solid.mass.cbrt() * EW_SCAN_TIME_FACTOR
        / (target.stats.ew_hide * target.stats.ew_signature)
        * target.stats.ew_scanned_time
}

/// Advance every armed scan timer. The timer only counts down while the
/// target is a hard sensor hit, and fires its event pair exactly once; it
/// re-arms only through a new target selection.
pub fn update_scans(reg: &mut PilotRegistry, dt: f64, sink: &mut dyn CombatEventSink) {
    let ids = reg.ids();
    for id in ids {
        let (target_id, armed) = match reg.get(id) {
            Some(p) => (p.target, p.ew.scan_timer > 0.0),
            None => continue,
        };
        if !armed || target_id == 0 {
            continue;
        }
        let in_hard_range = match (reg.get(id), reg.get(target_id)) {
            (Some(obs), Some(tgt)) => {
                let d2 = obs.solid.pos.distance_squared(tgt.solid.pos);
                let hard = obs.stats.ew_detect * obs.stats.ew_track * tgt.ew.signature;
                d2 < hard * hard
            }
            _ => continue,
        };
        if !in_hard_range {
            continue;
        }
        let fired = {
            let obs = match reg.get_mut(id) {
                Some(p) => p,
                None => continue,
            };
            obs.ew.scan_timer -= dt;
            obs.ew.scan_timer <= 0.0
        };
        if fired {
            sink.event(CombatEvent::Scan {
                scanner: id,
                target: target_id,
            });
            sink.event(CombatEvent::Scanned {
                target: target_id,
                scanner: id,
            });
        }
    }
}

/// Attempt to enter stealth. Refused while any seeker is locked on or any
/// hostile-capable pilot sits inside the would-be stealth envelope.
pub fn try_stealth(
    reg: &mut PilotRegistry,
    factions: &FactionTable,
    id: PilotId,
    sink: &mut dyn CombatEventSink,
) -> Result<(), SimError> {
    let (pos, range, faction, lockons, already) = match reg.get(id) {
        Some(p) => (
            p.solid.pos,
            p.ew.stealth_range,
            p.faction,
            p.lockons,
            p.flags.stealth,
        ),
        None => return Err(SimError::UnknownPilot(id)),
    };
    if already {
        return Ok(());
    }
    if lockons > 0 {
        return Err(SimError::CannotStealth("missile lock-on active"));
    }
    for other in reg.iter() {
        if other.id == id
            || factions.are_allies(faction, other.faction)
            || other.flags.disabled
            || !other.can_target()
        {
            continue;
        }
        let r = range * other.stats.ew_detect;
        if pos.distance_squared(other.solid.pos) < r * r {
            return Err(SimError::CannotStealth("hostile too close"));
        }
    }
    let pilot = reg
        .get_mut(id)
        .ok_or(SimError::UnknownPilot(id))?;
    pilot.flags.stealth = true;
    pilot.ew.stealth_timer = 0.0;
    pilot.shutdown_outfits();
    sink.event(CombatEvent::Stealth { pilot: id });
    Ok(())
}

/// Voluntarily drop stealth.
pub fn destealth(pilot: &mut Pilot, sink: &mut dyn CombatEventSink) {
    if !pilot.flags.stealth {
        return;
    }
    pilot.flags.stealth = false;
    sink.event(CombatEvent::Uncovered {
        pilot: pilot.id,
        forced: false,
    });
}

/// Advance the stealth tug-of-war for every stealthed pilot.
pub fn update_stealth(
    reg: &mut PilotRegistry,
    factions: &FactionTable,
    dt: f64,
    sink: &mut dyn CombatEventSink,
) {
    let ids = reg.ids();
    for id in ids {
        let (pos, range, faction, timer_stat, stealthed) = match reg.get(id) {
            Some(p) => (
                p.solid.pos,
                p.ew.stealth_range,
                p.faction,
                p.stats.ew_stealth_timer,
                p.flags.stealth,
            ),
            None => continue,
        };
        if !stealthed || range <= 0.0 {
            continue;
        }

        // Pressure from every non-ally close enough to erode the cover,
        // weighted by how deep inside the envelope they are.
        let mut pressure = 0.0;
        let mut nearby = 0u32;
        for other in reg.iter() {
            if other.id == id
                || factions.are_allies(faction, other.faction)
                || other.flags.disabled
                || !other.can_target()
            {
                continue;
            }
            let r = range * other.stats.ew_detect;
            let dist = pos.distance(other.solid.pos);
            if dist < r {
                nearby += 1;
                pressure += 1.0 - dist / r;
            }
        }

        let broke = {
            let p = match reg.get_mut(id) {
                Some(p) => p,
                None => continue,
            };
            if nearby == 0 {
                p.ew.stealth_timer =
                    (p.ew.stealth_timer + dt * EW_STEALTH_RECOVER_NUM / range).min(1.0);
                false
            } else {
                p.ew.stealth_timer -=
                    dt * (range / EW_STEALTH_DECAY_DIV + pressure) * timer_stat;
                if p.ew.stealth_timer < 0.0 {
                    p.flags.stealth = false;
                    true
                } else {
                    false
                }
            }
        };
        if broke {
            sink.event(CombatEvent::Uncovered {
                pilot: id,
                forced: true,
            });
        }
    }
}
