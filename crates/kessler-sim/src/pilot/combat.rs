//! Damage resolution and the disable, death and boarding state machines.
//!
//! Everything here is re-entrancy-aware: sink callbacks receive the pilot
//! mutably and may heal or otherwise alter it, so state is re-checked after
//! every callback instead of assumed.

use kessler_core::constants::{
    BOARDING_LOOT_FRACTION, BOARDING_TIME, DEATH_EXPLOSION_THRESHOLD, DEATH_PUFF_MAX_INTERVAL,
    DEATH_PUFF_MIN_INTERVAL, DEATH_SOUND_THRESHOLD, DEATH_TIMER_MAX, DEATH_TIMER_MIN,
    DISABLE_TIME_FACTOR, KNOCKBACK_DIV, MAX_HYPERSPACE_VEL, PILOT_SIZE_APPROX,
};
use kessler_core::damage::{Damage, DamageTypeTable};
use kessler_core::error::SimError;
use kessler_core::events::CombatEvent;
use kessler_core::outfit::Outfit;
use kessler_core::types::PilotId;
use rand::Rng;

use crate::events::CombatEventSink;
use crate::physics::Solid;
use crate::pilot::Pilot;

/// Resolve a hit on `pilot`. Returns the damage actually dealt (shield plus
/// armour), which feeds knockback and the impact callback.
///
/// `impact` is the solid of whatever struck the pilot, when there is one;
/// `shooter_is_player` gates the player-specific invincibility flag.
pub fn hit(
    pilot: &mut Pilot,
    impact: Option<&Solid>,
    shooter: Option<PilotId>,
    dmg: &Damage,
    outfit: Option<&Outfit>,
    dtypes: &DamageTypeTable,
    shooter_is_player: bool,
    sink: &mut dyn CombatEventSink,
) -> f64 {
    if pilot.flags.invincible
        || pilot.flags.hidden
        || (pilot.flags.invincible_player && shooter_is_player)
    {
        return 0.0;
    }

    let absorb = 1.0 - (pilot.absorb - dmg.penetration).clamp(0.0, 1.0);
    let (shield_dmg, armour_dmg, knockback) = dtypes.resolve(absorb, dmg);

    let mut real_damage = 0.0;

    if pilot.shield > 0.0 && pilot.shield >= shield_dmg {
        // Shields take the entire blow. Disable damage leaks through,
        // biased by the mean of the pre- and post-hit shield fraction so
        // rapid small hits and slow big hits are treated alike.
        let pre = pilot.shield_fraction();
        pilot.shield -= shield_dmg;
        let post = pilot.shield_fraction();
        let mean = (pre + post) / 2.0;
        pilot.stress += dmg.disable * absorb * (1.0 - mean / 2.0);
        real_damage += shield_dmg;
    } else if pilot.shield > 0.0 {
        // Shields absorb part of the blow; the remainder reaches armour.
        let frac = pilot.shield / shield_dmg;
        let pre = pilot.shield_fraction();
        real_damage += pilot.shield;
        pilot.shield = 0.0;
        let leak = 1.0 - pre / 4.0;
        pilot.stress += dmg.disable * absorb * (leak * frac + (1.0 - frac));
        let through = armour_dmg * (1.0 - frac);
        pilot.armour -= through;
        real_damage += through;
    } else {
        pilot.armour -= armour_dmg;
        pilot.stress += dmg.disable * absorb;
        real_damage += armour_dmg;
    }

    if pilot.flags.no_death {
        pilot.armour = pilot.armour.max(1.0);
        pilot.stress = pilot.stress.max(1.0);
    } else {
        pilot.armour = pilot.armour.max(0.0);
    }
    if pilot.flags.disabled_perm {
        pilot.stress = pilot.armour;
    }
    pilot.stress = pilot.stress.clamp(0.0, pilot.armour);

    if knockback > 0.0 {
        if let Some(w) = impact {
            let pool = pilot.shield_max + pilot.armour_max;
            let dam_mod = if pool > 0.0 { real_damage / pool } else { 0.0 };
            pilot.solid.vel += knockback
                * w.vel
                * (dam_mod / KNOCKBACK_DIV + (w.mass / pilot.solid.mass) / KNOCKBACK_DIV);
        }
    }

    if let Some(o) = outfit {
        if o.hooks.on_impact {
            sink.on_hit(pilot, shooter, o, real_damage);
            pilot.stress = pilot.stress.clamp(0.0, pilot.armour.max(0.0));
        }
    }

    update_disable(pilot, shooter, sink);
    if pilot.armour <= 0.0 && !pilot.flags.dying {
        dead(pilot, shooter, sink);
    }

    real_damage
}

/// Re-evaluate the disable boundary: disabled iff `armour <= stress`.
/// Fires the disable/undisable events on the transitions only.
pub fn update_disable(pilot: &mut Pilot, attacker: Option<PilotId>, sink: &mut dyn CombatEventSink) {
    if !pilot.flags.disabled && pilot.armour > 0.0 && pilot.armour <= pilot.stress {
        pilot.flags.disabled = true;
        pilot.flags.braking = false;
        pilot.flags.stealth = false;
        pilot.flags.hyperspace_prep = false;
        pilot.disable_timer = DISABLE_TIME_FACTOR * pilot.solid.mass.cbrt();
        pilot.disable_elapsed = 0.0;
        pilot.shutdown_outfits();
        pilot.set_accel(0.0);
        pilot.set_turn(0.0);
        sink.on_disable(pilot, attacker);
        // The callback may have healed the pilot out of the disable.
        if pilot.armour > pilot.stress {
            pilot.flags.disabled = false;
        }
    } else if pilot.flags.disabled && pilot.armour > pilot.stress {
        pilot.flags.disabled = false;
        pilot.flags.disabled_perm = false;
        pilot.flags.boarding = false;
        pilot.disable_elapsed = 0.0;
        sink.event(CombatEvent::Undisable { pilot: pilot.id });
    }
}

/// Advance the wake-up accumulator of a disabled pilot.
pub fn update_disabled(pilot: &mut Pilot, dt: f64, sink: &mut dyn CombatEventSink) {
    if !pilot.flags.disabled || pilot.flags.disabled_perm {
        return;
    }
    pilot.disable_elapsed += dt;
    if pilot.disable_elapsed >= pilot.disable_timer {
        pilot.stress = 0.0;
        update_disable(pilot, None, sink);
    }
}

/// Begin the death sequence. Idempotent: a pilot already dying is left
/// alone, so timers and events fire exactly once per death.
pub fn dead(pilot: &mut Pilot, killer: Option<PilotId>, sink: &mut dyn CombatEventSink) {
    if pilot.flags.dying {
        return;
    }
    let timer = 1.0 + (10.0 * pilot.armour_max * pilot.shield_max).sqrt() / 1500.0;
    pilot.death_timer = timer.clamp(DEATH_TIMER_MIN, DEATH_TIMER_MAX);
    pilot.death_puff_timer = 0.0;
    pilot.death_sound_played = false;
    pilot.death_explosion_fired = false;
    pilot.flags.hyperspace_prep = false;
    pilot.flags.landing = false;
    pilot.flags.boarding = false;
    pilot.shutdown_outfits();

    sink.on_death(pilot, killer);
    // An on-death hook may revive the pilot; only commit if still dead.
    if pilot.armour > 0.0 {
        return;
    }
    pilot.flags.dying = true;
    pilot.killer = killer;
}

/// What a dying pilot did this tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeathTick {
    /// Cosmetic explosion puffs spawned.
    pub puffs: u32,
    pub sound: bool,
    /// The final area explosion fired; caller applies its damage.
    pub exploded: bool,
    /// Timer exhausted; the pilot has been marked for purge.
    pub erased: bool,
}

/// Advance the explosion sub-sequence of a dying pilot.
pub fn update_dying(pilot: &mut Pilot, dt: f64, rng: &mut impl Rng) -> DeathTick {
    let mut out = DeathTick::default();
    if !pilot.flags.dying {
        return out;
    }
    pilot.death_timer -= dt;

    if !pilot.death_sound_played && pilot.death_timer <= DEATH_SOUND_THRESHOLD {
        pilot.death_sound_played = true;
        out.sound = true;
    }
    if !pilot.death_explosion_fired && pilot.death_timer <= DEATH_EXPLOSION_THRESHOLD {
        pilot.death_explosion_fired = true;
        out.exploded = true;
    }

    pilot.death_puff_timer -= dt;
    while pilot.death_puff_timer <= 0.0 && pilot.death_timer > DEATH_EXPLOSION_THRESHOLD {
        out.puffs += 1;
        pilot.death_puff_timer +=
            rng.gen_range(DEATH_PUFF_MIN_INTERVAL..DEATH_PUFF_MAX_INTERVAL);
    }

    if pilot.death_timer <= 0.0 {
        pilot.flags.delete = true;
        out.erased = true;
    }
    out
}

/// Begin boarding `target`. Checked proactively; failures are reported, not
/// thrown mid-tick.
pub fn try_board(boarder: &mut Pilot, target: &Pilot) -> Result<(), SimError> {
    if boarder.flags.boarding {
        return Err(SimError::CannotBoard("already boarding"));
    }
    if target.flags.boarded {
        return Err(SimError::CannotBoard("target has already been boarded"));
    }
    if !target.flags.disabled {
        return Err(SimError::CannotBoard("target is not disabled"));
    }
    let dist = boarder.solid.pos.distance(target.solid.pos);
    if dist > target.radius * PILOT_SIZE_APPROX + boarder.radius {
        return Err(SimError::CannotBoard("too far from target"));
    }
    let rel = (boarder.solid.vel - target.solid.vel).length();
    if rel > MAX_HYPERSPACE_VEL {
        return Err(SimError::CannotBoard("relative speed too high"));
    }
    boarder.flags.boarding = true;
    boarder.board_timer = BOARDING_TIME;
    Ok(())
}

/// Advance an active boarding. On completion loots the target and fires the
/// board event. Boarding a non-player target takes everything; the player
/// only ever loses the loot fraction.
pub fn update_boarding(
    boarder: &mut Pilot,
    target: &mut Pilot,
    dt: f64,
    sink: &mut dyn CombatEventSink,
) {
    if !boarder.flags.boarding {
        return;
    }
    if !target.flags.disabled || target.flags.dying {
        boarder.flags.boarding = false;
        return;
    }
    boarder.board_timer -= dt;
    if boarder.board_timer > 0.0 {
        return;
    }
    let credits = if target.is_player {
        let loot = (target.credits as f64 * BOARDING_LOOT_FRACTION * boarder.stats.loot_mod)
            .min(target.credits as f64);
        loot as u64
    } else {
        target.credits
    };
    target.credits -= credits;
    boarder.credits += credits;
    target.flags.boarded = true;
    boarder.flags.boarding = false;
    sink.event(CombatEvent::Board {
        boarder: boarder.id,
        target: target.id,
        credits,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NullSink, RecordingSink};
    use glam::DVec2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn pilot(shield_max: f64, armour_max: f64) -> Pilot {
        let mut p = Pilot::new("t", 1, DVec2::ZERO, DVec2::ZERO, 0.0, 100.0, 20.0);
        p.id = 1;
        p.shield = shield_max;
        p.shield_max = shield_max;
        p.armour = armour_max;
        p.armour_max = armour_max;
        p
    }

    fn raw(damage: f64, disable: f64, penetration: f64) -> Damage {
        Damage {
            kind: 0,
            damage,
            disable,
            penetration,
        }
    }

    fn invariants(p: &Pilot) {
        assert!(p.stress >= 0.0, "stress {}", p.stress);
        assert!(p.stress <= p.armour.max(0.0), "stress {} armour {}", p.stress, p.armour);
        assert!(p.armour <= p.armour_max);
        assert!((0.0..=p.shield_max).contains(&p.shield));
    }

    #[test]
    fn test_disable_from_single_big_hit() {
        // Full-penetration pure-disable hit: stress clamps to armour,
        // pilot disables, exactly one disable callback.
        let mut p = pilot(0.0, 200.0);
        let table = DamageTypeTable::default();
        let mut sink = RecordingSink::default();
        hit(&mut p, None, Some(9), &raw(0.0, 250.0, 1.0), None, &table, false, &mut sink);
        assert_eq!(p.stress, p.armour);
        assert!(p.flags.disabled);
        assert_eq!(sink.disables, vec![1]);
        invariants(&p);
    }

    #[test]
    fn test_hit_invariants_under_extremes() {
        let table = DamageTypeTable::default();
        let mut sink = NullSink;
        for (d, dis, pen) in [
            (1e9, 1e9, 1.0),
            (0.0, 0.0, 0.0),
            (50.0, 500.0, 0.5),
            (1e-9, 1e9, 2.0),
        ] {
            let mut p = pilot(100.0, 200.0);
            hit(&mut p, None, None, &raw(d, dis, pen), None, &table, false, &mut sink);
            invariants(&p);
        }
    }

    #[test]
    fn test_shield_leak_uses_mean_fraction() {
        // At full shields exactly half the disable leaks through.
        let table = DamageTypeTable::default();
        let mut sink = NullSink;
        let mut p = pilot(1000.0, 200.0);
        hit(&mut p, None, None, &raw(0.0, 100.0, 1.0), None, &table, false, &mut sink);
        assert!((p.stress - 50.0).abs() < 1e-9, "stress {}", p.stress);
    }

    #[test]
    fn test_dead_is_idempotent() {
        let mut p = pilot(0.0, 100.0);
        p.armour = 0.0;
        let mut sink = RecordingSink::default();
        dead(&mut p, Some(2), &mut sink);
        let timer = p.death_timer;
        dead(&mut p, Some(3), &mut sink);
        assert_eq!(sink.deaths, vec![1]);
        assert_eq!(p.death_timer, timer);
        assert_eq!(p.killer, Some(2));
    }

    #[test]
    fn test_disable_boundary_is_exact() {
        let mut p = pilot(0.0, 100.0);
        let mut sink = NullSink;
        p.stress = 99.9;
        update_disable(&mut p, None, &mut sink);
        assert!(!p.flags.disabled);
        p.stress = 100.0;
        update_disable(&mut p, None, &mut sink);
        assert!(p.flags.disabled);
        p.stress = 99.0;
        update_disable(&mut p, None, &mut sink);
        assert!(!p.flags.disabled);
    }

    #[test]
    fn test_disabled_pilot_wakes_up() {
        let mut p = pilot(0.0, 100.0);
        let mut sink = RecordingSink::default();
        p.stress = 100.0;
        update_disable(&mut p, None, &mut sink);
        assert!(p.flags.disabled);
        let mut t = 0.0;
        while p.flags.disabled && t < 100.0 {
            update_disabled(&mut p, 0.1, &mut sink);
            t += 0.1;
        }
        assert!(!p.flags.disabled);
        assert_eq!(p.stress, 0.0);
        assert!(sink
            .events
            .contains(&CombatEvent::Undisable { pilot: 1 }));
    }

    #[test]
    fn test_no_death_floor() {
        let mut p = pilot(0.0, 100.0);
        p.flags.no_death = true;
        let table = DamageTypeTable::default();
        let mut sink = RecordingSink::default();
        hit(&mut p, None, None, &raw(1e6, 0.0, 1.0), None, &table, false, &mut sink);
        assert_eq!(p.armour, 1.0);
        assert!(!p.flags.dying);
        assert!(sink.deaths.is_empty());
    }

    #[test]
    fn test_death_sequence_erases_after_timer() {
        let mut p = pilot(0.0, 100.0);
        p.armour = 0.0;
        let mut sink = NullSink;
        dead(&mut p, None, &mut sink);
        assert!(p.flags.dying);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut exploded = 0;
        let mut sounds = 0;
        for _ in 0..1000 {
            let tick = update_dying(&mut p, 0.05, &mut rng);
            exploded += tick.exploded as u32;
            sounds += tick.sound as u32;
            if tick.erased {
                break;
            }
        }
        assert!(p.flags.delete);
        assert_eq!(exploded, 1);
        assert_eq!(sounds, 1);
    }

    #[test]
    fn test_boarding_gates() {
        let mut boarder = pilot(0.0, 100.0);
        let mut target = pilot(0.0, 100.0);
        target.id = 2;
        assert!(try_board(&mut boarder, &target).is_err()); // not disabled

        target.flags.disabled = true;
        target.solid.pos = DVec2::new(1e4, 0.0);
        assert!(try_board(&mut boarder, &target).is_err()); // too far

        target.solid.pos = DVec2::new(10.0, 0.0);
        boarder.solid.vel = DVec2::new(100.0, 0.0);
        assert!(try_board(&mut boarder, &target).is_err()); // too fast

        boarder.solid.vel = DVec2::ZERO;
        assert!(try_board(&mut boarder, &target).is_ok());
        assert!(boarder.flags.boarding);
    }

    #[test]
    fn test_boarding_loots_everything_from_npc() {
        let mut boarder = pilot(0.0, 100.0);
        let mut target = pilot(0.0, 100.0);
        target.id = 2;
        target.credits = 1000;
        target.flags.disabled = true;
        target.solid.pos = DVec2::new(10.0, 0.0);
        try_board(&mut boarder, &target).unwrap();
        let mut sink = RecordingSink::default();
        for _ in 0..40 {
            update_boarding(&mut boarder, &mut target, 0.1, &mut sink);
        }
        assert_eq!(boarder.credits, 1000);
        assert_eq!(target.credits, 0);
        assert!(target.flags.boarded);
        assert!(!boarder.flags.boarding);
        assert!(matches!(sink.events[0], CombatEvent::Board { credits: 1000, .. }));
    }
}
