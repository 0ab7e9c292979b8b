//! Guided-munition micro-AI: lock-on, jamming, and the homing turn laws.
//!
//! Runs once per tick per guided weapon, before integration. It only steers
//! the weapon's solid (turn rate, acceleration, speed cap); the integrator
//! does the actual motion.

use glam::DVec2;
use kessler_core::constants::{
    JAM_BAND_FLY_STRAIGHT, JAM_BAND_HARD_TURN, JAM_BAND_SELF_DESTRUCT, JAM_SLOW_MIN_FRACTION,
    SEEKER_LOS_RATE_EPS, SEEKER_SIMPLE_GAIN,
};
use kessler_core::enums::SeekerState;
use kessler_core::outfit::{LauncherSpec, SeekerSpec};
use kessler_core::types::{angle_diff, vec_angle};
use rand::Rng;
use std::f64::consts::FRAC_PI_2;

use crate::weapon::Weapon;

/// What the seeker needs to know about its designated target this tick.
#[derive(Debug, Clone, Copy)]
pub struct SeekerTarget {
    pub pos: DVec2,
    pub vel: DVec2,
    pub signature: f64,
    /// The target's jamming strength.
    pub jam: f64,
}

/// Advance the seeker state machine and steer the weapon. The weapon may
/// mark itself destroyed (jam self-destruct outcome).
pub fn think(
    weapon: &mut Weapon,
    launcher: &LauncherSpec,
    seeker: &SeekerSpec,
    target: Option<SeekerTarget>,
    dt: f64,
    rng: &mut impl Rng,
) {
    // Accelerate toward the (possibly jam-reduced) top speed every tick.
    weapon.solid.accel = launcher.accel;
    weapon.solid.speed_max = if weapon.status == SeekerState::JammedSlowed {
        weapon.jam_speed_cap
    } else {
        launcher.speed_max
    };

    match weapon.status {
        SeekerState::Locking => {
            weapon.solid.dir_vel = 0.0;
            weapon.lockon -= dt;
            if weapon.lockon <= 0.0 {
                weapon.status = SeekerState::Ok;
            }
        }
        SeekerState::Ok => {
            // One jam opportunity: the first tick the target sits inside the
            // seeker's tracking radius decides jammed vs unjammed for good.
            if let Some(t) = target {
                let jam = (t.jam - seeker.resist).max(0.0);
                let track_range = seeker.tracking * t.signature;
                let dist2 = weapon.solid.pos.distance_squared(t.pos);
                if jam > 0.0 && dist2 < track_range * track_range {
                    if rng.gen_range(0.0..1.0) < jam {
                        jam_outcome(weapon, launcher, rng);
                    } else {
                        weapon.status = SeekerState::Unjammed;
                    }
                }
            }
            if weapon.status == SeekerState::Ok || weapon.status == SeekerState::Unjammed {
                home(weapon, launcher, seeker, target);
            }
        }
        SeekerState::Unjammed | SeekerState::JammedSlowed => {
            home(weapon, launcher, seeker, target);
        }
        // Flying blind: keep whatever turn the jam imposed.
        SeekerState::Jammed => {}
    }
}

fn jam_outcome(weapon: &mut Weapon, launcher: &LauncherSpec, rng: &mut impl Rng) {
    let roll: f64 = rng.gen_range(0.0..1.0);
    if roll < JAM_BAND_SELF_DESTRUCT {
        weapon.destroyed = true;
    } else if roll < JAM_BAND_HARD_TURN {
        weapon.status = SeekerState::Jammed;
        let sign = if rng.gen_range(0.0..1.0) < 0.5 { -1.0 } else { 1.0 };
        weapon.solid.dir_vel = sign * launcher.turn;
    } else if roll < JAM_BAND_FLY_STRAIGHT {
        weapon.status = SeekerState::Jammed;
        weapon.solid.dir_vel = 0.0;
    } else {
        weapon.status = SeekerState::JammedSlowed;
        weapon.jam_speed_cap =
            launcher.speed_max * rng.gen_range(JAM_SLOW_MIN_FRACTION..1.0);
    }
}

/// Steer toward the target. Smart seekers use a bang-bang lead law on the
/// line-of-sight rate; simple ones a proportional turn on the bearing error.
fn home(
    weapon: &mut Weapon,
    launcher: &LauncherSpec,
    seeker: &SeekerSpec,
    target: Option<SeekerTarget>,
) {
    let t = match target {
        Some(t) => t,
        None => {
            weapon.solid.dir_vel = 0.0;
            return;
        }
    };
    let rel_pos = t.pos - weapon.solid.pos;
    if rel_pos.length_squared() < 1e-9 {
        weapon.solid.dir_vel = 0.0;
        return;
    }
    let bearing = vec_angle(rel_pos);
    let diff = angle_diff(weapon.solid.dir, bearing);

    if seeker.smart {
        if diff.abs() > FRAC_PI_2 {
            // Target behind: committed U-turn at full rate.
            weapon.solid.dir_vel = launcher.turn * diff.signum();
            return;
        }
        let rel_vel = t.vel - weapon.solid.vel;
        let los_rate = rel_pos.perp_dot(rel_vel) / rel_pos.length_squared();
        if los_rate.abs() < SEEKER_LOS_RATE_EPS {
            // Line of sight is steady: hold the pursuit course.
            weapon.solid.dir_vel = 0.0;
        } else {
            weapon.solid.dir_vel = launcher.turn * los_rate.signum();
        }
    } else {
        weapon.solid.dir_vel =
            (SEEKER_SIMPLE_GAIN * diff).clamp(-launcher.turn, launcher.turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weapon::tests::{launcher_outfit, spawn_test_launcher};
    use kessler_core::outfit::OutfitKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn specs(outfit: &kessler_core::outfit::Outfit) -> (LauncherSpec, SeekerSpec) {
        match outfit.kind {
            OutfitKind::Launcher(l) => (l, l.seeker.unwrap()),
            _ => panic!("not a launcher"),
        }
    }

    fn fly(
        weapon: &mut Weapon,
        launcher: &LauncherSpec,
        seeker: &SeekerSpec,
        target: SeekerTarget,
        rng: &mut ChaCha8Rng,
        ticks: usize,
    ) -> f64 {
        let mut min_dist = f64::MAX;
        for _ in 0..ticks {
            think(weapon, launcher, seeker, Some(target), 0.05, rng);
            if weapon.destroyed {
                break;
            }
            weapon.solid.update(0.05);
            min_dist = min_dist.min(weapon.solid.pos.distance(target.pos));
        }
        min_dist
    }

    fn dummy_target(x: f64, y: f64) -> SeekerTarget {
        SeekerTarget {
            pos: DVec2::new(x, y),
            vel: DVec2::ZERO,
            signature: 100.0,
            jam: 0.0,
        }
    }

    #[test]
    fn test_locking_gates_homing() {
        let o = launcher_outfit(true);
        let (l, s) = specs(&o);
        let mut w = spawn_test_launcher(&o, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        // Target far off-axis; while locking the munition must fly straight.
        let t = dummy_target(0.0, 5000.0);
        think(&mut w, &l, &s, Some(t), 0.05, &mut rng);
        assert_eq!(w.status, SeekerState::Locking);
        assert_eq!(w.solid.dir_vel, 0.0);
        // Exhaust the lock timer.
        for _ in 0..40 {
            think(&mut w, &l, &s, Some(t), 0.05, &mut rng);
        }
        assert_ne!(w.status, SeekerState::Locking);
    }

    #[test]
    fn test_smart_seeker_converges_on_crossing_target() {
        let o = launcher_outfit(true);
        let (l, s) = specs(&o);
        let mut w = spawn_test_launcher(&o, 0.0);
        w.status = SeekerState::Unjammed;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut target = dummy_target(2000.0, 500.0);
        target.vel = DVec2::new(0.0, -80.0);
        let mut min_dist = f64::MAX;
        for step in 0..2000 {
            let t = SeekerTarget {
                pos: target.pos + target.vel * (step as f64 * 0.05),
                ..target
            };
            think(&mut w, &l, &s, Some(t), 0.05, &mut rng);
            w.solid.update(0.05);
            min_dist = min_dist.min(w.solid.pos.distance(t.pos));
        }
        assert!(min_dist < 50.0, "smart seeker min dist {min_dist:.1}");
    }

    #[test]
    fn test_simple_seeker_converges_on_stationary_target() {
        let o = launcher_outfit(false);
        let (l, s) = specs(&o);
        let mut w = spawn_test_launcher(&o, 0.0);
        w.status = SeekerState::Ok;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let min = fly(&mut w, &l, &s, dummy_target(1000.0, 800.0), &mut rng, 2000);
        assert!(min < 50.0, "simple seeker min dist {min:.1}");
    }

    #[test]
    fn test_jam_requires_tracking_range() {
        let o = launcher_outfit(true);
        let (l, s) = specs(&o);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        // Heavy jamming but target far outside tracking radius: no roll.
        let mut w = spawn_test_launcher(&o, 0.0);
        w.status = SeekerState::Ok;
        let far = SeekerTarget {
            jam: 10.0,
            ..dummy_target(1e6, 0.0)
        };
        think(&mut w, &l, &s, Some(far), 0.05, &mut rng);
        assert_eq!(w.status, SeekerState::Ok);
        assert!(!w.destroyed);
    }

    #[test]
    fn test_jam_outcomes_cover_all_bands() {
        let o = launcher_outfit(true);
        let (l, s) = specs(&o);
        let near = SeekerTarget {
            jam: 10.0, // certain jam (resist subtracted, still >> 1)
            ..dummy_target(100.0, 0.0)
        };
        let mut destroyed = 0;
        let mut jammed = 0;
        let mut slowed = 0;
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut w = spawn_test_launcher(&o, 0.0);
            w.status = SeekerState::Ok;
            think(&mut w, &l, &s, Some(near), 0.05, &mut rng);
            if w.destroyed {
                destroyed += 1;
            } else {
                match w.status {
                    SeekerState::Jammed => jammed += 1,
                    SeekerState::JammedSlowed => {
                        slowed += 1;
                        assert!(w.jam_speed_cap >= l.speed_max * JAM_SLOW_MIN_FRACTION);
                        assert!(w.jam_speed_cap < l.speed_max);
                    }
                    other => panic!("certain jam produced {other:?}"),
                }
            }
        }
        assert!(destroyed > 0 && jammed > 0 && slowed > 0);
    }

    #[test]
    fn test_unjammed_never_rolls_again() {
        let o = launcher_outfit(true);
        let (l, s) = specs(&o);
        let near = SeekerTarget {
            jam: 0.5,
            ..dummy_target(100.0, 0.0)
        };
        // Find a seed that survives the roll, then verify it stays clean.
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut w = spawn_test_launcher(&o, 0.0);
            w.status = SeekerState::Ok;
            think(&mut w, &l, &s, Some(near), 0.05, &mut rng);
            if w.status == SeekerState::Unjammed {
                for _ in 0..100 {
                    think(&mut w, &l, &s, Some(near), 0.05, &mut rng);
                }
                assert_eq!(w.status, SeekerState::Unjammed);
                assert!(!w.destroyed);
                return;
            }
        }
        panic!("no surviving seed found");
    }
}
