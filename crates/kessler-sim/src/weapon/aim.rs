//! Aiming: lead computation, tracking quality, swivel clamps, dispersion,
//! and the iterative lead correction for accelerating munitions.

use glam::DVec2;
use kessler_core::constants::{AIM_MAX_ITERATIONS, AIM_MISS_EPS};
use kessler_core::outfit::{heat_accuracy_penalty, Outfit};
use kessler_core::types::{angle_diff, angle_wrap, unit, vec_angle};
use rand::Rng;

/// Straight-line lead angle for a projectile of constant `speed` fired at a
/// target at `rel_pos` moving at `rel_vel` (both relative to the shooter).
/// Falls back to the direct bearing when no intercept exists.
pub fn lead_angle(rel_pos: DVec2, rel_vel: DVec2, speed: f64) -> f64 {
    let a = rel_vel.length_squared() - speed * speed;
    let b = 2.0 * rel_pos.dot(rel_vel);
    let c = rel_pos.length_squared();

    let t = if a.abs() < 1e-9 {
        // Relative speed matches projectile speed; degenerates to linear.
        if b.abs() < 1e-9 {
            return vec_angle(rel_pos);
        }
        -c / b
    } else {
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return vec_angle(rel_pos);
        }
        let sq = disc.sqrt();
        let t1 = (-b - sq) / (2.0 * a);
        let t2 = (-b + sq) / (2.0 * a);
        match (t1 > 0.0, t2 > 0.0) {
            (true, true) => t1.min(t2),
            (true, false) => t1,
            (false, true) => t2,
            _ => return vec_angle(rel_pos),
        }
    };
    if t <= 0.0 {
        return vec_angle(rel_pos);
    }
    vec_angle(rel_pos + rel_vel * t)
}

/// Tracking quality of an outfit against a target signature: 0 below
/// `trackmin` (no lead at all), 1 above `trackmax` (full lead).
pub fn track_quality(outfit: &Outfit, signature: f64) -> f64 {
    if outfit.trackmax <= outfit.trackmin {
        return 1.0;
    }
    ((signature - outfit.trackmin) / (outfit.trackmax - outfit.trackmin)).clamp(0.0, 1.0)
}

/// Blend the direct bearing toward the full lead angle by tracking quality.
pub fn blend_lead(bearing: f64, lead: f64, quality: f64) -> f64 {
    angle_wrap(bearing + angle_diff(bearing, lead) * quality)
}

/// Clamp a desired fire direction to within `swivel` of the mount facing.
pub fn clamp_swivel(facing: f64, desired: f64, swivel: f64) -> f64 {
    let diff = angle_diff(facing, desired);
    angle_wrap(facing + diff.clamp(-swivel, swivel))
}

/// Standard normal sample (Box-Muller).
pub fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Dispersed fire direction: Gaussian spread around `dir` with the outfit's
/// sigma plus the heat penalty of the firing slot.
pub fn disperse(dir: f64, sigma: f64, heat: f64, outfit: &Outfit, rng: &mut impl Rng) -> f64 {
    let total = sigma + heat_accuracy_penalty(heat, outfit.heat);
    if total <= 0.0 {
        return dir;
    }
    angle_wrap(dir + gaussian(rng) * total)
}

/// Distance an accelerating munition covers in time `t`, respecting its
/// speed cap.
fn travel(t: f64, v0: f64, accel: f64, v_max: f64) -> f64 {
    if accel <= 0.0 {
        return v0 * t;
    }
    let t_cap = ((v_max - v0) / accel).max(0.0);
    if t <= t_cap {
        v0 * t + 0.5 * accel * t * t
    } else {
        v0 * t_cap + 0.5 * accel * t_cap * t_cap + v_max * (t - t_cap)
    }
}

/// Intercept time estimate: when the munition's travel distance first
/// matches the target's range. Fixed-point iteration; negative when the
/// geometry is degenerate.
fn intercept_time(rel_pos: DVec2, rel_vel: DVec2, v0: f64, accel: f64, v_max: f64) -> f64 {
    let mut t = rel_pos.length() / v0.max(1e-6);
    for _ in 0..8 {
        let d = (rel_pos + rel_vel * t).length();
        let s_avg = travel(t, v0, accel, v_max) / t.max(1e-9);
        if s_avg <= 1e-9 {
            return -1.0;
        }
        let next = d / s_avg;
        if (next - t).abs() < 1e-6 {
            return next;
        }
        t = next;
    }
    t
}

/// Iterative lead correction for a munition with nonzero acceleration: a
/// secant refinement of the straight-line lead angle, driving the
/// perpendicular miss criterion (cross product of the aim heading against
/// the predicted intercept bearing) to zero. At most
/// [`AIM_MAX_ITERATIONS`] steps; exits early on convergence or a
/// degenerate (negative-time) intercept.
pub fn aim_correction(
    rel_pos: DVec2,
    rel_vel: DVec2,
    v0: f64,
    accel: f64,
    v_max: f64,
) -> f64 {
    let miss = |theta: f64| -> Option<f64> {
        let t = intercept_time(rel_pos, rel_vel, v0, accel, v_max);
        if t < 0.0 {
            return None;
        }
        let aim = unit(theta);
        let to_hit = (rel_pos + rel_vel * t).normalize_or_zero();
        Some(aim.perp_dot(to_hit))
    };

    let mut theta0 = lead_angle(rel_pos, rel_vel, v0.max(1e-6));
    let mut m0 = match miss(theta0) {
        Some(m) => m,
        None => return theta0,
    };
    if m0.abs() < AIM_MISS_EPS {
        return theta0;
    }

    let mut theta1 = theta0 + m0;
    for _ in 0..AIM_MAX_ITERATIONS {
        let m1 = match miss(theta1) {
            Some(m) => m,
            None => break,
        };
        if m1.abs() < AIM_MISS_EPS {
            return angle_wrap(theta1);
        }
        let dm = m1 - m0;
        if dm.abs() < 1e-12 {
            break;
        }
        let next = theta1 - m1 * (theta1 - theta0) / dm;
        theta0 = theta1;
        m0 = m1;
        theta1 = next;
    }
    angle_wrap(theta1)
}
