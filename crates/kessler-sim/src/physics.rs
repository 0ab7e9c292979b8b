//! Rigid-body motion in the 2D plane.
//!
//! A [`Solid`] is position, velocity, facing and turn rate plus the control
//! inputs (acceleration along the facing, optional soft speed cap). Ships use
//! the substepped integrator so the speed cap behaves at high time
//! compression; projectiles use the cheap Euler step.

use glam::DVec2;
use kessler_core::constants::{RK4_MIN_H, RK4_SPEED_SUBSTEP_DIV, SPEED_DAMPING, SPEED_LIMIT_GAIN};
use kessler_core::enums::IntegrationMethod;
use kessler_core::types::{angle_wrap, unit};
use serde::{Deserialize, Serialize};

/// A rigid body. Facing is decoupled from velocity: ships drift.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Solid {
    pub pos: DVec2,
    /// Position at the start of the last update, for swept collision.
    pub pre_pos: DVec2,
    pub vel: DVec2,
    /// Facing in radians, kept in [0, 2π).
    pub dir: f64,
    /// Turn rate in rad/s; applied every substep.
    pub dir_vel: f64,
    pub mass: f64,
    /// Forward acceleration along `dir` (already divided by mass).
    pub accel: f64,
    /// Soft speed cap; negative disables it.
    pub speed_max: f64,
    /// Drag coefficient shaping how hard the speed cap bites.
    pub drag: f64,
    pub method: IntegrationMethod,
}

impl Solid {
    pub fn new(pos: DVec2, vel: DVec2, dir: f64, mass: f64) -> Self {
        Self {
            pos,
            pre_pos: pos,
            vel,
            dir: angle_wrap(dir),
            dir_vel: 0.0,
            mass: mass.max(1.0),
            accel: 0.0,
            speed_max: -1.0,
            drag: 1.0,
            method: IntegrationMethod::RungeKutta,
        }
    }

    pub fn projectile(pos: DVec2, vel: DVec2, dir: f64, mass: f64) -> Self {
        let mut s = Self::new(pos, vel, dir, mass);
        s.method = IntegrationMethod::Euler;
        s
    }

    /// Advance the body by `dt`. Records `pre_pos` for swept collision.
    pub fn update(&mut self, dt: f64) {
        self.pre_pos = self.pos;
        match self.method {
            IntegrationMethod::Euler => self.update_euler(dt),
            IntegrationMethod::RungeKutta => self.update_rk4(dt),
        }
        self.dir = angle_wrap(self.dir);
    }

    /// Single symplectic Euler step. No speed-cap handling beyond a hard
    /// clamp; projectiles are short-lived and their caps rarely bind.
    fn update_euler(&mut self, dt: f64) {
        self.dir += self.dir_vel * dt;
        self.vel += self.accel * unit(self.dir) * dt;
        if self.speed_max >= 0.0 {
            let vmod = self.vel.length();
            if vmod > self.speed_max {
                self.vel *= self.speed_max / vmod;
            }
        }
        self.pos += self.vel * dt;
    }

    /// Substepped integrator with a soft speed cap.
    ///
    /// The substep is capped at [`RK4_MIN_H`] and the count floored at
    /// `speed / RK4_SPEED_SUBSTEP_DIV` so a fast body under time compression
    /// cannot blow through the cap (or a collision cell) in one step.
    /// Exceeding the cap applies a deceleration proportional to the
    /// overshoot, opposing the velocity, which converges on
    /// `max_speed(base, accel)` instead of clamping discontinuously.
    fn update_rk4(&mut self, dt: f64) {
        let mut n = if dt > RK4_MIN_H {
            (dt / RK4_MIN_H).ceil() as usize
        } else {
            1
        };
        let vmod = self.vel.length();
        if vmod > RK4_SPEED_SUBSTEP_DIV {
            n = n.max((vmod / RK4_SPEED_SUBSTEP_DIV).ceil() as usize);
        }
        let h = dt / n as f64;

        for _ in 0..n {
            let mut acc = self.accel * unit(self.dir);
            if self.speed_max >= 0.0 {
                let vmod = self.vel.length();
                if vmod > self.speed_max {
                    acc -= SPEED_LIMIT_GAIN * (vmod - self.speed_max) / self.drag * self.vel
                        / vmod;
                }
            }
            self.vel += acc * h;
            self.pos += self.vel * h;
            self.dir += self.dir_vel * h;
        }
    }

    /// Steady-state top speed under the soft cap: thrusting straight, the
    /// cap deceleration balances `accel` at this speed. Closed form for
    /// planning code that cannot afford to run the integrator.
    pub fn max_speed(base_speed: f64, accel: f64, drag: f64) -> f64 {
        base_speed + accel * drag / SPEED_DAMPING
    }
}
