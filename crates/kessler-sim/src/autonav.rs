//! Assisted-travel controller for the player pilot.
//!
//! A small finite state machine layered on the pilot model: it only drives
//! the same primitives an AI would (thrust fraction, turn fraction) and
//! manages the time-compression factor. One session exists per controlled
//! pilot; arrival, abort, or interruption ends it.

use std::f64::consts::PI;

use glam::DVec2;
use kessler_core::config::AutonavConfig;
use kessler_core::constants::{
    AUTONAV_FOLLOW_RADIUS, AUTONAV_JUMP_APPROACH_FRACTION, AUTONAV_JUMP_APPROACH_SLACK,
    AUTONAV_KD_MIN, AUTONAV_KD_OFFSET, AUTONAV_KD_SLOPE, AUTONAV_KP, AUTONAV_MIN_DIR_ERR,
    AUTONAV_MIN_VEL_ERR, AUTONAV_PD_THRUST_THRESHOLD, AUTONAV_RAMPDOWN_SECS, AUTONAV_RAMPUP_RATE,
    AUTONAV_TURN_FACTOR, MAX_HYPERSPACE_VEL, PILOT_SIZE_APPROX,
};
use kessler_core::error::SimError;
use kessler_core::events::CombatEvent;
use kessler_core::types::{angle_diff, vec_angle, PilotId};
use tracing::{debug, warn};

use crate::environment::{Environment, FactionTable};
use crate::events::CombatEventSink;
use crate::pilot::{combat, Pilot, PilotRegistry};

/// Where the session currently is in its travel sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutonavMode {
    /// Flying toward the approach point of a jump (by index in the
    /// environment's jump list).
    JumpApproach(usize),
    JumpBrake(usize),
    /// Flying toward a fixed position; arrival is direct, no brake phase.
    PosApproach(DVec2),
    /// Flying toward a spob without landing; arrival is direct.
    SpobApproach(usize),
    SpobLandApproach(usize),
    SpobLandBrake(usize),
    /// Holding a trailing point behind another pilot; never arrives.
    PilotFollow(PilotId),
    PilotBoardApproach(PilotId),
    PilotBoardBrake(PilotId),
}

/// What one session tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutonavState {
    Active,
    /// The sequence completed (jump engaged, landed, boarded, or position
    /// reached). The session should be dropped.
    Arrived,
    /// The session ended early; the reason is a short status message.
    Aborted(&'static str),
}

/// One assisted-travel session. Owned by the engine next to the player id.
#[derive(Debug, Clone)]
pub struct AutonavSession {
    pub mode: AutonavMode,
    /// Current time-compression factor the engine multiplies dt by.
    pub tc_mod: f64,
    tc_base: f64,
    tc_max: f64,
    /// Ramp-down rate, fixed when the ramp-down begins so the descent takes
    /// [`AUTONAV_RAMPDOWN_SECS`] regardless of where tc_mod was.
    tc_down: f64,
    ramping_down: bool,
    /// Shield fraction at the previous tick, for the damage abort check.
    last_shield: f64,
    pub status: String,
}

impl AutonavSession {
    fn new(pilot: &Pilot, config: &AutonavConfig, mode: AutonavMode, status: String) -> Self {
        let mut tc_max = (config.compression_velocity / pilot.max_speed()).max(1.0);
        if config.compression_mult >= 1.0 {
            tc_max = tc_max.min(config.compression_mult);
        }
        Self {
            mode,
            tc_mod: 1.0,
            tc_base: 1.0,
            tc_max,
            tc_down: 0.0,
            ramping_down: false,
            last_shield: pilot.shield_fraction(),
            status,
        }
    }

    fn ramp_up(&mut self, dt: f64) {
        if self.ramping_down {
            return;
        }
        self.tc_mod =
            (self.tc_mod + AUTONAV_RAMPUP_RATE * dt * (self.tc_max - self.tc_base)).min(self.tc_max);
    }

    /// Freeze the descent rate so the ramp to baseline takes the fixed
    /// window from wherever compression currently sits.
    fn begin_rampdown(&mut self) {
        if !self.ramping_down {
            self.ramping_down = true;
            self.tc_down = (self.tc_mod - self.tc_base) / AUTONAV_RAMPDOWN_SECS;
        }
    }

    fn ramp_down(&mut self, dt: f64) {
        self.tc_mod = (self.tc_mod - self.tc_down * dt).max(self.tc_base);
    }
}

fn session_gates(pilot: &Pilot) -> Result<(), SimError> {
    if pilot.flags.disabled {
        return Err(SimError::CannotAutonav("pilot is disabled"));
    }
    if pilot.flags.manual_control {
        return Err(SimError::CannotAutonav("pilot is under manual control"));
    }
    Ok(())
}

/// Start a jump sequence toward `jump_idx` in the environment's jump list.
pub fn start_jump(
    pilot: &Pilot,
    env: &Environment,
    jump_idx: usize,
    config: &AutonavConfig,
) -> Result<AutonavSession, SimError> {
    session_gates(pilot)?;
    let jp = env
        .jump_points
        .get(jump_idx)
        .ok_or(SimError::CannotAutonav("no such jump point"))?;
    if !jp.usable() {
        return Err(SimError::CannotAutonav("jump point is exit-only"));
    }
    if pilot.fuel < pilot.fuel_consumption {
        return Err(SimError::CannotAutonav("insufficient fuel"));
    }
    Ok(AutonavSession::new(
        pilot,
        config,
        AutonavMode::JumpApproach(jump_idx),
        "autonav: jumping".into(),
    ))
}

/// Start travel toward a fixed position.
pub fn start_pos(
    pilot: &Pilot,
    pos: DVec2,
    config: &AutonavConfig,
) -> Result<AutonavSession, SimError> {
    session_gates(pilot)?;
    Ok(AutonavSession::new(
        pilot,
        config,
        AutonavMode::PosApproach(pos),
        "autonav: flying to position".into(),
    ))
}

/// Start travel toward a spob, optionally landing on arrival.
pub fn start_spob(
    pilot: &Pilot,
    env: &Environment,
    spob_idx: usize,
    land: bool,
    config: &AutonavConfig,
) -> Result<AutonavSession, SimError> {
    session_gates(pilot)?;
    let spob = env
        .spobs
        .get(spob_idx)
        .ok_or(SimError::CannotAutonav("no such spob"))?;
    let (mode, verb) = if land {
        (AutonavMode::SpobLandApproach(spob_idx), "landing on")
    } else {
        (AutonavMode::SpobApproach(spob_idx), "flying to")
    };
    Ok(AutonavSession::new(
        pilot,
        config,
        mode,
        format!("autonav: {verb} {}", spob.name),
    ))
}

/// Start following another pilot at a trailing distance.
pub fn start_follow(
    pilot: &Pilot,
    target: &Pilot,
    config: &AutonavConfig,
) -> Result<AutonavSession, SimError> {
    session_gates(pilot)?;
    if !target.can_target() {
        return Err(SimError::CannotAutonav("target cannot be followed"));
    }
    Ok(AutonavSession::new(
        pilot,
        config,
        AutonavMode::PilotFollow(target.id),
        format!("autonav: following {}", target.name),
    ))
}

/// Start an approach-and-board sequence on another pilot.
pub fn start_board(
    pilot: &Pilot,
    target: &Pilot,
    config: &AutonavConfig,
) -> Result<AutonavSession, SimError> {
    session_gates(pilot)?;
    if !target.can_target() {
        return Err(SimError::CannotAutonav("target cannot be boarded"));
    }
    Ok(AutonavSession::new(
        pilot,
        config,
        AutonavMode::PilotBoardApproach(target.id),
        format!("autonav: boarding {}", target.name),
    ))
}

/// Turn toward `dir`; returns the absolute facing error.
fn face(pilot: &mut Pilot, dir: f64) -> f64 {
    let err = angle_diff(pilot.solid.dir, dir);
    pilot.set_turn((err * 10.0).clamp(-1.0, 1.0));
    err.abs()
}

/// Predicted stopping distance at the current speed: decelerate after a
/// worst-case U-turn. Speed is capped so a runaway velocity cannot produce
/// an absurd estimate.
fn braking_distance(pilot: &Pilot) -> f64 {
    if pilot.accel_max <= 0.0 {
        return 0.0;
    }
    let vel = pilot.solid.vel.length().min(1.5 * pilot.base_speed);
    let t = vel / pilot.accel_max;
    vel * (t + AUTONAV_TURN_FACTOR * PI / pilot.turn_max) - 0.5 * pilot.accel_max * t * t
}

/// Face-then-thrust toward `target`; returns the braking-aware remaining
/// distance. Crossing zero means it is time to stop approaching.
fn approach(pilot: &mut Pilot, target: DVec2) -> f64 {
    let rel = target - pilot.solid.pos;
    let dist = rel.length();
    let err = face(pilot, vec_angle(rel));
    if err < AUTONAV_MIN_DIR_ERR {
        pilot.set_accel(1.0);
    } else {
        pilot.set_accel(0.0);
    }
    dist - braking_distance(pilot)
}

/// Kill velocity by thrusting against it. True once slow enough.
fn brake(pilot: &mut Pilot) -> bool {
    if pilot.solid.vel.length() < AUTONAV_MIN_VEL_ERR {
        pilot.set_accel(0.0);
        pilot.set_turn(0.0);
        return true;
    }
    let err = face(pilot, vec_angle(-pilot.solid.vel));
    if err < AUTONAV_MIN_DIR_ERR {
        pilot.set_accel(1.0);
    } else {
        pilot.set_accel(0.0);
    }
    false
}

/// PD controller steering toward a (possibly moving) point. Thrust fires
/// only when facing is settled and the control demand is large enough.
fn pd_control(pilot: &mut Pilot, point: DVec2, point_vel: DVec2) {
    let tf = PI / pilot.turn_max + pilot.solid.vel.length() / pilot.accel_max;
    let kd = AUTONAV_KD_MIN.max(AUTONAV_KD_SLOPE * tf - AUTONAV_KD_OFFSET);
    let control = AUTONAV_KP * (point - pilot.solid.pos) + kd * (point_vel - pilot.solid.vel);
    let err = face(pilot, vec_angle(control));
    if err < AUTONAV_MIN_DIR_ERR && control.length() > AUTONAV_PD_THRUST_THRESHOLD {
        pilot.set_accel(1.0);
    } else {
        pilot.set_accel(0.0);
    }
}

fn abort(
    pilots: &mut PilotRegistry,
    id: PilotId,
    session: &mut AutonavSession,
    reason: &'static str,
) -> AutonavState {
    if let Some(p) = pilots.get_mut(id) {
        p.set_accel(0.0);
        p.set_turn(0.0);
    }
    session.tc_mod = session.tc_base;
    session.status = format!("autonav: aborted ({reason})");
    warn!(pilot = id, reason, "autonav aborted");
    AutonavState::Aborted(reason)
}

/// Advance the session one tick. `dt` is uncompressed wall time; the engine
/// applies `tc_mod` to the simulation step itself.
#[allow(clippy::too_many_arguments)]
pub fn update(
    session: &mut AutonavSession,
    pilots: &mut PilotRegistry,
    pilot_id: PilotId,
    env: &Environment,
    factions: &FactionTable,
    config: &AutonavConfig,
    dt: f64,
    sink: &mut dyn CombatEventSink,
) -> AutonavState {
    // Interruption checks first: any of these ends the session immediately.
    {
        let p = match pilots.get(pilot_id) {
            Some(p) => p,
            None => return abort(pilots, pilot_id, session, "pilot lost"),
        };
        if p.flags.manual_control {
            return abort(pilots, pilot_id, session, "manual control");
        }
        if p.flags.disabled || p.flags.dying {
            return abort(pilots, pilot_id, session, "ship disabled");
        }
        if p.lockons > 0 {
            return abort(pilots, pilot_id, session, "missile lock detected");
        }
        if p.shield_fraction() < session.last_shield * config.reset_shield {
            return abort(pilots, pilot_id, session, "taking damage");
        }
        let pos = p.solid.pos;
        let faction = p.faction;
        let hostile_near = pilots.iter().any(|q| {
            q.id != pilot_id
                && !q.flags.disabled
                && q.can_target()
                && factions.are_enemies(faction, q.faction)
                && q.solid.pos.distance(pos) < config.reset_dist
        });
        if hostile_near {
            return abort(pilots, pilot_id, session, "hostile presence detected");
        }
    }
    if let Some(p) = pilots.get(pilot_id) {
        session.last_shield = p.shield_fraction();
    }

    match session.mode {
        AutonavMode::JumpApproach(idx) => {
            let jp = match env.jump_points.get(idx) {
                Some(jp) => *jp,
                None => return abort(pilots, pilot_id, session, "jump point lost"),
            };
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            if p.fuel < p.fuel_consumption {
                return abort(pilots, pilot_id, session, "insufficient fuel");
            }
            let offset = (AUTONAV_JUMP_APPROACH_FRACTION * jp.radius)
                .max(jp.radius - AUTONAV_JUMP_APPROACH_SLACK);
            let toward = (p.solid.pos - jp.pos).normalize_or_zero();
            let point = jp.pos + toward * offset;
            let d = approach(p, point);
            if d < p.solid.vel.length() * AUTONAV_RAMPDOWN_SECS * session.tc_mod {
                session.begin_rampdown();
                session.ramp_down(dt);
            } else {
                session.ramp_up(dt);
            }
            if d <= 0.0 {
                debug!(pilot = pilot_id, "jump approach done, braking");
                session.mode = AutonavMode::JumpBrake(idx);
            }
            AutonavState::Active
        }
        AutonavMode::JumpBrake(_) => {
            session.begin_rampdown();
            session.ramp_down(dt);
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            if !brake(p) {
                return AutonavState::Active;
            }
            if p.fuel < p.fuel_consumption {
                return abort(pilots, pilot_id, session, "insufficient fuel");
            }
            p.fuel -= p.fuel_consumption;
            p.flags.hyperspace_prep = true;
            sink.event(CombatEvent::Jump { pilot: pilot_id });
            AutonavState::Arrived
        }
        AutonavMode::PosApproach(pos) => {
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            let d = approach(p, pos);
            if d < p.solid.vel.length() * AUTONAV_RAMPDOWN_SECS * session.tc_mod {
                session.begin_rampdown();
                session.ramp_down(dt);
            } else {
                session.ramp_up(dt);
            }
            if d <= 0.0 {
                p.set_accel(0.0);
                p.set_turn(0.0);
                session.tc_mod = session.tc_base;
                return AutonavState::Arrived;
            }
            AutonavState::Active
        }
        AutonavMode::SpobApproach(idx) => {
            let pos = match env.spobs.get(idx) {
                Some(s) => s.pos,
                None => return abort(pilots, pilot_id, session, "destination lost"),
            };
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            let d = approach(p, pos);
            if d < p.solid.vel.length() * AUTONAV_RAMPDOWN_SECS * session.tc_mod {
                session.begin_rampdown();
                session.ramp_down(dt);
            } else {
                session.ramp_up(dt);
            }
            if d <= 0.0 {
                p.set_accel(0.0);
                p.set_turn(0.0);
                session.tc_mod = session.tc_base;
                return AutonavState::Arrived;
            }
            AutonavState::Active
        }
        AutonavMode::SpobLandApproach(idx) => {
            let spob = match env.spobs.get(idx) {
                Some(s) => s.clone(),
                None => return abort(pilots, pilot_id, session, "destination lost"),
            };
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            // Aim past the body along the travel direction so the brake
            // phase settles on top of it instead of short of it.
            let travel = if p.solid.vel.length_squared() > 1.0 {
                p.solid.vel.normalize()
            } else {
                (spob.pos - p.solid.pos).normalize_or_zero()
            };
            let point = spob.pos + travel * (spob.radius * 0.5);
            let d = approach(p, point);
            if d < p.solid.vel.length() * AUTONAV_RAMPDOWN_SECS * session.tc_mod {
                session.begin_rampdown();
                session.ramp_down(dt);
            } else {
                session.ramp_up(dt);
            }
            if d <= 0.0 {
                session.mode = AutonavMode::SpobLandBrake(idx);
            }
            AutonavState::Active
        }
        AutonavMode::SpobLandBrake(idx) => {
            session.begin_rampdown();
            session.ramp_down(dt);
            let can_land = match env.spobs.get(idx) {
                Some(s) => s.can_land,
                None => return abort(pilots, pilot_id, session, "destination lost"),
            };
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            if !brake(p) {
                return AutonavState::Active;
            }
            if !can_land {
                return abort(pilots, pilot_id, session, "landing denied");
            }
            p.flags.landing = true;
            sink.event(CombatEvent::Land { pilot: pilot_id });
            AutonavState::Arrived
        }
        AutonavMode::PilotFollow(tid) => {
            let (t_pos, t_vel) = match pilots.get(tid) {
                Some(t) if t.can_target() && !t.flags.dying => (t.solid.pos, t.solid.vel),
                _ => return abort(pilots, pilot_id, session, "target lost"),
            };
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            // Trail point behind the target: along its velocity when moving,
            // otherwise on the side the follower is already on.
            let back = if t_vel.length_squared() > 1.0 {
                -t_vel.normalize()
            } else {
                (p.solid.pos - t_pos).normalize_or_zero()
            };
            pd_control(p, t_pos + back * AUTONAV_FOLLOW_RADIUS, t_vel);
            AutonavState::Active
        }
        AutonavMode::PilotBoardApproach(tid) => {
            let (t_pos, t_vel, t_radius) = match pilots.get(tid) {
                Some(t) if t.can_target() && !t.flags.dying => {
                    (t.solid.pos, t.solid.vel, t.radius)
                }
                _ => return abort(pilots, pilot_id, session, "target lost"),
            };
            let p = match pilots.get_mut(pilot_id) {
                Some(p) => p,
                None => return abort(pilots, pilot_id, session, "pilot lost"),
            };
            pd_control(p, t_pos, t_vel);
            if p.solid.pos.distance(t_pos) < t_radius * PILOT_SIZE_APPROX + p.radius {
                session.begin_rampdown();
                session.mode = AutonavMode::PilotBoardBrake(tid);
            }
            AutonavState::Active
        }
        AutonavMode::PilotBoardBrake(tid) => {
            session.begin_rampdown();
            session.ramp_down(dt);
            let (t_pos, t_vel, t_radius, t_disabled, t_boarded) = match pilots.get(tid) {
                Some(t) if t.can_target() && !t.flags.dying => (
                    t.solid.pos,
                    t.solid.vel,
                    t.radius,
                    t.flags.disabled,
                    t.flags.boarded,
                ),
                _ => return abort(pilots, pilot_id, session, "target lost"),
            };
            if t_boarded {
                return abort(pilots, pilot_id, session, "target has already been boarded");
            }
            if !t_disabled {
                return abort(pilots, pilot_id, session, "target is not disabled");
            }
            let (in_reach, matched) = {
                let p = match pilots.get_mut(pilot_id) {
                    Some(p) => p,
                    None => return abort(pilots, pilot_id, session, "pilot lost"),
                };
                let rel_vel = p.solid.vel - t_vel;
                if rel_vel.length() > MAX_HYPERSPACE_VEL {
                    // Kill relative speed first; the PD controller alone can
                    // settle into a drift too fast for the boarding clamp.
                    let err = face(p, vec_angle(-rel_vel));
                    if err < AUTONAV_MIN_DIR_ERR {
                        p.set_accel(1.0);
                    } else {
                        p.set_accel(0.0);
                    }
                } else {
                    pd_control(p, t_pos, t_vel);
                }
                (
                    p.solid.pos.distance(t_pos) < t_radius * PILOT_SIZE_APPROX + p.radius,
                    (p.solid.vel - t_vel).length() <= MAX_HYPERSPACE_VEL,
                )
            };
            if in_reach && matched {
                if let Some((me, tgt)) = pilots.pair_mut(pilot_id, tid) {
                    if combat::try_board(me, tgt).is_ok() {
                        // The boarding update resolves the target through the
                        // boarder's target reference.
                        me.set_target(tid);
                        me.set_accel(0.0);
                        me.set_turn(0.0);
                        return AutonavState::Arrived;
                    }
                }
            }
            AutonavState::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{JumpPoint, Relation, Spob};
    use crate::events::{NullSink, RecordingSink};

    const DT: f64 = 0.1;

    fn player() -> Pilot {
        let mut p = Pilot::new("player", 1, DVec2::ZERO, DVec2::ZERO, 0.0, 100.0, 20.0);
        p.is_player = true;
        p
    }

    fn step(
        session: &mut AutonavSession,
        pilots: &mut PilotRegistry,
        id: PilotId,
        env: &Environment,
        factions: &FactionTable,
        config: &AutonavConfig,
        sink: &mut dyn CombatEventSink,
    ) -> AutonavState {
        let state = update(session, pilots, id, env, factions, config, DT, sink);
        for p in pilots.iter_mut() {
            p.solid.update(DT);
        }
        state
    }

    #[test]
    fn test_position_arrival_without_overshoot() {
        let env = Environment::default();
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        let target = DVec2::new(4000.0, 0.0);
        let mut session = start_pos(pilots.get(id).unwrap(), target, &config).unwrap();
        let mut sink = NullSink;

        let mut arrived = false;
        for _ in 0..5000 {
            let state = step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
            let p = pilots.get(id).unwrap();
            // Never overshoots past the target by more than one frame's travel.
            let frame = p.solid.vel.length() * DT;
            assert!(
                p.solid.pos.x <= target.x + frame + 1e-9,
                "overshoot: {} past {}",
                p.solid.pos.x,
                target.x
            );
            if state == AutonavState::Arrived {
                arrived = true;
                break;
            }
            assert_eq!(state, AutonavState::Active);
        }
        assert!(arrived, "never arrived at the position target");
        // Arrival happens with the braking margin still ahead of the target.
        let p = pilots.get(id).unwrap();
        assert!(p.solid.pos.x <= target.x);
    }

    #[test]
    fn test_time_compression_ramps_up_then_down() {
        let env = Environment::default();
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        let mut session =
            start_pos(pilots.get(id).unwrap(), DVec2::new(50_000.0, 0.0), &config).unwrap();
        let mut sink = NullSink;

        let mut peak: f64 = 1.0;
        for _ in 0..5000 {
            step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
            peak = peak.max(session.tc_mod);
            if session.ramping_down {
                break;
            }
        }
        assert!(peak > 1.0, "compression never ramped up");
        assert!(session.tc_mod <= peak);
        let before = session.tc_mod;
        for _ in 0..10 {
            step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
        }
        assert!(session.tc_mod < before, "ramp-down did not descend");
    }

    #[test]
    fn test_jump_sequence_fires_jump_event() {
        let env = Environment {
            jump_points: vec![JumpPoint {
                pos: DVec2::new(3000.0, 0.0),
                radius: 200.0,
                hidden: false,
                exit_only: false,
            }],
            ..Default::default()
        };
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        let mut session = start_jump(pilots.get(id).unwrap(), &env, 0, &config).unwrap();
        let mut sink = RecordingSink::default();

        let mut state = AutonavState::Active;
        for _ in 0..10_000 {
            state = step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
            if state != AutonavState::Active {
                break;
            }
        }
        assert_eq!(state, AutonavState::Arrived);
        let p = pilots.get(id).unwrap();
        assert!(p.flags.hyperspace_prep);
        assert_eq!(p.fuel, 0.0);
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, CombatEvent::Jump { pilot } if *pilot == id)));
    }

    #[test]
    fn test_start_jump_rejects_exit_only_and_no_fuel() {
        let env = Environment {
            jump_points: vec![JumpPoint {
                pos: DVec2::new(3000.0, 0.0),
                radius: 200.0,
                hidden: false,
                exit_only: true,
            }],
            ..Default::default()
        };
        let config = AutonavConfig::default();
        let mut p = player();
        assert!(start_jump(&p, &env, 0, &config).is_err());
        assert!(start_jump(&p, &env, 1, &config).is_err());
        p.fuel = 0.0;
        assert!(start_jump(&p, &env, 0, &config).is_err());
    }

    #[test]
    fn test_hostile_proximity_aborts() {
        let env = Environment::default();
        let mut factions = FactionTable::default();
        factions.set(1, 2, Relation::Enemy);
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        pilots.spawn(Pilot::new(
            "raider",
            2,
            DVec2::new(1000.0, 0.0),
            DVec2::ZERO,
            0.0,
            100.0,
            20.0,
        ));
        let mut session =
            start_pos(pilots.get(id).unwrap(), DVec2::new(9000.0, 0.0), &config).unwrap();
        let mut sink = NullSink;
        let state = update(
            &mut session, &mut pilots, id, &env, &factions, &config, DT, &mut sink,
        );
        assert_eq!(state, AutonavState::Aborted("hostile presence detected"));
        assert_eq!(session.tc_mod, 1.0);
    }

    #[test]
    fn test_shield_drop_aborts() {
        let env = Environment::default();
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        let mut session =
            start_pos(pilots.get(id).unwrap(), DVec2::new(9000.0, 0.0), &config).unwrap();
        let mut sink = NullSink;
        assert_eq!(
            update(&mut session, &mut pilots, id, &env, &factions, &config, DT, &mut sink),
            AutonavState::Active
        );
        pilots.get_mut(id).unwrap().shield *= 0.5;
        assert_eq!(
            update(&mut session, &mut pilots, id, &env, &factions, &config, DT, &mut sink),
            AutonavState::Aborted("taking damage")
        );
    }

    #[test]
    fn test_landing_denied_aborts() {
        let env = Environment {
            spobs: vec![Spob {
                name: "Fortress".into(),
                pos: DVec2::new(2000.0, 0.0),
                radius: 150.0,
                can_land: false,
            }],
            ..Default::default()
        };
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        let mut session =
            start_spob(pilots.get(id).unwrap(), &env, 0, true, &config).unwrap();
        let mut sink = NullSink;
        let mut state = AutonavState::Active;
        for _ in 0..10_000 {
            state = step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
            if state != AutonavState::Active {
                break;
            }
        }
        assert_eq!(state, AutonavState::Aborted("landing denied"));
        assert!(!pilots.get(id).unwrap().flags.landing);
    }

    #[test]
    fn test_follow_keeps_distance_bounded() {
        let env = Environment::default();
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        let tid = pilots.spawn({
            let mut t = Pilot::new(
                "mark",
                1,
                DVec2::new(500.0, 0.0),
                DVec2::new(50.0, 0.0),
                0.0,
                100.0,
                20.0,
            );
            // Keep the mark cruising at constant velocity.
            t.solid.speed_max = -1.0;
            t
        });
        let mut session = start_follow(
            pilots.get(id).unwrap(),
            pilots.get(tid).unwrap(),
            &config,
        )
        .unwrap();
        let mut sink = NullSink;
        for _ in 0..3000 {
            let state =
                step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
            assert_eq!(state, AutonavState::Active);
        }
        let me = pilots.get(id).unwrap().solid.pos;
        let mark = pilots.get(tid).unwrap().solid.pos;
        assert!(
            me.distance(mark) < 1000.0,
            "follower fell behind: {}",
            me.distance(mark)
        );
    }

    #[test]
    fn test_board_sequence_reaches_boarding() {
        let env = Environment::default();
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let mut pilots = PilotRegistry::new();
        let id = pilots.spawn(player());
        let tid = pilots.spawn({
            let mut t = Pilot::new("hulk", 2, DVec2::new(600.0, 0.0), DVec2::ZERO, 0.0, 100.0, 30.0);
            t.flags.disabled = true;
            t
        });
        let mut session = start_board(
            pilots.get(id).unwrap(),
            pilots.get(tid).unwrap(),
            &config,
        )
        .unwrap();
        let mut sink = NullSink;
        let mut state = AutonavState::Active;
        for _ in 0..10_000 {
            state = step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
            if state != AutonavState::Active {
                break;
            }
        }
        assert_eq!(state, AutonavState::Arrived);
        assert!(pilots.get(id).unwrap().flags.boarding);
    }

    #[test]
    fn test_identical_runs_identical_state() {
        // Guards against hidden iteration-order dependence (faction table is
        // hash-based): two identical worlds must step identically.
        let env = Environment::default();
        let factions = FactionTable::default();
        let config = AutonavConfig::default();
        let run = || {
            let mut pilots = PilotRegistry::new();
            let id = pilots.spawn(player());
            let mut session =
                start_pos(pilots.get(id).unwrap(), DVec2::new(4000.0, 300.0), &config).unwrap();
            let mut sink = NullSink;
            for _ in 0..500 {
                step(&mut session, &mut pilots, id, &env, &factions, &config, &mut sink);
            }
            (pilots.get(id).unwrap().solid.pos, session.tc_mod)
        };
        assert_eq!(run(), run());
    }
}
