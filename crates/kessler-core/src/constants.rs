//! Simulation constants and tuning parameters.
//!
//! Many of these are empirically tuned gameplay values with no analytic
//! derivation; changing them is a balance change, not a bug fix. Values that
//! implementers are expected to re-tune are re-exported as configuration
//! defaults in `config.rs`.

use std::f64::consts::PI;

// --- Physics ---

/// Largest substep the RK4 integrator will take (time units).
pub const RK4_MIN_H: f64 = 0.01;

/// Divisor mapping current speed to a minimum RK4 substep count, so fast
/// bodies never tunnel through a single oversized step.
pub const RK4_SPEED_SUBSTEP_DIV: f64 = 100.0;

/// Gain of the soft speed cap: exceeding the cap applies a deceleration of
/// `SPEED_LIMIT_GAIN * overshoot / drag` opposing the velocity.
pub const SPEED_LIMIT_GAIN: f64 = 3.0;

/// Damping constant in the closed-form top speed
/// `max_speed = base + accel * drag / SPEED_DAMPING`.
pub const SPEED_DAMPING: f64 = 3.0;

// --- Spatial index ---

/// Default maximum elements in a quadtree leaf before splitting.
/// Grid-searched empirically; see config.
pub const QUADTREE_MAX_ELEMENTS: usize = 2;

/// Default maximum quadtree depth.
pub const QUADTREE_MAX_DEPTH: usize = 5;

// --- Electronic warfare ---

/// Exponent of the EW mass curve: `ew_mass = mass^(1/EW_MASS_EXP) * EW_MASS_SCALE`.
pub const EW_MASS_EXP: f64 = 1.8;

/// Scale of the EW mass curve.
pub const EW_MASS_SCALE: f64 = 350.0;

/// Asteroid field detection damping: `1 / (1 + EW_ASTEROID_DENSITY * density)`.
pub const EW_ASTEROID_DENSITY: f64 = 0.4;

/// Signature is this fraction of detection before stats/interference.
pub const EW_SIGNATURE_FACTOR: f64 = 0.75;

/// Stealth range is this fraction of the hide-modified mass curve.
pub const EW_STEALTH_FACTOR: f64 = 0.25;

/// Minimum stealth range before environmental modifiers.
pub const EW_STEALTH_MIN_RANGE: f64 = 1000.0;

/// Distance from a usable jump point within which stealth improves.
pub const EW_JUMP_STEALTH_DIST: f64 = 2500.0;

/// Floor of the jump-point stealth modifier at the marker itself.
pub const EW_JUMP_STEALTH_MIN: f64 = 0.5;

/// Stealth timer recovery numerator: `+dt * 5000 / stealth_range` per tick
/// with no hostile nearby, capped at 1.
pub const EW_STEALTH_RECOVER_NUM: f64 = 5000.0;

/// Stealth timer decay divisor: `-dt * (stealth_range / 10000 + mod)` per
/// tick with hostiles nearby.
pub const EW_STEALTH_DECAY_DIV: f64 = 10000.0;

/// Scan time curve: `target_mass^(1/3) * EW_SCAN_TIME_FACTOR / (hide * signature)`.
pub const EW_SCAN_TIME_FACTOR: f64 = 1.25;

// --- Pilot combat ---

/// Disable recovery duration: `DISABLE_TIME_FACTOR * mass^(1/3)` seconds.
pub const DISABLE_TIME_FACTOR: f64 = 8.0;

/// Death explosion timer: `1 + sqrt(10 * armour_max * shield_max) / 1500`,
/// clamped to [DEATH_TIMER_MIN, DEATH_TIMER_MAX].
pub const DEATH_TIMER_MIN: f64 = 1.0;
pub const DEATH_TIMER_MAX: f64 = 7.5;

/// Remaining death-timer threshold at which the death sound plays.
pub const DEATH_SOUND_THRESHOLD: f64 = 0.5;

/// Remaining death-timer threshold at which the final area explosion fires.
pub const DEATH_EXPLOSION_THRESHOLD: f64 = 0.2;

/// Bounds of the randomized interval between cosmetic explosions while dying.
pub const DEATH_PUFF_MIN_INTERVAL: f64 = 0.08;
pub const DEATH_PUFF_MAX_INTERVAL: f64 = 0.30;

/// Stress bleed-off while not disabled, as a fraction of current stress
/// per second.
pub const STRESS_DECAY_RATE: f64 = 0.3;

/// Final death explosion radius as a multiple of the ship's bounding radius.
pub const DEATH_BLAST_RADIUS_FACTOR: f64 = 4.0;

/// Final death explosion damage as a fraction of the ship's total max
/// health pool.
pub const DEATH_BLAST_DAMAGE_FACTOR: f64 = 0.25;

/// Armour penetration of the final death explosion.
pub const DEATH_BLAST_PENETRATION: f64 = 0.5;

/// Knockback impulse divisor (damage-fraction and mass-ratio terms).
pub const KNOCKBACK_DIV: f64 = 6.0;

/// Fraction of a pilot's bounding size within which boarding is possible.
pub const PILOT_SIZE_APPROX: f64 = 0.8;

/// Maximum relative speed for boarding (and hyperspace entry).
pub const MAX_HYPERSPACE_VEL: f64 = 25.0;

/// Fixed boarding duration in seconds.
pub const BOARDING_TIME: f64 = 3.0;

/// Fraction of the target's credits looted on boarding (player boarder).
pub const BOARDING_LOOT_FRACTION: f64 = 0.10;

// --- Weapons ---

/// Jam outcome probability bands (cumulative): self-destruct below the
/// first, hard random turn below the second, straight fly-off below the
/// third, slowed otherwise.
pub const JAM_BAND_SELF_DESTRUCT: f64 = 0.3;
pub const JAM_BAND_HARD_TURN: f64 = 0.6;
pub const JAM_BAND_FLY_STRAIGHT: f64 = 0.8;

/// Floor of the JammedSlowed speed-cap fraction (avoids a zero cap).
pub const JAM_SLOW_MIN_FRACTION: f64 = 0.1;

/// Proportional gain of the simple (non-smart) seeker turn law.
pub const SEEKER_SIMPLE_GAIN: f64 = 10.0;

/// LOS-rate magnitude below which a smart seeker holds parallel pursuit
/// instead of a bang-bang lead turn.
pub const SEEKER_LOS_RATE_EPS: f64 = 1e-3;

/// Maximum iterations of the quasi-Newton unguided lead correction.
pub const AIM_MAX_ITERATIONS: usize = 5;

/// Miss-criterion magnitude considered converged by the lead correction.
pub const AIM_MISS_EPS: f64 = 1e-2;

/// Seconds between beam hit-visual pulses.
pub const BEAM_HIT_PULSE: f64 = 0.05;

// --- Heat ---

/// Heat added per shot as a fraction of the outfit's heat coefficient.
pub const HEAT_PER_SHOT: f64 = 1.0;

/// Exponential cooling rate of slot heat (per second).
pub const HEAT_COOL_RATE: f64 = 0.25;

/// Extra dispersion (radians) at full heat for a heat coefficient of 1.
pub const HEAT_ACCURACY_PENALTY: f64 = PI / 16.0;

// --- Autonav ---

/// Facing error below which autonav applies thrust.
pub const AUTONAV_MIN_DIR_ERR: f64 = 0.02;

/// Speed magnitude below which braking is considered complete.
pub const AUTONAV_MIN_VEL_ERR: f64 = 10.0;

/// Turn-time safety factor in the braking-distance estimate.
pub const AUTONAV_TURN_FACTOR: f64 = 1.1;

/// Proportional gain of the follow/board PD controller.
pub const AUTONAV_KP: f64 = 10.0;

/// Derivative gain floor and linear shaping of the PD controller:
/// `Kd = max(5, 10.84 * time_factor - 10.82)`.
pub const AUTONAV_KD_MIN: f64 = 5.0;
pub const AUTONAV_KD_SLOPE: f64 = 10.84;
pub const AUTONAV_KD_OFFSET: f64 = 10.82;

/// Control-vector magnitude required before the PD controller thrusts.
pub const AUTONAV_PD_THRUST_THRESHOLD: f64 = 300.0;

/// Trailing distance when following (not boarding) another pilot.
pub const AUTONAV_FOLLOW_RADIUS: f64 = 100.0;

/// Seconds over which time compression ramps back down to baseline.
pub const AUTONAV_RAMPDOWN_SECS: f64 = 3.0;

/// Time-compression ramp-up rate factor: `+dt * 0.2 * (tc_max - tc_base)`.
pub const AUTONAV_RAMPUP_RATE: f64 = 0.2;

/// Default velocity divided by ship top speed to get max time compression.
pub const AUTONAV_COMPRESSION_VELOCITY: f64 = 5000.0;

/// Default hard cap on the time-compression multiplier (< 1 disables cap).
pub const AUTONAV_COMPRESSION_MULT: f64 = 200.0;

/// Default shield-fraction drop threshold that aborts autonav under fire.
pub const AUTONAV_RESET_SHIELD: f64 = 0.95;

/// Default hostile-proximity distance that aborts autonav.
pub const AUTONAV_RESET_DIST: f64 = 3000.0;

/// Jump approach point bias: the greater of this fraction of the jump
/// radius or the radius minus [`AUTONAV_JUMP_APPROACH_SLACK`].
pub const AUTONAV_JUMP_APPROACH_FRACTION: f64 = 0.8;
pub const AUTONAV_JUMP_APPROACH_SLACK: f64 = 30.0;
