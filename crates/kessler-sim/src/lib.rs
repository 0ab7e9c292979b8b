//! Deterministic 2D space-combat simulation.
//!
//! Owns the pilot and weapon registries, runs the per-tick pipeline
//! (sensors, combat, weapons, collisions, purge), and reports state
//! transitions through an injected event sink.

pub mod autonav;
pub mod engine;
pub mod environment;
pub mod events;
pub mod ew;
pub mod physics;
pub mod pilot;
pub mod spatial;
pub mod weapon;

pub use engine::SimWorld;
pub use kessler_core as core;
