//! Core types and definitions for the Kessler combat simulation.
//!
//! This crate defines the vocabulary shared across all other crates:
//! identifiers, geometry helpers, damage and outfit definitions, events,
//! configuration, and constants. It carries no simulation logic.

pub mod config;
pub mod constants;
pub mod damage;
pub mod enums;
pub mod error;
pub mod events;
pub mod outfit;
pub mod types;
