//! The event sink the simulation reports into.
//!
//! The sink is injected by the embedding game layer (scripting, missions,
//! UI). Callbacks that fire at a moment where game logic is allowed to
//! mutate the subject receive `&mut Pilot`; the simulation re-checks the
//! relevant state after each such call instead of assuming the callback
//! was pure. Everything else arrives as a plain [`CombatEvent`].

use kessler_core::events::CombatEvent;
use kessler_core::outfit::Outfit;
use kessler_core::types::PilotId;

use crate::pilot::Pilot;

pub trait CombatEventSink {
    /// A weapon hit landed on `pilot`. `real_damage` is the amount actually
    /// applied after absorption. Only fired when the source outfit declares
    /// an impact hook.
    fn on_hit(
        &mut self,
        pilot: &mut Pilot,
        shooter: Option<PilotId>,
        outfit: &Outfit,
        real_damage: f64,
    ) {
        let _ = (pilot, shooter, outfit, real_damage);
    }

    /// `pilot` ran out of armour. The callback may heal the pilot; the
    /// death sequence only proceeds if armour is still depleted afterward.
    fn on_death(&mut self, pilot: &mut Pilot, killer: Option<PilotId>) {
        let _ = (pilot, killer);
    }

    /// `pilot` became disabled.
    fn on_disable(&mut self, pilot: &mut Pilot, attacker: Option<PilotId>) {
        let _ = (pilot, attacker);
    }

    /// Notification-only event; the subject is identified by id.
    fn event(&mut self, ev: CombatEvent) {
        let _ = ev;
    }
}

/// Sink that discards everything. Useful for tests and headless runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl CombatEventSink for NullSink {}

/// Sink that records plain events in order. Test helper.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<CombatEvent>,
    pub deaths: Vec<PilotId>,
    pub disables: Vec<PilotId>,
}

impl CombatEventSink for RecordingSink {
    fn on_death(&mut self, pilot: &mut Pilot, _killer: Option<PilotId>) {
        self.deaths.push(pilot.id);
    }

    fn on_disable(&mut self, pilot: &mut Pilot, _attacker: Option<PilotId>) {
        self.disables.push(pilot.id);
    }

    fn event(&mut self, ev: CombatEvent) {
        self.events.push(ev);
    }
}
