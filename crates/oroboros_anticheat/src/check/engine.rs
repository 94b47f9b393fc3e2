//! # Check Engine
//!
//! Owns the check catalog and the player state store. One engine sits
//! behind one pipeline, which guarantees a single analyzing thread.
//!
//! The engine never calls its sink itself. Analysis returns an
//! [`Outcome`] and the caller delivers it once the engine is unlocked.

use super::{Check, Outcome};
use crate::config::ChecksConfig;
use crate::error::{AnalysisFault, AnalysisResult};
use crate::event::{MoveEvent, Packet, Player, PlayerId};
use crate::player::{PlayerEntityState, PlayerStore};
use crate::sink::PunishmentSink;
use std::sync::Arc;

/// Runs every registered check against incoming packets.
pub struct CheckEngine {
    checks: Vec<Check>,
    players: PlayerStore,
    sink: Arc<dyn PunishmentSink>,
}

impl std::fmt::Debug for CheckEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckEngine")
            .field("checks", &self.checks)
            .field("tracked_players", &self.players.len())
            .finish_non_exhaustive()
    }
}

impl CheckEngine {
    /// Creates an engine with no checks.
    #[must_use]
    pub fn new(sink: Arc<dyn PunishmentSink>) -> Self {
        Self {
            checks: Vec::new(),
            players: PlayerStore::new(),
            sink,
        }
    }

    /// Creates an engine with the built-in catalog.
    #[must_use]
    pub fn from_config(config: &ChecksConfig, sink: Arc<dyn PunishmentSink>) -> Self {
        let mut engine = Self::new(sink);
        engine.register(Check::inertia(config.inertia()));
        engine.register(Check::convergence(config.convergence()));
        engine
    }

    /// Adds a check. Checks run in registration order.
    pub fn register(&mut self, check: Check) {
        tracing::info!("Registered check: {} (enabled: {})", check.name(), check.config().enabled);
        self.checks.push(check);
    }

    /// Downstream sink for delivering outcomes.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn PunishmentSink> {
        Arc::clone(&self.sink)
    }

    /// Registered checks.
    #[must_use]
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Violation level of a player for a named check.
    #[must_use]
    pub fn violation_level(&self, check: &str, player: PlayerId) -> Option<f64> {
        self.checks
            .iter()
            .find(|c| c.name() == check)
            .map(|c| c.violation_level(player))
    }

    /// Stored state of a player, if any.
    #[must_use]
    pub fn player_state(&self, player: PlayerId) -> Option<&PlayerEntityState> {
        self.players.get(player)
    }

    /// Number of players with stored state.
    #[must_use]
    pub fn tracked_players(&self) -> usize {
        self.players.len()
    }

    /// Analyzes an inbound packet. [`Outcome::allowed`] is false if it
    /// should be dropped.
    pub fn process_in(&mut self, packet: &Packet, player: &Player) -> AnalysisResult<Outcome> {
        match packet {
            Packet::Move(event) => self.handle_move(event, player),
            Packet::Opaque { .. } => Ok(Outcome::pass()),
        }
    }

    /// Analyzes an outbound packet.
    pub fn process_out(&mut self, packet: &Packet, player: &Player) -> AnalysisResult<()> {
        tracing::trace!("Outbound {} packet for {}", packet.kind(), player.id);
        Ok(())
    }

    /// Runs all checks for one movement step.
    pub fn handle_move(&mut self, event: &MoveEvent, player: &Player) -> AnalysisResult<Outcome> {
        validate(event)?;

        let state = self.players.get_or_create(player.id);
        state.begin_step(event);

        let mut events = Vec::new();
        let mut cancelled = false;
        for check in &mut self.checks {
            cancelled |= check.run(event, state, player, &mut events);
        }

        state.end_step(event);
        Ok(Outcome { allowed: !cancelled, events })
    }

    /// Purges a player from every check and from the state store.
    pub fn remove_data(&mut self, player: PlayerId) {
        for check in &mut self.checks {
            check.remove_data(player);
        }
        if self.players.remove(player) {
            tracing::debug!("Purged anti-cheat state for player {}", player);
        }
    }
}

fn validate(event: &MoveEvent) -> AnalysisResult<()> {
    if !event.from.is_finite() {
        return Err(AnalysisFault::NonFinite { field: "from" });
    }
    if !event.to.is_finite() {
        return Err(AnalysisFault::NonFinite { field: "to" });
    }
    if !event.velocity.is_finite() {
        return Err(AnalysisFault::NonFinite { field: "velocity" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Analyzer, Failure, Verdict};
    use crate::config::CheckConfig;
    use crate::sink::{ChannelSink, LogSink, SinkEvent};
    use oroboros_shared::{Location, Vec3};

    /// Fails every step with a resync request.
    struct AlwaysFail;

    impl Analyzer for AlwaysFail {
        fn evaluate(&self, event: &MoveEvent, _state: &mut PlayerEntityState) -> Verdict {
            Verdict::Fail(Failure::resync(event.from))
        }
    }

    fn unlimited(mut config: CheckConfig) -> CheckConfig {
        config.flag_limit = None;
        config
    }

    fn step(tick: u64) -> MoveEvent {
        MoveEvent::new(
            Location::new(Vec3::new(0.0, 64.0, 0.0), 0.0, 0.0),
            Location::new(Vec3::new(0.0, 64.0, 0.1), 0.0, 0.0),
            Vec3::ZERO,
            tick,
        )
    }

    #[test]
    fn test_state_created_lazily_and_purged() {
        let (sink, _rx) = ChannelSink::unbounded();
        let mut engine = CheckEngine::from_config(&ChecksConfig::default(), Arc::new(sink));
        let player = Player::new(3, "sam");

        assert!(engine.player_state(player.id).is_none());
        engine.handle_move(&step(1), &player).unwrap();
        assert_eq!(engine.player_state(player.id).map(|s| s.samples), Some(1));

        engine.remove_data(player.id);
        assert!(engine.player_state(player.id).is_none());
        assert_eq!(engine.tracked_players(), 0);
    }

    #[test]
    fn test_failing_check_cancels_move() {
        let (sink, rx) = ChannelSink::unbounded();
        let mut engine = CheckEngine::new(Arc::new(sink));
        engine.register(Check::new(unlimited(CheckConfig::inertia()), AlwaysFail));
        let player = Player::new(3, "sam");

        let outcome = engine.process_in(&Packet::Move(step(1)), &player).unwrap();
        assert!(!outcome.allowed);
        assert_eq!(engine.violation_level("inertia", player.id), Some(1.0));

        // Nothing reaches the sink until the outcome is delivered
        assert!(rx.try_recv().is_err());
        assert!(!outcome.deliver(engine.sink().as_ref()));
        assert!(matches!(rx.try_recv().unwrap(), SinkEvent::Resync { .. }));
    }

    #[test]
    fn test_disabled_check_never_runs() {
        let mut engine = CheckEngine::new(Arc::new(LogSink));
        let mut config = CheckConfig::inertia();
        config.enabled = false;
        engine.register(Check::new(config, AlwaysFail));
        let player = Player::new(3, "sam");

        for tick in 1..10 {
            assert_eq!(engine.handle_move(&step(tick), &player).unwrap(), Outcome::pass());
        }
        assert_eq!(engine.violation_level("inertia", player.id), Some(0.0));
    }

    #[test]
    fn test_opaque_packets_pass_through() {
        let mut engine = CheckEngine::new(Arc::new(LogSink));
        engine.register(Check::new(CheckConfig::inertia(), AlwaysFail));
        let player = Player::new(3, "sam");
        let packet = Packet::Opaque { id: 0x0F, payload: Arc::from(&[1u8, 2, 3][..]) };

        assert_eq!(engine.process_in(&packet, &player).unwrap(), Outcome::pass());
        engine.process_out(&packet, &player).unwrap();
        assert_eq!(engine.tracked_players(), 0);
    }

    #[test]
    fn test_non_finite_event_is_a_fault() {
        let (sink, _rx) = ChannelSink::unbounded();
        let mut engine = CheckEngine::from_config(&ChecksConfig::default(), Arc::new(sink));
        let mut event = step(1);
        event.velocity = Vec3::new(f64::NAN, 0.0, 0.0);

        let err = engine.handle_move(&event, &Player::new(3, "sam")).unwrap_err();
        assert_eq!(err, AnalysisFault::NonFinite { field: "velocity" });
        assert_eq!(engine.tracked_players(), 0);
    }
}
