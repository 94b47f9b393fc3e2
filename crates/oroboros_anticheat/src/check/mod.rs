//! # Checks
//!
//! A check is a fixed violation-level state machine ([`Check`]) holding a
//! pluggable [`Analyzer`]. The analyzer decides pass/fail for one event;
//! the check owns decay, escalation, thresholds and flag rate limiting.
//!
//! ```text
//!   MoveEvent ──► Analyzer::evaluate ──► Verdict
//!                                          │
//!          Pass ──► reward (decay) ◄───────┤
//!          Fail ──► punish (+1, cap) ◄─────┤
//!                     │                    │
//!                     ├─► threshold? ──► SinkEvent::Punished
//!                     └─► resync?    ──► SinkEvent::Resync
//!   Inconclusive ──► no change ◄───────────┘
//! ```
//!
//! Sink events are collected into an [`Outcome`] and delivered only after
//! the engine lock is released, so a sink may call back into the pipeline
//! (kicking a player runs `remove_player`).

mod convergence;
mod engine;
mod inertia;

pub use convergence::{AimConvergence, CONVERGENCE_EPSILON, EYE_HEIGHT};
pub use engine::CheckEngine;
pub use inertia::Inertia;

use crate::config::CheckConfig;
use crate::event::{MoveEvent, Player, PlayerId};
use crate::player::PlayerEntityState;
use crate::sink::{Punishment, PunishmentSink, SinkEvent};
use oroboros_shared::Location;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Details of a failed evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Failure {
    /// Punish at an effective threshold of one unit.
    pub instant: bool,
    /// Requested corrective location, if the check wants a cancel.
    pub resync: Option<Location>,
}

impl Failure {
    /// Gradual failure without a cancel request.
    #[must_use]
    pub const fn plain() -> Self {
        Self { instant: false, resync: None }
    }

    /// Failure that punishes on the first unit.
    #[must_use]
    pub const fn instant() -> Self {
        Self { instant: true, resync: None }
    }

    /// Gradual failure that requests a resync to `location`.
    #[must_use]
    pub const fn resync(location: Location) -> Self {
        Self { instant: false, resync: Some(location) }
    }
}

/// Outcome of one evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    /// Behavior looks legitimate.
    Pass,
    /// Behavior is anomalous.
    Fail(Failure),
    /// Not enough information; state is left alone.
    Inconclusive,
}

/// Result of analyzing one inbound packet.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    /// False if a check cancelled the packet.
    pub allowed: bool,
    /// Punishments and resyncs not yet handed to the sink.
    pub events: Vec<SinkEvent>,
}

impl Outcome {
    /// Allowed, nothing to deliver.
    #[must_use]
    pub const fn pass() -> Self {
        Self { allowed: true, events: Vec::new() }
    }

    /// Hands every event to `sink` in order. Returns [`Self::allowed`].
    pub fn deliver(self, sink: &dyn PunishmentSink) -> bool {
        for event in self.events {
            match event {
                SinkEvent::Punished(punishment) => sink.punishment_triggered(&punishment),
                SinkEvent::Resync { player, location } => sink.force_resync(&player, location),
            }
        }
        self.allowed
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::pass()
    }
}

/// Evaluation logic of one check.
pub trait Analyzer: Send {
    /// Judges one movement step.
    ///
    /// May update analyzer scratch in `state` but never violation levels.
    fn evaluate(&self, event: &MoveEvent, state: &mut PlayerEntityState) -> Verdict;
}

/// Violation state of one player for one check.
#[derive(Clone, Debug, Default)]
struct ViolationRecord {
    level: f64,
    flags: VecDeque<Instant>,
}

/// A configured check with per-player violation levels.
pub struct Check {
    config: CheckConfig,
    analyzer: Box<dyn Analyzer>,
    violations: HashMap<PlayerId, ViolationRecord>,
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("config", &self.config)
            .field("tracked_players", &self.violations.len())
            .finish_non_exhaustive()
    }
}

impl Check {
    /// Creates a check from its configuration and analyzer.
    #[must_use]
    pub fn new(config: CheckConfig, analyzer: impl Analyzer + 'static) -> Self {
        Self {
            config,
            analyzer: Box::new(analyzer),
            violations: HashMap::new(),
        }
    }

    /// The inertia check with the given configuration.
    #[must_use]
    pub fn inertia(config: CheckConfig) -> Self {
        Self::new(config, Inertia)
    }

    /// The aim convergence check with the given configuration.
    #[must_use]
    pub fn convergence(config: CheckConfig) -> Self {
        Self::new(config, AimConvergence)
    }

    /// Check configuration.
    #[must_use]
    pub const fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Check name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current violation level of a player (zero if untracked).
    #[must_use]
    pub fn violation_level(&self, player: PlayerId) -> f64 {
        self.violations.get(&player).map_or(0.0, |record| record.level)
    }

    /// Runs the analyzer and applies the verdict. Returns true if the
    /// event should be cancelled.
    pub fn run(
        &mut self,
        event: &MoveEvent,
        state: &mut PlayerEntityState,
        player: &Player,
        outbox: &mut Vec<SinkEvent>,
    ) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.analyzer.evaluate(event, state) {
            Verdict::Pass => {
                self.reward(player.id);
                false
            }
            Verdict::Fail(failure) => self.punish(player, failure, outbox),
            Verdict::Inconclusive => false,
        }
    }

    /// Decays the player's level toward zero.
    pub fn reward(&mut self, player: PlayerId) {
        if let Some(record) = self.violations.get_mut(&player) {
            record.level = self.config.decay.apply(record.level);
        }
    }

    /// Raises the player's level by one unit and punishes at threshold.
    ///
    /// Sink events go to `outbox`. Returns true if a requested resync was
    /// honored (event cancelled).
    pub fn punish(&mut self, player: &Player, failure: Failure, outbox: &mut Vec<SinkEvent>) -> bool {
        let config = &self.config;
        let record = self.violations.entry(player.id).or_default();
        record.level = (record.level + 1.0).min(config.violation_cap);

        let threshold = if failure.instant {
            config.punish_threshold.min(1.0)
        } else {
            config.punish_threshold
        };

        if record.level >= threshold && Self::admit_flag(config, record, Instant::now()) {
            outbox.push(SinkEvent::Punished(Punishment {
                player: player.clone(),
                check: config.name.clone(),
                violation_level: record.level,
                message: config.format_message(&player.name, record.level),
            }));
        }

        match failure.resync {
            Some(location) if config.resync_threshold.map_or(true, |t| record.level >= t) => {
                outbox.push(SinkEvent::Resync { player: player.clone(), location });
                true
            }
            _ => false,
        }
    }

    /// Forgets everything about a player.
    pub fn remove_data(&mut self, player: PlayerId) {
        self.violations.remove(&player);
    }

    fn admit_flag(config: &CheckConfig, record: &mut ViolationRecord, now: Instant) -> bool {
        let Some(limit) = config.flag_limit else {
            return true;
        };
        let window = Duration::from_millis(limit.window_ms);
        while record
            .flags
            .front()
            .is_some_and(|&at| now.duration_since(at) >= window)
        {
            record.flags.pop_front();
        }
        if record.flags.len() < limit.max_flags as usize {
            record.flags.push_back(now);
            true
        } else {
            false
        }
    }
}
