//! # Punishment Sinks
//!
//! The downstream side of the engine. Kicking, banning and staff
//! notification live behind [`PunishmentSink`]; the engine only reports.

use crate::event::Player;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use oroboros_shared::Location;

/// A check crossed its punishment threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct Punishment {
    /// Offending player.
    pub player: Player,
    /// Check name.
    pub check: String,
    /// Violation level after the failing evaluation.
    pub violation_level: f64,
    /// Formatted message template.
    pub message: String,
}

/// Consumer of punishments and resync requests.
///
/// Called from whichever thread runs analysis, so implementations must
/// return quickly.
pub trait PunishmentSink: Send + Sync {
    /// A punishment threshold was reached.
    fn punishment_triggered(&self, punishment: &Punishment);

    /// The player should be rubberbanded to `location`.
    fn force_resync(&self, _player: &Player, _location: Location) {}
}

/// Sink that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl PunishmentSink for LogSink {
    fn punishment_triggered(&self, punishment: &Punishment) {
        tracing::warn!(
            "[{}] {} (player {})",
            punishment.check,
            punishment.message,
            punishment.player.id
        );
    }

    fn force_resync(&self, player: &Player, location: Location) {
        tracing::debug!(
            "Resync {} to ({:.3}, {:.3}, {:.3})",
            player.name,
            location.position.x,
            location.position.y,
            location.position.z
        );
    }
}

/// Event forwarded by [`ChannelSink`].
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    /// See [`PunishmentSink::punishment_triggered`].
    Punished(Punishment),
    /// See [`PunishmentSink::force_resync`].
    Resync {
        /// Player to correct.
        player: Player,
        /// Corrected location.
        location: Location,
    },
}

/// Sink that forwards everything over a channel.
///
/// Never blocks: when a bounded channel is full the event is dropped
/// and logged.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
}

impl ChannelSink {
    /// Creates a sink backed by a bounded channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<SinkEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }

    /// Creates a sink backed by an unbounded channel.
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<SinkEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: SinkEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Punishment channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Punishment channel closed");
            }
        }
    }
}

impl PunishmentSink for ChannelSink {
    fn punishment_triggered(&self, punishment: &Punishment) {
        self.send(SinkEvent::Punished(punishment.clone()));
    }

    fn force_resync(&self, player: &Player, location: Location) {
        self.send(SinkEvent::Resync { player: player.clone(), location });
    }
}
