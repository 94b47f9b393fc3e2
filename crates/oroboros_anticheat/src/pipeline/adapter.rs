//! # Pipeline Seams
//!
//! Upstream hooks: adapters that see every packet before the engine, and
//! the injector that attaches the pipeline to a player's connection.

use crate::error::AnalysisResult;
use crate::event::{Packet, Player};

/// Handle returned when an adapter is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AdapterId(pub u64);

/// Per-packet hook run before the check engine.
///
/// An error aborts dispatch of that packet only.
pub trait PacketAdapter: Send + Sync {
    /// Inspects one packet.
    fn run(&self, packet: &Packet, player: &Player) -> AnalysisResult<()>;
}

impl<F> PacketAdapter for F
where
    F: Fn(&Packet, &Player) -> AnalysisResult<()> + Send + Sync,
{
    fn run(&self, packet: &Packet, player: &Player) -> AnalysisResult<()> {
        self(packet, player)
    }
}

/// Attaches and detaches the pipeline from player connections.
pub trait ChannelInjector: Send + Sync {
    /// Starts intercepting this player's packets.
    fn inject(&self, player: &Player);

    /// Stops intercepting every player's packets.
    fn eject_all(&self);
}

/// Injector for hosts that feed the pipeline directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInjector;

impl ChannelInjector for NoopInjector {
    fn inject(&self, _player: &Player) {}

    fn eject_all(&self) {}
}
