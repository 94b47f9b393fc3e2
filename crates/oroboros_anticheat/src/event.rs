//! # Packets and Movement Events
//!
//! Everything arrives already parsed. The network layer owns decoding;
//! this crate only sees the result.

use oroboros_shared::{Location, Vec3};
use std::fmt;
use std::sync::Arc;

/// Opaque player identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a connected player. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    /// Identifier.
    pub id: PlayerId,
    /// Display name, used in punishment messages.
    pub name: Arc<str>,
}

impl Player {
    /// Creates a new player handle.
    #[must_use]
    pub fn new(id: u64, name: &str) -> Self {
        Self { id: PlayerId(id), name: Arc::from(name) }
    }
}

/// Which way a packet travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    Inbound,
    /// Server to client.
    Outbound,
}

impl Direction {
    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Environment flags the game engine computes for one movement step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct MoveFlags {
    /// Move was a teleport.
    pub teleported: bool,
    /// A knockback was accepted on this step.
    pub accepted_knockback: bool,
    /// A slowdown (e.g. hitting while sprinting) applied on this step.
    pub hit_slowdown: bool,
    /// Hitbox touches a block.
    pub touching_blocks: bool,
    /// Solid block adjacent at feet level of the destination.
    pub solid_near_feet: bool,
    /// Solid block adjacent at head level of the destination.
    pub solid_near_head: bool,
    /// Liquid adjacent at feet level of the origin.
    pub liquid_near_feet: bool,
    /// Liquid adjacent at head level of the origin.
    pub liquid_near_head: bool,
    /// Player is flying.
    pub flying: bool,
    /// Player is riding a vehicle.
    pub in_vehicle: bool,
}

/// One simulated movement step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveEvent {
    /// Location before the step.
    pub from: Location,
    /// Location after the step.
    pub to: Location,
    /// Known velocity entering this step.
    pub velocity: Vec3,
    /// On ground before the step.
    pub was_on_ground: bool,
    /// On ground after the step.
    pub on_ground: bool,
    /// Environment flags.
    pub flags: MoveFlags,
    /// Server tick of this step.
    pub tick: u64,
}

impl MoveEvent {
    /// Creates a plain airborne move with no flags set.
    #[must_use]
    pub fn new(from: Location, to: Location, velocity: Vec3, tick: u64) -> Self {
        Self {
            from,
            to,
            velocity,
            was_on_ground: false,
            on_ground: false,
            flags: MoveFlags::default(),
            tick,
        }
    }

    /// Position change of this step.
    #[must_use]
    pub fn delta(&self) -> Vec3 {
        self.to.position - self.from.position
    }

    /// True when the position changed (not a look-only update).
    #[must_use]
    pub fn has_delta_pos(&self) -> bool {
        self.from.position != self.to.position
    }
}

/// A parsed packet.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// Movement/look sample.
    Move(MoveEvent),
    /// Anything the current checks do not interpret.
    Opaque {
        /// Protocol packet id.
        id: u16,
        /// Raw payload.
        payload: Arc<[u8]>,
    },
}

impl Packet {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Move(_) => "move",
            Self::Opaque { .. } => "opaque",
        }
    }
}
