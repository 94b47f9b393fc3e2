//! # Player Entity State
//!
//! Ephemeral per-player data the checks read and write. Entries are
//! created on the first event for an id and live until removed.

use crate::event::{MoveEvent, PlayerId};
use oroboros_shared::Vec3;
use std::collections::HashMap;

/// Per-player telemetry and analyzer scratch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerEntityState {
    /// Known velocity entering the current step.
    pub velocity: Vec3,
    /// Tick of the current step.
    pub current_tick: u64,
    /// On ground after the last completed step. Checks treat it as a
    /// second source for "was on ground".
    pub on_ground: bool,
    /// Last tick the player was observed on ground.
    pub last_tick_on_ground: Option<u64>,
    /// Completed steps since the entry was created.
    pub samples: u64,
    /// Convergence point of the previous look sample.
    pub last_convergence: Option<Vec3>,
}

impl PlayerEntityState {
    /// True until the first step has completed.
    #[must_use]
    pub const fn is_first_observation(&self) -> bool {
        self.samples == 0
    }

    /// Ticks since the player last stood on ground.
    ///
    /// A player never seen on ground counts from tick `-1`.
    #[must_use]
    pub fn ticks_since_ground(&self) -> u64 {
        match self.last_tick_on_ground {
            Some(tick) => self.current_tick.saturating_sub(tick),
            None => self.current_tick.saturating_add(1),
        }
    }

    /// Loads the step's snapshot before checks run.
    pub fn begin_step(&mut self, event: &MoveEvent) {
        self.velocity = event.velocity;
        self.current_tick = event.tick;
        if event.on_ground {
            self.last_tick_on_ground = Some(event.tick);
        }
    }

    /// Commits the step after checks ran.
    pub fn end_step(&mut self, event: &MoveEvent) {
        self.on_ground = event.on_ground;
        self.samples += 1;
    }
}

/// Map of player state, keyed by id.
#[derive(Debug, Default)]
pub struct PlayerStore {
    states: HashMap<PlayerId, PlayerEntityState>,
}

impl PlayerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a player, created on first access.
    pub fn get_or_create(&mut self, id: PlayerId) -> &mut PlayerEntityState {
        self.states.entry(id).or_default()
    }

    /// State for a player, if any.
    #[must_use]
    pub fn get(&self, id: PlayerId) -> Option<&PlayerEntityState> {
        self.states.get(&id)
    }

    /// Drops the player's state. Returns true if it existed.
    pub fn remove(&mut self, id: PlayerId) -> bool {
        self.states.remove(&id).is_some()
    }

    /// Number of tracked players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when no player is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
