//! # Pending Queue
//!
//! The only structure shared between producers and the async worker.
//!
//! ```text
//!   producers ──push──►  [ e0 e1 e2 | e3 e4 ]   ◄── appended mid-drain
//!                          └─ batch ─┘
//!   worker: next_batch() copies e0..e2, dispatches, remove_prefix(gen, 3)
//! ```
//!
//! The worker removes exactly the prefix it copied, so entries appended
//! while a batch is in flight are neither lost nor processed twice.

use crate::event::{Direction, Packet, Player};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// A packet waiting for analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedPacket {
    /// The packet.
    pub packet: Packet,
    /// Owning player.
    pub player: Player,
    /// Travel direction.
    pub direction: Direction,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<QueuedPacket>,
    running: bool,
    /// Bumped on every start so a stale worker cannot resume.
    generation: u64,
}

/// FIFO of packets with batch drain and cooperative wake/sleep.
#[derive(Debug, Default)]
pub struct PendingQueue {
    state: Mutex<QueueState>,
    signal: Condvar,
}

impl PendingQueue {
    /// Creates a stopped, empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the queue for producers. Returns the worker generation.
    pub fn start(&self) -> u64 {
        let mut state = self.state.lock();
        state.running = true;
        state.generation += 1;
        state.generation
    }

    /// Closes the queue and wakes the worker once.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.signal.notify_one();
    }

    /// Appends an entry and wakes the worker. Returns false if stopped.
    pub fn push(&self, entry: QueuedPacket) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }
        state.entries.push_back(entry);
        self.signal.notify_one();
        true
    }

    /// Blocks until entries are pending, then copies all of them.
    ///
    /// Returns `None` once the queue is stopped or the generation is
    /// stale; pending entries are left in place.
    pub fn next_batch(&self, generation: u64) -> Option<Vec<QueuedPacket>> {
        let mut state = self.state.lock();
        loop {
            if !state.running || state.generation != generation {
                return None;
            }
            if !state.entries.is_empty() {
                let len = state.entries.len();
                return Some(state.entries.iter().take(len).cloned().collect());
            }
            self.signal.wait(&mut state);
        }
    }

    /// Removes the first `count` entries. Returns true if more are pending.
    ///
    /// No-op for a stale `generation`: the entries now queued belong to a
    /// newer worker that has not copied them.
    pub fn remove_prefix(&self, generation: u64, count: usize) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let count = count.min(state.entries.len());
        state.entries.drain(..count);
        !state.entries.is_empty()
    }

    /// True while `generation` is the running worker generation.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.running && state.generation == generation
    }

    /// Drops every pending entry. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        dropped
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn entry(id: u16) -> QueuedPacket {
        QueuedPacket {
            packet: Packet::Opaque { id, payload: Arc::from(&[][..]) },
            player: Player::new(1, "alex"),
            direction: Direction::Inbound,
        }
    }

    fn ids(batch: &[QueuedPacket]) -> Vec<u16> {
        batch
            .iter()
            .map(|e| match e.packet {
                Packet::Opaque { id, .. } => id,
                Packet::Move(_) => u16::MAX,
            })
            .collect()
    }

    #[test]
    fn test_stopped_queue_rejects_pushes() {
        let queue = PendingQueue::new();
        assert!(!queue.push(entry(0)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_prefix_keeps_tail_appended_mid_drain() {
        let queue = PendingQueue::new();
        let generation = queue.start();
        queue.push(entry(0));
        queue.push(entry(1));

        let batch = queue.next_batch(generation).unwrap();
        assert_eq!(ids(&batch), vec![0, 1]);

        // Producer appends while the batch is in flight
        queue.push(entry(2));
        queue.push(entry(3));

        assert!(queue.remove_prefix(generation, batch.len()));
        let batch = queue.next_batch(generation).unwrap();
        assert_eq!(ids(&batch), vec![2, 3]);
        assert!(!queue.remove_prefix(generation, batch.len()));
    }

    #[test]
    fn test_stop_wakes_blocked_worker() {
        let queue = Arc::new(PendingQueue::new());
        let generation = queue.start();

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.next_batch(generation))
        };

        queue.stop();
        assert!(worker.join().unwrap().is_none());
    }

    #[test]
    fn test_push_wakes_blocked_worker() {
        let queue = Arc::new(PendingQueue::new());
        let generation = queue.start();

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.next_batch(generation))
        };

        queue.push(entry(9));
        assert_eq!(ids(&worker.join().unwrap().unwrap()), vec![9]);
    }

    #[test]
    fn test_stale_generation_gets_nothing() {
        let queue = PendingQueue::new();
        let old = queue.start();
        queue.stop();
        let current = queue.start();
        queue.push(entry(0));

        assert!(queue.next_batch(old).is_none());
        assert!(queue.next_batch(current).is_some());
    }

    #[test]
    fn test_clear_after_shrink_is_safe() {
        let queue = PendingQueue::new();
        let generation = queue.start();
        queue.push(entry(0));
        queue.push(entry(1));
        let batch = queue.next_batch(generation).unwrap();

        assert_eq!(queue.clear(), 2);
        assert!(!queue.remove_prefix(generation, batch.len()));
    }

    #[test]
    fn test_stale_worker_cannot_remove_newer_entries() {
        let queue = PendingQueue::new();
        let old = queue.start();
        queue.push(entry(0));
        let batch = queue.next_batch(old).unwrap();

        // Restarted while the old batch is still in flight
        queue.stop();
        queue.clear();
        let current = queue.start();
        queue.push(entry(100));
        queue.push(entry(101));

        assert!(!queue.is_current(old));
        assert!(queue.is_current(current));
        assert!(!queue.remove_prefix(old, batch.len()));
        assert_eq!(queue.len(), 2);
        assert_eq!(ids(&queue.next_batch(current).unwrap()), vec![100, 101]);
    }
}
