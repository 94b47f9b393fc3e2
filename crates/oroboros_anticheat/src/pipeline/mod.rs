//! # Packet Dispatch Pipeline
//!
//! Decouples packet capture from analysis.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PACKET PIPELINE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Network / sim threads          Async check worker          │
//! │  ┌──────────────┐  push+signal  ┌──────────────────┐        │
//! │  │ process_in   │──────────────►│ snapshot N       │        │
//! │  │ process_out  │   [queue]     │ dispatch N       │        │
//! │  │ move_event   │               │ remove exactly N │        │
//! │  └──────────────┘               └────────┬─────────┘        │
//! │         │ (sync mode)                     │                  │
//! │         └──────────► adapters ──► CheckEngine ──► sink      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modes
//!
//! - **Sync**: analysis runs on the caller thread and inbound packets can
//!   be vetoed.
//! - **Async**: the caller only enqueues; a single worker analyzes. Vetoes
//!   are impossible, resyncs still go out through the sink.
//!
//! Either way exactly one thread analyzes at a time, so per-player state
//! needs no fine-grained locking.

mod adapter;
mod queue;

pub use adapter::{AdapterId, ChannelInjector, NoopInjector, PacketAdapter};
pub use queue::{PendingQueue, QueuedPacket};

use crate::check::CheckEngine;
use crate::config::AntiCheatConfig;
use crate::error::{AnalysisFault, AnalysisResult, PipelineError};
use crate::event::{Direction, MoveEvent, Packet, Player, PlayerId};
use crate::sink::PunishmentSink;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Name of the async worker thread.
pub const WORKER_THREAD_NAME: &str = "oroboros-async-checks";

/// Pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Packets queued for the worker.
    pub enqueued: u64,
    /// Packets dispatched to adapters and the engine.
    pub dispatched: u64,
    /// Dispatches that ended in a fault.
    pub faults: u64,
    /// Batches drained by the worker.
    pub batches: u64,
    /// Queued packets dropped at shutdown.
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    enqueued: AtomicU64,
    dispatched: AtomicU64,
    faults: AtomicU64,
    batches: AtomicU64,
    discarded: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

type AdapterList = RwLock<Vec<(AdapterId, Arc<dyn PacketAdapter>)>>;

/// State shared with the worker thread.
struct Shared {
    queue: PendingQueue,
    engine: Arc<Mutex<CheckEngine>>,
    sink: Arc<dyn PunishmentSink>,
    adapters_inbound: AdapterList,
    adapters_outbound: AdapterList,
    stats: StatsCounters,
}

impl Shared {
    fn dispatch(&self, packet: &Packet, player: &Player, direction: Direction) -> bool {
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match direction {
            Direction::Inbound => self.dispatch_inbound(packet, player),
            Direction::Outbound => self.dispatch_outbound(packet, player).map(|()| true),
        }));

        let fault = match outcome {
            Ok(Ok(allowed)) => return allowed,
            Ok(Err(fault)) => fault,
            Err(payload) => AnalysisFault::Panicked { reason: panic_reason(payload.as_ref()) },
        };

        // Fail open: a broken check never drops the packet
        self.stats.faults.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            "Analysis fault on {} {} packet for player {}: {}",
            direction.as_str(),
            packet.kind(),
            player.id,
            fault
        );
        true
    }

    fn dispatch_inbound(&self, packet: &Packet, player: &Player) -> AnalysisResult<bool> {
        for adapter in snapshot(&self.adapters_inbound) {
            adapter.run(packet, player)?;
        }
        let outcome = self.engine.lock().process_in(packet, player)?;
        // Engine is unlocked here: a sink that kicks re-enters remove_player
        Ok(outcome.deliver(self.sink.as_ref()))
    }

    fn dispatch_outbound(&self, packet: &Packet, player: &Player) -> AnalysisResult<()> {
        for adapter in snapshot(&self.adapters_outbound) {
            adapter.run(packet, player)?;
        }
        self.engine.lock().process_out(packet, player)
    }

    fn worker_loop(&self, generation: u64) {
        tracing::info!("Async check worker started (generation {})", generation);

        while let Some(batch) = self.queue.next_batch(generation) {
            for entry in &batch {
                // A check may have restarted the pipeline mid-batch
                if !self.queue.is_current(generation) {
                    break;
                }
                self.dispatch(&entry.packet, &entry.player, entry.direction);
            }
            self.stats.batches.fetch_add(1, Ordering::Relaxed);
            let more = self.queue.remove_prefix(generation, batch.len());
            tracing::trace!("Drained batch of {} (more pending: {})", batch.len(), more);
        }

        tracing::info!("Async check worker stopped (generation {})", generation);
    }
}

/// Copies the adapter list so adapters run without holding the lock.
fn snapshot(list: &AdapterList) -> Vec<Arc<dyn PacketAdapter>> {
    list.read().iter().map(|(_, adapter)| Arc::clone(adapter)).collect()
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        (*reason).to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Packet interception front end for one check engine.
pub struct PacketPipeline {
    shared: Arc<Shared>,
    async_mode: bool,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    injector: Arc<dyn ChannelInjector>,
    hooked: Mutex<HashSet<PlayerId>>,
    next_adapter: AtomicU64,
}

impl std::fmt::Debug for PacketPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketPipeline")
            .field("async_mode", &self.async_mode)
            .field("running", &self.is_running())
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl PacketPipeline {
    /// Creates a stopped pipeline around an engine.
    #[must_use]
    pub fn new(engine: CheckEngine, async_mode: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: PendingQueue::new(),
                sink: engine.sink(),
                engine: Arc::new(Mutex::new(engine)),
                adapters_inbound: RwLock::new(Vec::new()),
                adapters_outbound: RwLock::new(Vec::new()),
                stats: StatsCounters::default(),
            }),
            async_mode,
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
            injector: Arc::new(NoopInjector),
            hooked: Mutex::new(HashSet::new()),
            next_adapter: AtomicU64::new(0),
        }
    }

    /// Creates a stopped pipeline with the built-in checks.
    #[must_use]
    pub fn from_config(config: &AntiCheatConfig, sink: Arc<dyn PunishmentSink>) -> Self {
        Self::new(
            CheckEngine::from_config(&config.checks, sink),
            config.pipeline.async_checks,
        )
    }

    /// Replaces the connection injector.
    #[must_use]
    pub fn with_injector(mut self, injector: Arc<dyn ChannelInjector>) -> Self {
        self.injector = injector;
        self
    }

    /// Starts accepting packets. In async mode, spawns the worker.
    pub fn enable(&self) -> Result<(), PipelineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.async_mode {
            let generation = self.shared.queue.start();
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(WORKER_THREAD_NAME.to_string())
                .spawn(move || shared.worker_loop(generation));

            match spawned {
                Ok(handle) => *self.worker.lock() = Some(handle),
                Err(err) => {
                    self.shared.queue.stop();
                    self.running.store(false, Ordering::SeqCst);
                    return Err(PipelineError::WorkerSpawn(err));
                }
            }
        }
        tracing::info!("Packet pipeline enabled (async: {})", self.async_mode);
        Ok(())
    }

    /// Stops accepting packets, detaches every player, and stops the worker.
    ///
    /// Packets still queued are dropped.
    pub fn disable(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.async_mode {
            self.shared.queue.stop();
            let handle = self.worker.lock().take();
            if let Some(handle) = handle {
                // A check that disables the pipeline runs on the worker itself
                if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                    tracing::error!("Async check worker panicked");
                }
            }
            let discarded = self.shared.queue.clear();
            self.shared.stats.discarded.fetch_add(discarded as u64, Ordering::Relaxed);
            if discarded > 0 {
                tracing::debug!("Discarded {} queued packets on shutdown", discarded);
            }
        }
        self.injector.eject_all();
        self.hooked.lock().clear();
        tracing::info!("Packet pipeline disabled");
    }

    /// Starts intercepting a player's connection.
    pub fn add_listener(&self, player: &Player) {
        self.injector.inject(player);
        self.hooked.lock().insert(player.id);
    }

    /// Players currently hooked.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.hooked.lock().len()
    }

    /// Handles an inbound packet. Returns false if it should be dropped.
    ///
    /// Always true in async mode or when stopped.
    pub fn process_inbound(&self, packet: Packet, player: &Player) -> bool {
        if !self.is_running() {
            return true;
        }
        if self.async_mode {
            self.enqueue(packet, player, Direction::Inbound);
            return true;
        }
        self.shared.dispatch(&packet, player, Direction::Inbound)
    }

    /// Handles an outbound packet.
    pub fn process_outbound(&self, packet: Packet, player: &Player) {
        if !self.is_running() {
            return;
        }
        if self.async_mode {
            self.enqueue(packet, player, Direction::Outbound);
            return;
        }
        self.shared.dispatch(&packet, player, Direction::Outbound);
    }

    /// Handles one movement step. See [`Self::process_inbound`].
    pub fn move_event(&self, player: &Player, event: MoveEvent) -> bool {
        self.process_inbound(Packet::Move(event), player)
    }

    /// Purges a disconnected player from every check.
    ///
    /// Safe to call from a [`PunishmentSink`], which always runs with the
    /// engine unlocked.
    pub fn remove_player(&self, player: PlayerId) {
        self.shared.engine.lock().remove_data(player);
        self.hooked.lock().remove(&player);
    }

    /// Registers an adapter for inbound packets.
    pub fn add_adapter_inbound(&self, adapter: Arc<dyn PacketAdapter>) -> AdapterId {
        self.push_adapter(&self.shared.adapters_inbound, adapter)
    }

    /// Unregisters an inbound adapter. Returns true if it was registered.
    pub fn remove_adapter_inbound(&self, id: AdapterId) -> bool {
        remove_adapter(&self.shared.adapters_inbound, id)
    }

    /// Registers an adapter for outbound packets.
    pub fn add_adapter_outbound(&self, adapter: Arc<dyn PacketAdapter>) -> AdapterId {
        self.push_adapter(&self.shared.adapters_outbound, adapter)
    }

    /// Unregisters an outbound adapter. Returns true if it was registered.
    pub fn remove_adapter_outbound(&self, id: AdapterId) -> bool {
        remove_adapter(&self.shared.adapters_outbound, id)
    }

    /// The engine behind this pipeline.
    #[must_use]
    pub fn engine(&self) -> &Arc<Mutex<CheckEngine>> {
        &self.shared.engine
    }

    /// True if analysis runs on the async worker.
    #[inline]
    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.async_mode
    }

    /// True between `enable` and `disable`.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Packets waiting for the async worker.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.snapshot()
    }

    fn enqueue(&self, packet: Packet, player: &Player, direction: Direction) {
        let entry = QueuedPacket { packet, player: player.clone(), direction };
        if self.shared.queue.push(entry) {
            self.shared.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn push_adapter(&self, list: &AdapterList, adapter: Arc<dyn PacketAdapter>) -> AdapterId {
        let id = AdapterId(self.next_adapter.fetch_add(1, Ordering::Relaxed));
        list.write().push((id, adapter));
        id
    }
}

fn remove_adapter(list: &AdapterList, id: AdapterId) -> bool {
    let mut list = list.write();
    let before = list.len();
    list.retain(|(existing, _)| *existing != id);
    list.len() != before
}

impl Drop for PacketPipeline {
    fn drop(&mut self) {
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChecksConfig;
    use crate::sink::ChannelSink;
    use oroboros_shared::{Location, Vec3};
    use std::sync::atomic::AtomicUsize;

    /// Records every inject/eject call.
    #[derive(Default)]
    struct RecordingInjector {
        injected: AtomicUsize,
        ejected: AtomicUsize,
    }

    impl ChannelInjector for RecordingInjector {
        fn inject(&self, _player: &Player) {
            self.injected.fetch_add(1, Ordering::SeqCst);
        }

        fn eject_all(&self) {
            self.ejected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipeline(async_mode: bool) -> PacketPipeline {
        let (sink, _rx) = ChannelSink::unbounded();
        PacketPipeline::new(
            CheckEngine::from_config(&ChecksConfig::default(), Arc::new(sink)),
            async_mode,
        )
    }

    fn opaque() -> Packet {
        Packet::Opaque { id: 1, payload: Arc::from(&[0u8][..]) }
    }

    #[test]
    fn test_stopped_pipeline_ignores_packets() {
        let pipeline = pipeline(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        pipeline.add_adapter_inbound(Arc::new(move |_: &Packet, _: &Player| -> AnalysisResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert!(pipeline.process_inbound(opaque(), &Player::new(1, "alex")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.stats(), PipelineStats::default());
    }

    #[test]
    fn test_sync_dispatch_runs_adapters_in_caller_thread() {
        let pipeline = pipeline(false);
        pipeline.enable().unwrap();
        let caller = thread::current().id();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        pipeline.add_adapter_outbound(Arc::new(move |_: &Packet, _: &Player| -> AnalysisResult<()> {
            log.lock().push(thread::current().id());
            Ok(())
        }));

        pipeline.process_outbound(opaque(), &Player::new(1, "alex"));
        assert_eq!(*seen.lock(), vec![caller]);
        assert_eq!(pipeline.stats().dispatched, 1);
    }

    #[test]
    fn test_adapter_error_fails_open() {
        let pipeline = pipeline(false);
        pipeline.enable().unwrap();
        pipeline.add_adapter_inbound(Arc::new(|_: &Packet, _: &Player| -> AnalysisResult<()> {
            Err(AnalysisFault::Adapter { adapter: "broken".to_string(), reason: "boom".to_string() })
        }));

        assert!(pipeline.process_inbound(opaque(), &Player::new(1, "alex")));
        assert_eq!(pipeline.stats().faults, 1);
    }

    #[test]
    fn test_removed_adapter_no_longer_runs() {
        let pipeline = pipeline(false);
        pipeline.enable().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = pipeline.add_adapter_inbound(Arc::new(move |_: &Packet, _: &Player| -> AnalysisResult<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        pipeline.process_inbound(opaque(), &Player::new(1, "alex"));
        assert!(pipeline.remove_adapter_inbound(id));
        assert!(!pipeline.remove_adapter_inbound(id));
        pipeline.process_inbound(opaque(), &Player::new(1, "alex"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disable_ejects_all_listeners() {
        let injector = Arc::new(RecordingInjector::default());
        let pipeline = pipeline(true).with_injector(Arc::clone(&injector) as Arc<dyn ChannelInjector>);
        pipeline.enable().unwrap();
        pipeline.add_listener(&Player::new(1, "alex"));
        pipeline.add_listener(&Player::new(2, "sam"));
        assert_eq!(pipeline.listener_count(), 2);

        pipeline.disable();
        assert!(!pipeline.is_running());
        assert_eq!(injector.injected.load(Ordering::SeqCst), 2);
        assert_eq!(injector.ejected.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.listener_count(), 0);
    }

    #[test]
    fn test_enable_twice_is_idempotent() {
        let pipeline = pipeline(true);
        pipeline.enable().unwrap();
        pipeline.enable().unwrap();
        pipeline.disable();
        pipeline.disable();
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_sync_move_updates_engine() {
        let pipeline = pipeline(false);
        pipeline.enable().unwrap();
        let player = Player::new(4, "kai");
        let event = MoveEvent::new(
            Location::new(Vec3::new(0.0, 64.0, 0.0), 0.0, 0.0),
            Location::new(Vec3::new(0.0, 64.0, 0.2), 0.0, 0.0),
            Vec3::ZERO,
            1,
        );

        assert!(pipeline.move_event(&player, event));
        assert_eq!(pipeline.engine().lock().tracked_players(), 1);

        pipeline.remove_player(player.id);
        assert_eq!(pipeline.engine().lock().tracked_players(), 0);
    }

    #[test]
    fn test_panic_reason_extraction() {
        assert_eq!(panic_reason(&"static"), "static");
        assert_eq!(panic_reason(&String::from("owned")), "owned");
        assert_eq!(panic_reason(&42u32), "unknown panic payload");
    }
}
