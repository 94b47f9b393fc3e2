//! # OROBOROS Anti-Cheat - The Watchtower
//!
//! Server-side movement and aim validation with a non-blocking packet
//! pipeline.
//!
//! ## Features
//!
//! - **Packet Pipeline**: sync (vetoing) or async (dedicated worker) dispatch
//! - **Violation Engine**: decay, escalation, thresholds, flag rate limits
//! - **Aim Convergence**: repeated exact look-ray convergence
//! - **Inertia**: airborne horizontal speed and turn validation
//!
//! ## Architecture
//!
//! ```text
//! NETWORK / SIM THREAD               ANALYSIS (caller or worker)
//!     │                                  │
//!     │─── process_inbound ─────────────►│ adapters
//!     │─── process_outbound ────────────►│    │
//!     │─── move_event ──────────────────►│    ▼
//!     │                                  │ CheckEngine
//!     │                                  │  ├─ Inertia
//!     │                                  │  └─ AimConvergence
//!     │                                  │    │
//!     │                                  │    ▼
//!     │                                  │ PunishmentSink
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let config = AntiCheatConfig::load("config/anticheat.toml")?;
//! let pipeline = PacketPipeline::from_config(&config, Arc::new(LogSink));
//! pipeline.enable()?;
//! pipeline.move_event(&player, event);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod check;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod player;
pub mod sink;

pub use check::{AimConvergence, Analyzer, Check, CheckEngine, Failure, Inertia, Outcome, Verdict};
pub use config::{AntiCheatConfig, CheckConfig, Decay, FlagLimit};
pub use error::{AnalysisFault, ConfigError, PipelineError};
pub use event::{Direction, MoveEvent, MoveFlags, Packet, Player, PlayerId};
pub use pipeline::{PacketAdapter, PacketPipeline, PipelineStats};
pub use player::PlayerEntityState;
pub use sink::{ChannelSink, LogSink, Punishment, PunishmentSink, SinkEvent};
