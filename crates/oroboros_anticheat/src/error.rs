//! # Anti-Cheat Error Types
//!
//! None of these ever reach the player. Analysis faults stop at the
//! dispatch boundary; config errors stop at startup.

use thiserror::Error;

/// A failure while analyzing one packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisFault {
    /// Telemetry carried NaN or infinite values.
    #[error("non-finite value in {field}")]
    NonFinite {
        /// Which part of the event was bad.
        field: &'static str,
    },

    /// A packet adapter rejected the packet.
    #[error("adapter {adapter} failed: {reason}")]
    Adapter {
        /// Adapter name.
        adapter: String,
        /// What went wrong.
        reason: String,
    },

    /// An adapter or check panicked during dispatch.
    #[error("panicked during dispatch: {reason}")]
    Panicked {
        /// Panic payload, if it was a string.
        reason: String,
    },
}

/// Result type for analysis.
pub type AnalysisResult<T> = Result<T, AnalysisFault>;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config parsed but a value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors controlling the packet pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The async worker thread could not be started.
    #[error("failed to spawn async check worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
