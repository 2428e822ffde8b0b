//! Error types for the QLTR controller

use crate::NodeId;
use thiserror::Error;

/// QLTR error type
#[derive(Error, Debug)]
pub enum QltrError {
    /// Path shorter than two nodes
    #[error("invalid path: {len} node(s), at least 2 required")]
    InvalidPath {
        /// Number of nodes in the rejected path
        len: usize,
    },

    /// A hop's switch is not registered
    #[error("unresolved hop {from} -> {to}: switch {missing} not registered ({installed} hop(s) already installed)")]
    UnresolvedHop {
        /// Hop source
        from: NodeId,
        /// Hop destination
        to: NodeId,
        /// The switch that could not be resolved
        missing: NodeId,
        /// Rules installed before the failure
        installed: usize,
    },

    /// Stats reply carried no samples
    #[error("no flow statistics to reduce")]
    EmptyStats,

    /// Stats samples sum to zero duration
    #[error("flow statistics cover zero duration")]
    ZeroDuration,

    /// Reward or success rate rejected
    #[error("invalid feedback: {0}")]
    InvalidFeedback(String),

    /// Malformed MAC address
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// Switch adapter failure
    #[error("switch adapter error: {0}")]
    Adapter(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for QLTR
pub type QltrResult<T> = Result<T, QltrError>;
