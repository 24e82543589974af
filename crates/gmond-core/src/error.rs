//! Error taxonomy: kinds, not an exhaustive hierarchy.
//!
//! Only [`StartupError`] is a real type that propagates — everything in the
//! "transient" classes (ingress, egress, sampling, client-io) is handled
//! inline by logging and continuing.

use thiserror::Error;

/// Conditions that abort startup before the runtime core begins
/// ("startup-fatal"). The binary crate converts these into a printed
/// diagnostic and `exit(1)`.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind socket for {channel}: {source}")]
    Bind {
        channel: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to join multicast group for {channel}: {source}")]
    Multicast {
        channel: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ACL: {0}")]
    BadAcl(String),

    #[error("configured both deaf and mute — nothing to do")]
    DeafAndMute,
}
