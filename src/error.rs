use std::time::Duration;
use thiserror::Error;

/// Error types that can occur while coordinating sessions.
///
/// This enum represents all possible error conditions that can arise
/// during session lifecycle operations, live-connection traffic, and
/// collaborator calls.
#[derive(Error, Debug)]
pub enum HeraldError {
    /// A communication channel was closed unexpectedly
    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    /// Configuration or builder validation failed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// User-facing validation failed; no side effects were attempted
    #[error("{0}")]
    Validation(String),

    /// The persistence collaborator failed
    #[error("Store error: {0}")]
    Store(String),

    /// The scheduling-provider collaborator failed
    #[error("Scheduling provider error: {0}")]
    Provider(String),

    /// The announcement-surface collaborator failed
    #[error("Announcement error: {0}")]
    Announce(String),

    /// A live connection presented no or unknown credentials
    #[error("Unauthenticated connection")]
    Unauthenticated,

    /// A correlated request got no response within the configured window
    #[error("No response within {0:?}")]
    RequestTimeout(Duration),

    /// Hook template rendering failed
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

pub type Result<T> = std::result::Result<T, HeraldError>;
