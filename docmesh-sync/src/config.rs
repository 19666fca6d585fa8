use std::time::Duration;

/// Default inbox capacity.
pub const DEFAULT_INBOX_CAPACITY: usize = 16;

/// Configuration for a [`RepoHandle`](crate::RepoHandle).
#[derive(Debug, Clone)]
pub struct HandleConfig {
    /// Ephemeral messages buffered before receive loops wait for the
    /// application.
    pub inbox_capacity: usize,
    /// Bound on the handshake when connecting through the handle's helpers.
    pub handshake_timeout: Option<Duration>,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            handshake_timeout: Some(Duration::from_secs(5)),
        }
    }
}
