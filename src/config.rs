//! Client configuration and the reconnect backoff policy.

use std::time::Duration;

use crate::error::{Result, TruthOrDareError};

/// Environment variable holding the hub's base URL.
pub const SERVER_URL_ENV: &str = "TRUTH_OR_DARE_SERVER_URL";

/// Default path of the room hub, appended to the base URL.
pub const DEFAULT_HUB_PATH: &str = "/roomHub";

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_JOURNAL_CAPACITY: usize = 200;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_EXPONENTIAL_ATTEMPTS: u32 = 3;

// ── Reconnect policy ────────────────────────────────────────────────

/// Backoff schedule for automatic reconnection.
///
/// The first `exponential_attempts` retries wait `2^attempt * base_delay`,
/// capped at `max_delay`; every later retry waits `max_delay`.
///
/// ```
/// use std::time::Duration;
/// use truth_or_dare_client::config::ReconnectPolicy;
///
/// let policy = ReconnectPolicy::default();
/// assert_eq!(policy.delay_for(0), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(1), Duration::from_secs(2));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(4));
/// assert_eq!(policy.delay_for(3), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether an unexpected close triggers automatic reconnection at all.
    pub enabled: bool,
    /// Delay unit of the exponential phase.
    pub base_delay: Duration,
    /// Ceiling for every delay.
    pub max_delay: Duration,
    /// Number of attempts that use exponential growth.
    pub exponential_attempts: u32,
    /// Give up after this many failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            exponential_attempts: DEFAULT_EXPONENTIAL_ATTEMPTS,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects: an unexpected close is final.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Limit the number of reconnect attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Override the base and ceiling delays.
    #[must_use]
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait before the zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt >= self.exponential_attempts {
            return self.max_delay;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    pub fn allows(&self, attempts_made: u32) -> bool {
        self.enabled && self.max_attempts.is_none_or(|max| attempts_made < max)
    }
}

// ── Client configuration ────────────────────────────────────────────

/// Configuration for a [`RoomHub`](crate::RoomHub) and the session it manages.
///
/// ```
/// use std::time::Duration;
/// use truth_or_dare_client::config::{ClientConfig, ReconnectPolicy};
///
/// let config = ClientConfig::new("https://game.example.com")
///     .with_reconnect(ReconnectPolicy::default().with_max_attempts(5))
///     .with_call_timeout(Duration::from_secs(20));
/// assert_eq!(config.endpoint(), "https://game.example.com/roomHub");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `https://game.example.com`.
    pub server_url: String,
    /// Path of the room hub. Defaults to `/roomHub`.
    pub hub_path: String,
    /// Automatic reconnection schedule.
    pub reconnect: ReconnectPolicy,
    /// How long to wait for the handshake answer. Defaults to **15 seconds**.
    pub handshake_timeout: Duration,
    /// Interval between keep-alive pings. Defaults to **15 seconds**.
    pub keepalive_interval: Duration,
    /// Silence after which the server is considered gone. Defaults to **30 seconds**.
    pub server_timeout: Duration,
    /// Grace period for a graceful stop before the session task is aborted.
    pub shutdown_timeout: Duration,
    /// Upper bound on how long a call waits for its outcome. `None` waits
    /// until the outcome arrives or the session closes for good.
    pub call_timeout: Option<Duration>,
    /// Number of room journal lines kept by the store.
    pub journal_capacity: usize,
}

impl ClientConfig {
    /// Create a configuration for the given base URL with default values.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            hub_path: DEFAULT_HUB_PATH.to_string(),
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            call_timeout: None,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }

    /// Build a configuration from `TRUTH_OR_DARE_SERVER_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`TruthOrDareError::Config`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        match std::env::var(SERVER_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(Self::new(url.trim())),
            _ => Err(TruthOrDareError::Config(format!("{SERVER_URL_ENV} is not set"))),
        }
    }

    /// Full hub URL: base URL joined with the hub path.
    pub fn endpoint(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        if self.hub_path.is_empty() {
            return base.to_string();
        }
        let path = self.hub_path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Set the hub path.
    #[must_use]
    pub fn with_hub_path(mut self, hub_path: impl Into<String>) -> Self {
        self.hub_path = hub_path.into();
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the keep-alive interval.
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the server silence timeout.
    #[must_use]
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    /// Set the graceful stop timeout. A zero timeout aborts the session task immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Bound how long each call waits for its outcome.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Set the journal capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_schedule() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (0..6).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 10, 10, 10]);
    }

    #[test]
    fn exponential_phase_is_capped() {
        let policy = ReconnectPolicy::default()
            .with_delays(Duration::from_secs(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(0), Duration::from_secs(4));
        assert_eq!(policy.delay_for(1), Duration::from_secs(8));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
    }

    #[test]
    fn allows_respects_max_attempts() {
        let unlimited = ReconnectPolicy::default();
        assert!(unlimited.allows(10_000));

        let limited = ReconnectPolicy::default().with_max_attempts(2);
        assert!(limited.allows(0));
        assert!(limited.allows(1));
        assert!(!limited.allows(2));

        assert!(!ReconnectPolicy::disabled().allows(0));
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        assert_eq!(
            ClientConfig::new("http://localhost:5000/").endpoint(),
            "http://localhost:5000/roomHub"
        );
        assert_eq!(
            ClientConfig::new("http://localhost:5000")
                .with_hub_path("hubs/rooms")
                .endpoint(),
            "http://localhost:5000/hubs/rooms"
        );
        assert_eq!(
            ClientConfig::new("ws://h").with_hub_path("").endpoint(),
            "ws://h"
        );
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://h");
        assert_eq!(config.hub_path, "/roomHub");
        assert_eq!(config.handshake_timeout, Duration::from_secs(15));
        assert_eq!(config.server_timeout, Duration::from_secs(30));
        assert!(config.call_timeout.is_none());
        assert_eq!(config.journal_capacity, 200);
        assert_eq!(
            ClientConfig::new("x")
                .with_journal_capacity(0)
                .journal_capacity,
            1
        );
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_ceiling(
            attempt in 0u32..1_000,
            base_ms in 1u64..5_000,
            max_ms in 1u64..60_000,
        ) {
            let policy = ReconnectPolicy::default()
                .with_delays(Duration::from_millis(base_ms), Duration::from_millis(max_ms));
            prop_assert!(policy.delay_for(attempt) <= policy.max_delay);
        }

        #[test]
        fn late_attempts_use_ceiling(attempt in 3u32..u32::MAX) {
            let policy = ReconnectPolicy::default();
            prop_assert_eq!(policy.delay_for(attempt), Duration::from_secs(10));
        }

        #[test]
        fn early_attempts_double(attempt in 0u32..3, base_ms in 1u64..1_000) {
            let policy = ReconnectPolicy::default()
                .with_delays(Duration::from_millis(base_ms), Duration::from_secs(3_600));
            let expected = Duration::from_millis(base_ms * (1 << attempt));
            prop_assert_eq!(policy.delay_for(attempt), expected);
        }
    }
}
