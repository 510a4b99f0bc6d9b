//! Command-line options for the two binaries.
//!
//! Every option can also be set through its `QUOTADRAIN_*` environment variable.

use clap::Parser;
use quotadrain::{ConfigError, DrainConfig, Quota};
use std::net::SocketAddr;
use std::time::Duration;

/// Options for `quotadrain-client`.
///
/// ```bash
/// quotadrain-client --acceptor-url http://127.0.0.1:8080 --listen 0.0.0.0:8081
/// ```
#[derive(Debug, Clone, Parser)]
#[command(
    name = "quotadrain-client",
    about = "Queue items over HTTP and drain them to a quota-limited acceptor."
)]
pub struct ClientOpts {
    /// Address the producer API listens on
    #[arg(long, env = "QUOTADRAIN_LISTEN", default_value = "0.0.0.0:8081")]
    pub listen: SocketAddr,

    /// Base URL of the remote acceptor
    #[arg(long, env = "QUOTADRAIN_ACCEPTOR_URL", default_value = "http://127.0.0.1:8080")]
    pub acceptor_url: String,

    /// Per-request timeout in seconds, for both quota fetch and submissions
    #[arg(long, env = "QUOTADRAIN_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Consecutive failed submissions before the drain loop stops
    #[arg(long, env = "QUOTADRAIN_MAX_ERROR_STREAK", default_value_t = 10)]
    pub max_error_streak: usize,

    /// Pause after a failed submission, in milliseconds (0: retry immediately)
    #[arg(long, env = "QUOTADRAIN_FAILURE_PAUSE_MS", default_value_t = 0)]
    pub failure_pause_ms: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "QUOTADRAIN_JSON_LOGS")]
    pub json_logs: bool,
}

impl ClientOpts {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Drain loop settings derived from the options.
    ///
    /// # Errors
    /// [`ConfigError`] for a zero streak or timeout.
    pub fn drain_config(&self) -> Result<DrainConfig, ConfigError> {
        DrainConfig::builder()
            .max_error_streak(self.max_error_streak)
            .submit_timeout(self.timeout())
            .failure_pause(Duration::from_millis(self.failure_pause_ms))
            .build()
    }
}

/// Options for `quotadrain-mock-server`.
#[derive(Debug, Clone, Parser)]
#[command(name = "quotadrain-mock-server", about = "Mock acceptor advertising a fixed quota.")]
pub struct MockOpts {
    /// Address the acceptor listens on
    #[arg(long, env = "QUOTADRAIN_MOCK_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Items admitted per window
    #[arg(long, env = "QUOTADRAIN_MOCK_MAX_ITEMS", default_value_t = 10)]
    pub max_items: u64,

    /// Window length in seconds
    #[arg(long, env = "QUOTADRAIN_MOCK_WINDOW_SECS", default_value_t = 15)]
    pub window_secs: u64,

    /// Also enforce the sliding window, not just the batch size
    #[arg(long, env = "QUOTADRAIN_MOCK_STRICT")]
    pub strict: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "QUOTADRAIN_JSON_LOGS")]
    pub json_logs: bool,
}

impl MockOpts {
    /// # Errors
    /// [`ConfigError`] for a zero item count or window.
    pub fn quota(&self) -> Result<Quota, ConfigError> {
        Quota::new(self.max_items, Duration::from_secs(self.window_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let opts = ClientOpts::try_parse_from(["quotadrain-client"]).unwrap();
        assert_eq!(opts.listen, "0.0.0.0:8081".parse::<SocketAddr>().unwrap());
        assert_eq!(opts.acceptor_url, "http://127.0.0.1:8080");
        assert!(!opts.json_logs);

        let cfg = opts.drain_config().unwrap();
        assert_eq!(cfg.max_error_streak(), 10);
        assert_eq!(cfg.submit_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.failure_pause(), Duration::ZERO);
    }

    #[test]
    fn zero_streak_is_rejected() {
        let opts =
            ClientOpts::try_parse_from(["quotadrain-client", "--max-error-streak", "0"]).unwrap();
        assert_eq!(opts.drain_config(), Err(ConfigError::InvalidErrorStreak(0)));
    }

    #[test]
    fn mock_flags() {
        let opts = MockOpts::try_parse_from([
            "quotadrain-mock-server",
            "--max-items",
            "3",
            "--window-secs",
            "2",
            "--strict",
        ])
        .unwrap();
        let quota = opts.quota().unwrap();
        assert_eq!(quota.max_items(), 3);
        assert_eq!(quota.window(), Duration::from_secs(2));
        assert!(opts.strict);
    }

    #[test]
    fn mock_zero_window_is_rejected() {
        let opts =
            MockOpts::try_parse_from(["quotadrain-mock-server", "--window-secs", "0"]).unwrap();
        assert!(opts.quota().is_err());
    }
}
