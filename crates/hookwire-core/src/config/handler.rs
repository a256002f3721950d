//! Hook handler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Dashed option names accepted in configuration files, with the field each
/// one sets.
pub(crate) const KEY_ALIASES: [(&str, &str); 8] = [
    ("hooks-handler-timeout", "timeout"),
    ("hooks-handler-connect-timeout", "connect_timeout"),
    ("hooks-handler-connect-retry", "connect_retry"),
    ("hooks-handler-after-connect-wait", "after_connect_wait"),
    ("hooks-handler-term-timeout", "term_timeout"),
    ("hooks-handler-term-retry", "term_retry"),
    ("hooks-handler-host", "host"),
    ("hooks-handler-port", "port"),
];

/// Settings for the out-of-process hook handler.
///
/// All timing values are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Handler language keyword, or a command line for a custom handler.
    #[serde(default)]
    pub language: String,
    /// Hook file paths passed to the handler as trailing arguments.
    #[serde(default)]
    pub hookfiles: Vec<String>,
    /// Per-call timeout.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Overall deadline for connecting to the handler.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Delay between connection attempts.
    #[serde(default = "default_connect_retry")]
    pub connect_retry: u64,
    /// Grace period after connecting, before the connection is used.
    #[serde(default = "default_after_connect_wait")]
    pub after_connect_wait: u64,
    /// How long graceful termination is attempted.
    #[serde(default = "default_term_timeout")]
    pub term_timeout: u64,
    /// Delay between graceful termination attempts.
    #[serde(default = "default_term_retry")]
    pub term_retry: u64,
    /// Host the handler listens on.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the handler listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl HandlerConfig {
    /// Creates a configuration for `language` with default timings.
    pub fn for_language(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Default::default()
        }
    }

    /// Returns whether hooks should run in an external handler.
    ///
    /// An empty language means hooks are native.
    pub fn is_remote(&self) -> bool {
        !self.language.trim().is_empty()
    }

    /// Per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Overall connect deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    /// Delay between connection attempts.
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry)
    }

    /// Grace period after connecting.
    pub fn after_connect_wait(&self) -> Duration {
        Duration::from_millis(self.after_connect_wait)
    }

    /// Graceful termination window.
    pub fn term_timeout(&self) -> Duration {
        Duration::from_millis(self.term_timeout)
    }

    /// Delay between graceful termination attempts.
    pub fn term_retry(&self) -> Duration {
        Duration::from_millis(self.term_retry)
    }

    /// `host:port` of the handler.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            language: String::new(),
            hookfiles: Vec::new(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            connect_retry: default_connect_retry(),
            after_connect_wait: default_after_connect_wait(),
            term_timeout: default_term_timeout(),
            term_retry: default_term_retry(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_timeout() -> u64 {
    5000
}

fn default_connect_timeout() -> u64 {
    1500
}

fn default_connect_retry() -> u64 {
    500
}

fn default_after_connect_wait() -> u64 {
    100
}

fn default_term_timeout() -> u64 {
    5000
}

fn default_term_retry() -> u64 {
    500
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    61321
}
