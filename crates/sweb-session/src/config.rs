//! Configuration for providers, cookies and the background sweep.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default idle timeout for sessions (one hour).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default upper bound for a single persistence write.
pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(2);

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "SWEBSID";

/// Configuration for a [`MemoryProvider`](crate::MemoryProvider).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Idle time after which a session is eligible for the sweep.
    pub timeout: Duration,

    /// Optional cap on sessions held in memory.
    /// When reached, the tail of the recency list is dropped from memory
    /// (its file, if any, is kept for lazy reload).
    pub max_sessions: Option<usize>,

    /// Directory for per-session files. `None` keeps sessions in memory only.
    pub save_path: Option<PathBuf>,

    /// Upper bound for one attribute write to disk.
    pub persist_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_sessions: None,
            save_path: None,
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap the number of sessions held in memory.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    /// Persist sessions as files under `path`.
    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// Set the persistence write timeout.
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        if self.max_sessions == Some(0) {
            return Err(Error::Config("max_sessions must be greater than zero".into()));
        }
        if self.persist_timeout.is_zero() {
            return Err(Error::Config(
                "persist_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Cookie settings for a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Name of the session cookie.
    pub name: String,

    /// Host the application is served from; normalized into the cookie domain.
    pub host: String,

    /// Cookie lifetime. `None` issues a browser-session cookie with no
    /// `Max-Age`/`Expires`.
    pub max_age: Option<Duration>,

    /// Hide the cookie from client-side scripts.
    pub http_only: bool,

    /// Only send the cookie over HTTPS.
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            host: String::new(),
            max_age: None,
            http_only: true,
            secure: false,
        }
    }
}

impl CookieConfig {
    /// Create a cookie configuration with the given cookie name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the host used to derive the cookie domain.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the cookie lifetime.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Issue browser-session cookies.
    pub fn without_max_age(mut self) -> Self {
        self.max_age = None;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Settings for the background sweep task.
#[derive(Debug, Clone, Default)]
pub struct GcConfig {
    /// Sweep period. Defaults to the provider timeout.
    pub interval: Option<Duration>,

    /// Period for writing every in-memory session to disk. Disabled when `None`.
    pub flush_interval: Option<Duration>,
}

impl GcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the sweep period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Enable periodic flushing of all sessions.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }
}
