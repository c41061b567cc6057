//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [session]                # provider, timeouts, persistence
//! [cookie]                 # session cookie attributes
//! [server]                 # listen address
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sweb_session::{CookieConfig, GcConfig, ProviderConfig};

use crate::error::{ConfigError, Result};

/// Default address for `sweb serve`.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwebConfig {
    pub session: Option<SessionSection>,
    pub cookie: Option<CookieSection>,
    pub server: Option<ServerSection>,
}

impl SwebConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: SwebConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.cookie.is_some() {
            self.cookie = other.cookie;
        }
        if other.server.is_some() {
            self.server = other.server;
        }
    }

    /// Effective `[session]` section.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// Effective `[cookie]` section.
    pub fn cookie(&self) -> CookieSection {
        self.cookie.clone().unwrap_or_default()
    }

    /// Effective `[server]` section.
    pub fn server(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    /// Reject settings the session store cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.session().validate()?;
        self.cookie().validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Which provider backs the session store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Sessions live in memory only.
    #[default]
    Memory,
    /// Sessions are also written to files under `save_path`.
    File,
}

impl ProviderKind {
    /// Name the provider is registered under.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
        }
    }
}

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub provider: ProviderKind,
    /// Idle timeout in seconds.
    pub timeout_secs: u64,
    /// Directory for session files (required by the `file` provider).
    pub save_path: Option<PathBuf>,
    /// Cap on sessions held in memory.
    pub max_sessions: Option<usize>,
    pub persist_timeout_ms: u64,
    /// Sweep period; defaults to the timeout.
    pub gc_interval_secs: Option<u64>,
    /// Period for writing all sessions to disk.
    pub flush_interval_secs: Option<u64>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            timeout_secs: sweb_session::DEFAULT_TIMEOUT.as_secs(),
            save_path: None,
            max_sessions: None,
            persist_timeout_ms: 2000,
            gc_interval_secs: None,
            flush_interval_secs: None,
        }
    }
}

impl SessionSection {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid("session.timeout_secs", "must be greater than zero"));
        }
        if self.persist_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "session.persist_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.max_sessions == Some(0) {
            return Err(ConfigError::invalid("session.max_sessions", "must be greater than zero"));
        }
        if self.gc_interval_secs == Some(0) {
            return Err(ConfigError::invalid(
                "session.gc_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.flush_interval_secs == Some(0) {
            return Err(ConfigError::invalid(
                "session.flush_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.provider == ProviderKind::File && self.save_path.is_none() {
            return Err(ConfigError::invalid(
                "session.save_path",
                "required when provider = \"file\"",
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Settings for the in-memory provider (never touches disk).
    pub fn memory_provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new()
            .with_timeout(self.timeout())
            .with_persist_timeout(Duration::from_millis(self.persist_timeout_ms));
        if let Some(max) = self.max_sessions {
            config = config.with_max_sessions(max);
        }
        config
    }

    /// Settings for the file-backed provider, if a directory is configured.
    pub fn file_provider_config(&self) -> Option<ProviderConfig> {
        let dir = self.save_path.as_ref()?;
        Some(self.memory_provider_config().with_save_path(dir))
    }

    pub fn gc_config(&self) -> GcConfig {
        let mut config = GcConfig::new();
        if let Some(secs) = self.gc_interval_secs {
            config = config.with_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.flush_interval_secs {
            config = config.with_flush_interval(Duration::from_secs(secs));
        }
        config
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cookie
// ─────────────────────────────────────────────────────────────────────────────

/// `[cookie]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSection {
    pub name: String,
    /// Host the site is served from; the cookie domain is derived from it.
    pub domain: String,
    /// Cookie lifetime. Omitted: the session timeout. `0`: a cookie that
    /// ends with the browser session.
    pub max_age_secs: Option<u64>,
    pub http_only: bool,
    pub secure: bool,
}

impl Default for CookieSection {
    fn default() -> Self {
        Self {
            name: sweb_session::DEFAULT_COOKIE_NAME.to_string(),
            domain: String::new(),
            max_age_secs: None,
            http_only: true,
            secure: false,
        }
    }
}

impl CookieSection {
    pub fn validate(&self) -> Result<()> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .bytes()
                .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b));
        if !valid_name {
            return Err(ConfigError::invalid("cookie.name", "must be a non-empty cookie token"));
        }
        Ok(())
    }

    /// Cookie settings; `session_timeout` is the lifetime when none is set.
    pub fn cookie_config(&self, session_timeout: Duration) -> CookieConfig {
        let config = CookieConfig::new(self.name.as_str())
            .with_host(self.domain.as_str())
            .with_http_only(self.http_only)
            .with_secure(self.secure);
        match self.max_age_secs {
            Some(0) => config.without_max_age(),
            Some(secs) => config.with_max_age(Duration::from_secs(secs)),
            None => config.with_max_age(session_timeout),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind to.
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}
