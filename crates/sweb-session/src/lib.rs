//! Server-side HTTP session store.
//!
//! This crate provides the storage engine behind cookie-based sessions:
//! - An in-memory provider ordered by recency, with idle-timeout expiration
//! - Optional per-session files so sessions survive restarts
//! - A cookie manager that binds session ids to requests and responses
//! - A background sweep that evicts expired sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use sweb_session::{CookieConfig, GcConfig, MemoryProvider, ProviderConfig, SessionManager};
//!
//! let provider = MemoryProvider::new(
//!     ProviderConfig::new()
//!         .with_timeout(Duration::from_secs(3600))
//!         .with_save_path("/var/lib/sweb/sessions"),
//! )?;
//! let manager = SessionManager::new(Arc::new(provider), CookieConfig::new("SWEBSID"));
//! let gc = manager.spawn_gc(GcConfig::new());
//!
//! let start = manager.start_session(&request_headers, &remote_addr).await?;
//! start.session.attributes().set("uid", "42").await?;
//! if start.is_new {
//!     manager.set_session_cookie(&mut response_headers, start.session.id())?;
//! }
//! ```

mod attributes;
mod config;
mod cookie;
mod error;
mod gc;
mod manager;
mod persistence;
mod provider;
mod registry;
mod session;
mod sid;

pub use attributes::{Attributes, decode_map, encode_map};
pub use config::{
    CookieConfig, DEFAULT_COOKIE_NAME, DEFAULT_PERSIST_TIMEOUT, DEFAULT_TIMEOUT, GcConfig,
    ProviderConfig,
};
pub use crate::cookie::{is_local_host, normalize_cookie_domain, read_cookie};
pub use error::{Error, Result};
pub use gc::GcHandle;
pub use manager::{SessionManager, SessionStart};
pub use persistence::{FileStore, parse_sid_from_file_name};
pub use provider::{MemoryProvider, ProviderStats, is_expired_at};
pub use registry::ProviderRegistry;
pub use session::Session;
pub use sid::{SESSION_ID_LEN, new_session_id};
