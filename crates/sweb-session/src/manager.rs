//! Cookie-bound session management.
//!
//! [`SessionManager`] ties a provider to a cookie: it reads the session id
//! from request headers, writes it to response headers, and forwards session
//! lifecycle calls to the provider.

use std::sync::Arc;

use http::HeaderMap;
use tracing::debug;

use crate::config::{CookieConfig, GcConfig};
use crate::cookie::{self, CookieAttrs};
use crate::error::{Error, Result};
use crate::gc::{self, GcHandle};
use crate::provider::MemoryProvider;
use crate::registry::ProviderRegistry;
use crate::session::Session;
use crate::sid;

/// Outcome of [`SessionManager::start_session`].
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub session: Session,
    /// The session was created for this request and its cookie still has to
    /// be sent.
    pub is_new: bool,
}

/// Binds sessions held by a provider to an HTTP cookie.
#[derive(Debug)]
pub struct SessionManager {
    provider: Arc<MemoryProvider>,
    cookie: CookieConfig,
    /// Normalized form of `cookie.host`.
    domain: String,
}

impl SessionManager {
    pub fn new(provider: Arc<MemoryProvider>, cookie: CookieConfig) -> Self {
        let domain = cookie::normalize_cookie_domain(&cookie.host);
        Self {
            provider,
            cookie,
            domain,
        }
    }

    /// Build a manager around the provider registered as `name`.
    pub fn from_registry(
        registry: &ProviderRegistry,
        name: &str,
        cookie: CookieConfig,
    ) -> Result<Self> {
        let provider = registry
            .lookup(name)
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;
        Ok(Self::new(provider, cookie))
    }

    pub fn provider(&self) -> &Arc<MemoryProvider> {
        &self.provider
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    /// Normalized cookie domain; empty when no `Domain` attribute is sent.
    pub fn cookie_domain(&self) -> &str {
        &self.domain
    }

    pub fn set_http_only(&mut self, http_only: bool) {
        self.cookie.http_only = http_only;
    }

    /// Change the host the cookie domain is derived from.
    pub fn set_cookie_domain(&mut self, host: &str) {
        self.cookie.host = host.to_string();
        self.domain = cookie::normalize_cookie_domain(host);
    }

    fn attrs(&self, http_only: bool) -> CookieAttrs<'_> {
        CookieAttrs {
            domain: &self.domain,
            http_only,
            secure: self.cookie.secure,
            max_age: self.cookie.max_age,
        }
    }

    /// Session id carried by the request, if any.
    pub fn get_session_cookie(&self, headers: &HeaderMap) -> Option<String> {
        cookie::read_cookie(headers, &self.cookie.name).filter(|sid| !sid.is_empty())
    }

    pub fn set_session_cookie(&self, headers: &mut HeaderMap, sid: &str) -> Result<()> {
        cookie::write_cookie(headers, &self.cookie.name, sid, &self.attrs(self.cookie.http_only))
    }

    pub fn delete_session_cookie(&self, headers: &mut HeaderMap) -> Result<()> {
        cookie::write_expired_cookie(headers, &self.cookie.name, &self.domain)
    }

    /// Read an auxiliary cookie set with [`set_ext_cookie`](Self::set_ext_cookie).
    pub fn get_ext_cookie(&self, headers: &HeaderMap, name: &str) -> Option<String> {
        cookie::read_cookie(headers, name)
    }

    /// Set an auxiliary cookie. Always `HttpOnly`.
    pub fn set_ext_cookie(&self, headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
        cookie::write_cookie(headers, name, value, &self.attrs(true))
    }

    pub fn delete_ext_cookie(&self, headers: &mut HeaderMap, name: &str) -> Result<()> {
        cookie::write_expired_cookie(headers, name, &self.domain)
    }

    pub fn new_session_id(&self, remote_addr: &str) -> Result<String> {
        sid::new_session_id(remote_addr)
    }

    pub async fn get_session(&self, sid: &str) -> Option<Session> {
        self.provider.get_session(sid).await
    }

    pub async fn add_new_session(&self, session: Session) -> Result<()> {
        self.provider.add_new_session(session).await
    }

    pub async fn remove_session(&self, sid: &str) -> Result<()> {
        self.provider.remove_session(sid).await
    }

    /// Resolve the request's session, creating one when the cookie is absent
    /// or names an unknown or expired session.
    ///
    /// The caller sets the cookie when [`SessionStart::is_new`] is true.
    pub async fn start_session(
        &self,
        headers: &HeaderMap,
        remote_addr: &str,
    ) -> Result<SessionStart> {
        if let Some(sid) = self.get_session_cookie(headers)
            && let Some(session) = self.provider.get_session(&sid).await
        {
            return Ok(SessionStart {
                session,
                is_new: false,
            });
        }

        let sid = self.new_session_id(remote_addr)?;
        let session = Session::new(self.provider.new_attributes(sid.as_str()));
        self.provider.add_new_session(session.clone()).await?;
        debug!(session_id = %sid, remote_addr, "Started new session");

        Ok(SessionStart {
            session,
            is_new: true,
        })
    }

    /// Start the background expiration sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_gc(&self, config: GcConfig) -> GcHandle {
        gc::spawn(Arc::clone(&self.provider), config)
    }
}
