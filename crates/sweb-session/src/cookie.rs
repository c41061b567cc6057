//! Cookie encoding for session binding.

use std::time::Duration;

use cookie::Cookie;
use cookie::time::{self, OffsetDateTime};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use tracing::trace;

use crate::error::{Error, Result};

/// Whether `host` is a development or private-network address.
///
/// Cookies for such hosts are issued without a `Domain` attribute.
pub fn is_local_host(host: &str) -> bool {
    host.starts_with("localhost") || host.starts_with("127.0.0.1") || host.starts_with("192.168.")
}

/// Derive the cookie `Domain` from the host the application is served on.
///
/// ```
/// use sweb_session::normalize_cookie_domain;
///
/// assert_eq!(normalize_cookie_domain("www.example.com"), ".example.com");
/// assert_eq!(normalize_cookie_domain("app.example.com"), ".app.example.com");
/// assert_eq!(normalize_cookie_domain("localhost:8080"), "");
/// ```
pub fn normalize_cookie_domain(host: &str) -> String {
    let host = host.trim();
    if host.is_empty() {
        return String::new();
    }
    if let Some(rest) = host.strip_prefix("www") && rest.starts_with('.') {
        return strip_port(rest).to_string();
    }
    if host.starts_with('.') {
        return strip_port(host).to_string();
    }
    if is_local_host(host) {
        return String::new();
    }
    format!(".{}", strip_port(host))
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Find the cookie called `name` among all `Cookie` request headers.
///
/// The value is returned percent-decoded. Headers that are not valid UTF-8
/// and malformed pairs are ignored.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|parsed| parsed.ok())
        .find(|cookie| cookie.name() == name)?
        .value()
        .to_string();

    match urlencoding::decode(&raw) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(e) => {
            trace!(cookie = %name, error = %e, "Ignoring undecodable cookie");
            None
        }
    }
}

/// Attributes shared by every cookie a manager writes.
#[derive(Debug, Clone)]
pub(crate) struct CookieAttrs<'a> {
    pub domain: &'a str,
    pub http_only: bool,
    pub secure: bool,
    pub max_age: Option<Duration>,
}

/// Append a `Set-Cookie` header carrying `value` percent-encoded.
pub(crate) fn write_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    attrs: &CookieAttrs<'_>,
) -> Result<()> {
    let mut builder = Cookie::build((name.to_string(), urlencoding::encode(value).into_owned()))
        .path("/")
        .http_only(attrs.http_only)
        .secure(attrs.secure);

    if !attrs.domain.is_empty() {
        builder = builder.domain(attrs.domain.to_string());
    }
    if let Some(max_age) = attrs.max_age {
        let secs = i64::try_from(max_age.as_secs())
            .unwrap_or(i64::MAX)
            .min(i64::from(i32::MAX));
        let max_age = time::Duration::seconds(secs);
        builder = builder
            .max_age(max_age)
            .expires(OffsetDateTime::now_utc() + max_age);
    }

    append(headers, &builder.build())
}

/// Append a `Set-Cookie` header that makes the client drop `name`.
pub(crate) fn write_expired_cookie(
    headers: &mut HeaderMap,
    name: &str,
    domain: &str,
) -> Result<()> {
    let mut builder = Cookie::build((name.to_string(), String::new()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::ZERO)
        .expires(OffsetDateTime::now_utc() - time::Duration::days(365));

    if !domain.is_empty() {
        builder = builder.domain(domain.to_string());
    }

    append(headers, &builder.build())
}

fn append(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<()> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| Error::InvalidCookie(format!("{}: {e}", cookie.name())))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}
