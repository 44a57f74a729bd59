//! Session cookie pair with sliding expiration.
//!
//! The primary cookie holds the opaque session token. A second "tracked
//! expiry" cookie records when the pair was last written to expire (epoch
//! milliseconds). Cookies are only rewritten when that timestamp is missing or
//! due, so most requests emit no `Set-Cookie` at all.

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, header::SET_COOKIE};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};

use crate::config::GatewayConfig;

/// Appended to the base cookie name to form the tracked expiry cookie name.
pub const EXPIRY_COOKIE_SUFFIX: &str = "_expires";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Cookies are current; emit nothing.
    Keep,
    /// Rewrite both cookies this request.
    Set,
    /// Delete both cookies (stale tracked expiry without a session).
    Clear,
}

/// Session cookie state of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub value: String,
    pub present: bool,
    pub action: SessionAction,
}

impl SessionState {
    pub fn token(&self) -> Option<&str> {
        self.present.then_some(self.value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SessionTracker {
    name: String,
    expiry_name: String,
    max_age: Duration,
    refresh_margin: Duration,
    secure: bool,
}

impl SessionTracker {
    pub fn new(base_name: impl Into<String>, max_age: Duration, secure: bool) -> Self {
        let name = base_name.into();
        let expiry_name = format!("{name}{EXPIRY_COOKIE_SUFFIX}");
        Self {
            name,
            expiry_name,
            max_age,
            refresh_margin: Duration::ZERO,
            secure,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.session_cookie.clone(),
            config.session_max_age,
            config.secure_cookies(),
        )
        .with_refresh_margin(config.refresh_margin)
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.name
    }

    pub fn expiry_cookie_name(&self) -> &str {
        &self.expiry_name
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Inspect the request cookies and decide what this request must do.
    pub fn read(&self, headers: &HeaderMap, now: DateTime<Utc>) -> SessionState {
        let jar = CookieJar::from_headers(headers);
        let value = jar
            .get(&self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());
        let tracked = jar.get(&self.expiry_name).map(|c| c.value().to_string());

        let Some(value) = value else {
            let action = if tracked.is_some() {
                SessionAction::Clear
            } else {
                SessionAction::Keep
            };
            return SessionState {
                value: String::new(),
                present: false,
                action,
            };
        };

        let refresh_at = now.timestamp_millis() + millis(self.refresh_margin);
        let expires_at = tracked
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok());
        let action = match expires_at {
            Some(expires_at) if expires_at > refresh_at => SessionAction::Keep,
            // Missing, malformed or due.
            _ => SessionAction::Set,
        };

        SessionState {
            value,
            present: true,
            action,
        }
    }

    /// Write both cookies with a fresh expiry of `now + max_age`.
    ///
    /// `value` is the decoded token as returned by [`read`](Self::read); it is
    /// percent-encoded on the way out so it survives the round trip.
    pub fn apply(&self, headers: &mut HeaderMap, value: &str, now: DateTime<Utc>) {
        let max_age = self.max_age.as_secs();
        let expires_at = now.timestamp_millis() + millis(self.max_age);
        let flags = self.flags();
        let encoded = urlencoding::encode(value);

        replace_set_cookie(
            headers,
            &self.name,
            format!("{}={encoded}; Max-Age={max_age}{flags}", self.name),
        );
        replace_set_cookie(
            headers,
            &self.expiry_name,
            format!(
                "{}={expires_at}; Max-Age={max_age}{flags}",
                self.expiry_name
            ),
        );
    }

    /// Delete both cookies. Replaces any cookie already queued for either
    /// name, so repeated calls leave the same headers as a single one.
    pub fn clear(&self, headers: &mut HeaderMap) {
        let flags = self.flags();
        for name in [&self.name, &self.expiry_name] {
            replace_set_cookie(
                headers,
                name,
                format!("{name}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT{flags}"),
            );
        }
    }

    /// Whether a response already carries a `Set-Cookie` for the session.
    pub fn is_written(&self, headers: &HeaderMap) -> bool {
        let prefix = format!("{}=", self.name);
        headers
            .get_all(SET_COOKIE)
            .iter()
            .any(|v| v.as_bytes().starts_with(prefix.as_bytes()))
    }

    fn flags(&self) -> &'static str {
        if self.secure {
            "; Path=/; HttpOnly; Secure; SameSite=Lax"
        } else {
            "; Path=/; HttpOnly; SameSite=Lax"
        }
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn replace_set_cookie(headers: &mut HeaderMap, name: &str, line: String) {
    let value = match HeaderValue::from_str(&line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(cookie = name, "refusing to emit malformed cookie: {e}");
            return;
        }
    };

    let prefix = format!("{name}=");
    let kept: Vec<HeaderValue> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter(|v| !v.as_bytes().starts_with(prefix.as_bytes()))
        .cloned()
        .collect();
    headers.remove(SET_COOKIE);
    for v in kept {
        headers.append(SET_COOKIE, v);
    }
    headers.append(SET_COOKIE, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn tracker() -> SessionTracker {
        SessionTracker::new("sid", DAY, false)
    }

    fn request(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn future_tracked_expiry_keeps_cookies() {
        let now = Utc::now();
        let future = now.timestamp_millis() + 60_000;
        let state = tracker().read(&request(&format!("sid=tok; sid_expires={future}")), now);
        assert_eq!(state.token(), Some("tok"));
        assert_eq!(state.action, SessionAction::Keep);
    }

    #[test]
    fn missing_malformed_or_due_expiry_forces_rewrite() {
        let now = Utc::now();
        let past = now.timestamp_millis() - 1;
        let exactly_now = now.timestamp_millis();
        for cookie in [
            "sid=tok".to_string(),
            "sid=tok; sid_expires=tomorrow".to_string(),
            format!("sid=tok; sid_expires={past}"),
            format!("sid=tok; sid_expires={exactly_now}"),
        ] {
            let state = tracker().read(&request(&cookie), now);
            assert!(state.present, "{cookie}");
            assert_eq!(state.action, SessionAction::Set, "{cookie}");
        }
    }

    #[test]
    fn refresh_margin_brings_rewrite_forward() {
        let now = Utc::now();
        let soon = now.timestamp_millis() + 30_000;
        let cookie = format!("sid=tok; sid_expires={soon}");

        assert_eq!(
            tracker().read(&request(&cookie), now).action,
            SessionAction::Keep
        );
        let eager = tracker().with_refresh_margin(Duration::from_secs(60));
        assert_eq!(
            eager.read(&request(&cookie), now).action,
            SessionAction::Set
        );
    }

    #[test]
    fn absent_session_is_kept_or_cleared() {
        let now = Utc::now();
        let state = tracker().read(&HeaderMap::new(), now);
        assert!(!state.present);
        assert_eq!(state.token(), None);
        assert_eq!(state.action, SessionAction::Keep);

        let stale = tracker().read(&request("sid=; sid_expires=123"), now);
        assert!(!stale.present);
        assert_eq!(stale.action, SessionAction::Clear);
    }

    #[test]
    fn apply_writes_both_cookies_with_new_expiry() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        SessionTracker::new("sid", DAY, true).apply(&mut headers, "tok", now);

        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert_eq!(
            cookies[0],
            "sid=tok; Max-Age=86400; Path=/; HttpOnly; Secure; SameSite=Lax"
        );
        let expected = now.timestamp_millis() + 86_400_000;
        assert_eq!(
            cookies[1],
            format!("sid_expires={expected}; Max-Age=86400; Path=/; HttpOnly; Secure; SameSite=Lax")
        );
    }

    #[test]
    fn written_cookies_read_back_as_keep() {
        let now = Utc::now();
        let t = tracker();
        let mut response = HeaderMap::new();
        t.apply(&mut response, "tok", now);

        // Replay the cookie values as the browser would send them.
        let replay: Vec<String> = set_cookies(&response)
            .iter()
            .map(|c| c.split(';').next().unwrap().to_string())
            .collect();
        let state = t.read(&request(&replay.join("; ")), now);
        assert_eq!(state.action, SessionAction::Keep);
    }

    #[test]
    fn encoded_token_survives_refresh() {
        let now = Utc::now();
        let t = tracker();
        let state = t.read(&request("sid=abc%3Bdef%20g"), now);
        assert_eq!(state.token(), Some("abc;def g"));
        assert_eq!(state.action, SessionAction::Set);

        let mut response = HeaderMap::new();
        t.apply(&mut response, &state.value, now);
        let cookies = set_cookies(&response);
        assert!(
            cookies[0].starts_with("sid=abc%3Bdef%20g;"),
            "{}",
            cookies[0]
        );

        let replay: Vec<String> = cookies
            .iter()
            .map(|c| c.split(';').next().unwrap().to_string())
            .collect();
        let again = t.read(&request(&replay.join("; ")), now);
        assert_eq!(again.token(), Some("abc;def g"));
        assert_eq!(again.action, SessionAction::Keep);
    }

    #[test]
    fn clear_is_idempotent() {
        let t = tracker();
        let mut once = HeaderMap::new();
        t.clear(&mut once);

        let mut twice = HeaderMap::new();
        t.clear(&mut twice);
        t.clear(&mut twice);

        assert_eq!(set_cookies(&once), set_cookies(&twice));
        assert_eq!(set_cookies(&once).len(), 2);
        assert!(set_cookies(&once).iter().all(|c| c.contains("Max-Age=0")));
    }

    #[test]
    fn clear_replaces_a_pending_refresh() {
        let t = tracker();
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("theme=dark; Path=/"));
        t.apply(&mut headers, "tok", Utc::now());
        assert!(t.is_written(&headers));

        t.clear(&mut headers);
        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[0], "theme=dark; Path=/");
        assert!(cookies[1].starts_with("sid=;"));
        assert!(cookies[2].starts_with("sid_expires=;"));
    }
}
