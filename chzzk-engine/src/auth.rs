//! Cookie jar and derived HTTP headers for Chzzk requests.
//!
//! `AuthStore` holds a versioned snapshot of [`AuthHeaders`] behind a `parking_lot::RwLock`.
//! Readers take a clone of the `Arc` under a brief critical section and never observe a
//! half-updated header set; `replace` swaps the whole snapshot atomically so in-flight
//! requests keep whatever headers they already captured.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::error::{EngineError, Result};

const ORIGIN: &str = "https://chzzk.naver.com";
const REFERER: &str = "https://chzzk.naver.com/";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
const FALLBACK_DEVICE_ID: &str = "4438f666-fa96-4d28-9cc8-39c460399cc8";
const DEVICE_ID_COOKIE: &str = "ba.uuid";
const ADULT_AUTH_COOKIE: &str = "NID_SES";

#[derive(Debug, Deserialize)]
struct SessionCookie {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SessionBlob {
    cookies: Vec<SessionCookie>,
}

/// A derived, ready-to-send header set for one cookie snapshot.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    headers: HeaderMap,
    has_adult_auth: bool,
}

impl AuthHeaders {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the snapshot that produced these headers carries the `NID_SES` cookie
    /// (Naver's full-login marker), required to view adult-flagged channels.
    pub fn has_adult_auth(&self) -> bool {
        self.has_adult_auth
    }

    fn derive(cookies: &HashMap<String, String>) -> Self {
        let cookie_string = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");

        let device_id = cookies
            .get(DEVICE_ID_COOKIE)
            .cloned()
            .unwrap_or_else(|| FALLBACK_DEVICE_ID.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_USER_AGENT),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static(ORIGIN));
        headers.insert(reqwest::header::REFERER, HeaderValue::from_static(REFERER));
        headers.insert(
            HeaderName::from_static("front-client-platform-type"),
            HeaderValue::from_static("PC"),
        );
        headers.insert(
            HeaderName::from_static("front-client-product-type"),
            HeaderValue::from_static("web"),
        );
        if let Ok(value) = HeaderValue::from_str(&cookie_string) {
            headers.insert(reqwest::header::COOKIE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&device_id) {
            headers.insert(HeaderName::from_static("deviceid"), value);
        }

        Self {
            headers,
            has_adult_auth: cookies.contains_key(ADULT_AUTH_COOKIE),
        }
    }
}

/// Shared, read-mostly cookie jar. Construct once at startup from a persisted session
/// blob; `SessionRefresher` is the only expected writer.
pub struct AuthStore {
    state: RwLock<Arc<AuthHeaders>>,
}

impl AuthStore {
    /// Load cookies from a session blob at `path` (`{"cookies":[{"name","value"}...]}`,
    /// the shape a browser `storage_state()` dump produces).
    pub fn from_session_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::SessionMissing(format!("session file {}: {e}", path.display()))
        })?;
        let blob: SessionBlob = serde_json::from_str(&raw)?;
        let cookies = blob
            .cookies
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect::<HashMap<_, _>>();

        Ok(Self {
            state: RwLock::new(Arc::new(AuthHeaders::derive(&cookies))),
        })
    }

    /// Returns the currently active header set. Safe to call concurrently; the
    /// critical section is just an `Arc` clone under a read lock.
    pub fn current_headers(&self) -> Arc<AuthHeaders> {
        self.state.read().clone()
    }

    /// Atomically install a new cookie set and its derived headers.
    pub fn replace(&self, cookies: HashMap<String, String>) {
        let derived = Arc::new(AuthHeaders::derive(&cookies));
        *self.state.write() = derived;
    }

    /// Build a store directly from an in-memory cookie set, bypassing the session file.
    /// Used by other modules' tests that need an `AuthStore` without touching disk.
    #[doc(hidden)]
    pub fn from_cookies(cookies: HashMap<String, String>) -> Self {
        Self {
            state: RwLock::new(Arc::new(AuthHeaders::derive(&cookies))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookies(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn derives_cookie_header_and_device_id() {
        let headers = AuthHeaders::derive(&cookies(&[
            ("NID_AUT", "abc"),
            ("ba.uuid", "11111111-1111-1111-1111-111111111111"),
        ]));
        let cookie_header = headers.headers().get(reqwest::header::COOKIE).unwrap();
        assert!(cookie_header.to_str().unwrap().contains("NID_AUT=abc"));
        let device_id = headers.headers().get("deviceid").unwrap();
        assert_eq!(device_id, "11111111-1111-1111-1111-111111111111");
    }

    #[test]
    fn falls_back_to_default_device_id() {
        let headers = AuthHeaders::derive(&cookies(&[("NID_AUT", "abc")]));
        let device_id = headers.headers().get("deviceid").unwrap();
        assert_eq!(device_id, FALLBACK_DEVICE_ID);
    }

    #[test]
    fn adult_auth_tracks_nid_ses_cookie() {
        assert!(!AuthHeaders::derive(&cookies(&[])).has_adult_auth());
        assert!(AuthHeaders::derive(&cookies(&[("NID_SES", "x")])).has_adult_auth());
    }

    #[test]
    fn replace_is_observed_by_subsequent_reads() {
        let store = AuthStore {
            state: RwLock::new(Arc::new(AuthHeaders::derive(&cookies(&[("a", "1")])))),
        };
        let before = store.current_headers();
        assert!(
            before
                .headers()
                .get(reqwest::header::COOKIE)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("a=1")
        );

        store.replace(cookies(&[("b", "2")]));
        let after = store.current_headers();
        assert!(
            after
                .headers()
                .get(reqwest::header::COOKIE)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("b=2")
        );
        // the snapshot taken before replace() is untouched
        assert!(
            before
                .headers()
                .get(reqwest::header::COOKIE)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("a=1")
        );
    }
}
