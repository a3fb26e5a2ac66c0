//! Scheduled session refresh.
//!
//! Fires once per entered hour in `sessionRefreshHours`, calls out to a
//! [`SessionLogin`] collaborator, and swaps the new cookies into `AuthStore`.
//! Active recordings are never restarted: the next HTTP call each worker makes picks
//! up the new headers on its own.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Timelike};
use chzzk_engine::AuthStore;
use tracing::{info, warn};

/// External collaborator that performs the actual (browser-driven) login and
/// produces a fresh cookie jar. A concrete implementation is out of scope for this
/// crate; only the trait and the scheduling logic that calls it live here.
#[async_trait]
pub trait SessionLogin: Send + Sync {
    async fn refresh(&self) -> Result<HashMap<String, String>, String>;
}

/// Standalone fallback: always fails, with a log line explaining why. Lets the binary
/// run without a real login collaborator wired in.
pub struct NoopSessionLogin;

#[async_trait]
impl SessionLogin for NoopSessionLogin {
    async fn refresh(&self) -> Result<HashMap<String, String>, String> {
        Err("session refresh is disabled: no SessionLogin collaborator configured".to_string())
    }
}

pub struct SessionRefresher {
    auth: Arc<AuthStore>,
    login: Arc<dyn SessionLogin>,
    refresh_hours: BTreeSet<u8>,
    last_refreshed_hour: Option<u8>,
}

impl SessionRefresher {
    pub fn new(auth: Arc<AuthStore>, login: Arc<dyn SessionLogin>, refresh_hours: BTreeSet<u8>) -> Self {
        Self {
            auth,
            login,
            refresh_hours,
            last_refreshed_hour: None,
        }
    }

    /// Call once per coordinator tick. Fires at most once per calendar hour, the
    /// first time that hour is observed to be in `refresh_hours`.
    pub async fn maybe_refresh(&mut self) {
        let hour = Local::now().hour() as u8;
        if !self.refresh_hours.contains(&hour) {
            return;
        }
        if self.last_refreshed_hour == Some(hour) {
            return;
        }

        match self.login.refresh().await {
            Ok(cookies) => {
                self.auth.replace(cookies);
                self.last_refreshed_hour = Some(hour);
                info!(hour, "session refreshed");
            }
            Err(e) => {
                warn!(hour, error = %e, "session refresh failed");
                self.last_refreshed_hour = Some(hour);
            }
        }
    }
}
