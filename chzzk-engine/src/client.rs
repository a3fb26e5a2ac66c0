//! Typed access to the Chzzk live-detail endpoint.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::auth::AuthStore;
use crate::error::{EngineError, Result};

const LIVE_DETAIL_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

fn live_detail_url(channel_id: &str) -> String {
    format!("https://api.chzzk.naver.com/service/v1/channels/{channel_id}/live-detail")
}

/// An immutable snapshot of one live poll outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveDetail {
    pub channel_id: String,
    pub channel_name: String,
    pub live_title: String,
    pub video_id: String,
    pub master_playlist_url: String,
    pub adult: bool,
}

/// Result of one `getLiveDetail` call. `Offline` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveDetailOutcome {
    Live(LiveDetail),
    Offline,
}

#[derive(Debug, Deserialize)]
struct LiveDetailResponse {
    content: Option<LiveDetailContent>,
}

#[derive(Debug, Deserialize)]
struct LiveDetailContent {
    status: Option<String>,
    #[serde(default)]
    adult: bool,
    #[serde(rename = "liveTitle", default)]
    live_title: String,
    channel: Option<ChannelInfo>,
    #[serde(rename = "livePlaybackJson")]
    live_playback_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    #[serde(rename = "channelName", default)]
    channel_name: String,
}

#[derive(Debug, Deserialize)]
struct PlaybackJson {
    media: Vec<PlaybackMedia>,
    meta: PlaybackMeta,
}

#[derive(Debug, Deserialize)]
struct PlaybackMedia {
    #[serde(rename = "mediaId")]
    media_id: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct PlaybackMeta {
    #[serde(rename = "videoId", default)]
    video_id: String,
}

enum StepOutcome {
    Done(LiveDetailOutcome),
    Retry,
}

pub struct ChzzkClient {
    http: Client,
    auth: std::sync::Arc<AuthStore>,
}

impl ChzzkClient {
    pub fn new(http: Client, auth: std::sync::Arc<AuthStore>) -> Self {
        Self { http, auth }
    }

    /// Query the live-detail endpoint for `channel_id`, retrying transient failures.
    ///
    /// Returns `Ok(Offline)` for definitive offline conditions, `Ok(Live(..))` when a
    /// playable HLS path was found, and `Err` after attempts are exhausted (callers
    /// should treat a transport `Err` as Offline-for-this-tick, per the poller's
    /// conservative restart policy) or immediately on `AuthExpired`.
    pub async fn get_live_detail(&self, channel_id: &str) -> Result<LiveDetailOutcome> {
        let url = live_detail_url(channel_id);

        for attempt in 1..=MAX_ATTEMPTS {
            let headers = self.auth.current_headers();
            let result = self
                .http
                .get(&url)
                .headers(headers.headers().clone())
                .timeout(LIVE_DETAIL_TIMEOUT)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(EngineError::from(e));
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(EngineError::AuthExpired);
            }
            if !status.is_success() {
                if attempt == MAX_ATTEMPTS {
                    return Err(EngineError::StatusCode(status));
                }
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }

            let body: LiveDetailResponse = response.json().await?;
            match self.evaluate(channel_id, body, headers.has_adult_auth()) {
                StepOutcome::Done(outcome) => return Ok(outcome),
                StepOutcome::Retry => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(EngineError::StatusCode(StatusCode::INTERNAL_SERVER_ERROR));
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }

        unreachable!("loop always returns or errors by the final attempt")
    }

    fn evaluate(
        &self,
        channel_id: &str,
        body: LiveDetailResponse,
        has_adult_auth: bool,
    ) -> StepOutcome {
        let content = match body.content {
            Some(content) => content,
            None => return StepOutcome::Done(LiveDetailOutcome::Offline),
        };

        if content.adult && !has_adult_auth {
            tracing::warn!(channel = %channel_id, "adult-flagged channel without adult auth, treating as offline");
            return StepOutcome::Done(LiveDetailOutcome::Offline);
        }

        let playback_raw = match &content.live_playback_json {
            Some(raw) => raw,
            None => {
                if content.status.as_deref() == Some("ENDED") {
                    return StepOutcome::Done(LiveDetailOutcome::Offline);
                }
                return StepOutcome::Retry;
            }
        };

        let playback: PlaybackJson = match serde_json::from_str(playback_raw) {
            Ok(playback) => playback,
            Err(_) => return StepOutcome::Retry,
        };

        let hls_path = playback
            .media
            .iter()
            .find(|m| m.media_id.eq_ignore_ascii_case("hls"))
            .map(|m| m.path.clone());

        let Some(master_playlist_url) = hls_path else {
            return StepOutcome::Retry;
        };

        StepOutcome::Done(LiveDetailOutcome::Live(LiveDetail {
            channel_id: channel_id.to_string(),
            channel_name: content
                .channel
                .map(|c| c.channel_name)
                .unwrap_or_default(),
            live_title: content.live_title,
            video_id: playback.meta.video_id,
            master_playlist_url,
            adult: content.adult,
        }))
    }
}
