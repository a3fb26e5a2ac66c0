//! Live HLS download loop: one [`Downloader`] per active recording.
//!
//! Expressed as an explicit small state machine (`FetchPlaylist` → `FetchSegment` →
//! `BackoffAndAdvance`) rather than chained callbacks, so a stalled or misbehaving
//! server produces a bounded, observable sequence of states instead of a deeply
//! nested retry closure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, StatusCode, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::auth::AuthStore;
use crate::client::LiveDetail;
use crate::config::{OnStartPrevious, Quality};
use crate::error::{EngineError, Result};
use crate::filename::sanitize;
use crate::playlist;

const STALL_TICK: Duration = Duration::from_secs(1);
const STALL_SECONDS_DEFAULT: u64 = 15;
const PREFETCH_DEFAULT: usize = 2;
const LIVE_EDGE_BIAS_DEFAULT: u64 = 2;
const LOOP_SLEEP: Duration = Duration::from_millis(100);
const SEGMENT_CHUNK: usize = 64 * 1024;
const PLAYLIST_TIMEOUT: Duration = Duration::from_secs(10);
const SEGMENT_READ_TIMEOUT: Duration = Duration::from_secs(6);
const BACKOFF: Duration = Duration::from_millis(500);

/// Parameters a [`Downloader`] is constructed with. Fields default the same way the
/// on-disk config does, so callers only set what they want to override.
#[derive(Debug, Clone)]
pub struct DownloaderOptions {
    pub recordings_root: PathBuf,
    pub archive_dir: PathBuf,
    pub on_start_previous: OnStartPrevious,
    pub quality: Quality,
    pub prefetch: usize,
    pub live_edge_bias: u64,
    pub stall_seconds: u64,
    pub ll_hls: bool,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            recordings_root: PathBuf::from("./recordings"),
            archive_dir: PathBuf::from("./archive"),
            on_start_previous: OnStartPrevious::Keep,
            quality: Quality::Best,
            prefetch: PREFETCH_DEFAULT,
            live_edge_bias: LIVE_EDGE_BIAS_DEFAULT,
            stall_seconds: STALL_SECONDS_DEFAULT,
            ll_hls: true,
        }
    }
}

/// Why a [`Downloader::run`] call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    Cancelled,
    AuthExpired,
    Error(String),
}

enum State {
    FetchPlaylist,
    FetchSegment,
    BackoffAndAdvance,
}

struct Position {
    msn: u64,
    part: u64,
}

/// Of a freshly-fetched media playlist's segment URIs, return only the ones at or
/// after `want_msn`. `first_seq` is the sequence number the server assigned the
/// playlist's first listed segment (`#EXT-X-MEDIA-SEQUENCE`); segments older than
/// `want_msn` have already been downloaded and must not be appended again.
fn segments_from(want_msn: u64, first_seq: Option<u64>, uris: Vec<String>) -> Vec<String> {
    let first_seq = first_seq.unwrap_or(want_msn);
    let skip = want_msn.saturating_sub(first_seq) as usize;
    if skip >= uris.len() {
        Vec::new()
    } else {
        uris[skip..].to_vec()
    }
}

/// Records one live session to one output `.ts` file.
pub struct Downloader {
    http: Client,
    auth: Arc<AuthStore>,
    live_detail: LiveDetail,
    options: DownloaderOptions,
    progress_tx: watch::Sender<u64>,
    cancel: CancellationToken,
    started_at: chrono::DateTime<chrono::Local>,
}

impl Downloader {
    pub fn new(
        http: Client,
        auth: Arc<AuthStore>,
        live_detail: LiveDetail,
        options: DownloaderOptions,
        progress_tx: watch::Sender<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            auth,
            live_detail,
            options,
            progress_tx,
            cancel,
            started_at: chrono::Local::now(),
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.options
            .recordings_root
            .join(sanitize(&self.live_detail.channel_id))
    }

    /// The output path this instance will record to. Stable for the lifetime of this
    /// `Downloader`; callers that need to track output size externally (the
    /// supervisor's stall watchdog) can read it before spawning [`Downloader::run`].
    pub fn output_path(&self) -> PathBuf {
        let stamp = self.started_at.format("%Y%m%d_%H%M%S");
        let title = sanitize(&self.live_detail.live_title);
        self.output_dir().join(format!("{stamp}_{title}.ts"))
    }

    /// Move aside or delete pre-existing files in the channel's output directory,
    /// per `onStartPrevious`. Never fatal: failures are logged and swallowed.
    #[instrument(skip(self), fields(channel = %self.live_detail.channel_id))]
    async fn housekeep(&self) {
        let dir = self.output_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return, // directory doesn't exist yet, nothing to do
        };

        let mut existing = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name();
                    if !name.to_string_lossy().starts_with('.') {
                        existing.push(entry.path());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to list previous recordings");
                    break;
                }
            }
        }

        if existing.is_empty() {
            return;
        }

        match self.options.on_start_previous {
            OnStartPrevious::Keep => {}
            OnStartPrevious::Delete => {
                for path in existing {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %e, "failed to delete previous recording");
                    }
                }
            }
            OnStartPrevious::Archive => {
                let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                let dest_dir = self
                    .options
                    .archive_dir
                    .join(sanitize(&self.live_detail.channel_id))
                    .join(stamp.to_string());
                if let Err(e) = tokio::fs::create_dir_all(&dest_dir).await {
                    warn!(error = %e, "failed to create archive directory");
                    return;
                }
                for path in existing {
                    let Some(file_name) = path.file_name() else {
                        continue;
                    };
                    if let Err(e) = tokio::fs::rename(&path, dest_dir.join(file_name)).await {
                        warn!(path = %path.display(), error = %e, "failed to archive previous recording");
                    }
                }
            }
        }
    }

    /// Run the download loop to completion. Returns when cancelled, when
    /// authentication is rejected, or when an unrecoverable error occurs.
    #[instrument(skip(self), fields(channel = %self.live_detail.channel_id))]
    pub async fn run(mut self) -> TerminalReason {
        self.housekeep().await;

        if let Err(e) = tokio::fs::create_dir_all(self.output_dir()).await {
            return TerminalReason::Error(format!("failed to create output directory: {e}"));
        }

        let output_path = self.output_path();
        let mut file = match File::create(&output_path).await {
            Ok(file) => file,
            Err(e) => return TerminalReason::Error(format!("failed to open output file: {e}")),
        };

        info!(path = %output_path.display(), "recording started");

        let master_url = match Url::parse(&self.live_detail.master_playlist_url) {
            Ok(url) => url,
            Err(_) => {
                return TerminalReason::Error("invalid master playlist url".to_string());
            }
        };

        let variant_url = match self.resolve_variant(&master_url).await {
            Ok(url) => url,
            Err(EngineError::AuthExpired) => return TerminalReason::AuthExpired,
            Err(e) => return TerminalReason::Error(e.to_string()),
        };

        let mut state = State::FetchPlaylist;
        let mut position: Option<Position> = None;
        let mut bytes_written: u64 = 0;
        let mut last_size_at_tick: u64 = 0;
        let mut idle_ticks: u64 = 0;
        let mut last_tick = Instant::now();
        let mut pending_segments: Vec<String> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if last_tick.elapsed() >= STALL_TICK {
                last_tick = Instant::now();
                if bytes_written > last_size_at_tick {
                    idle_ticks = 0;
                } else {
                    idle_ticks += 1;
                    if idle_ticks * STALL_TICK.as_secs() >= self.options.stall_seconds {
                        if let Some(pos) = position.as_mut() {
                            pos.msn += 1;
                            pos.part = 0;
                        }
                        idle_ticks = 0;
                    }
                }
                last_size_at_tick = bytes_written;
            }

            match state {
                State::FetchPlaylist => {
                    match self.fetch_playlist(&variant_url, position.as_ref()).await {
                        Ok((sequence, uris)) => {
                            if position.is_none() {
                                position = Some(Position {
                                    msn: sequence.unwrap_or(0) + self.options.live_edge_bias,
                                    part: 0,
                                });
                            }

                            let pos = position.as_ref().expect("position set above");
                            pending_segments = segments_from(pos.msn, sequence, uris);
                            state = State::FetchSegment;
                        }
                        Err(EngineError::AuthExpired) => return TerminalReason::AuthExpired,
                        Err(_) => {
                            state = State::BackoffAndAdvance;
                        }
                    }
                }
                State::FetchSegment => {
                    let base = variant_url
                        .join(".")
                        .unwrap_or_else(|_| variant_url.clone());
                    let take = pending_segments.len().min(self.options.prefetch);
                    let mut failed = false;
                    let mut consumed: u64 = 0;

                    for uri in pending_segments.drain(..take) {
                        let segment_url = match base.join(&uri) {
                            Ok(url) => url,
                            Err(_) => continue,
                        };
                        match self.fetch_segment(segment_url, &mut file).await {
                            Ok(written) => {
                                bytes_written += written;
                                consumed += 1;
                                let _ = self.progress_tx.send(bytes_written);
                            }
                            Err(EngineError::AuthExpired) => return TerminalReason::AuthExpired,
                            Err(_) => {
                                failed = true;
                                break;
                            }
                        }
                        if self.cancel.is_cancelled() {
                            break;
                        }
                    }

                    // Advance past exactly the segments we actually wrote, so the next
                    // FetchPlaylist skip-calculation neither repeats nor drops one.
                    if let Some(pos) = position.as_mut() {
                        pos.msn += consumed;
                        pos.part = 0;
                    }

                    state = if failed {
                        State::BackoffAndAdvance
                    } else {
                        State::FetchPlaylist
                    };
                }
                State::BackoffAndAdvance => {
                    if let Some(pos) = position.as_mut() {
                        pos.msn += 1;
                        pos.part = 0;
                    }
                    tokio::time::sleep(BACKOFF).await;
                    state = State::FetchPlaylist;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(LOOP_SLEEP) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        if let Err(e) = file.flush().await {
            warn!(error = %e, "failed to flush output file on shutdown");
        }
        drop(file);

        info!(bytes_written, "recording stopped");
        TerminalReason::Cancelled
    }

    async fn resolve_variant(&self, master_url: &Url) -> Result<Url> {
        let headers = self.auth.current_headers();
        let response = self
            .http
            .get(master_url.clone())
            .headers(headers.headers().clone())
            .timeout(PLAYLIST_TIMEOUT)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(EngineError::AuthExpired);
        }
        if !response.status().is_success() {
            return Err(EngineError::StatusCode(response.status()));
        }

        let text = response.text().await?;
        let variants = playlist::parse_master(&text, master_url)?;
        if variants.is_empty() {
            return Ok(master_url.clone());
        }

        let variant = playlist::select_variant(&variants, self.options.quality)
            .ok_or_else(|| EngineError::PlaylistParse("no variants in master playlist".to_string()))?;
        Url::parse(&variant.absolute_url).map_err(|_| EngineError::InvalidUrl(variant.absolute_url.clone()))
    }

    async fn fetch_playlist(
        &self,
        variant_url: &Url,
        position: Option<&Position>,
    ) -> Result<(Option<u64>, Vec<String>)> {
        let mut url = variant_url.clone();
        if self.options.ll_hls {
            if let Some(pos) = position {
                url.query_pairs_mut()
                    .append_pair("_HLS_msn", &pos.msn.to_string())
                    .append_pair("_HLS_part", &pos.part.to_string());
            }
        }

        let headers = self.auth.current_headers();
        let response = self
            .http
            .get(url)
            .headers(headers.headers().clone())
            .timeout(PLAYLIST_TIMEOUT)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(EngineError::AuthExpired);
        }
        if !response.status().is_success() {
            return Err(EngineError::StatusCode(response.status()));
        }

        let text = response.text().await?;
        playlist::parse_media(&text)
    }

    async fn fetch_segment(&self, segment_url: Url, file: &mut File) -> Result<u64> {
        let headers = self.auth.current_headers();
        let response = self
            .http
            .get(segment_url)
            .headers(headers.headers().clone())
            .timeout(SEGMENT_READ_TIMEOUT)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(EngineError::AuthExpired);
        }
        if !response.status().is_success() {
            return Err(EngineError::StatusCode(response.status()));
        }

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut buffer: Vec<u8> = Vec::with_capacity(SEGMENT_CHUNK);

        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk?;
            buffer.extend_from_slice(&chunk);
            while buffer.len() >= SEGMENT_CHUNK {
                let to_write: Vec<u8> = buffer.drain(..SEGMENT_CHUNK).collect();
                file.write_all(&to_write).await?;
                written += to_write.len() as u64;
            }
        }
        if !buffer.is_empty() {
            written += buffer.len() as u64;
            file.write_all(&buffer).await?;
        }

        debug!(bytes = written, "segment written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_from_skips_already_downloaded_segments() {
        let uris = vec!["a.ts", "b.ts", "c.ts"]
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        // playlist's first segment is sequence 10; we already consumed up to 11,
        // so only "b.ts" (seq 11) and "c.ts" (seq 12) are new.
        let pending = segments_from(11, Some(10), uris);
        assert_eq!(pending, vec!["b.ts".to_string(), "c.ts".to_string()]);
    }

    #[test]
    fn segments_from_returns_everything_on_first_fetch() {
        let uris = vec!["a.ts", "b.ts"].into_iter().map(str::to_string).collect::<Vec<_>>();
        let pending = segments_from(5, Some(5), uris.clone());
        assert_eq!(pending, uris);
    }

    #[test]
    fn segments_from_is_empty_when_server_has_nothing_new() {
        let uris = vec!["a.ts", "b.ts"].into_iter().map(str::to_string).collect::<Vec<_>>();
        let pending = segments_from(20, Some(10), uris);
        assert!(pending.is_empty());
    }

    #[test]
    fn default_options_match_spec_defaults() {
        let options = DownloaderOptions::default();
        assert_eq!(options.prefetch, 2);
        assert_eq!(options.live_edge_bias, 2);
        assert_eq!(options.stall_seconds, 15);
        assert!(options.ll_hls);
    }

    #[tokio::test]
    async fn housekeep_is_a_noop_when_directory_is_absent() {
        let tmp = tempfile_dir();
        let options = DownloaderOptions {
            recordings_root: tmp.clone(),
            ..Default::default()
        };
        let (tx, _rx) = watch::channel(0u64);
        let downloader = Downloader::new(
            Client::new(),
            Arc::new(AuthStore::from_cookies(Default::default())),
            LiveDetail {
                channel_id: "chan1".to_string(),
                channel_name: "chan1".to_string(),
                live_title: "title".to_string(),
                video_id: "v1".to_string(),
                master_playlist_url: "https://example.com/master.m3u8".to_string(),
                adult: false,
            },
            options,
            tx,
            CancellationToken::new(),
        );
        downloader.housekeep().await; // directory does not exist; must not panic
        let _ = tokio::fs::remove_dir_all(&tmp).await;
    }

    fn tempfile_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("chzzk-downloader-test-{}", std::process::id()));
        dir
    }
}
