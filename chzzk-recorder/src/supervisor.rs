//! Owns the map `channel → RecordingHandle`; drives start/stop/restart on
//! liveness transitions and detects stalls via output file growth.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chzzk_engine::{AuthStore, ChzzkClient, Downloader, DownloaderOptions, LiveDetailOutcome, TerminalReason};
use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::poller::ChannelPollResult;

struct RecordingHandle {
    output_path: PathBuf,
    started_at: Instant,
    cancel: CancellationToken,
    task: JoinHandle<TerminalReason>,
    progress: watch::Receiver<u64>,
    last_observed_size: u64,
    last_growth_at: Instant,
}

pub struct Supervisor {
    http: Client,
    auth: Arc<AuthStore>,
    client: Arc<ChzzkClient>,
    downloader_options: DownloaderOptions,
    stall_restart_sec: u64,
    handles: HashMap<String, RecordingHandle>,
}

/// What happened to a channel during one tick, for the heartbeat log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    StallRestarted,
}

impl Supervisor {
    pub fn new(
        http: Client,
        auth: Arc<AuthStore>,
        client: Arc<ChzzkClient>,
        downloader_options: DownloaderOptions,
        stall_restart_sec: u64,
    ) -> Self {
        Self {
            http,
            auth,
            client,
            downloader_options,
            stall_restart_sec,
            handles: HashMap::new(),
        }
    }

    pub fn currently_recording(&self) -> Vec<String> {
        self.handles.keys().cloned().collect()
    }

    /// Signal every active worker to stop. Used on graceful shutdown; does not wait
    /// for workers to finish, the caller is expected to allow a short grace period.
    pub fn cancel_all(&mut self) {
        for (channel, handle) in self.handles.drain() {
            info!(channel = %channel, "cancelling worker for shutdown");
            handle.cancel.cancel();
        }
    }

    /// Run one supervisor tick: reap, stall-check, stop-stale, start-new.
    #[instrument(skip(self, poll_results))]
    pub async fn tick(&mut self, poll_results: &[(String, ChannelPollResult)]) -> Vec<(String, Transition)> {
        let mut transitions = Vec::new();

        self.reap(&mut transitions);
        self.stall_check(&mut transitions).await;
        self.stop_stale(poll_results, &mut transitions);
        self.start_new(poll_results, &mut transitions).await;

        let recording: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        if transitions.is_empty() {
            info!(recording = ?recording, "tick complete, no transitions");
        } else {
            info!(recording = ?recording, transitions = ?transitions, "tick complete");
        }

        transitions
    }

    fn reap(&mut self, transitions: &mut Vec<(String, Transition)>) {
        let dead: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, h)| h.task.is_finished())
            .map(|(c, _)| c.clone())
            .collect();

        for channel in dead {
            self.handles.remove(&channel);
            transitions.push((channel, Transition::Stopped));
        }
    }

    async fn stall_check(&mut self, transitions: &mut Vec<(String, Transition)>) {
        let mut stalled = Vec::new();
        for (channel, handle) in self.handles.iter_mut() {
            let size = *handle.progress.borrow();

            if size > handle.last_observed_size {
                handle.last_observed_size = size;
                handle.last_growth_at = Instant::now();
            } else if handle.last_growth_at.elapsed() >= Duration::from_secs(self.stall_restart_sec) {
                stalled.push(channel.clone());
            }
        }

        for channel in stalled {
            if let Some(handle) = self.handles.remove(&channel) {
                warn!(channel = %channel, "stall detected, killing worker");
                handle.cancel.cancel();
                transitions.push((channel, Transition::StallRestarted));
            }
        }
    }

    fn stop_stale(&mut self, poll_results: &[(String, ChannelPollResult)], transitions: &mut Vec<(String, Transition)>) {
        for (channel, result) in poll_results {
            if !matches!(result, ChannelPollResult::Offline) {
                continue;
            }
            if let Some(handle) = self.handles.remove(channel) {
                info!(channel = %channel, "confirmed offline, stopping worker");
                handle.cancel.cancel();
                transitions.push((channel.clone(), Transition::Stopped));
            }
        }
    }

    async fn start_new(&mut self, poll_results: &[(String, ChannelPollResult)], transitions: &mut Vec<(String, Transition)>) {
        for (channel, result) in poll_results {
            if !matches!(result, ChannelPollResult::Live(_)) {
                continue;
            }
            if self.handles.contains_key(channel) {
                continue;
            }

            let detail = match self.client.get_live_detail(channel).await {
                Ok(LiveDetailOutcome::Live(detail)) => detail,
                Ok(LiveDetailOutcome::Offline) => continue,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "failed to re-confirm liveness before starting");
                    continue;
                }
            };

            let cancel = CancellationToken::new();
            let (progress_tx, progress_rx) = watch::channel(0u64);
            let downloader = Downloader::new(
                self.http.clone(),
                self.auth.clone(),
                detail,
                self.downloader_options.clone(),
                progress_tx,
                cancel.clone(),
            );
            let output_path = downloader.output_path();
            let task = tokio::spawn(downloader.run());

            self.handles.insert(
                channel.clone(),
                RecordingHandle {
                    output_path,
                    started_at: Instant::now(),
                    cancel,
                    task,
                    progress: progress_rx,
                    last_observed_size: 0,
                    last_growth_at: Instant::now(),
                },
            );
            info!(channel = %channel, "recording started");
            transitions.push((channel.clone(), Transition::Started));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chzzk_engine::ChzzkClient;

    #[test]
    fn invariant_at_most_one_handle_per_channel() {
        // HashMap<String, RecordingHandle> enforces this structurally: inserting
        // under an existing key replaces rather than duplicates the entry.
        let mut handles: HashMap<String, u32> = HashMap::new();
        handles.insert("c1".to_string(), 1);
        handles.insert("c1".to_string(), 2);
        assert_eq!(handles.len(), 1);
        assert_eq!(handles["c1"], 2);
    }

    fn test_supervisor() -> Supervisor {
        let http = Client::new();
        let auth = Arc::new(AuthStore::from_cookies(Default::default()));
        let client = Arc::new(ChzzkClient::new(http.clone(), auth.clone()));
        Supervisor::new(http, auth, client, DownloaderOptions::default(), 180)
    }

    fn fake_handle(output_path: PathBuf, last_growth_at: Instant) -> RecordingHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(async { TerminalReason::Cancelled });
        let (_progress_tx, progress_rx) = watch::channel(0u64);
        RecordingHandle {
            output_path,
            started_at: Instant::now(),
            cancel,
            task,
            progress: progress_rx,
            last_observed_size: 0,
            last_growth_at,
        }
    }

    #[tokio::test]
    async fn reap_removes_finished_workers() {
        let mut supervisor = test_supervisor();
        let handle = fake_handle(PathBuf::from("/tmp/does-not-matter.ts"), Instant::now());
        supervisor.handles.insert("c1".to_string(), handle);

        // give the trivially-completing task a chance to finish
        for _ in 0..50 {
            if supervisor.handles["c1"].task.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let mut transitions = Vec::new();
        supervisor.reap(&mut transitions);
        assert!(supervisor.handles.is_empty());
        assert_eq!(transitions, vec![("c1".to_string(), Transition::Stopped)]);
    }

    #[tokio::test]
    async fn stop_stale_cancels_only_confirmed_offline_channels() {
        let mut supervisor = test_supervisor();
        supervisor.handles.insert(
            "c1".to_string(),
            fake_handle(PathBuf::from("/tmp/c1.ts"), Instant::now()),
        );
        supervisor.handles.insert(
            "c2".to_string(),
            fake_handle(PathBuf::from("/tmp/c2.ts"), Instant::now()),
        );

        let poll_results = vec![
            ("c1".to_string(), ChannelPollResult::Offline),
            ("c2".to_string(), ChannelPollResult::Errored),
        ];
        let mut transitions = Vec::new();
        supervisor.stop_stale(&poll_results, &mut transitions);

        assert!(!supervisor.handles.contains_key("c1"));
        assert!(supervisor.handles.contains_key("c2"));
        assert_eq!(transitions, vec![("c1".to_string(), Transition::Stopped)]);
    }

    #[tokio::test]
    async fn stall_check_kills_worker_after_threshold() {
        let mut supervisor = test_supervisor();
        supervisor.stall_restart_sec = 10;
        let stale_growth = Instant::now() - Duration::from_secs(20);
        supervisor
            .handles
            .insert("c1".to_string(), fake_handle(PathBuf::from("/nonexistent/c1.ts"), stale_growth));

        let mut transitions = Vec::new();
        supervisor.stall_check(&mut transitions).await;

        assert!(!supervisor.handles.contains_key("c1"));
        assert_eq!(transitions, vec![("c1".to_string(), Transition::StallRestarted)]);
    }

    #[tokio::test]
    async fn stall_check_leaves_recently_grown_worker_alone() {
        let mut supervisor = test_supervisor();
        supervisor.stall_restart_sec = 180;
        supervisor.handles.insert(
            "c1".to_string(),
            fake_handle(PathBuf::from("/nonexistent/c1.ts"), Instant::now()),
        );

        let mut transitions = Vec::new();
        supervisor.stall_check(&mut transitions).await;

        assert!(supervisor.handles.contains_key("c1"));
        assert!(transitions.is_empty());
    }
}
