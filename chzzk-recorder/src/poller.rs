//! Periodic multi-channel liveness polling.

use std::collections::BTreeSet;
use std::sync::Arc;

use chzzk_engine::{ChzzkClient, LiveDetail, LiveDetailOutcome};
use tracing::{instrument, warn};

/// Outcome of polling one channel for one tick. `Errored` is kept distinct from
/// `Offline` so the supervisor can apply its conservative "don't stop on error" rule.
#[derive(Debug, Clone)]
pub enum ChannelPollResult {
    Live(LiveDetail),
    Offline,
    Errored,
}

pub struct Poller {
    client: Arc<ChzzkClient>,
    target_channels: BTreeSet<String>,
}

impl Poller {
    pub fn new(client: Arc<ChzzkClient>, target_channels: BTreeSet<String>) -> Self {
        Self {
            client,
            target_channels,
        }
    }

    /// Query every target channel's liveness. Order does not matter; channels are
    /// queried sequentially for simplicity (the channel count in practice is small
    /// enough that bounded concurrency would not meaningfully shorten a tick).
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Vec<(String, ChannelPollResult)> {
        let mut results = Vec::with_capacity(self.target_channels.len());
        for channel in &self.target_channels {
            let result = match self.client.get_live_detail(channel).await {
                Ok(LiveDetailOutcome::Live(detail)) => ChannelPollResult::Live(detail),
                Ok(LiveDetailOutcome::Offline) => ChannelPollResult::Offline,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "poll failed, treating as offline-for-this-tick");
                    ChannelPollResult::Errored
                }
            };
            results.push((channel.clone(), result));
        }
        results
    }
}
