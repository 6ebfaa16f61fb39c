use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{info, warn};

use crate::alert::Alert;
use crate::channels::{self, Channel, Delivery};
use crate::config::Config;

/// Result of one channel's single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Per-channel outcomes of one alert, in dispatch order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<(&'static str, ChannelOutcome)>,
}

impl DispatchReport {
    #[cfg(test)]
    pub fn outcome(&self, channel: &str) -> Option<&ChannelOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == channel)
            .map(|(_, outcome)| outcome)
    }

    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == ChannelOutcome::Delivered)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ChannelOutcome::Failed { .. }))
            .count()
    }
}

/// Fans an alert out to every enabled channel.
pub struct Dispatcher {
    channels: Vec<Arc<dyn Channel>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Channel>>, timeout: Duration) -> Self {
        Self { channels, timeout }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.server.delivery_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let channels = channels::from_config(config, &client)?;
        Ok(Self::new(channels, timeout))
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Attempt every channel once, concurrently. Never fails as a whole.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let attempts = self.channels.iter().map(|channel| async move {
            let name = channel.name();
            let outcome = match tokio::time::timeout(self.timeout, channel.send(alert)).await {
                Ok(Ok(Delivery::Sent)) => ChannelOutcome::Delivered,
                Ok(Ok(Delivery::Skipped(reason))) => ChannelOutcome::Skipped { reason },
                Ok(Err(e)) => ChannelOutcome::Failed {
                    reason: format!("{:#}", e),
                },
                Err(_) => ChannelOutcome::Failed {
                    reason: format!("timed out after {:?}", self.timeout),
                },
            };
            (name, outcome)
        });

        let report = DispatchReport {
            outcomes: join_all(attempts).await,
        };

        for (name, outcome) in &report.outcomes {
            match outcome {
                ChannelOutcome::Delivered => info!("[{}] alert delivered", name),
                ChannelOutcome::Skipped { reason } => info!("[{}] skipped: {}", name, reason),
                ChannelOutcome::Failed { reason } => warn!("[{}] delivery failed: {}", name, reason),
            }
        }

        report
    }
}
