use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    Channel,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::errors::{Result, StreamDemoError};
use crate::message::outgoing_properties;

/// Outcome of a publisher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStop {
    LimitReached,
    Shutdown,
}

pub struct StreamPublisher {
    channel: Channel,
    exchange: String,
    routing_key: String,
    payload: Vec<u8>,
    interval: Duration,
    confirm: bool,
}

impl StreamPublisher {
    pub fn new(
        channel: Channel,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Vec<u8>>,
        interval: Duration,
        confirm: bool,
    ) -> Self {
        Self {
            channel,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.into(),
            interval: interval.max(Duration::from_millis(1)),
            confirm,
        }
    }

    /// Puts the channel in confirm mode when confirms are enabled.
    pub async fn enable_confirms(&self) -> Result<()> {
        if self.confirm {
            self.channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| {
                    StreamDemoError::ChannelError(format!("Failed to enable confirms: {}", e))
                })?;
            debug!(channel_id = self.channel.id(), "Publisher confirms enabled");
        }
        Ok(())
    }

    pub async fn publish_one(&self, sequence: u64) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &self.payload,
                outgoing_properties(sequence),
            )
            .await
            .map_err(|e| StreamDemoError::PublishError(e.to_string()))?;

        if self.confirm {
            let confirmation = confirm
                .await
                .map_err(|e| StreamDemoError::PublishError(e.to_string()))?;
            check_confirmation(&confirmation, sequence)?;
        }

        Ok(())
    }

    /// Publishes one message per tick until `limit` messages are sent or
    /// `shutdown` resolves. Returns how many were sent and why it stopped.
    pub async fn run<S>(&self, limit: Option<u64>, shutdown: S) -> Result<(u64, PublishStop)>
    where
        S: Future<Output = ()>,
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            exchange = %self.exchange,
            routing_key = %self.routing_key,
            interval_ms = self.interval.as_millis() as u64,
            "Publisher started"
        );

        let mut sent: u64 = 0;
        loop {
            if limit.is_some_and(|limit| sent >= limit) {
                return Ok((sent, PublishStop::LimitReached));
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(sent, "Publisher stopping on shutdown signal");
                    return Ok((sent, PublishStop::Shutdown));
                }
                _ = ticker.tick() => {
                    info!(sequence = sent, "Publishing message");
                    self.publish_one(sent).await?;
                    sent += 1;
                }
            }
        }
    }
}

fn check_confirmation(confirmation: &Confirmation, sequence: u64) -> Result<()> {
    match confirmation {
        Confirmation::Nack(_) => Err(StreamDemoError::PublishError(format!(
            "broker rejected message {}",
            sequence
        ))),
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
    }
}
