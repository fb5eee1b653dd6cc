use async_trait::async_trait;
use futures_lite::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions},
    types::{FieldTable, ShortString},
    Channel,
};
use tracing::{debug, error, info, warn};

use super::errors::{Result, StreamDemoError};
use super::offset::{StreamOffset, X_STREAM_OFFSET};
use crate::message::ReceivedMessage;

/// Processes one delivery. A returned error is logged and the delivery is
/// still acked: stream queues do not implement nack or reject, and the
/// consumer keeps running.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> anyhow::Result<()>;
}

/// Prints every body to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintingHandler;

#[async_trait]
impl DeliveryHandler for PrintingHandler {
    async fn handle(&self, message: &ReceivedMessage) -> anyhow::Result<()> {
        debug!(
            delivery_tag = message.delivery_tag,
            offset = ?message.stream_offset,
            "Delivery received"
        );
        println!("Received message: {}", message.body_text());
        Ok(())
    }
}

pub fn consume_arguments(offset: &StreamOffset) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(ShortString::from(X_STREAM_OFFSET), offset.to_amqp_value());
    args
}

pub struct StreamConsumer {
    channel: Channel,
    queue: String,
    consumer_tag: String,
    prefetch_count: u16,
    offset: StreamOffset,
}

impl StreamConsumer {
    pub fn new(
        channel: Channel,
        queue: &str,
        consumer_tag: &str,
        prefetch_count: u16,
        offset: StreamOffset,
    ) -> Self {
        Self {
            channel,
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
            prefetch_count,
            offset,
        }
    }

    /// Consumes until the broker closes the delivery stream and returns the
    /// number of deliveries handled.
    pub async fn run<H: DeliveryHandler>(&self, handler: &H) -> Result<u64> {
        // Stream queues refuse consumers without a prefetch limit.
        self.channel
            .basic_qos(self.prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|e| StreamDemoError::ChannelError(format!("Failed to set QoS: {}", e)))?;

        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                consume_arguments(&self.offset),
            )
            .await
            .map_err(|e| {
                StreamDemoError::ConsumeError(format!(
                    "Failed to start consuming from '{}': {}",
                    self.queue, e
                ))
            })?;

        info!(
            queue = %self.queue,
            consumer_tag = %self.consumer_tag,
            offset = %self.offset,
            prefetch = self.prefetch_count,
            "Consumer started"
        );

        let mut handled: u64 = 0;
        while let Some(delivery) = consumer.next().await {
            let delivery = delivery.map_err(|e| {
                error!(error = %e, "Error receiving delivery");
                StreamDemoError::ConsumeError(e.to_string())
            })?;

            let message = ReceivedMessage::from(&delivery);
            if let Err(e) = handler.handle(&message).await {
                warn!(
                    delivery_tag = message.delivery_tag,
                    offset = ?message.stream_offset,
                    error = %e,
                    "Handler failed, skipping delivery"
                );
            }
            // Streams keep the message either way; the ack only returns
            // prefetch credit.
            delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| StreamDemoError::AckError(e.to_string()))?;
            handled += 1;
        }

        info!(queue = %self.queue, handled, "Delivery stream closed");
        Ok(handled)
    }
}
