use chrono::Utc;
use lapin::message::Delivery;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::BasicProperties;
use std::borrow::Cow;
use uuid::Uuid;

use crate::rabbitmq::offset::X_STREAM_OFFSET;

pub const X_SEQUENCE: &str = "x-sequence";
pub const TEXT_PLAIN: &str = "text/plain";

/// Owned view of a delivery, independent of the channel it arrived on.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedMessage {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub redelivered: bool,
    pub body: Vec<u8>,
    /// Position in the stream, from the `x-stream-offset` header.
    pub stream_offset: Option<i64>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
}

impl ReceivedMessage {
    pub fn from_parts(
        delivery_tag: u64,
        routing_key: &str,
        redelivered: bool,
        properties: &BasicProperties,
        body: Vec<u8>,
    ) -> Self {
        Self {
            delivery_tag,
            routing_key: routing_key.to_string(),
            redelivered,
            body,
            stream_offset: properties.headers().as_ref().and_then(stream_offset_header),
            message_id: properties.message_id().as_ref().map(|id| id.as_str().to_string()),
            timestamp: *properties.timestamp(),
        }
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl From<&Delivery> for ReceivedMessage {
    fn from(delivery: &Delivery) -> Self {
        Self::from_parts(
            delivery.delivery_tag,
            delivery.routing_key.as_str(),
            delivery.redelivered,
            &delivery.properties,
            delivery.data.clone(),
        )
    }
}

/// Reads the broker-assigned offset. Stream deliveries carry it as a signed
/// 64-bit integer, but any integer encoding is accepted.
pub fn stream_offset_header(headers: &FieldTable) -> Option<i64> {
    match headers.inner().get(&ShortString::from(X_STREAM_OFFSET))? {
        AMQPValue::LongLongInt(v) => Some(*v),
        AMQPValue::LongInt(v) => Some(i64::from(*v)),
        AMQPValue::LongUInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortUInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortShortInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortShortUInt(v) => Some(i64::from(*v)),
        AMQPValue::Timestamp(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

/// Properties attached to every published message.
pub fn outgoing_properties(sequence: u64) -> BasicProperties {
    let mut headers = FieldTable::default();
    headers.insert(
        ShortString::from(X_SEQUENCE),
        AMQPValue::LongLongInt(sequence as i64),
    );

    BasicProperties::default()
        .with_content_type(ShortString::from(TEXT_PLAIN))
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_timestamp(Utc::now().timestamp() as u64)
        .with_headers(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(key: &str, value: AMQPValue) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(ShortString::from(key), value);
        headers
    }

    #[test]
    fn offset_header_accepts_integer_encodings() {
        let long = headers_with(X_STREAM_OFFSET, AMQPValue::LongLongInt(1_234_567));
        assert_eq!(stream_offset_header(&long), Some(1_234_567));

        let short = headers_with(X_STREAM_OFFSET, AMQPValue::ShortUInt(12));
        assert_eq!(stream_offset_header(&short), Some(12));
    }

    #[test]
    fn offset_header_missing_or_wrong_type() {
        assert_eq!(stream_offset_header(&FieldTable::default()), None);

        let text = headers_with(X_STREAM_OFFSET, AMQPValue::LongString("7".into()));
        assert_eq!(stream_offset_header(&text), None);

        let other = headers_with("x-other", AMQPValue::LongLongInt(3));
        assert_eq!(stream_offset_header(&other), None);
    }

    #[test]
    fn received_message_reads_properties() {
        let properties = BasicProperties::default()
            .with_message_id("msg-1".into())
            .with_timestamp(1_700_000_000)
            .with_headers(headers_with(X_STREAM_OFFSET, AMQPValue::LongLongInt(42)));

        let message = ReceivedMessage::from_parts(
            9,
            "baz_exchange",
            false,
            &properties,
            b"Hello world!".to_vec(),
        );

        assert_eq!(message.delivery_tag, 9);
        assert_eq!(message.routing_key, "baz_exchange");
        assert_eq!(message.stream_offset, Some(42));
        assert_eq!(message.message_id.as_deref(), Some("msg-1"));
        assert_eq!(message.timestamp, Some(1_700_000_000));
        assert_eq!(message.body_text(), "Hello world!");
    }

    #[test]
    fn invalid_utf8_body_is_rendered_lossily() {
        let message = ReceivedMessage::from_parts(
            1,
            "",
            true,
            &BasicProperties::default(),
            vec![b'h', b'i', 0xff],
        );
        assert_eq!(message.body_text(), "hi\u{fffd}");
        assert_eq!(message.stream_offset, None);
    }

    #[test]
    fn outgoing_properties_are_complete() {
        let properties = outgoing_properties(5);

        assert_eq!(
            properties.content_type().as_ref().map(|c| c.as_str()),
            Some(TEXT_PLAIN)
        );
        let id = properties.message_id().as_ref().unwrap().as_str().to_string();
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(properties.timestamp().unwrap() > 0);

        let sequence = properties
            .headers()
            .as_ref()
            .and_then(|h| h.inner().get(&ShortString::from(X_SEQUENCE)).cloned());
        assert_eq!(sequence, Some(AMQPValue::LongLongInt(5)));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = outgoing_properties(1).message_id().clone();
        let b = outgoing_properties(1).message_id().clone();
        assert_ne!(a, b);
    }
}
