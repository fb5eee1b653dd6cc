// src/rabbitmq/offset.rs
//! Start position for a stream consumer, sent as the `x-stream-offset`
//! argument of `basic.consume`.

use chrono::{DateTime, SecondsFormat, Utc};
use lapin::types::{AMQPValue, LongString};
use std::fmt;
use std::str::FromStr;

pub const X_STREAM_OFFSET: &str = "x-stream-offset";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamOffset {
    /// Oldest message still retained by the stream.
    #[default]
    First,
    /// Start of the last written chunk.
    Last,
    /// Only messages published after the consumer attaches.
    Next,
    /// Absolute offset in the log. The broker reads it as a signed 64-bit
    /// integer, so parsing rejects values above `i64::MAX`.
    Offset(u64),
    /// First chunk written at or after this point in time. Parsing rejects
    /// times before the Unix epoch.
    Timestamp(DateTime<Utc>),
}

impl StreamOffset {
    pub fn to_amqp_value(&self) -> AMQPValue {
        match self {
            StreamOffset::First => AMQPValue::LongString(LongString::from("first")),
            StreamOffset::Last => AMQPValue::LongString(LongString::from("last")),
            StreamOffset::Next => AMQPValue::LongString(LongString::from("next")),
            StreamOffset::Offset(n) => {
                AMQPValue::LongLongInt(i64::try_from(*n).unwrap_or(i64::MAX))
            }
            StreamOffset::Timestamp(at) => {
                AMQPValue::Timestamp(u64::try_from(at.timestamp()).unwrap_or(0))
            }
        }
    }
}

impl FromStr for StreamOffset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "first" => return Ok(StreamOffset::First),
            "last" => return Ok(StreamOffset::Last),
            "next" => return Ok(StreamOffset::Next),
            _ => {}
        }

        if let Ok(n) = s.parse::<u64>() {
            if i64::try_from(n).is_err() {
                return Err(format!(
                    "invalid stream offset '{}': must not exceed {}",
                    s,
                    i64::MAX
                ));
            }
            return Ok(StreamOffset::Offset(n));
        }

        let at = DateTime::parse_from_rfc3339(s)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|_| {
                format!(
                    "invalid stream offset '{}': expected first, last, next, \
                     a non-negative integer or an RFC 3339 timestamp",
                    s
                )
            })?;
        if at.timestamp() < 0 {
            return Err(format!(
                "invalid stream offset '{}': timestamps before 1970-01-01 are not supported",
                s
            ));
        }
        Ok(StreamOffset::Timestamp(at))
    }
}

impl fmt::Display for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOffset::First => f.write_str("first"),
            StreamOffset::Last => f.write_str("last"),
            StreamOffset::Next => f.write_str("next"),
            StreamOffset::Offset(n) => write!(f, "{}", n),
            StreamOffset::Timestamp(at) => {
                f.write_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}
