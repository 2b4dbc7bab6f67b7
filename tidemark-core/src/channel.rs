//! Decoded push-channel messages and frame decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TidemarkError;
use crate::types::{Quality, Sample, SourceId, Value};

/// Updates for one point within a channel message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelItem {
    /// Point name as reported by the historian.
    pub name: String,
    /// Source id of the point.
    pub source: SourceId,
    /// Readings, sorted ascending once the message is delivered.
    pub samples: Vec<Sample>,
}

/// One decoded frame from a push connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelMessage {
    /// Per-point updates in frame order.
    pub items: Vec<ChannelItem>,
}

impl ChannelMessage {
    /// Sort every point's samples ascending by timestamp (stable).
    pub fn sort_samples(&mut self) {
        for item in &mut self.items {
            item.samples.sort_by_key(|s| s.ts);
        }
    }

    /// Sorted copy of the message.
    #[must_use]
    pub fn sorted(mut self) -> Self {
        self.sort_samples();
        self
    }

    /// Whether every point's samples are in ascending order.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.items
            .iter()
            .all(|i| i.samples.windows(2).all(|w| w[0].ts <= w[1].ts))
    }

    /// Total number of samples across points.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.items.iter().map(|i| i.samples.len()).sum()
    }
}

/// Turns raw frames into [`ChannelMessage`]s.
pub trait MessageDecoder: Send + Sync {
    /// Decode a single frame.
    ///
    /// # Errors
    /// Returns `Decode` when the frame does not match the expected schema.
    fn decode(&self, frame: &[u8]) -> Result<ChannelMessage, TidemarkError>;
}

/// Decoder for the historian's JSON channel frames:
/// `{"Items":[{"Name","WebId","Items":[{"Timestamp","Value","Good"}]}]}`.
///
/// A sample with `Good: false` carries no value. Digital states arrive as
/// objects and are reduced to their `Name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFrameDecoder;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireFrame {
    items: Vec<WireItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireItem {
    name: String,
    web_id: String,
    items: Vec<WireSample>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireSample {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    value: serde_json::Value,
    good: bool,
}

impl MessageDecoder for JsonFrameDecoder {
    fn decode(&self, frame: &[u8]) -> Result<ChannelMessage, TidemarkError> {
        let wire: WireFrame =
            serde_json::from_slice(frame).map_err(|e| TidemarkError::Decode(e.to_string()))?;
        let items = wire
            .items
            .into_iter()
            .map(|item| ChannelItem {
                name: item.name,
                source: SourceId::new(item.web_id),
                samples: item.items.into_iter().map(wire_sample).collect(),
            })
            .collect();
        Ok(ChannelMessage { items })
    }
}

fn wire_sample(s: WireSample) -> Sample {
    if !s.good {
        return Sample::bad(s.timestamp);
    }
    Sample {
        ts: s.timestamp,
        value: json_scalar(s.value),
        quality: Quality::Good,
    }
}

fn json_scalar(v: serde_json::Value) -> Option<Value> {
    use serde_json::Value as J;
    match v {
        J::Null | J::Array(_) => None,
        J::Bool(b) => Some(Value::Bool(b)),
        J::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        J::String(s) => Some(Value::Text(s)),
        J::Object(mut map) => match map.remove("Name") {
            Some(J::String(name)) => Some(Value::Text(name)),
            _ => None,
        },
    }
}
