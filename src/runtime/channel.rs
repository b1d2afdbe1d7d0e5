//! Channel protocol
//!
//! An output channel emits an ordered, explicitly closed sequence of
//! envelopes. An input channel pin receives the same envelopes together with
//! the channel's state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::block::BlockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEvent {
    Data,
    Close,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    Pending,
    Open,
    Closed,
    Error,
}

/// The envelope sent out of an output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChannelMessage {
    pub event: Option<ChannelEvent>,
    pub data: Option<Value>,
}

impl OutputChannelMessage {
    pub fn data(value: Value) -> Self {
        Self {
            event: Some(ChannelEvent::Data),
            data: Some(value),
        }
    }

    pub fn close() -> Self {
        Self {
            event: Some(ChannelEvent::Close),
            data: None,
        }
    }

    pub fn into_value(self) -> Value {
        let event = self.event.map(|e| match e {
            ChannelEvent::Data => "Data",
            ChannelEvent::Close => "Close",
            ChannelEvent::Error => "Error",
        });
        serde_json::json!({
            "event": event,
            "data": self.data,
        })
    }
}

/// What an input channel pin receives.
///
/// A `Data` event without data is a tick and carries nothing to consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputChannel<T> {
    #[serde(default)]
    pub state: ChannelState,
    #[serde(default)]
    pub event: Option<ChannelEvent>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<BlockError>,
}

impl<T> InputChannel<T> {
    /// Whether the sender closed the channel
    pub fn is_closed(&self) -> bool {
        self.event == Some(ChannelEvent::Close)
    }

    pub fn is_error(&self) -> bool {
        self.event == Some(ChannelEvent::Error)
    }

    /// The item carried by a data event, if any
    pub fn data(&self) -> Option<&T> {
        match self.event {
            Some(ChannelEvent::Data) => self.data.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_envelopes() {
        assert_eq!(
            OutputChannelMessage::data(json!(3)).into_value(),
            json!({ "event": "Data", "data": 3 })
        );
        assert_eq!(
            OutputChannelMessage::close().into_value(),
            json!({ "event": "Close", "data": null })
        );
    }

    #[test]
    fn test_input_channel_events() {
        let data: InputChannel<i64> =
            serde_json::from_value(json!({ "state": "Open", "event": "Data", "data": 4 })).unwrap();
        assert_eq!(data.data(), Some(&4));
        assert!(!data.is_closed());

        let tick: InputChannel<i64> =
            serde_json::from_value(json!({ "state": "Open", "event": "Data", "data": null })).unwrap();
        assert_eq!(tick.data(), None);

        let closed: InputChannel<i64> =
            serde_json::from_value(json!({ "state": "Closed", "event": "Close" })).unwrap();
        assert!(closed.is_closed());
        assert_eq!(closed.data(), None);
    }

    #[test]
    fn test_input_channel_error() {
        let errored: InputChannel<String> = serde_json::from_value(json!({
            "state": "Error",
            "event": "Error",
            "error": { "message": "upstream failed", "data": null }
        }))
        .unwrap();
        assert!(errored.is_error());
        assert_eq!(errored.error.unwrap().message, "upstream failed");
    }
}
