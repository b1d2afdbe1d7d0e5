//! Wire messages exchanged with the orchestrator
//!
//! A run consumes one [`BlockRunData`] and produces a batch of
//! [`BlockMessage`]s in emission order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BlockPinRef;

/// A value sent out of an output pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub source: BlockPinRef,
    pub value: Value,
    /// Position in a channel or streaming tool sequence; 0 otherwise
    #[serde(default)]
    pub index: u64,
}

/// A value to pre-seed on an input pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub target: BlockPinRef,
    pub value: Value,
}

/// Wiring that feeds a pin's future value into another pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRedirect {
    pub source: BlockPinRef,
    pub target: BlockPinRef,
}

/// A new value for a persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateValue {
    pub state: String,
    pub value: Value,
}

/// One batch of side effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockMessage {
    #[serde(default)]
    pub outputs: Vec<OutputValue>,
    #[serde(default)]
    pub inputs: Vec<InputValue>,
    #[serde(default)]
    pub redirects: Vec<PinRedirect>,
    #[serde(default)]
    pub states: Vec<StateValue>,
}

impl BlockMessage {
    pub fn output(source: BlockPinRef, value: Value, index: u64) -> Self {
        Self {
            outputs: vec![OutputValue {
                source,
                value,
                index,
            }],
            ..Self::default()
        }
    }

    pub fn state(state: impl Into<String>, value: Value) -> Self {
        Self {
            states: vec![StateValue {
                state: state.into(),
                value,
            }],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
            && self.inputs.is_empty()
            && self.redirects.is_empty()
            && self.states.is_empty()
    }

    /// Append another message's entries to this one
    pub fn merge(&mut self, other: BlockMessage) {
        self.outputs.extend(other.outputs);
        self.inputs.extend(other.inputs);
        self.redirects.extend(other.redirects);
        self.states.extend(other.states);
    }
}

/// The full specification of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRunData {
    pub name: String,
    /// npm-style version range
    pub version: String,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default)]
    pub state: Vec<StateValue>,
    #[serde(default)]
    pub inputs: Vec<InputValue>,
    #[serde(default)]
    pub dynamic_inputs: Vec<BlockPinRef>,
    #[serde(default)]
    pub dynamic_outputs: Vec<BlockPinRef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_data_uses_camel_case() {
        let data: BlockRunData = serde_json::from_value(json!({
            "name": "Greeter",
            "version": "^1",
            "function": "greet",
            "inputs": [{ "target": { "port": "name", "pin": "" }, "value": "Ada" }],
            "dynamicOutputs": [{ "port": "items.2", "pin": "" }]
        }))
        .unwrap();

        assert_eq!(data.function, "greet");
        assert!(data.state.is_empty());
        assert_eq!(data.dynamic_outputs[0].port, "items.2");
        assert_eq!(data.inputs[0].value, json!("Ada"));
    }

    #[test]
    fn test_message_merge_preserves_order() {
        let mut batch = BlockMessage::output(BlockPinRef::new("a", ""), json!(1), 0);
        batch.merge(BlockMessage::output(BlockPinRef::new("b", ""), json!(2), 0));
        batch.merge(BlockMessage::state("count", json!(2)));

        assert_eq!(batch.outputs.len(), 2);
        assert_eq!(batch.outputs[1].source.port, "b");
        assert_eq!(batch.states[0].state, "count");
        assert!(!batch.is_empty());
        assert!(BlockMessage::default().is_empty());
    }

    #[test]
    fn test_message_serialization_shape() {
        let message = BlockMessage::output(BlockPinRef::new("greet", ""), json!("Hello"), 0);
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "outputs": [{ "source": { "port": "greet", "pin": "" }, "value": "Hello", "index": 0 }],
                "inputs": [],
                "redirects": [],
                "states": []
            })
        );
    }
}
