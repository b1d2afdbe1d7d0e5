//! The view a running function has of its block instance
//!
//! A [`BlockScope`] lends the function body the instance's ports and state
//! and owns the [`Emitter`] collecting everything the body sends.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::channel::OutputChannelMessage;
use super::emitter::Emitter;
use super::ports::{output_handle_mut, PortSlot, PortValue, Ports};
use super::tool::{bind, flatten, CallbackCall, ToolArgs, ToolCall};
use crate::config::RuntimeConfig;
use crate::core::block::FunctionKind;
use crate::core::error::RunError;
use crate::core::interface::CompiledBlock;
use crate::core::message::{BlockMessage, OutputValue};
use crate::core::port::PortKind;
use crate::core::{split_path, BlockPinRef};

/// Arguments a step or callback was invoked with, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionArgs {
    function: String,
    values: IndexMap<String, Value>,
}

impl FunctionArgs {
    pub fn new(function: impl Into<String>, values: IndexMap<String, Value>) -> Self {
        Self {
            function: function.into(),
            values,
        }
    }

    /// Deserialize one argument
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, RunError> {
        let value = self.values.get(name).ok_or_else(|| RunError::MissingArgument {
            function: self.function.clone(),
            param: name.to_string(),
        })?;
        serde_json::from_value(value.clone())
            .map_err(|e| RunError::validation(self.function.as_str(), name, e.to_string()))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Items of a variadic list argument; empty when absent
    pub fn list(&self, name: &str) -> &[Value] {
        match self.values.get(name) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Entries of a variadic dictionary argument
    pub fn dict(&self, name: &str) -> Option<&Map<String, Value>> {
        self.values.get(name).and_then(Value::as_object)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct BlockScope<'a> {
    compiled: &'a CompiledBlock,
    config: &'a RuntimeConfig,
    ports: &'a mut Ports,
    states: &'a mut IndexMap<String, Value>,
    context: Option<&'a Value>,
    function: &'a str,
    emitter: Emitter,
}

impl<'a> BlockScope<'a> {
    pub(crate) fn new(
        compiled: &'a CompiledBlock,
        config: &'a RuntimeConfig,
        ports: &'a mut Ports,
        states: &'a mut IndexMap<String, Value>,
        context: Option<&'a Value>,
        function: &'a str,
    ) -> Self {
        Self {
            compiled,
            config,
            ports,
            states,
            context,
            function,
            emitter: Emitter::new(),
        }
    }

    /// Name of the running function
    pub fn function_name(&self) -> &str {
        self.function
    }

    /// The opaque context the orchestrator sent with the run
    pub fn context(&self) -> Option<&Value> {
        self.context
    }

    // ---- reading inputs ----

    /// Value of the input port at `port[.index]`
    pub fn value(&self, port_path: &str) -> Option<&Value> {
        let (name, index) = split_path(port_path);
        match self.ports.get(name)?.element(index)? {
            PortValue::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Deserialize the input port at `port[.index]`
    pub fn get<T: DeserializeOwned>(&self, port_path: &str) -> Result<T, RunError> {
        let value = self
            .value(port_path)
            .ok_or_else(|| RunError::UnknownPort(port_path.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| RunError::validation(port_path, "", e.to_string()))
    }

    /// Values of a List input port; empty slots read as `null`
    pub fn values(&self, port: &str) -> Vec<Value> {
        match self.ports.get(port) {
            Some(PortSlot::List(slots)) => slots
                .iter()
                .map(|slot| match slot {
                    Some(PortValue::Value(value)) => value.clone(),
                    _ => Value::Null,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Entries of a Dictionary input port
    pub fn entries(&self, port: &str) -> IndexMap<String, Value> {
        match self.ports.get(port) {
            Some(PortSlot::Dictionary(slots)) => slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    PortValue::Value(value) => Some((key.clone(), value.clone())),
                    _ => None,
                })
                .collect(),
            _ => IndexMap::new(),
        }
    }

    /// Value of a named pin inside a nested port or tool
    pub fn pin_value(&self, port_path: &str, pin_path: &str) -> Option<&Value> {
        let (name, index) = split_path(port_path);
        match self.ports.get(name)?.element(index)? {
            PortValue::Pins(pins) => pins.value(pin_path),
            PortValue::Tool(tool) => tool.input(pin_path),
            _ => None,
        }
    }

    /// Allocated indices or keys of a port
    pub fn indices(&self, port: &str) -> Vec<String> {
        self.ports.get(port).map(PortSlot::indices).unwrap_or_default()
    }

    // ---- sending outputs ----

    /// Send on the nameless output pin of `port[.index]`
    pub fn send(&mut self, port_path: &str, value: impl Into<Value>) -> Result<(), RunError> {
        self.send_pin(port_path, "", value)
    }

    /// Send on output pin `pin[.index]` of `port[.index]`.
    ///
    /// Channel outputs wrap the value in a `Data` envelope and advance the
    /// channel's index.
    pub fn send_pin(
        &mut self,
        port_path: &str,
        pin_path: &str,
        value: impl Into<Value>,
    ) -> Result<(), RunError> {
        let value = self.check_output(port_path, pin_path, value.into())?;
        let handle = output_handle_mut(self.ports, port_path, pin_path)?;

        let (value, index) = if handle.is_channel() {
            (OutputChannelMessage::data(value).into_value(), handle.next_index())
        } else {
            (value, 0)
        };
        let source = handle.source().clone();
        self.emitter.output(source, value, index);
        Ok(())
    }

    /// Close the output channel at `port[.index]`
    pub fn close(&mut self, port_path: &str) -> Result<(), RunError> {
        self.close_pin(port_path, "")
    }

    pub fn close_pin(&mut self, port_path: &str, pin_path: &str) -> Result<(), RunError> {
        let handle = output_handle_mut(self.ports, port_path, pin_path)?;
        if !handle.is_channel() {
            return Err(RunError::NotAChannel(
                BlockPinRef::new(port_path, pin_path).to_string(),
            ));
        }
        let index = handle.next_index();
        let source = handle.source().clone();
        self.emitter
            .output(source, OutputChannelMessage::close().into_value(), index);
        Ok(())
    }

    fn check_output(&self, port_path: &str, pin_path: &str, value: Value) -> Result<Value, RunError> {
        if !self.config.validate_outputs {
            return Ok(value);
        }
        let (port, _) = split_path(port_path);
        let (pin, _) = split_path(pin_path);
        let adapter = self
            .compiled
            .output_adapter(port, pin)
            .ok_or_else(|| RunError::UnknownPin {
                port: port_path.to_string(),
                pin: pin_path.to_string(),
            })?;
        adapter
            .validate(value)
            .map_err(|message| RunError::validation(port_path, pin_path, message))
    }

    // ---- state ----

    pub fn state(&self, name: &str) -> Option<&Value> {
        self.states.get(name)
    }

    pub fn state_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, RunError> {
        let value = self
            .states
            .get(name)
            .ok_or_else(|| RunError::UnknownState(name.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| RunError::validation(name, "", e.to_string()))
    }

    /// Replace a state's value and emit it to the orchestrator
    pub fn set_state(&mut self, name: &str, value: impl Into<Value>) -> Result<(), RunError> {
        let adapter = self
            .compiled
            .state_adapter(name)
            .ok_or_else(|| RunError::UnknownState(name.to_string()))?;
        let value = adapter
            .validate(value.into())
            .map_err(|message| RunError::validation(name, "", message))?;
        self.states.insert(name.to_string(), value.clone());
        self.emitter.state(name, value);
        Ok(())
    }

    // ---- tools and callbacks ----

    /// Package a call to the tool at `port[.index]`
    pub fn call_tool(&mut self, tool_path: &str, args: ToolArgs) -> Result<ToolCall, RunError> {
        let (name, index) = split_path(tool_path);
        let slot = self
            .ports
            .get_mut(name)
            .ok_or_else(|| RunError::UnknownPort(tool_path.to_string()))?;
        let element = match slot {
            PortSlot::Single(value) => Some(value),
            PortSlot::List(values) => index
                .parse::<usize>()
                .ok()
                .and_then(|i| values.get_mut(i))
                .and_then(Option::as_mut),
            PortSlot::Dictionary(values) => values.get_mut(index),
        };
        let Some(PortValue::Tool(handle)) = element else {
            return Err(RunError::PortKind {
                port: tool_path.to_string(),
                expected: "an allocated tool",
            });
        };

        let bound = bind(handle.signature(), args)?;
        let call_index = handle.next_call_index();
        let port = handle.port().to_string();

        let mut outputs = Vec::new();
        for (param, pin_path, value) in flatten(bound) {
            let value = if self.config.validate_outputs {
                let adapter = self.compiled.output_adapter(name, &param).ok_or_else(|| {
                    RunError::UnknownPin {
                        port: tool_path.to_string(),
                        pin: param.clone(),
                    }
                })?;
                adapter
                    .validate(value)
                    .map_err(|message| RunError::validation(tool_path, pin_path.as_str(), message))?
            } else {
                value
            };
            outputs.push(OutputValue {
                source: BlockPinRef::new(port.as_str(), pin_path),
                value,
                index: call_index,
            });
        }
        Ok(ToolCall::new(port, outputs))
    }

    /// A continuation into callback `name`, receiving the tool result on
    /// `result_param`
    pub fn callback(&self, name: &str, result_param: &str) -> Result<CallbackCall, RunError> {
        match self.compiled.port_kind(name) {
            Some(PortKind::Function(FunctionKind::Callback)) => {}
            Some(_) => return Err(RunError::NotACallback(name.to_string())),
            None => return Err(RunError::UnknownFunction(name.to_string())),
        }
        let known = self
            .compiled
            .interface
            .port(name)
            .is_some_and(|port| port.inputs.contains_key(result_param));
        if !known {
            return Err(RunError::UnknownPin {
                port: name.to_string(),
                pin: result_param.to_string(),
            });
        }
        Ok(CallbackCall::new(name, result_param))
    }

    /// Enqueue a packaged tool call; the callback's literal arguments are
    /// validated against its input pins first
    pub fn dispatch(&mut self, mut call: ToolCall) -> Result<(), RunError> {
        for input in call.inputs_mut() {
            let (port, _) = split_path(&input.target.port);
            let (pin, _) = split_path(&input.target.pin);
            let adapter = self
                .compiled
                .input_adapter(port, pin)
                .ok_or_else(|| RunError::UnknownPin {
                    port: input.target.port.clone(),
                    pin: input.target.pin.clone(),
                })?;
            let value = std::mem::take(&mut input.value);
            input.value = adapter
                .validate(value)
                .map_err(|message| RunError::validation(port, pin, message))?;
        }
        tracing::debug!(
            tool = call.port(),
            outputs = call.outputs().len(),
            redirects = call.redirects().len(),
            "dispatching tool call"
        );
        self.emitter.emit(call.into_message());
        Ok(())
    }

    /// Enqueue a raw message
    pub fn emit(&mut self, message: BlockMessage) {
        self.emitter.emit(message);
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub(crate) fn into_emitter(self) -> Emitter {
        self.emitter
    }
}
