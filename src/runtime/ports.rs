//! Materialized ports of a block instance
//!
//! A compiled interface says which ports exist; an instance turns each of
//! them into a slot holding values, output handles, tool handles, or nested
//! pin sets. List and dictionary slots are sized from the dynamic pin
//! references the orchestrator sends with the run.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use crate::core::error::RunError;
use crate::core::interface::CompiledBlock;
use crate::core::port::{PortInterface, PortKind};
use crate::core::types::ToolSignature;
use crate::core::{join_path, split_path, BlockPinRef, Cardinality};

/// An output pin the block can send on.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputHandle {
    source: BlockPinRef,
    channel: bool,
    index: u64,
}

impl OutputHandle {
    pub fn new(source: BlockPinRef, channel: bool) -> Self {
        Self {
            source,
            channel,
            index: 0,
        }
    }

    /// Full address of the pin, indices included
    pub fn source(&self) -> &BlockPinRef {
        &self.source
    }

    pub fn is_channel(&self) -> bool {
        self.channel
    }

    /// Index the next channel envelope will carry
    pub fn index(&self) -> u64 {
        self.index
    }

    pub(crate) fn next_index(&mut self) -> u64 {
        let index = self.index;
        self.index += 1;
        index
    }
}

/// A nested tool the block can call.
#[derive(Debug, Clone)]
pub struct ToolHandle {
    port: String,
    signature: Arc<ToolSignature>,
    calls: u64,
    inputs: IndexMap<String, Value>,
}

impl ToolHandle {
    pub fn new(port: impl Into<String>, signature: Arc<ToolSignature>) -> Self {
        Self {
            port: port.into(),
            signature,
            calls: 0,
            inputs: IndexMap::new(),
        }
    }

    /// Port address of the tool, index included
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn signature(&self) -> &ToolSignature {
        &self.signature
    }

    /// Value of one of the tool's input pins (`return` or a generic)
    pub fn input(&self, pin: &str) -> Option<&Value> {
        self.inputs.get(pin)
    }

    pub(crate) fn set_input(&mut self, pin: &str, value: Value) {
        self.inputs.insert(pin.to_string(), value);
    }

    /// Index for the next call: a running counter for streaming tools, 0 otherwise
    pub(crate) fn next_call_index(&mut self) -> u64 {
        if !self.signature.streaming {
            return 0;
        }
        let index = self.calls;
        self.calls += 1;
        index
    }
}

/// One pin inside a nested port.
#[derive(Debug, Clone, PartialEq)]
pub enum PinSlot {
    Value(Value),
    ValueList(Vec<Value>),
    ValueDict(IndexMap<String, Value>),
    Output(OutputHandle),
    OutputList(Vec<Option<OutputHandle>>),
    OutputDict(IndexMap<String, OutputHandle>),
}

impl PinSlot {
    fn empty_input(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::Single => PinSlot::Value(Value::Null),
            Cardinality::List => PinSlot::ValueList(Vec::new()),
            Cardinality::Dictionary => PinSlot::ValueDict(IndexMap::new()),
        }
    }

    /// The slot as a single JSON value; output slots have none
    pub fn to_value(&self) -> Option<Value> {
        match self {
            PinSlot::Value(value) => Some(value.clone()),
            PinSlot::ValueList(values) => Some(Value::Array(values.clone())),
            PinSlot::ValueDict(values) => Some(Value::Object(
                values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            _ => None,
        }
    }
}

/// The named pins of a nested port, or the pending arguments of a function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinSet {
    pins: IndexMap<String, PinSlot>,
}

impl PinSet {
    pub fn get(&self, pin: &str) -> Option<&PinSlot> {
        self.pins.get(pin)
    }

    pub fn pins(&self) -> impl Iterator<Item = (&String, &PinSlot)> {
        self.pins.iter()
    }

    /// The value at `pin[.index]`
    pub fn value(&self, pin_path: &str) -> Option<&Value> {
        let (pin, index) = split_path(pin_path);
        match (self.pins.get(pin)?, index) {
            (PinSlot::Value(value), "") => Some(value),
            (PinSlot::ValueList(values), index) => values.get(index.parse::<usize>().ok()?),
            (PinSlot::ValueDict(values), index) => values.get(index),
            _ => None,
        }
    }

    /// Store an input value at `pin[.index]`, padding lists with `null`.
    ///
    /// A pin not yet present is created with the given cardinality.
    pub(crate) fn set_input(
        &mut self,
        pin_path: &str,
        cardinality: Cardinality,
        value: Value,
    ) -> Result<(), RunError> {
        let (pin, index) = split_path(pin_path);
        let slot = self
            .pins
            .entry(pin.to_string())
            .or_insert_with(|| PinSlot::empty_input(cardinality));

        match slot {
            PinSlot::Value(current) => *current = value,
            PinSlot::ValueList(values) => {
                let position = parse_index(pin_path, index)?;
                if values.len() <= position {
                    values.resize(position + 1, Value::Null);
                }
                values[position] = value;
            }
            PinSlot::ValueDict(values) => {
                values.insert(index.to_string(), value);
            }
            _ => {
                return Err(RunError::PortKind {
                    port: pin_path.to_string(),
                    expected: "an input",
                })
            }
        }
        Ok(())
    }

    fn output_mut(&mut self, pin_path: &str) -> Result<&mut OutputHandle, RunError> {
        let (pin, index) = split_path(pin_path);
        let slot = self.pins.get_mut(pin).ok_or_else(|| RunError::UnknownPin {
            port: String::new(),
            pin: pin_path.to_string(),
        })?;
        match slot {
            PinSlot::Output(handle) => Ok(handle),
            PinSlot::OutputList(handles) => {
                let position = parse_index(pin_path, index)?;
                handles
                    .get_mut(position)
                    .and_then(Option::as_mut)
                    .ok_or_else(|| unallocated(pin_path, index))
            }
            PinSlot::OutputDict(handles) => handles
                .get_mut(index)
                .ok_or_else(|| unallocated(pin_path, index)),
            _ => Err(RunError::PortKind {
                port: pin_path.to_string(),
                expected: "an output",
            }),
        }
    }
}

/// The value held by one port (or one element of a list/dictionary port).
#[derive(Debug, Clone)]
pub enum PortValue {
    Value(Value),
    Output(OutputHandle),
    Pins(PinSet),
    Tool(ToolHandle),
}

/// A materialized port.
#[derive(Debug, Clone)]
pub enum PortSlot {
    Single(PortValue),
    /// Unrequested indices stay empty
    List(Vec<Option<PortValue>>),
    Dictionary(IndexMap<String, PortValue>),
}

impl PortSlot {
    /// The element at `index`; a Single port ignores the index
    pub fn element(&self, index: &str) -> Option<&PortValue> {
        match self {
            PortSlot::Single(value) => Some(value),
            PortSlot::List(values) => values.get(index.parse::<usize>().ok()?)?.as_ref(),
            PortSlot::Dictionary(values) => values.get(index),
        }
    }

    /// Allocated indices or keys, in order
    pub fn indices(&self) -> Vec<String> {
        match self {
            PortSlot::Single(_) => vec![String::new()],
            PortSlot::List(values) => values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_some())
                .map(|(i, _)| i.to_string())
                .collect(),
            PortSlot::Dictionary(values) => values.keys().cloned().collect(),
        }
    }
}

pub type Ports = IndexMap<String, PortSlot>;

/// Dynamic references grouped by port index: `index -> [pin paths]`
type Requests<'r> = IndexMap<&'r str, Vec<&'r str>>;

/// Build the slots of every non-function port.
pub fn materialize(
    compiled: &CompiledBlock,
    dynamic_inputs: &[BlockPinRef],
    dynamic_outputs: &[BlockPinRef],
) -> Result<Ports, RunError> {
    let mut inputs: IndexMap<&str, Requests<'_>> = IndexMap::new();
    let mut outputs: IndexMap<&str, Requests<'_>> = IndexMap::new();
    for (refs, requests) in [(dynamic_inputs, &mut inputs), (dynamic_outputs, &mut outputs)] {
        for reference in refs {
            let (port, index) = split_path(&reference.port);
            if compiled.port_kind(port).is_none() {
                return Err(RunError::UnknownPort(reference.port.clone()));
            }
            requests
                .entry(port)
                .or_default()
                .entry(index)
                .or_default()
                .push(reference.pin.as_str());
        }
    }

    let empty = Requests::new();
    let mut ports = Ports::new();
    for (name, kind) in compiled.port_kinds() {
        if matches!(kind, PortKind::Function(_)) {
            continue;
        }
        let Some(interface) = compiled.interface.port(name) else {
            continue;
        };
        let port_inputs = inputs.get(name.as_str()).unwrap_or(&empty);
        let port_outputs = outputs.get(name.as_str()).unwrap_or(&empty);

        let slot = match interface.cardinality {
            Cardinality::Single => PortSlot::Single(port_value(
                compiled,
                name,
                name,
                pins_at(port_inputs, ""),
                pins_at(port_outputs, ""),
            )?),
            Cardinality::List => {
                let mut slots: Vec<Option<PortValue>> = Vec::new();
                for index in requested_indices(port_inputs, port_outputs) {
                    let position = parse_index(name, index)?;
                    if slots.len() <= position {
                        slots.resize(position + 1, None);
                    }
                    slots[position] = Some(port_value(
                        compiled,
                        name,
                        &join_path(name, index),
                        pins_at(port_inputs, index),
                        pins_at(port_outputs, index),
                    )?);
                }
                PortSlot::List(slots)
            }
            Cardinality::Dictionary => {
                let mut slots = IndexMap::new();
                for key in requested_indices(port_inputs, port_outputs) {
                    slots.insert(
                        key.to_string(),
                        port_value(
                            compiled,
                            name,
                            &join_path(name, key),
                            pins_at(port_inputs, key),
                            pins_at(port_outputs, key),
                        )?,
                    );
                }
                PortSlot::Dictionary(slots)
            }
        };
        ports.insert(name.clone(), slot);
    }
    Ok(ports)
}

fn pins_at<'a, 'r>(requests: &'a Requests<'r>, index: &str) -> &'a [&'r str] {
    requests.get(index).map_or(&[], Vec::as_slice)
}

/// Non-empty port indices requested by either direction, first seen first
fn requested_indices<'r>(inputs: &Requests<'r>, outputs: &Requests<'r>) -> Vec<&'r str> {
    let mut indices: Vec<&str> = Vec::new();
    for index in inputs.keys().chain(outputs.keys()) {
        if !index.is_empty() && !indices.contains(index) {
            indices.push(*index);
        }
    }
    indices
}

/// Materialize one element of port `name` living at address `path`.
pub(crate) fn port_value(
    compiled: &CompiledBlock,
    name: &str,
    path: &str,
    input_pins: &[&str],
    output_pins: &[&str],
) -> Result<PortValue, RunError> {
    let interface = compiled
        .interface
        .port(name)
        .ok_or_else(|| RunError::UnknownPort(name.to_string()))?;
    let kind = compiled
        .port_kind(name)
        .ok_or_else(|| RunError::UnknownPort(name.to_string()))?;

    let value = match kind {
        PortKind::Input | PortKind::Generic => {
            PortValue::Value(default_value(compiled, name, "", interface)?.unwrap_or(Value::Null))
        }
        PortKind::Output => {
            let channel = interface.outputs.get("").is_some_and(|pin| pin.channel);
            PortValue::Output(OutputHandle::new(BlockPinRef::new(path, ""), channel))
        }
        PortKind::Tool(signature) => {
            let mut handle = ToolHandle::new(path, Arc::clone(signature));
            for pin in interface.inputs.keys() {
                if let Some(value) = default_value(compiled, name, pin, interface)? {
                    handle.set_input(pin, value);
                }
            }
            PortValue::Tool(handle)
        }
        PortKind::Nested => PortValue::Pins(pin_set(compiled, name, path, interface, input_pins, output_pins)?),
        PortKind::Function(_) => {
            return Err(RunError::PortKind {
                port: name.to_string(),
                expected: "a data port",
            })
        }
    };
    Ok(value)
}

fn pin_set(
    compiled: &CompiledBlock,
    name: &str,
    path: &str,
    interface: &PortInterface,
    input_pins: &[&str],
    output_pins: &[&str],
) -> Result<PinSet, RunError> {
    let mut pins = IndexMap::new();

    for (pin, pin_interface) in &interface.inputs {
        let default = default_value(compiled, name, pin, interface)?;
        let slot = match pin_interface.cardinality {
            Cardinality::Single => PinSlot::Value(default.unwrap_or(Value::Null)),
            Cardinality::List => {
                let mut values = Vec::new();
                for index in pin_indices(input_pins, pin) {
                    let position = parse_index(&join_path(pin, index), index)?;
                    if values.len() <= position {
                        values.resize(position + 1, Value::Null);
                    }
                    values[position] = default.clone().unwrap_or(Value::Null);
                }
                PinSlot::ValueList(values)
            }
            Cardinality::Dictionary => PinSlot::ValueDict(
                pin_indices(input_pins, pin)
                    .into_iter()
                    .map(|key| (key.to_string(), default.clone().unwrap_or(Value::Null)))
                    .collect(),
            ),
        };
        pins.insert(pin.clone(), slot);
    }

    for (pin, pin_interface) in &interface.outputs {
        let handle = |pin_path: String| {
            OutputHandle::new(BlockPinRef::new(path, pin_path), pin_interface.channel)
        };
        let slot = match pin_interface.cardinality {
            Cardinality::Single => PinSlot::Output(handle(pin.clone())),
            Cardinality::List => {
                let mut handles: Vec<Option<OutputHandle>> = Vec::new();
                for index in pin_indices(output_pins, pin) {
                    let pin_path = join_path(pin, index);
                    let position = parse_index(&pin_path, index)?;
                    if handles.len() <= position {
                        handles.resize(position + 1, None);
                    }
                    handles[position] = Some(handle(pin_path));
                }
                PinSlot::OutputList(handles)
            }
            Cardinality::Dictionary => PinSlot::OutputDict(
                pin_indices(output_pins, pin)
                    .into_iter()
                    .map(|key| (key.to_string(), handle(join_path(pin, key))))
                    .collect(),
            ),
        };
        pins.insert(pin.clone(), slot);
    }

    Ok(PinSet { pins })
}

/// Indices requested for `pin` among `pin[.index]` paths
fn pin_indices<'r>(paths: &[&'r str], pin: &str) -> Vec<&'r str> {
    let mut indices = Vec::new();
    for path in paths {
        let (name, index) = split_path(path);
        if name == pin && !index.is_empty() && !indices.contains(&index) {
            indices.push(index);
        }
    }
    indices
}

/// The coerced default of an input pin, if it declares one
fn default_value(
    compiled: &CompiledBlock,
    port: &str,
    pin: &str,
    interface: &PortInterface,
) -> Result<Option<Value>, RunError> {
    let Some(default) = interface.inputs.get(pin).and_then(|p| p.default.clone()) else {
        return Ok(None);
    };
    match compiled.input_adapter(port, pin) {
        Some(adapter) => adapter
            .validate(default)
            .map(Some)
            .map_err(|message| RunError::validation(port, pin, message)),
        None => Ok(Some(default)),
    }
}

/// Highest index a list port or pin may address. List slots are padded up to
/// the index they are addressed at, so the cap bounds the allocation.
pub const MAX_LIST_INDEX: usize = u16::MAX as usize;

pub(crate) fn parse_index(path: &str, index: &str) -> Result<usize, RunError> {
    let invalid = |message: String| RunError::InvalidIndex {
        path: path.to_string(),
        index: index.to_string(),
        message,
    };
    let position = index
        .parse::<usize>()
        .map_err(|_| invalid("Indexes on list Ports must be valid integers".to_string()))?;
    if position > MAX_LIST_INDEX {
        return Err(invalid(format!("list indexes cannot exceed {MAX_LIST_INDEX}")));
    }
    Ok(position)
}

fn unallocated(path: &str, index: &str) -> RunError {
    RunError::InvalidIndex {
        path: path.to_string(),
        index: index.to_string(),
        message: "no slot was allocated at this index".to_string(),
    }
}

/// The element of a port at `path`, created from the interface when a list
/// or dictionary slot has not been allocated yet.
pub(crate) fn element_mut<'p>(
    compiled: &CompiledBlock,
    ports: &'p mut Ports,
    port_path: &str,
) -> Result<&'p mut PortValue, RunError> {
    let (name, index) = split_path(port_path);
    let slot = ports
        .get_mut(name)
        .ok_or_else(|| RunError::UnknownPort(port_path.to_string()))?;

    match slot {
        PortSlot::Single(value) => Ok(value),
        PortSlot::List(values) => {
            let position = parse_index(port_path, index)?;
            if values.len() <= position {
                values.resize(position + 1, None);
            }
            if values[position].is_none() {
                values[position] = Some(port_value(compiled, name, port_path, &[], &[])?);
            }
            values[position]
                .as_mut()
                .ok_or_else(|| unallocated(port_path, index))
        }
        PortSlot::Dictionary(values) => {
            if !values.contains_key(index) {
                let value = port_value(compiled, name, port_path, &[], &[])?;
                values.insert(index.to_string(), value);
            }
            values
                .get_mut(index)
                .ok_or_else(|| unallocated(port_path, index))
        }
    }
}

/// The output handle at `(port[.index], pin[.index])`; never allocates.
pub(crate) fn output_handle_mut<'p>(
    ports: &'p mut Ports,
    port_path: &str,
    pin_path: &str,
) -> Result<&'p mut OutputHandle, RunError> {
    let (name, index) = split_path(port_path);
    let slot = ports
        .get_mut(name)
        .ok_or_else(|| RunError::UnknownPort(port_path.to_string()))?;

    let element = match slot {
        PortSlot::Single(value) => Some(value),
        PortSlot::List(values) => {
            let position = parse_index(port_path, index)?;
            values.get_mut(position).and_then(Option::as_mut)
        }
        PortSlot::Dictionary(values) => values.get_mut(index),
    }
    .ok_or_else(|| unallocated(port_path, index))?;

    match (element, pin_path) {
        (PortValue::Output(handle), "") => Ok(handle),
        (PortValue::Pins(pins), pin_path) if !pin_path.is_empty() => {
            pins.output_mut(pin_path).map_err(|err| match err {
                RunError::UnknownPin { pin, .. } => RunError::UnknownPin {
                    port: port_path.to_string(),
                    pin,
                },
                other => other,
            })
        }
        _ => Err(RunError::PortKind {
            port: BlockPinRef::new(port_path, pin_path).to_string(),
            expected: "an output",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockDefinition;
    use crate::core::types::{ParamDecl, PortShape, TypeExpr};
    use serde_json::json;

    fn compiled(def: BlockDefinition) -> Arc<CompiledBlock> {
        def.compiled().unwrap()
    }

    #[test]
    fn test_list_output_port_is_padded() {
        let block = compiled(
            BlockDefinition::builder("Items")
                .field("items", TypeExpr::list(TypeExpr::output(TypeExpr::String)))
                .build()
                .unwrap(),
        );
        let ports = materialize(
            &block,
            &[],
            &[BlockPinRef::new("items.0", ""), BlockPinRef::new("items.2", "")],
        )
        .unwrap();

        let PortSlot::List(slots) = &ports["items"] else {
            panic!("expected a list port");
        };
        assert_eq!(slots.len(), 3);
        assert!(slots[1].is_none());
        let Some(PortValue::Output(handle)) = &slots[2] else {
            panic!("expected an output handle");
        };
        assert_eq!(handle.source(), &BlockPinRef::new("items.2", ""));
    }

    #[test]
    fn test_non_integer_list_index() {
        let block = compiled(
            BlockDefinition::builder("Items")
                .field("items", TypeExpr::list(TypeExpr::output(TypeExpr::String)))
                .build()
                .unwrap(),
        );
        let err = materialize(&block, &[], &[BlockPinRef::new("items.first", "")]).unwrap_err();
        assert!(matches!(err, RunError::InvalidIndex { .. }));
    }

    #[test]
    fn test_unknown_dynamic_port() {
        let block = compiled(BlockDefinition::builder("Empty").build().unwrap());
        let err = materialize(&block, &[BlockPinRef::new("ghost.0", "")], &[]).unwrap_err();
        assert!(matches!(err, RunError::UnknownPort(_)));
    }

    #[test]
    fn test_single_input_gets_coerced_default() {
        let block = compiled(
            BlockDefinition::builder("Defaults")
                .field_with_default("limit", TypeExpr::Integer.config(), json!("7"))
                .field("name", TypeExpr::String.config())
                .build()
                .unwrap(),
        );
        let ports = materialize(&block, &[], &[]).unwrap();
        assert!(matches!(&ports["limit"], PortSlot::Single(PortValue::Value(v)) if *v == json!(7)));
        assert!(matches!(&ports["name"], PortSlot::Single(PortValue::Value(Value::Null))));
    }

    #[test]
    fn test_nested_pin_set_reads_pin_indices() {
        let shape = PortShape::new("Route")
            .field("out", TypeExpr::list(TypeExpr::output(TypeExpr::String)))
            .field("headers", TypeExpr::dict(TypeExpr::String.input()));
        let block = compiled(
            BlockDefinition::builder("Router")
                .field("route", TypeExpr::port(shape))
                .build()
                .unwrap(),
        );
        let ports = materialize(
            &block,
            &[BlockPinRef::new("route", "headers.accept")],
            &[BlockPinRef::new("route", "out.1")],
        )
        .unwrap();

        let PortSlot::Single(PortValue::Pins(pins)) = &ports["route"] else {
            panic!("expected a pin set");
        };
        match pins.get("out") {
            Some(PinSlot::OutputList(handles)) => {
                assert_eq!(handles.len(), 2);
                assert_eq!(
                    handles[1].as_ref().map(|h| h.source().clone()),
                    Some(BlockPinRef::new("route", "out.1"))
                );
            }
            other => panic!("unexpected slot {other:?}"),
        }
        assert_eq!(pins.value("headers.accept"), Some(&Value::Null));
    }

    #[test]
    fn test_tool_handle_counts_streaming_calls() {
        let signature = crate::core::types::ToolSignature::new("Emit")
            .param(ParamDecl::new("x", TypeExpr::Integer))
            .streaming();
        let mut handle = ToolHandle::new("emit", Arc::new(signature));
        assert_eq!(handle.next_call_index(), 0);
        assert_eq!(handle.next_call_index(), 1);

        let plain = crate::core::types::ToolSignature::new("Once");
        let mut handle = ToolHandle::new("once", Arc::new(plain));
        assert_eq!(handle.next_call_index(), 0);
        assert_eq!(handle.next_call_index(), 0);
    }

    #[test]
    fn test_pin_set_pads_list_inputs() {
        let mut pins = PinSet::default();
        pins.set_input("args.2", Cardinality::List, json!(5)).unwrap();
        assert_eq!(
            pins.get("args").and_then(PinSlot::to_value),
            Some(json!([null, null, 5]))
        );
        assert!(matches!(
            pins.set_input("args.x", Cardinality::List, json!(1)),
            Err(RunError::InvalidIndex { .. })
        ));
        let huge = format!("args.{}", usize::MAX);
        assert!(matches!(
            pins.set_input(&huge, Cardinality::List, json!(1)),
            Err(RunError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_index_cap() {
        assert_eq!(parse_index("items", &MAX_LIST_INDEX.to_string()).unwrap(), MAX_LIST_INDEX);
        for index in [(MAX_LIST_INDEX + 1).to_string(), usize::MAX.to_string()] {
            assert!(matches!(
                parse_index("items", &index),
                Err(RunError::InvalidIndex { .. })
            ));
        }
    }
}
