//! Block instances
//!
//! An instance holds the ports, state, and pending arguments of one block
//! for exactly one function run.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::ports::{element_mut, materialize, PinSet, PortValue, Ports};
use super::scope::{BlockScope, FunctionArgs};
use crate::config::RuntimeConfig;
use crate::core::block::{BlockDefinition, FunctionDecl, FunctionKind};
use crate::core::error::RunError;
use crate::core::interface::CompiledBlock;
use crate::core::message::{BlockMessage, BlockRunData, InputValue, StateValue};
use crate::core::port::PortKind;
use crate::core::types::ParamKind;
use crate::core::{split_path, BlockPinRef};

/// Unique identifier of an instance, used in log spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstancePhase {
    Constructed,
    Loaded,
    Running,
    Completed,
    Errored,
}

impl InstancePhase {
    fn can_load(self) -> bool {
        matches!(self, InstancePhase::Constructed | InstancePhase::Loaded)
    }
}

impl fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything loaded into an instance before it runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadRequest {
    pub context: Option<Value>,
    pub state: Vec<StateValue>,
    pub inputs: Vec<InputValue>,
    pub dynamic_inputs: Vec<BlockPinRef>,
    pub dynamic_outputs: Vec<BlockPinRef>,
}

impl From<&BlockRunData> for LoadRequest {
    fn from(data: &BlockRunData) -> Self {
        Self {
            context: data.context.clone(),
            state: data.state.clone(),
            inputs: data.inputs.clone(),
            dynamic_inputs: data.dynamic_inputs.clone(),
            dynamic_outputs: data.dynamic_outputs.clone(),
        }
    }
}

pub struct BlockInstance {
    id: InstanceId,
    definition: Arc<BlockDefinition>,
    compiled: Arc<CompiledBlock>,
    config: RuntimeConfig,
    phase: InstancePhase,
    ports: Ports,
    states: IndexMap<String, Value>,
    context: Option<Value>,
    pending: HashMap<String, PinSet>,
}

impl BlockInstance {
    /// A fresh instance with default port values and default states
    pub fn new(definition: Arc<BlockDefinition>, config: RuntimeConfig) -> Result<Self, RunError> {
        let compiled = definition.compiled()?;
        let ports = materialize(&compiled, &[], &[])?;

        let mut states = IndexMap::new();
        for (name, state) in &compiled.interface.state {
            let value = match compiled.state_adapter(name) {
                Some(adapter) => adapter
                    .validate(state.default.clone())
                    .map_err(|message| RunError::validation(name.as_str(), "", message))?,
                None => state.default.clone(),
            };
            states.insert(name.clone(), value);
        }

        let id = InstanceId::new();
        tracing::debug!(instance = %id, block = %definition.name(), "created block instance");

        Ok(Self {
            id,
            definition,
            compiled,
            config,
            phase: InstancePhase::Constructed,
            ports,
            states,
            context: None,
            pending: HashMap::new(),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn phase(&self) -> InstancePhase {
        self.phase
    }

    pub fn definition(&self) -> &BlockDefinition {
        &self.definition
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn state(&self, name: &str) -> Option<&Value> {
        self.states.get(name)
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    fn ensure_loadable(&self, action: &'static str) -> Result<(), RunError> {
        if self.phase.can_load() {
            Ok(())
        } else {
            Err(RunError::InvalidPhase {
                phase: self.phase.to_string(),
                action,
            })
        }
    }

    /// Size ports, then apply context, state, and inputs
    pub fn load(&mut self, request: LoadRequest) -> Result<(), RunError> {
        self.create_ports(&request.dynamic_inputs, &request.dynamic_outputs)?;
        self.set_context(request.context)?;
        self.set_state(&request.state)?;
        self.set_inputs(request.inputs)?;
        self.phase = InstancePhase::Loaded;

        tracing::debug!(
            instance = %self.id,
            block = %self.definition.name(),
            ports = self.ports.len(),
            "loaded block instance"
        );
        Ok(())
    }

    /// Rebuild the ports, allocating the requested list and dictionary slots
    pub fn create_ports(
        &mut self,
        dynamic_inputs: &[BlockPinRef],
        dynamic_outputs: &[BlockPinRef],
    ) -> Result<(), RunError> {
        self.ensure_loadable("create ports")?;
        self.ports = materialize(&self.compiled, dynamic_inputs, dynamic_outputs)?;
        Ok(())
    }

    pub fn set_context(&mut self, context: Option<Value>) -> Result<(), RunError> {
        self.ensure_loadable("set the context")?;
        self.context = context;
        Ok(())
    }

    pub fn set_state(&mut self, values: &[StateValue]) -> Result<(), RunError> {
        self.ensure_loadable("set state")?;
        for entry in values {
            let adapter = self
                .compiled
                .state_adapter(&entry.state)
                .ok_or_else(|| RunError::UnknownState(entry.state.clone()))?;
            let value = adapter
                .validate(entry.value.clone())
                .map_err(|message| RunError::validation(entry.state.as_str(), "", message))?;
            self.states.insert(entry.state.clone(), value);
        }
        Ok(())
    }

    pub fn set_inputs(&mut self, inputs: Vec<InputValue>) -> Result<(), RunError> {
        self.ensure_loadable("set inputs")?;
        for input in inputs {
            self.set_input(&input.target, input.value)?;
        }
        Ok(())
    }

    /// Coerce and store one input value
    pub fn set_input(&mut self, target: &BlockPinRef, value: Value) -> Result<(), RunError> {
        self.ensure_loadable("set inputs")?;
        let compiled = Arc::clone(&self.compiled);
        let (port_name, _) = split_path(&target.port);
        let (pin_name, pin_index) = split_path(&target.pin);

        let pin = compiled
            .interface
            .port(port_name)
            .and_then(|port| port.inputs.get(pin_name));
        let (Some(pin), Some(adapter)) = (pin, compiled.input_adapter(port_name, pin_name)) else {
            if self.config.strict_inputs {
                return Err(RunError::UnknownPin {
                    port: target.port.clone(),
                    pin: target.pin.clone(),
                });
            }
            tracing::warn!(instance = %self.id, target = %target, "skipping input for unknown pin");
            return Ok(());
        };
        let value = adapter
            .validate(value)
            .map_err(|message| RunError::validation(target.port.as_str(), target.pin.as_str(), message))?;

        if let Some(PortKind::Function(_)) = compiled.port_kind(port_name) {
            return self
                .pending
                .entry(port_name.to_string())
                .or_default()
                .set_input(&target.pin, pin.cardinality, value);
        }

        let element = element_mut(&compiled, &mut self.ports, &target.port)?;
        if pin_name.is_empty() {
            return match element {
                PortValue::Value(current) => {
                    *current = value;
                    Ok(())
                }
                _ => Err(RunError::PortKind {
                    port: target.port.clone(),
                    expected: "an input",
                }),
            };
        }
        match element {
            PortValue::Pins(pins) => pins.set_input(&target.pin, pin.cardinality, value),
            PortValue::Tool(tool) if pin_index.is_empty() => {
                tool.set_input(pin_name, value);
                Ok(())
            }
            _ => Err(RunError::PortKind {
                port: target.port.clone(),
                expected: "a port with named pins",
            }),
        }
    }

    /// The value currently held by an input pin
    pub fn input_value(&self, target: &BlockPinRef) -> Option<Value> {
        let (port_name, port_index) = split_path(&target.port);
        let (pin_name, _) = split_path(&target.pin);

        if let Some(PortKind::Function(_)) = self.compiled.port_kind(port_name) {
            let pending = self.pending.get(port_name)?;
            return match split_path(&target.pin).1 {
                "" => pending.get(pin_name).and_then(|slot| slot.to_value()),
                _ => pending.value(&target.pin).cloned(),
            };
        }

        match self.ports.get(port_name)?.element(port_index)? {
            PortValue::Value(value) if pin_name.is_empty() => Some(value.clone()),
            PortValue::Pins(pins) => pins.value(&target.pin).cloned(),
            PortValue::Tool(tool) => tool.input(pin_name).cloned(),
            _ => None,
        }
    }

    /// Run one function and return the messages it emitted.
    ///
    /// An instance runs at most once; any later call fails with
    /// [`RunError::AlreadyRun`] and emits nothing.
    pub async fn run(&mut self, function: &str) -> Result<Vec<BlockMessage>, RunError> {
        let definition = Arc::clone(&self.definition);
        let decl = definition
            .function(function)
            .ok_or_else(|| RunError::UnknownFunction(function.to_string()))?;

        if !self.phase.can_load() {
            return Err(RunError::AlreadyRun {
                function: function.to_string(),
            });
        }
        self.phase = InstancePhase::Running;

        let span = tracing::info_span!(
            "block_run",
            instance = %self.id,
            block = %definition.name(),
            function
        );
        let result = self.execute(function, decl).instrument(span).await;

        match &result {
            Ok(messages) => {
                self.phase = InstancePhase::Completed;
                tracing::info!(
                    instance = %self.id,
                    block = %definition.name(),
                    function,
                    messages = messages.len(),
                    "block run completed"
                );
            }
            Err(err) => {
                self.phase = InstancePhase::Errored;
                tracing::warn!(
                    instance = %self.id,
                    block = %definition.name(),
                    function,
                    error = %err,
                    "block run failed"
                );
            }
        }
        result
    }

    async fn execute(&mut self, function: &str, decl: &FunctionDecl) -> Result<Vec<BlockMessage>, RunError> {
        let args = self.function_args(function, decl)?;
        let compiled = Arc::clone(&self.compiled);

        let mut scope = BlockScope::new(
            &compiled,
            &self.config,
            &mut self.ports,
            &mut self.states,
            self.context.as_ref(),
            function,
        );
        let returned = decl.handler().call(&mut scope, args).await?;
        let mut emitter = scope.into_emitter();

        if let (FunctionKind::Step, Some(_)) = (decl.kind, &decl.returns) {
            let value = if self.config.validate_outputs {
                let adapter = compiled
                    .output_adapter(function, &decl.output_name)
                    .ok_or_else(|| RunError::UnknownPin {
                        port: function.to_string(),
                        pin: decl.output_name.clone(),
                    })?;
                adapter.validate(returned).map_err(|message| {
                    RunError::validation(function, decl.output_name.as_str(), message)
                })?
            } else {
                returned
            };
            emitter.output(BlockPinRef::new(function, decl.output_name.as_str()), value, 0);
        }

        Ok(emitter.into_messages())
    }

    /// Arguments from pending inputs, falling back to pin defaults
    fn function_args(&self, function: &str, decl: &FunctionDecl) -> Result<FunctionArgs, RunError> {
        let port = self
            .compiled
            .interface
            .port(function)
            .ok_or_else(|| RunError::UnknownFunction(function.to_string()))?;
        let pending = self.pending.get(function);

        let mut values = IndexMap::new();
        for param in &decl.params {
            let provided = pending
                .and_then(|p| p.get(&param.name))
                .and_then(|slot| slot.to_value());
            let value = match (provided, param.kind) {
                (Some(value), _) => value,
                (None, ParamKind::Single) => {
                    let default = port.inputs.get(&param.name).and_then(|pin| pin.default.clone());
                    let Some(default) = default else {
                        return Err(RunError::MissingArgument {
                            function: function.to_string(),
                            param: param.name.clone(),
                        });
                    };
                    match self.compiled.input_adapter(function, &param.name) {
                        Some(adapter) => adapter.validate(default).map_err(|message| {
                            RunError::validation(function, param.name.as_str(), message)
                        })?,
                        None => default,
                    }
                }
                (None, ParamKind::VarList) => Value::Array(Vec::new()),
                (None, ParamKind::VarDict) => Value::Object(Map::new()),
            };
            values.insert(param.name.clone(), value);
        }
        Ok(FunctionArgs::new(function, values))
    }
}

impl fmt::Debug for BlockInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockInstance")
            .field("id", &self.id)
            .field("block", &self.definition.name())
            .field("phase", &self.phase)
            .finish()
    }
}
