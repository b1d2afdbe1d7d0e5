//! Block interface compiler
//!
//! Walks a definition once and produces its immutable [`BlockInterface`]
//! together with the adapters the runtime needs. The result is cached on the
//! definition.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::block::BlockDefinition;
use super::error::DefinitionError;
use super::pin::InputPinInterface;
use super::port::{
    build_field, build_function, merge_generics, BuiltPort, FieldOutcome, PortInterface, PortKind,
    ERROR_PORT,
};
use super::schema::TypeAdapter;
use super::{BlockPinRef, Metadata};

/// Interface of one persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInterface {
    pub metadata: Metadata,
    /// Input pins whose values key the state's lifetime
    pub scope: Vec<BlockPinRef>,
    pub default: Value,
}

/// The structural interface of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInterface {
    pub metadata: Metadata,
    pub ports: IndexMap<String, PortInterface>,
    pub state: IndexMap<String, StateInterface>,
}

impl BlockInterface {
    pub fn port(&self, name: &str) -> Option<&PortInterface> {
        self.ports.get(name)
    }

    /// Look up an input pin by address, ignoring index suffixes
    pub fn input_pin(&self, reference: &BlockPinRef) -> Option<&InputPinInterface> {
        let (port, _) = super::split_path(&reference.port);
        let (pin, _) = super::split_path(&reference.pin);
        self.ports.get(port)?.inputs.get(pin)
    }

    /// Check that every generic reference and state scope points at an
    /// existing input pin
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::ok();

        for (port_name, port) in &self.ports {
            let references = port
                .inputs
                .iter()
                .map(|(pin, i)| (pin, &i.generics))
                .chain(port.outputs.iter().map(|(pin, o)| (pin, &o.generics)));

            for (pin_name, generics) in references {
                for (generic, target) in generics {
                    if self.input_pin(target).is_none() {
                        result = result.merge(ValidationResult::error(DefinitionError::DanglingGeneric {
                            name: generic.clone(),
                            location: BlockPinRef::new(port_name.as_str(), pin_name.as_str()).to_string(),
                            target: target.to_string(),
                        }));
                    }
                }
            }
        }

        for (state_name, state) in &self.state {
            for reference in &state.scope {
                if self.input_pin(reference).is_none() {
                    result = result.with_warning(format!(
                        "State '{state_name}' is scoped by missing pin {reference}"
                    ));
                }
            }
        }

        result
    }
}

/// Outcome of checking a compiled interface.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether validation passed
    pub valid: bool,
    pub errors: Vec<DefinitionError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(error: DefinitionError) -> Self {
        Self {
            valid: false,
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, msg: impl Into<String>) -> Self {
        self.warnings.push(msg.into());
        self
    }

    /// Merge another validation result into this one
    pub fn merge(mut self, other: ValidationResult) -> Self {
        if !other.valid {
            self.valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    /// The first error, if any
    pub fn into_result(self) -> Result<Vec<String>, DefinitionError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.warnings),
        }
    }
}

/// A compiled interface plus everything the runtime looks up per pin.
#[derive(Debug)]
pub struct CompiledBlock {
    pub interface: Arc<BlockInterface>,
    input_adapters: HashMap<(String, String), TypeAdapter>,
    output_adapters: HashMap<(String, String), TypeAdapter>,
    state_adapters: HashMap<String, TypeAdapter>,
    port_kinds: IndexMap<String, PortKind>,
}

impl CompiledBlock {
    pub fn input_adapter(&self, port: &str, pin: &str) -> Option<&TypeAdapter> {
        self.input_adapters.get(&(port.to_string(), pin.to_string()))
    }

    pub fn output_adapter(&self, port: &str, pin: &str) -> Option<&TypeAdapter> {
        self.output_adapters.get(&(port.to_string(), pin.to_string()))
    }

    pub fn state_adapter(&self, state: &str) -> Option<&TypeAdapter> {
        self.state_adapters.get(state)
    }

    pub fn port_kind(&self, port: &str) -> Option<&PortKind> {
        self.port_kinds.get(port)
    }

    pub fn port_kinds(&self) -> impl Iterator<Item = (&String, &PortKind)> {
        self.port_kinds.iter()
    }

    /// Compile a definition's interface.
    pub fn compile(definition: &BlockDefinition) -> Result<Self, DefinitionError> {
        let mut ports: IndexMap<String, BuiltPort> = IndexMap::new();
        let mut states = IndexMap::new();
        let mut state_adapters = HashMap::new();
        let mut generics: BTreeMap<String, Value> = BTreeMap::new();
        let mut setters = Vec::new();

        // A field or function of the same name replaces the inherited error port
        let error_declared = definition.fields().contains_key(ERROR_PORT)
            || definition.functions().contains_key(ERROR_PORT);
        if !error_declared {
            insert_port(&mut ports, &mut generics, BuiltPort::error()?)?;
        }

        for (name, field) in definition.fields() {
            match build_field(name, field)? {
                FieldOutcome::Port(port) => insert_port(&mut ports, &mut generics, port)?,
                FieldOutcome::State(state) => {
                    let scope = match &state.scope.step {
                        Some(step) => state
                            .scope
                            .inputs
                            .iter()
                            .map(|input| BlockPinRef::new(step.as_str(), input.as_str()))
                            .collect(),
                        None => Vec::new(),
                    };
                    state_adapters.insert(name.clone(), state.resolved.adapter.clone());
                    states.insert(
                        name.clone(),
                        StateInterface {
                            metadata: state.metadata,
                            scope,
                            default: state.default,
                        },
                    );
                }
                FieldOutcome::Setter { generic, metadata } => {
                    setters.push((name.clone(), generic, metadata))
                }
                FieldOutcome::Ignored => {}
            }
        }

        for (name, function) in definition.functions() {
            insert_port(&mut ports, &mut generics, build_function(name, function)?)?;
        }

        for (name, bound) in &generics {
            if ports.contains_key(name) {
                return Err(DefinitionError::PortNameCollision { name: name.clone() });
            }
            ports.insert(name.clone(), BuiltPort::generic(name, bound)?);
        }

        for (field, generic, metadata) in setters {
            apply_setter(&mut ports, &generics, &field, &generic, metadata)?;
        }

        let mut input_adapters = HashMap::new();
        let mut output_adapters = HashMap::new();
        let mut port_kinds = IndexMap::new();
        let mut interfaces = IndexMap::new();
        for (name, port) in ports {
            for (pin, adapter) in port.input_adapters {
                input_adapters.insert((name.clone(), pin), adapter);
            }
            for (pin, adapter) in port.output_adapters {
                output_adapters.insert((name.clone(), pin), adapter);
            }
            port_kinds.insert(name.clone(), port.kind);
            interfaces.insert(name, port.interface);
        }

        let interface = BlockInterface {
            metadata: definition.metadata().clone(),
            ports: interfaces,
            state: states,
        };
        for warning in interface.validate().into_result()? {
            tracing::warn!(block = %definition.name(), "{warning}");
        }

        tracing::debug!(
            block = %definition.name(),
            version = %definition.version(),
            ports = interface.ports.len(),
            states = interface.state.len(),
            "compiled block interface"
        );

        Ok(Self {
            interface: Arc::new(interface),
            input_adapters,
            output_adapters,
            state_adapters,
            port_kinds,
        })
    }
}

fn insert_port(
    ports: &mut IndexMap<String, BuiltPort>,
    generics: &mut BTreeMap<String, Value>,
    port: BuiltPort,
) -> Result<(), DefinitionError> {
    if ports.contains_key(&port.name) {
        return Err(DefinitionError::PortNameCollision { name: port.name });
    }
    merge_generics(generics, &port.generics)?;
    ports.insert(port.name.clone(), port);
    Ok(())
}

/// Re-home the generic port `generic` onto the setter field's name.
fn apply_setter(
    ports: &mut IndexMap<String, BuiltPort>,
    generics: &BTreeMap<String, Value>,
    field: &str,
    generic: &str,
    metadata: Metadata,
) -> Result<(), DefinitionError> {
    if !generics.contains_key(generic) {
        return Err(DefinitionError::UnknownGeneric {
            field: field.to_string(),
            name: generic.to_string(),
        });
    }
    if ports.contains_key(field) {
        return Err(DefinitionError::PortNameCollision {
            name: field.to_string(),
        });
    }

    let Some(mut port) = ports.shift_remove(generic) else {
        return Err(DefinitionError::UnknownGeneric {
            field: field.to_string(),
            name: generic.to_string(),
        });
    };
    port.name = field.to_string();
    port.interface
        .metadata
        .insert("hidden".to_string(), Value::Bool(false));
    port.interface.metadata.extend(metadata);
    ports.insert(field.to_string(), port);

    let from = BlockPinRef::new(generic, "");
    let to = BlockPinRef::new(field, "");
    for port in ports.values_mut() {
        let maps = port
            .interface
            .inputs
            .values_mut()
            .map(|p| &mut p.generics)
            .chain(port.interface.outputs.values_mut().map(|p| &mut p.generics));
        for map in maps {
            for reference in map.values_mut() {
                if *reference == from {
                    *reference = to.clone();
                }
            }
        }
    }
    Ok(())
}
