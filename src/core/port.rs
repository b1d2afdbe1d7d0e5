//! Port builder
//!
//! Groups the pins of one logical port: a plain field, a list or dictionary
//! of sub-ports, a nested tool, a nested port shape, or a step/callback
//! function. Classification order is fixed and tested:
//!
//! 1. `Output[T]` / `OutputChannel[T]`
//! 2. `Tool`
//! 3. nested `Port`
//! 4. a field marked `Config`, `Input`, or an `InputChannel[T]`

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::block::{BlockError, FunctionDecl, FunctionKind};
use super::error::DefinitionError;
use super::pin::{
    generic_input_pin, input_pin, marker, output_pin, placeholder, state, value_output_pin,
    BuiltInputPin, BuiltOutputPin, BuiltState, GenericHome, InputOptions, InputPinInterface,
    Marker, OutputPinInterface,
};
use super::schema::{single_argument, TypeAdapter};
use super::types::{
    metadata_of, Constructor, FieldDecl, ParamKind, PortShape, ToolSignature, TypeExpr,
};
use super::{Cardinality, Metadata};

/// Name of the hidden output port every block reports domain errors on
pub const ERROR_PORT: &str = "error";

/// Interface of one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortInterface {
    pub metadata: Metadata,
    pub inputs: IndexMap<String, InputPinInterface>,
    pub outputs: IndexMap<String, OutputPinInterface>,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
    #[serde(rename = "isFunction")]
    pub is_function: bool,
}

/// What a port materializes into at run time.
#[derive(Debug, Clone)]
pub enum PortKind {
    /// A single nameless input pin holding a value
    Input,
    /// A single nameless output pin
    Output,
    /// A nested tool called through its output pins
    Tool(Arc<ToolSignature>),
    /// A nested port with its own named pins
    Nested,
    /// A step or callback
    Function(FunctionKind),
    /// A port supplying a generic parameter's schema
    Generic,
}

/// A built port with the adapters of its pins.
#[derive(Debug, Clone)]
pub struct BuiltPort {
    pub name: String,
    pub interface: PortInterface,
    pub kind: PortKind,
    pub input_adapters: IndexMap<String, TypeAdapter>,
    pub output_adapters: IndexMap<String, TypeAdapter>,
    /// Generics that a top-level generic port must supply
    pub generics: BTreeMap<String, Value>,
    home: GenericHome,
    local_generics: BTreeMap<String, Value>,
}

impl BuiltPort {
    fn new(
        name: &str,
        kind: PortKind,
        cardinality: Cardinality,
        metadata: Metadata,
        home: GenericHome,
    ) -> Self {
        Self {
            name: name.to_string(),
            interface: PortInterface {
                metadata,
                inputs: IndexMap::new(),
                outputs: IndexMap::new(),
                cardinality,
                is_function: matches!(kind, PortKind::Function(_)),
            },
            kind,
            input_adapters: IndexMap::new(),
            output_adapters: IndexMap::new(),
            generics: BTreeMap::new(),
            home,
            local_generics: BTreeMap::new(),
        }
    }

    /// The hidden output every block reports domain errors on
    pub fn error() -> Result<Self, DefinitionError> {
        let mut metadata = Metadata::new();
        metadata.insert("hidden".to_string(), Value::Bool(true));

        let mut port = Self::new(
            ERROR_PORT,
            PortKind::Output,
            Cardinality::Single,
            metadata.clone(),
            GenericHome::TopLevel,
        );
        let pin = value_output_pin(
            &TypeExpr::of::<BlockError>(),
            metadata,
            Cardinality::Single,
            false,
            &GenericHome::TopLevel,
        )?;
        port.add_output("", pin)?;
        Ok(port)
    }

    /// A top-level port supplying the schema of generic `name`
    pub fn generic(name: &str, bound: &Value) -> Result<Self, DefinitionError> {
        let mut metadata = Metadata::new();
        metadata.insert("generic".to_string(), Value::Bool(true));
        metadata.insert("hidden".to_string(), Value::Bool(true));

        let mut port = Self::new(
            name,
            PortKind::Generic,
            Cardinality::Single,
            metadata,
            GenericHome::TopLevel,
        );
        let pin = generic_input_pin(placeholder(name, bound), Metadata::new())?;
        port.add_input("", pin)?;
        Ok(port)
    }

    fn absorb(&mut self, generics: &BTreeMap<String, Value>) -> Result<(), DefinitionError> {
        let target = match self.home {
            GenericHome::TopLevel => &mut self.generics,
            GenericHome::Local(_) => &mut self.local_generics,
        };
        merge_generics(target, generics)
    }

    fn add_input(&mut self, pin: &str, built: BuiltInputPin) -> Result<(), DefinitionError> {
        if self.interface.inputs.contains_key(pin) {
            return Err(DefinitionError::PortNameCollision {
                name: format!("{}.{}", self.name, pin),
            });
        }
        self.absorb(&built.generics)?;
        self.interface.inputs.insert(pin.to_string(), built.interface);
        self.input_adapters.insert(pin.to_string(), built.adapter);
        Ok(())
    }

    fn add_output(&mut self, pin: &str, built: BuiltOutputPin) -> Result<(), DefinitionError> {
        if self.interface.outputs.contains_key(pin) {
            return Err(DefinitionError::PortNameCollision {
                name: format!("{}.{}", self.name, pin),
            });
        }
        self.absorb(&built.generics)?;
        self.interface.outputs.insert(pin.to_string(), built.interface);
        self.output_adapters.insert(pin.to_string(), built.adapter);
        Ok(())
    }

    /// Add one sticky input pin per generic used locally, named after it
    fn add_local_generic_pins(&mut self) -> Result<(), DefinitionError> {
        let locals = std::mem::take(&mut self.local_generics);
        for (name, bound) in &locals {
            let mut metadata = Metadata::new();
            metadata.insert("generic".to_string(), Value::Bool(true));
            let pin = generic_input_pin(placeholder(name, bound), metadata)?;
            self.add_input(name, pin)?;
        }
        self.local_generics = locals;
        Ok(())
    }

    /// Move local generic pin `generic` to `setter`, rewriting references
    fn apply_local_setter(
        &mut self,
        setter: &str,
        generic: &str,
        metadata: Metadata,
    ) -> Result<(), DefinitionError> {
        if !self.local_generics.contains_key(generic) {
            return Err(DefinitionError::UnknownGeneric {
                field: format!("{}.{}", self.name, setter),
                name: generic.to_string(),
            });
        }
        if self.interface.inputs.contains_key(setter) {
            return Err(DefinitionError::PortNameCollision {
                name: format!("{}.{}", self.name, setter),
            });
        }

        if let Some(mut pin) = self.interface.inputs.shift_remove(generic) {
            pin.metadata.extend(metadata);
            self.interface.inputs.insert(setter.to_string(), pin);
        }
        if let Some(adapter) = self.input_adapters.shift_remove(generic) {
            self.input_adapters.insert(setter.to_string(), adapter);
        }

        let from = GenericHome::Local(self.name.clone()).reference(generic);
        let to = GenericHome::Local(self.name.clone()).reference(setter);
        let generics = self
            .interface
            .inputs
            .values_mut()
            .map(|p| &mut p.generics)
            .chain(self.interface.outputs.values_mut().map(|p| &mut p.generics));
        for map in generics {
            for reference in map.values_mut() {
                if *reference == from {
                    *reference = to.clone();
                }
            }
        }
        Ok(())
    }
}

/// Merge generic bounds, rejecting one name with two different bounds.
pub fn merge_generics(
    target: &mut BTreeMap<String, Value>,
    source: &BTreeMap<String, Value>,
) -> Result<(), DefinitionError> {
    for (name, bound) in source {
        match target.get(name) {
            Some(existing) if existing != bound => {
                return Err(DefinitionError::GenericConflict { name: name.clone() })
            }
            Some(_) => {}
            None => {
                target.insert(name.clone(), bound.clone());
            }
        }
    }
    Ok(())
}

/// How a block-level field was classified.
#[derive(Debug, Clone)]
pub enum FieldOutcome {
    Port(BuiltPort),
    State(BuiltState),
    /// `GenericSetter[T]`: expose generic `T` under this field's name
    Setter { generic: String, metadata: Metadata },
    Ignored,
}

/// Classify a block-level field.
pub fn build_field(name: &str, field: &FieldDecl) -> Result<FieldOutcome, DefinitionError> {
    let ty = &field.ty;

    match ty.applied() {
        Some((Constructor::Dict, args)) => {
            if let Some(item) = args.last() {
                if item_shape(name, item)?.is_some() {
                    check_string_key(name, args)?;
                    let port = build_item(name, item, None, Cardinality::Dictionary)?;
                    return Ok(port.map_or(FieldOutcome::Ignored, FieldOutcome::Port));
                }
            }
        }
        Some((Constructor::List, [item])) => {
            if item_shape(name, item)?.is_some() {
                let port = build_item(name, item, None, Cardinality::List)?;
                return Ok(port.map_or(FieldOutcome::Ignored, FieldOutcome::Port));
            }
        }
        _ => {}
    }

    if let Some(port) = build_item(name, ty, field.default.as_ref(), Cardinality::Single)? {
        return Ok(FieldOutcome::Port(port));
    }

    if let Marker::State(scope) = marker(name, ty)? {
        return Ok(FieldOutcome::State(state(
            name,
            ty,
            scope,
            field.default.as_ref(),
        )?));
    }

    if let Some((generic, metadata)) = setter_target(name, ty)? {
        return Ok(FieldOutcome::Setter { generic, metadata });
    }

    Ok(FieldOutcome::Ignored)
}

enum ItemShape<'a> {
    Output,
    Tool(&'a Arc<ToolSignature>),
    Nested(&'a Arc<PortShape>),
    Marked,
}

fn item_shape<'a>(location: &str, ty: &'a TypeExpr) -> Result<Option<ItemShape<'a>>, DefinitionError> {
    if ty.is_output() {
        return Ok(Some(ItemShape::Output));
    }
    match ty.strip().0 {
        TypeExpr::Tool(signature) => return Ok(Some(ItemShape::Tool(signature))),
        TypeExpr::Port(shape) => return Ok(Some(ItemShape::Nested(shape))),
        _ => {}
    }
    if marker(location, ty)?.is_input() {
        return Ok(Some(ItemShape::Marked));
    }
    Ok(None)
}

/// Build the port an item type yields, with the given port cardinality.
fn build_item(
    name: &str,
    ty: &TypeExpr,
    default: Option<&Value>,
    cardinality: Cardinality,
) -> Result<Option<BuiltPort>, DefinitionError> {
    let Some(shape) = item_shape(name, ty)? else {
        return Ok(None);
    };

    let port = match shape {
        ItemShape::Output => {
            let pin = output_pin(ty, Cardinality::Single, &GenericHome::TopLevel)?;
            let mut port = BuiltPort::new(
                name,
                PortKind::Output,
                cardinality,
                Metadata::new(),
                GenericHome::TopLevel,
            );
            port.add_output("", pin)?;
            port
        }
        ItemShape::Tool(signature) => build_tool(name, signature, cardinality)?,
        ItemShape::Nested(shape) => build_nested(name, shape, cardinality)?,
        ItemShape::Marked => {
            let home = GenericHome::TopLevel;
            let pin = input_pin(
                ty,
                InputOptions {
                    location: name,
                    cardinality: Cardinality::Single,
                    default: if cardinality == Cardinality::Single { default } else { None },
                    home: &home,
                },
            )?;
            let mut port = BuiltPort::new(name, PortKind::Input, cardinality, Metadata::new(), home);
            port.add_input("", pin)?;
            port
        }
    };
    Ok(Some(port))
}

/// Tool pins: parameters become outputs, the return type becomes the
/// `return` input, and every generic gets a local sticky input pin.
fn build_tool(
    name: &str,
    signature: &Arc<ToolSignature>,
    cardinality: Cardinality,
) -> Result<BuiltPort, DefinitionError> {
    let home = GenericHome::Local(name.to_string());
    let mut port = BuiltPort::new(
        name,
        PortKind::Tool(Arc::clone(signature)),
        cardinality,
        signature.metadata.clone(),
        home.clone(),
    );

    for param in &signature.params {
        let (inner, annotations) = param.ty.strip();
        let pin = value_output_pin(
            inner,
            metadata_of(&annotations),
            param_cardinality(param.kind),
            false,
            &home,
        )?;
        port.add_output(&param.name, pin)?;
    }

    let returns = signature.returns.clone().unwrap_or(TypeExpr::Any);
    let mut result = input_pin(
        &returns,
        InputOptions {
            location: &format!("{name}.return"),
            cardinality: Cardinality::Single,
            default: None,
            home: &home,
        },
    )?;
    result.interface.required = false;
    result.interface.sticky = false;
    port.add_input("return", result)?;

    port.add_local_generic_pins()?;
    Ok(port)
}

/// Nested port pins, by field precedence: output, dictionary of outputs,
/// list of outputs, dictionary of marked items, list of marked items,
/// marked field, generic setter.
fn build_nested(
    name: &str,
    shape: &PortShape,
    cardinality: Cardinality,
) -> Result<BuiltPort, DefinitionError> {
    let home = GenericHome::Local(name.to_string());
    let mut port = BuiltPort::new(name, PortKind::Nested, cardinality, Metadata::new(), home.clone());
    let mut setters = Vec::new();

    for (field_name, field) in &shape.fields {
        let location = format!("{name}.{field_name}");
        let ty = &field.ty;

        if ty.is_output() {
            port.add_output(field_name, output_pin(ty, Cardinality::Single, &home)?)?;
            continue;
        }

        if let Some((constructor @ (Constructor::Dict | Constructor::List), args)) = ty.applied() {
            let item = match constructor {
                Constructor::List => single_argument(constructor, args)?,
                _ => match args.last() {
                    Some(item) => item,
                    None => {
                        return Err(DefinitionError::TypeArguments {
                            constructor: constructor.name(),
                            expected: 2,
                            found: 0,
                        })
                    }
                },
            };
            let pin_cardinality = match constructor {
                Constructor::List => Cardinality::List,
                _ => Cardinality::Dictionary,
            };

            if item.is_output() {
                if pin_cardinality == Cardinality::Dictionary {
                    check_string_key(&location, args)?;
                }
                port.add_output(field_name, output_pin(item, pin_cardinality, &home)?)?;
                continue;
            }
            if marker(&location, item)?.is_input() {
                if pin_cardinality == Cardinality::Dictionary {
                    check_string_key(&location, args)?;
                }
                let pin = input_pin(
                    item,
                    InputOptions {
                        location: &location,
                        cardinality: pin_cardinality,
                        default: None,
                        home: &home,
                    },
                )?;
                port.add_input(field_name, pin)?;
                continue;
            }
        }

        if marker(&location, ty)?.is_input() {
            let pin = input_pin(
                ty,
                InputOptions {
                    location: &location,
                    cardinality: Cardinality::Single,
                    default: field.default.as_ref(),
                    home: &home,
                },
            )?;
            port.add_input(field_name, pin)?;
            continue;
        }

        if let Some((generic, metadata)) = setter_target(&location, ty)? {
            setters.push((field_name.clone(), generic, metadata));
        }
    }

    port.add_local_generic_pins()?;
    for (setter, generic, metadata) in setters {
        port.apply_local_setter(&setter, &generic, metadata)?;
    }
    Ok(port)
}

/// A step or callback port: parameters become inputs; a step's declared
/// return type becomes its output pin.
pub fn build_function(name: &str, function: &FunctionDecl) -> Result<BuiltPort, DefinitionError> {
    let home = GenericHome::TopLevel;
    let mut port = BuiltPort::new(
        name,
        PortKind::Function(function.kind),
        Cardinality::Single,
        function.metadata.clone(),
        home.clone(),
    );

    for param in &function.params {
        let pin = input_pin(
            &param.ty,
            InputOptions {
                location: &format!("{name}.{}", param.name),
                cardinality: param_cardinality(param.kind),
                default: param.default.as_ref(),
                home: &home,
            },
        )?;
        port.add_input(&param.name, pin)?;
    }

    if let (FunctionKind::Step, Some(returns)) = (function.kind, &function.returns) {
        let (inner, annotations) = returns.strip();
        let pin = value_output_pin(
            inner,
            metadata_of(&annotations),
            Cardinality::Single,
            false,
            &home,
        )?;
        port.add_output(&function.output_name, pin)?;
    }

    Ok(port)
}

fn param_cardinality(kind: ParamKind) -> Cardinality {
    match kind {
        ParamKind::Single => Cardinality::Single,
        ParamKind::VarList => Cardinality::List,
        ParamKind::VarDict => Cardinality::Dictionary,
    }
}

fn check_string_key(field: &str, args: &[TypeExpr]) -> Result<(), DefinitionError> {
    match args {
        [_] => Ok(()),
        [key, _] if *key.strip().0 == TypeExpr::String => Ok(()),
        [_, _] => Err(DefinitionError::NonStringKey {
            field: field.to_string(),
        }),
        _ => Err(DefinitionError::TypeArguments {
            constructor: Constructor::Dict.name(),
            expected: 2,
            found: args.len(),
        }),
    }
}

/// The generic a `GenericSetter[T]` field names, with the field's metadata.
pub(crate) fn setter_target(
    field: &str,
    ty: &TypeExpr,
) -> Result<Option<(String, Metadata)>, DefinitionError> {
    let (inner, annotations) = ty.strip();
    let TypeExpr::Apply(Constructor::GenericSetter, args) = inner else {
        return Ok(None);
    };
    match args.as_slice() {
        [arg] => match arg.strip().0 {
            TypeExpr::Generic(param) => Ok(Some((param.name.clone(), metadata_of(&annotations)))),
            _ => Err(DefinitionError::SetterTarget {
                field: field.to_string(),
            }),
        },
        _ => Err(DefinitionError::TypeArguments {
            constructor: Constructor::GenericSetter.name(),
            expected: 1,
            found: args.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ParamDecl, StateScope};
    use crate::core::BlockPinRef;
    use serde_json::json;

    fn port_of(outcome: FieldOutcome) -> BuiltPort {
        match outcome {
            FieldOutcome::Port(port) => port,
            other => panic!("expected a port, got {other:?}"),
        }
    }

    #[test]
    fn test_output_field_is_single_output_port() {
        let port = port_of(build_field("greeting", &TypeExpr::output(TypeExpr::String).into()).unwrap());
        assert!(matches!(port.kind, PortKind::Output));
        assert_eq!(port.interface.cardinality, Cardinality::Single);
        assert!(port.interface.outputs.contains_key(""));
        assert!(port.interface.inputs.is_empty());
    }

    #[test]
    fn test_list_of_outputs_is_list_port() {
        let ty = TypeExpr::list(TypeExpr::output_channel(TypeExpr::Integer));
        let port = port_of(build_field("items", &ty.into()).unwrap());
        assert_eq!(port.interface.cardinality, Cardinality::List);
        let pin = &port.interface.outputs[""];
        assert_eq!(pin.cardinality, Cardinality::Single);
        assert!(pin.channel);
    }

    #[test]
    fn test_dictionary_port_requires_string_keys() {
        let ty = TypeExpr::dict_with_key(TypeExpr::Integer, TypeExpr::output(TypeExpr::String));
        assert_eq!(
            build_field("routes", &ty.into()).unwrap_err(),
            DefinitionError::NonStringKey {
                field: "routes".into()
            }
        );

        let ty = TypeExpr::dict_with_key(TypeExpr::String, TypeExpr::output(TypeExpr::String));
        let port = port_of(build_field("routes", &ty.into()).unwrap());
        assert_eq!(port.interface.cardinality, Cardinality::Dictionary);
    }

    #[test]
    fn test_annotated_list_is_single_port() {
        let ty = TypeExpr::list(TypeExpr::String).config();
        let port = port_of(build_field("tags", &ty.into()).unwrap());
        assert_eq!(port.interface.cardinality, Cardinality::Single);
        assert_eq!(port.interface.inputs[""].schema["type"], json!("array"));
    }

    #[test]
    fn test_list_of_marked_items_is_list_port() {
        let ty = TypeExpr::list(TypeExpr::String.config());
        let port = port_of(build_field("tags", &ty.into()).unwrap());
        assert_eq!(port.interface.cardinality, Cardinality::List);
        assert_eq!(port.interface.inputs[""].schema, json!({ "type": "string" }));
    }

    #[test]
    fn test_output_takes_precedence_over_marker() {
        let ty = TypeExpr::output(TypeExpr::String).config();
        let port = port_of(build_field("result", &ty.into()).unwrap());
        assert!(matches!(port.kind, PortKind::Output));
        assert!(port.interface.inputs.is_empty());
    }

    #[test]
    fn test_state_and_unmarked_fields() {
        let scope = StateScope::default();
        let field = FieldDecl::with_default(TypeExpr::Integer.state(scope), json!(0));
        assert!(matches!(build_field("seen", &field).unwrap(), FieldOutcome::State(_)));
        assert!(matches!(
            build_field("scratch", &TypeExpr::String.into()).unwrap(),
            FieldOutcome::Ignored
        ));
    }

    #[test]
    fn test_tool_pins() {
        let signature = ToolSignature::new("Search")
            .param(ParamDecl::new("query", TypeExpr::String))
            .param(ParamDecl::var_list("filters", TypeExpr::String))
            .param(ParamDecl::var_dict("options", TypeExpr::Any))
            .returns(TypeExpr::list(TypeExpr::String));
        let port = port_of(build_field("search", &TypeExpr::tool(signature).into()).unwrap());

        assert!(matches!(port.kind, PortKind::Tool(_)));
        assert_eq!(port.interface.outputs["query"].cardinality, Cardinality::Single);
        assert_eq!(port.interface.outputs["filters"].cardinality, Cardinality::List);
        assert_eq!(port.interface.outputs["options"].cardinality, Cardinality::Dictionary);

        let result = &port.interface.inputs["return"];
        assert!(!result.required);
        assert!(!result.sticky);
    }

    #[test]
    fn test_tool_generics_are_local_pins() {
        let signature = ToolSignature::new("Transform")
            .param(ParamDecl::new("value", TypeExpr::generic("T")))
            .returns(TypeExpr::generic("T"));
        let port = port_of(build_field("transform", &TypeExpr::tool(signature).into()).unwrap());

        assert!(port.generics.is_empty());
        let generic = &port.interface.inputs["T"];
        assert!(generic.sticky);
        assert_eq!(generic.default, Some(json!({ "title": "T" })));
        assert_eq!(
            port.interface.outputs["value"].generics["T"],
            BlockPinRef::new("transform", "T")
        );
    }

    #[test]
    fn test_nested_port_precedence() {
        let shape = PortShape::new("Route")
            .field("out", TypeExpr::output(TypeExpr::String))
            .field("many", TypeExpr::dict(TypeExpr::output(TypeExpr::String)))
            .field("each", TypeExpr::list(TypeExpr::output(TypeExpr::String)))
            .field("headers", TypeExpr::dict(TypeExpr::String.input()))
            .field("args", TypeExpr::list(TypeExpr::Integer.input()))
            .field("limit", FieldDecl::with_default(TypeExpr::Integer.config(), json!(3)))
            .field("note", TypeExpr::String);
        let port = port_of(build_field("route", &TypeExpr::port(shape).into()).unwrap());

        assert_eq!(port.interface.outputs["out"].cardinality, Cardinality::Single);
        assert_eq!(port.interface.outputs["many"].cardinality, Cardinality::Dictionary);
        assert_eq!(port.interface.outputs["each"].cardinality, Cardinality::List);
        assert_eq!(port.interface.inputs["headers"].cardinality, Cardinality::Dictionary);
        assert_eq!(port.interface.inputs["args"].cardinality, Cardinality::List);
        assert_eq!(port.interface.inputs["limit"].default, Some(json!(3)));
        assert!(!port.interface.inputs.contains_key("note"));
    }

    #[test]
    fn test_nested_generic_setter() {
        let shape = PortShape::new("Typed")
            .field("value", TypeExpr::generic("T").input())
            .field("schema", TypeExpr::generic_setter("T"));
        let port = port_of(build_field("typed", &TypeExpr::port(shape).into()).unwrap());

        assert!(!port.interface.inputs.contains_key("T"));
        assert!(port.interface.inputs.contains_key("schema"));
        assert_eq!(
            port.interface.inputs["value"].generics["T"],
            BlockPinRef::new("typed", "schema")
        );
    }

    #[test]
    fn test_nested_setter_for_unknown_generic() {
        let shape = PortShape::new("Typed").field("schema", TypeExpr::generic_setter("U"));
        assert!(matches!(
            build_field("typed", &TypeExpr::port(shape).into()),
            Err(DefinitionError::UnknownGeneric { .. })
        ));
    }
}
