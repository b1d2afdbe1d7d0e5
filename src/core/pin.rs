//! Pin builder
//!
//! Classifies a single declared field or parameter into an input pin, an
//! output pin, a state, or nothing, and resolves its schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::DefinitionError;
use super::schema::{resolve, single_argument, ResolvedType, TypeAdapter};
use super::types::{item_default_of, metadata_of, Annotation, Constructor, StateScope, TypeExpr};
use super::{BlockPinRef, Cardinality, Metadata};

/// Interface of one input pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPinInterface {
    pub metadata: Metadata,
    pub schema: Value,
    pub generics: BTreeMap<String, BlockPinRef>,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
    pub sticky: bool,
    pub required: bool,
    /// Serialized as `null` when absent
    pub default: Option<Value>,
    pub channel: bool,
}

/// Interface of one output pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPinInterface {
    pub metadata: Metadata,
    pub schema: Value,
    pub generics: BTreeMap<String, BlockPinRef>,
    #[serde(rename = "type")]
    pub cardinality: Cardinality,
    pub channel: bool,
}

/// Where references to a newly discovered generic should point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericHome {
    /// A top-level generic port named after the parameter: `(T, "")`
    TopLevel,
    /// A local generic pin on the given port: `(port, T)`
    Local(String),
}

impl GenericHome {
    pub fn reference(&self, generic: &str) -> BlockPinRef {
        match self {
            GenericHome::TopLevel => BlockPinRef::new(generic, ""),
            GenericHome::Local(port) => BlockPinRef::new(port.as_str(), generic),
        }
    }
}

/// Role marker found on a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Config,
    Input { sticky: bool },
    State(StateScope),
    /// `InputChannel[T]` declared without an explicit marker
    Channel,
    None,
}

impl Marker {
    /// Whether the declaration produces an input pin
    pub fn is_input(&self) -> bool {
        matches!(self, Marker::Config | Marker::Input { .. } | Marker::Channel)
    }
}

/// Find the role marker of a declaration; more than one is an error.
pub fn marker(field: &str, ty: &TypeExpr) -> Result<Marker, DefinitionError> {
    let (inner, annotations) = ty.strip();
    let mut found = Marker::None;
    let mut count = 0;

    for annotation in annotations {
        let marker = match annotation {
            Annotation::Config => Marker::Config,
            Annotation::Input { sticky } => Marker::Input { sticky: *sticky },
            Annotation::State(scope) => Marker::State(scope.clone()),
            _ => continue,
        };
        count += 1;
        found = marker;
    }

    if count > 1 {
        return Err(DefinitionError::ConflictingMarkers {
            field: field.to_string(),
        });
    }
    if count == 0 && matches!(inner, TypeExpr::Apply(Constructor::InputChannel, _)) {
        return Ok(Marker::Channel);
    }
    Ok(found)
}

/// A built input pin with its adapter and the generics it mentions.
#[derive(Debug, Clone)]
pub struct BuiltInputPin {
    pub interface: InputPinInterface,
    pub adapter: TypeAdapter,
    pub generics: BTreeMap<String, Value>,
}

/// A built output pin with its adapter and the generics it mentions.
#[derive(Debug, Clone)]
pub struct BuiltOutputPin {
    pub interface: OutputPinInterface,
    pub adapter: TypeAdapter,
    pub generics: BTreeMap<String, Value>,
}

/// Options for building an input pin.
#[derive(Debug, Clone)]
pub struct InputOptions<'a> {
    /// Name used in error messages
    pub location: &'a str,
    pub cardinality: Cardinality,
    /// Class-level default; only consulted for Single pins
    pub default: Option<&'a Value>,
    pub home: &'a GenericHome,
}

/// Build an input pin from a declared field, parameter, or list item type.
pub fn input_pin(ty: &TypeExpr, options: InputOptions<'_>) -> Result<BuiltInputPin, DefinitionError> {
    let role = marker(options.location, ty)?;
    let (inner, annotations) = ty.strip();

    let (value_ty, channel) = match inner {
        TypeExpr::Apply(Constructor::InputChannel, args) => {
            (single_argument(Constructor::InputChannel, args)?, true)
        }
        other => (other, false),
    };

    let mut metadata = metadata_of(&annotations);
    let sticky = match role {
        Marker::Config => {
            metadata.insert("config".to_string(), Value::Bool(true));
            true
        }
        Marker::Input { sticky } => sticky,
        _ => false,
    };

    let resolved = resolve(value_ty)?;
    let default = match options.cardinality {
        Cardinality::Single => options.default.cloned().or_else(|| item_default_of(&annotations)),
        _ => item_default_of(&annotations),
    };
    if let Some(default) = &default {
        check_default(&resolved.adapter, default, options.location)?;
    }

    let adapter = if channel {
        resolved.channel_envelope()?
    } else {
        resolved.adapter.clone()
    };

    Ok(BuiltInputPin {
        interface: InputPinInterface {
            metadata,
            schema: resolved.schema,
            generics: references(&resolved.generics, options.home),
            cardinality: options.cardinality,
            sticky,
            required: default.is_none(),
            default,
            channel,
        },
        adapter,
        generics: resolved.generics,
    })
}

/// Build an output pin from an `Output[T]` or `OutputChannel[T]` declaration.
pub fn output_pin(
    ty: &TypeExpr,
    cardinality: Cardinality,
    home: &GenericHome,
) -> Result<BuiltOutputPin, DefinitionError> {
    let (inner, annotations) = ty.strip();
    let (value_ty, channel) = match inner {
        TypeExpr::Apply(Constructor::Output, args) => (single_argument(Constructor::Output, args)?, false),
        TypeExpr::Apply(Constructor::OutputChannel, args) => {
            (single_argument(Constructor::OutputChannel, args)?, true)
        }
        _ => return Err(DefinitionError::UnexpectedWrapper { kind: "non-output" }),
    };
    value_output_pin(value_ty, metadata_of(&annotations), cardinality, channel, home)
}

/// Build an output pin for a plain value type (step returns, tool parameters).
pub fn value_output_pin(
    value_ty: &TypeExpr,
    metadata: Metadata,
    cardinality: Cardinality,
    channel: bool,
    home: &GenericHome,
) -> Result<BuiltOutputPin, DefinitionError> {
    let resolved = resolve(value_ty)?;
    Ok(BuiltOutputPin {
        interface: OutputPinInterface {
            metadata,
            schema: resolved.schema,
            generics: references(&resolved.generics, home),
            cardinality,
            channel,
        },
        adapter: resolved.adapter,
        generics: resolved.generics,
    })
}

/// The sticky input that supplies a generic's concrete schema.
///
/// Its value is itself a schema, so it accepts any object and defaults to
/// the generic's placeholder.
pub fn generic_input_pin(placeholder: Value, metadata: Metadata) -> Result<BuiltInputPin, DefinitionError> {
    let adapter = TypeAdapter::any_object()?;
    Ok(BuiltInputPin {
        interface: InputPinInterface {
            metadata,
            schema: adapter.schema().clone(),
            generics: BTreeMap::new(),
            cardinality: Cardinality::Single,
            sticky: true,
            required: false,
            default: Some(placeholder),
            channel: false,
        },
        adapter,
        generics: BTreeMap::new(),
    })
}

/// Placeholder schema for a generic with the given bound.
pub fn placeholder(name: &str, bound: &Value) -> Value {
    let mut schema = match bound {
        Value::Object(object) => object.clone(),
        _ => Metadata::new(),
    };
    schema.insert("title".to_string(), Value::String(name.to_string()));
    Value::Object(schema)
}

/// A state declaration.
#[derive(Debug, Clone)]
pub struct BuiltState {
    pub metadata: Metadata,
    pub scope: StateScope,
    pub default: Value,
    pub resolved: ResolvedType,
}

/// Build a state from a `State`-marked field; a default is mandatory.
pub fn state(
    field: &str,
    ty: &TypeExpr,
    scope: StateScope,
    default: Option<&Value>,
) -> Result<BuiltState, DefinitionError> {
    let (inner, annotations) = ty.strip();
    let default = default
        .cloned()
        .or_else(|| item_default_of(&annotations))
        .ok_or_else(|| DefinitionError::StateWithoutDefault {
            field: field.to_string(),
        })?;

    let resolved = resolve(inner)?;
    check_default(&resolved.adapter, &default, field)?;

    Ok(BuiltState {
        metadata: metadata_of(&annotations),
        scope,
        default,
        resolved,
    })
}

fn references(generics: &BTreeMap<String, Value>, home: &GenericHome) -> BTreeMap<String, BlockPinRef> {
    generics
        .keys()
        .map(|name| (name.clone(), home.reference(name)))
        .collect()
}

fn check_default(adapter: &TypeAdapter, default: &Value, location: &str) -> Result<(), DefinitionError> {
    adapter
        .validate(default.clone())
        .map(|_| ())
        .map_err(|message| DefinitionError::InvalidDefault {
            location: location.to_string(),
            message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single<'a>(location: &'a str, default: Option<&'a Value>, home: &'a GenericHome) -> InputOptions<'a> {
        InputOptions {
            location,
            cardinality: Cardinality::Single,
            default,
            home,
        }
    }

    #[test]
    fn test_config_pin_is_sticky_and_flagged() {
        let home = GenericHome::TopLevel;
        let pin = input_pin(&TypeExpr::String.config(), single("name", None, &home)).unwrap();
        assert!(pin.interface.sticky);
        assert!(pin.interface.required);
        assert_eq!(pin.interface.default, None);
        assert_eq!(pin.interface.metadata.get("config"), Some(&json!(true)));
        assert_eq!(pin.interface.schema, json!({ "type": "string" }));
    }

    #[test]
    fn test_default_makes_pin_optional() {
        let home = GenericHome::TopLevel;
        let default = json!(5);
        let pin = input_pin(&TypeExpr::Integer.input(), single("limit", Some(&default), &home)).unwrap();
        assert!(!pin.interface.required);
        assert!(!pin.interface.sticky);
        assert_eq!(pin.interface.default, Some(json!(5)));
    }

    #[test]
    fn test_default_reported_verbatim() {
        let home = GenericHome::TopLevel;
        let default = json!("5");
        let pin = input_pin(&TypeExpr::Integer.config(), single("limit", Some(&default), &home)).unwrap();
        assert_eq!(pin.interface.default, Some(json!("5")));
    }

    #[test]
    fn test_invalid_default_rejected() {
        let home = GenericHome::TopLevel;
        let default = json!("five");
        let err = input_pin(&TypeExpr::Integer.config(), single("limit", Some(&default), &home)).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidDefault { .. }));
    }

    #[test]
    fn test_conflicting_markers() {
        let ty = TypeExpr::String.config().sticky_input();
        assert_eq!(
            marker("name", &ty).unwrap_err(),
            DefinitionError::ConflictingMarkers { field: "name".into() }
        );
    }

    #[test]
    fn test_input_channel_is_implicit_input() {
        let ty = TypeExpr::input_channel(TypeExpr::Integer);
        assert_eq!(marker("stream", &ty).unwrap(), Marker::Channel);

        let home = GenericHome::TopLevel;
        let pin = input_pin(&ty, single("stream", None, &home)).unwrap();
        assert!(pin.interface.channel);
        assert_eq!(pin.interface.schema, json!({ "type": "integer" }));
        assert!(pin
            .adapter
            .validate(json!({ "state": "Open", "event": "Data", "data": 1 }))
            .is_ok());
    }

    #[test]
    fn test_item_default_for_list_pin() {
        let home = GenericHome::TopLevel;
        let ty = TypeExpr::String.input().with_item_default(json!("n/a"));
        let pin = input_pin(
            &ty,
            InputOptions {
                location: "labels",
                cardinality: Cardinality::List,
                default: None,
                home: &home,
            },
        )
        .unwrap();
        assert_eq!(pin.interface.cardinality, Cardinality::List);
        assert!(!pin.interface.required);
        assert_eq!(pin.interface.default, Some(json!("n/a")));
    }

    #[test]
    fn test_generic_references_follow_home() {
        let ty = TypeExpr::generic("T").config();
        let top = GenericHome::TopLevel;
        let pin = input_pin(&ty, single("value", None, &top)).unwrap();
        assert_eq!(pin.interface.generics["T"], BlockPinRef::new("T", ""));

        let local = GenericHome::Local("tool".into());
        let pin = input_pin(&ty, single("value", None, &local)).unwrap();
        assert_eq!(pin.interface.generics["T"], BlockPinRef::new("tool", "T"));
    }

    #[test]
    fn test_output_pin_unwraps_channel() {
        let pin = output_pin(
            &TypeExpr::output_channel(TypeExpr::String),
            Cardinality::Single,
            &GenericHome::TopLevel,
        )
        .unwrap();
        assert!(pin.interface.channel);
        assert_eq!(pin.interface.schema, json!({ "type": "string" }));
    }

    #[test]
    fn test_output_arity_checked() {
        let ty = TypeExpr::Apply(Constructor::Output, vec![TypeExpr::String, TypeExpr::Integer]);
        assert!(matches!(
            output_pin(&ty, Cardinality::Single, &GenericHome::TopLevel),
            Err(DefinitionError::TypeArguments { constructor: "Output", .. })
        ));
    }

    #[test]
    fn test_state_requires_default() {
        let scope = StateScope::default();
        let ty = TypeExpr::Integer.state(scope.clone());
        assert!(matches!(
            state("counter", &ty, scope.clone(), None),
            Err(DefinitionError::StateWithoutDefault { .. })
        ));

        let default = json!(0);
        let built = state("counter", &ty, scope, Some(&default)).unwrap();
        assert_eq!(built.default, json!(0));
    }

    #[test]
    fn test_generic_input_pin() {
        let pin = generic_input_pin(placeholder("T", &json!({})), Metadata::new()).unwrap();
        assert!(pin.interface.sticky);
        assert!(!pin.interface.required);
        assert_eq!(pin.interface.default, Some(json!({ "title": "T" })));
        assert!(pin.adapter.validate(json!({ "type": "string" })).is_ok());
    }
}
