//! Declarative type descriptions
//!
//! Blocks describe the shape of every field and parameter with a [`TypeExpr`]
//! tree. The tree carries plain value types, unresolved generic parameters,
//! port wrappers (`Output`, `OutputChannel`, `InputChannel`), containers,
//! nested tools and ports, and annotations (`Config`, `Input`, `State`,
//! metadata, item defaults).

use indexmap::IndexMap;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;
use std::sync::Arc;

use super::Metadata;

/// A type constructor applied to type arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constructor {
    /// `List[T]`
    List,
    /// `Dict[T]` (string keys) or `Dict[K, T]`
    Dict,
    /// `Optional[T]`
    Optional,
    /// `Union[A, B, ...]`
    Union,
    /// `Output[T]`: a handle the block sends values through
    Output,
    /// `OutputChannel[T]`: an output that streams a closed sequence
    OutputChannel,
    /// `InputChannel[T]`: an input that receives a streamed sequence
    InputChannel,
    /// `GenericSetter[T]`: exposes generic `T` under this field's name
    GenericSetter,
}

impl Constructor {
    pub fn name(self) -> &'static str {
        match self {
            Constructor::List => "List",
            Constructor::Dict => "Dict",
            Constructor::Optional => "Optional",
            Constructor::Union => "Union",
            Constructor::Output => "Output",
            Constructor::OutputChannel => "OutputChannel",
            Constructor::InputChannel => "InputChannel",
            Constructor::GenericSetter => "GenericSetter",
        }
    }
}

/// An unresolved generic parameter, optionally bounded by a concrete type.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: String,
    pub bound: Option<Box<TypeExpr>>,
}

/// Which input pins scope a state's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateScope {
    /// Step whose inputs key the state
    pub step: Option<String>,
    /// Input pins of that step
    pub inputs: Vec<String>,
}

/// Annotations carried by [`TypeExpr::Annotated`].
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Sticky configuration input
    Config,
    /// Input with explicit stickiness
    Input { sticky: bool },
    /// Persisted state, not a pin
    State(StateScope),
    /// Free-form metadata
    Metadata(Metadata),
    /// Default for each slot of a list or dictionary pin
    Default(Value),
}

/// A property of an [`ObjectType`].
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: TypeExpr,
    pub required: bool,
}

/// A titled record value type whose properties may use generics.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub title: String,
    pub properties: Vec<Property>,
}

impl ObjectType {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            properties: Vec::new(),
        }
    }

    /// Add a required property
    pub fn property(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.properties.push(Property {
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    /// Add a property that may be omitted
    pub fn optional_property(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.properties.push(Property {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }
}

/// How a function or tool parameter binds arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// One named argument
    Single,
    /// Any number of positional arguments, addressed `name.i`
    VarList,
    /// Any number of keyword arguments, addressed `name.key`
    VarDict,
}

/// A parameter of a step, callback, or tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            kind: ParamKind::Single,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn var_list(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            kind: ParamKind::VarList,
            ..Self::new(name, ty)
        }
    }

    pub fn var_dict(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            kind: ParamKind::VarDict,
            ..Self::new(name, ty)
        }
    }
}

/// The call signature of a nested tool.
///
/// Parameters become outputs of the tool's port (the block sends them when it
/// calls the tool); the return type becomes the port's `return` input.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSignature {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub returns: Option<TypeExpr>,
    pub streaming: bool,
    pub metadata: Metadata,
}

impl ToolSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            streaming: false,
            metadata: Metadata::new(),
        }
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, ty: TypeExpr) -> Self {
        self.returns = Some(ty);
        self
    }

    /// Calls on a streaming tool are numbered with an increasing index
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A declared field: its type plus its class-level default.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub ty: TypeExpr,
    pub default: Option<Value>,
}

impl FieldDecl {
    pub fn new(ty: TypeExpr) -> Self {
        Self { ty, default: None }
    }

    pub fn with_default(ty: TypeExpr, default: Value) -> Self {
        Self {
            ty,
            default: Some(default),
        }
    }
}

impl From<TypeExpr> for FieldDecl {
    fn from(ty: TypeExpr) -> Self {
        FieldDecl::new(ty)
    }
}

/// A nested port type with its own named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PortShape {
    pub name: String,
    pub fields: IndexMap<String, FieldDecl>,
}

impl PortShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: impl Into<FieldDecl>) -> Self {
        self.fields.insert(name.into(), field.into());
        self
    }
}

/// A declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Any,
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Object(ObjectType),
    /// A concrete JSON Schema, possibly carrying its own definitions
    Schema(Value),
    Generic(GenericParam),
    Apply(Constructor, Vec<TypeExpr>),
    Annotated(Box<TypeExpr>, Vec<Annotation>),
    Tool(Arc<ToolSignature>),
    Port(Arc<PortShape>),
}

impl TypeExpr {
    /// The schema of a Rust type, derived with `schemars`.
    ///
    /// A root schema only holds string-keyed maps, so converting it to JSON
    /// does not fail in practice. If it ever did, the result is `null`, which
    /// the resolver rejects as [`DefinitionError::InvalidSchema`] when the
    /// block compiles.
    ///
    /// [`DefinitionError::InvalidSchema`]: super::error::DefinitionError::InvalidSchema
    pub fn of<T: JsonSchema>() -> Self {
        let generator = SchemaSettings::draft07()
            .with(|settings| settings.meta_schema = None)
            .into_generator();
        let root = generator.into_root_schema_for::<T>();
        TypeExpr::Schema(serde_json::to_value(root).unwrap_or(Value::Null))
    }

    pub fn schema(schema: Value) -> Self {
        TypeExpr::Schema(schema)
    }

    pub fn generic(name: impl Into<String>) -> Self {
        TypeExpr::Generic(GenericParam {
            name: name.into(),
            bound: None,
        })
    }

    pub fn bounded_generic(name: impl Into<String>, bound: TypeExpr) -> Self {
        TypeExpr::Generic(GenericParam {
            name: name.into(),
            bound: Some(Box::new(bound)),
        })
    }

    pub fn list(item: TypeExpr) -> Self {
        TypeExpr::Apply(Constructor::List, vec![item])
    }

    /// A dictionary with string keys
    pub fn dict(item: TypeExpr) -> Self {
        TypeExpr::Apply(Constructor::Dict, vec![item])
    }

    /// A dictionary with an explicit key type
    pub fn dict_with_key(key: TypeExpr, item: TypeExpr) -> Self {
        TypeExpr::Apply(Constructor::Dict, vec![key, item])
    }

    pub fn optional(inner: TypeExpr) -> Self {
        TypeExpr::Apply(Constructor::Optional, vec![inner])
    }

    pub fn union(variants: Vec<TypeExpr>) -> Self {
        TypeExpr::Apply(Constructor::Union, variants)
    }

    pub fn output(item: TypeExpr) -> Self {
        TypeExpr::Apply(Constructor::Output, vec![item])
    }

    pub fn output_channel(item: TypeExpr) -> Self {
        TypeExpr::Apply(Constructor::OutputChannel, vec![item])
    }

    pub fn input_channel(item: TypeExpr) -> Self {
        TypeExpr::Apply(Constructor::InputChannel, vec![item])
    }

    pub fn generic_setter(name: impl Into<String>) -> Self {
        TypeExpr::Apply(Constructor::GenericSetter, vec![TypeExpr::generic(name)])
    }

    pub fn tool(signature: ToolSignature) -> Self {
        TypeExpr::Tool(Arc::new(signature))
    }

    pub fn port(shape: PortShape) -> Self {
        TypeExpr::Port(Arc::new(shape))
    }

    /// Add an annotation, flattening into an existing annotation carrier
    pub fn annotate(self, annotation: Annotation) -> Self {
        match self {
            TypeExpr::Annotated(inner, mut annotations) => {
                annotations.push(annotation);
                TypeExpr::Annotated(inner, annotations)
            }
            other => TypeExpr::Annotated(Box::new(other), vec![annotation]),
        }
    }

    /// Mark as a sticky configuration input
    pub fn config(self) -> Self {
        self.annotate(Annotation::Config)
    }

    /// Mark as a non-sticky input
    pub fn input(self) -> Self {
        self.annotate(Annotation::Input { sticky: false })
    }

    /// Mark as a sticky input
    pub fn sticky_input(self) -> Self {
        self.annotate(Annotation::Input { sticky: true })
    }

    /// Mark as persisted state
    pub fn state(self, scope: StateScope) -> Self {
        self.annotate(Annotation::State(scope))
    }

    pub fn with_metadata(self, metadata: Metadata) -> Self {
        self.annotate(Annotation::Metadata(metadata))
    }

    /// Default applied to every slot of a list or dictionary pin
    pub fn with_item_default(self, default: Value) -> Self {
        self.annotate(Annotation::Default(default))
    }

    /// The type with every annotation layer removed, plus the annotations
    /// in declaration order.
    pub fn strip(&self) -> (&TypeExpr, Vec<&Annotation>) {
        let mut annotations = Vec::new();
        let mut current = self;
        while let TypeExpr::Annotated(inner, layer) = current {
            annotations.extend(layer.iter());
            current = inner;
        }
        (current, annotations)
    }

    /// The constructor and arguments, looking through annotations.
    pub fn applied(&self) -> Option<(Constructor, &[TypeExpr])> {
        match self.strip().0 {
            TypeExpr::Apply(constructor, args) => Some((*constructor, args.as_slice())),
            _ => None,
        }
    }

    /// Whether this is `Output[..]` or `OutputChannel[..]`, through annotations
    pub fn is_output(&self) -> bool {
        matches!(
            self.applied(),
            Some((Constructor::Output | Constructor::OutputChannel, _))
        )
    }

    /// Whether the type mentions a generic parameter anywhere
    pub fn has_generics(&self) -> bool {
        match self {
            TypeExpr::Generic(_) => true,
            TypeExpr::Apply(_, args) => args.iter().any(TypeExpr::has_generics),
            TypeExpr::Annotated(inner, _) => inner.has_generics(),
            TypeExpr::Object(object) => object.properties.iter().any(|p| p.ty.has_generics()),
            TypeExpr::Tool(signature) => {
                signature.params.iter().any(|p| p.ty.has_generics())
                    || signature.returns.as_ref().is_some_and(TypeExpr::has_generics)
            }
            TypeExpr::Port(shape) => shape.fields.values().any(|f| f.ty.has_generics()),
            _ => false,
        }
    }
}

/// Metadata of the first `Metadata` annotation, or empty.
pub(crate) fn metadata_of(annotations: &[&Annotation]) -> Metadata {
    annotations
        .iter()
        .find_map(|a| match a {
            Annotation::Metadata(m) => Some(m.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// The first `Default` annotation, if any.
pub(crate) fn item_default_of(annotations: &[&Annotation]) -> Option<Value> {
    annotations.iter().find_map(|a| match a {
        Annotation::Default(v) => Some(v.clone()),
        _ => None,
    })
}
