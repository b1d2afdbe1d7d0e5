//! Structural type resolver
//!
//! Turns a [`TypeExpr`] into a JSON Schema document, a [`TypeAdapter`] that
//! coerces and validates values against it, and the map of generic
//! parameters the type mentions. Generic parameters are replaced by `$ref`s
//! to placeholder definitions under `$defs/<name>` so that callers can bind
//! them later.

use jsonschema::JSONSchema;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::DefinitionError;
use super::types::{Constructor, GenericParam, ObjectType, TypeExpr};

/// Maximum nesting depth the resolver walks before giving up
pub const MAX_TYPE_DEPTH: usize = 10;

/// Result of resolving one declared type.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    /// JSON Schema with placeholder and hoisted definitions under `$defs`
    pub schema: Value,
    /// Generic parameter name to its bound schema (`{}` when unbounded)
    pub generics: BTreeMap<String, Value>,
    pub adapter: TypeAdapter,
}

impl ResolvedType {
    /// Adapter for the `{state, event, data, error}` envelope an input
    /// channel receives, with `data` coerced by this type.
    pub fn channel_envelope(&self) -> Result<TypeAdapter, DefinitionError> {
        let mut item = self.schema.clone();
        let defs = match item.as_object_mut() {
            Some(object) => object.remove("$defs"),
            None => None,
        };

        let mut schema = json!({
            "type": "object",
            "properties": {
                "state": { "enum": ["Pending", "Open", "Closed", "Error"] },
                "event": { "enum": ["Data", "Close", "Error"] },
                "data": { "anyOf": [item, { "type": "null" }] },
                "error": {}
            },
            "required": ["event"]
        });
        if let (Some(defs), Some(object)) = (defs, schema.as_object_mut()) {
            object.insert("$defs".to_string(), defs);
        }

        let coercion = Coercion::Object(vec![(
            "data".to_string(),
            Coercion::Nullable(Box::new(self.adapter.coercion().clone())),
        )]);
        TypeAdapter::new(schema, coercion)
    }
}

/// Resolve a declared type into its schema, adapter, and generics.
pub fn resolve(ty: &TypeExpr) -> Result<ResolvedType, DefinitionError> {
    let mut resolver = Resolver::default();
    let (mut schema, coercion) = resolver.walk(ty, 0)?;

    if !resolver.defs.is_empty() {
        let defs = Value::Object(std::mem::take(&mut resolver.defs));
        schema = match schema {
            Value::Object(mut object) => {
                object.insert("$defs".to_string(), defs);
                Value::Object(object)
            }
            other => json!({ "allOf": [other], "$defs": defs }),
        };
    }

    let adapter = TypeAdapter::new(schema.clone(), coercion)?;
    Ok(ResolvedType {
        schema,
        generics: resolver.generics,
        adapter,
    })
}

#[derive(Default)]
struct Resolver {
    defs: Map<String, Value>,
    generics: BTreeMap<String, Value>,
}

impl Resolver {
    fn walk(&mut self, ty: &TypeExpr, depth: usize) -> Result<(Value, Coercion), DefinitionError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(DefinitionError::TypeTooDeep {
                max: MAX_TYPE_DEPTH,
            });
        }

        match ty {
            TypeExpr::Any => Ok((json!({}), Coercion::Any)),
            TypeExpr::Null => Ok((json!({ "type": "null" }), Coercion::Null)),
            TypeExpr::Boolean => Ok((json!({ "type": "boolean" }), Coercion::Boolean)),
            TypeExpr::Integer => Ok((json!({ "type": "integer" }), Coercion::Integer)),
            TypeExpr::Number => Ok((json!({ "type": "number" }), Coercion::Number)),
            TypeExpr::String => Ok((json!({ "type": "string" }), Coercion::String)),
            TypeExpr::Object(object) => self.object(object, depth),
            TypeExpr::Schema(raw) => self.raw(raw),
            TypeExpr::Generic(param) => self.generic(param, depth),
            TypeExpr::Apply(constructor, args) => self.apply(*constructor, args, depth),
            TypeExpr::Annotated(inner, _) => self.walk(inner, depth + 1),
            TypeExpr::Tool(_) => Err(DefinitionError::UnexpectedWrapper { kind: "Tool" }),
            TypeExpr::Port(_) => Err(DefinitionError::UnexpectedWrapper { kind: "Port" }),
        }
    }

    fn object(
        &mut self,
        object: &ObjectType,
        depth: usize,
    ) -> Result<(Value, Coercion), DefinitionError> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut coercions = Vec::new();

        for property in &object.properties {
            let (schema, coercion) = self.walk(&property.ty, depth + 1)?;
            properties.insert(property.name.clone(), schema);
            coercions.push((property.name.clone(), coercion));
            if property.required {
                required.push(Value::String(property.name.clone()));
            }
        }

        let mut schema = json!({
            "title": object.title,
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        Ok((schema, Coercion::Object(coercions)))
    }

    fn raw(&mut self, raw: &Value) -> Result<(Value, Coercion), DefinitionError> {
        if !(raw.is_object() || raw.is_boolean()) {
            return Err(DefinitionError::InvalidSchema(format!(
                "a raw schema must be an object or a boolean, found {raw}"
            )));
        }
        let mut schema = raw.clone();
        if let Some(object) = schema.as_object_mut() {
            object.remove("$schema");
            for key in ["definitions", "$defs"] {
                if let Some(Value::Object(defs)) = object.remove(key) {
                    for (name, mut def) in defs {
                        rewrite_refs(&mut def);
                        self.defs.insert(name, def);
                    }
                }
            }
        }
        rewrite_refs(&mut schema);
        let coercion = Coercion::from_schema(&schema, &self.defs, 0);
        Ok((schema, coercion))
    }

    fn generic(
        &mut self,
        param: &GenericParam,
        depth: usize,
    ) -> Result<(Value, Coercion), DefinitionError> {
        let (bound, coercion) = match &param.bound {
            Some(bound) if bound.has_generics() => {
                return Err(DefinitionError::GenericInBound {
                    name: param.name.clone(),
                })
            }
            Some(bound) => self.walk(bound, depth + 1)?,
            None => (json!({}), Coercion::Any),
        };

        match self.generics.get(&param.name) {
            Some(existing) if *existing != bound => {
                return Err(DefinitionError::GenericConflict {
                    name: param.name.clone(),
                })
            }
            Some(_) => {}
            None => {
                self.generics.insert(param.name.clone(), bound.clone());
            }
        }

        let mut placeholder = match bound {
            Value::Object(object) => object,
            _ => Map::new(),
        };
        placeholder.insert("title".to_string(), Value::String(param.name.clone()));
        self.defs
            .insert(param.name.clone(), Value::Object(placeholder));

        Ok((
            json!({ "$ref": format!("#/$defs/{}", param.name) }),
            coercion,
        ))
    }

    fn apply(
        &mut self,
        constructor: Constructor,
        args: &[TypeExpr],
        depth: usize,
    ) -> Result<(Value, Coercion), DefinitionError> {
        match constructor {
            Constructor::List => {
                let item = single_argument(constructor, args)?;
                let (items, coercion) = self.walk(item, depth + 1)?;
                Ok((
                    json!({ "type": "array", "items": items }),
                    Coercion::Array(Box::new(coercion)),
                ))
            }
            Constructor::Dict => {
                let item = match args {
                    [item] | [_, item] => item,
                    _ => {
                        return Err(DefinitionError::TypeArguments {
                            constructor: constructor.name(),
                            expected: 2,
                            found: args.len(),
                        })
                    }
                };
                let (values, coercion) = self.walk(item, depth + 1)?;
                Ok((
                    json!({ "type": "object", "additionalProperties": values }),
                    Coercion::Map(Box::new(coercion)),
                ))
            }
            Constructor::Optional => {
                let inner = single_argument(constructor, args)?;
                let (schema, coercion) = self.walk(inner, depth + 1)?;
                Ok((
                    json!({ "anyOf": [schema, { "type": "null" }] }),
                    Coercion::Nullable(Box::new(coercion)),
                ))
            }
            Constructor::Union => {
                if args.is_empty() {
                    return Err(DefinitionError::TypeArguments {
                        constructor: constructor.name(),
                        expected: 1,
                        found: 0,
                    });
                }
                let mut schemas = Vec::with_capacity(args.len());
                let mut coercions = Vec::with_capacity(args.len());
                for variant in args {
                    let (schema, coercion) = self.walk(variant, depth + 1)?;
                    schemas.push(schema);
                    coercions.push(coercion);
                }
                Ok((json!({ "anyOf": schemas }), Coercion::Union(coercions)))
            }
            other => Err(DefinitionError::UnexpectedWrapper { kind: other.name() }),
        }
    }
}

/// The only type argument of a one-argument constructor.
pub(crate) fn single_argument(
    constructor: Constructor,
    args: &[TypeExpr],
) -> Result<&TypeExpr, DefinitionError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(DefinitionError::TypeArguments {
            constructor: constructor.name(),
            expected: 1,
            found: args.len(),
        }),
    }
}

fn rewrite_refs(value: &mut Value) {
    match value {
        Value::Object(object) => {
            for (key, child) in object.iter_mut() {
                match child {
                    Value::String(reference) if key == "$ref" => {
                        if let Some(name) = reference.strip_prefix("#/definitions/") {
                            *reference = format!("#/$defs/{name}");
                        }
                    }
                    other => rewrite_refs(other),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(rewrite_refs),
        _ => {}
    }
}

/// Lax value conversions applied before schema validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Any,
    Null,
    String,
    Boolean,
    Integer,
    Number,
    Array(Box<Coercion>),
    Map(Box<Coercion>),
    Object(Vec<(String, Coercion)>),
    Nullable(Box<Coercion>),
    Union(Vec<Coercion>),
}

impl Coercion {
    /// Derive conversions from a concrete schema's `type` keywords.
    fn from_schema(schema: &Value, defs: &Map<String, Value>, depth: usize) -> Coercion {
        if depth > MAX_TYPE_DEPTH {
            return Coercion::Any;
        }
        let Some(object) = schema.as_object() else {
            return Coercion::Any;
        };

        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            return reference
                .strip_prefix("#/$defs/")
                .and_then(|name| defs.get(name))
                .map(|def| Coercion::from_schema(def, defs, depth + 1))
                .unwrap_or(Coercion::Any);
        }

        for key in ["anyOf", "oneOf"] {
            if let Some(Value::Array(variants)) = object.get(key) {
                return Coercion::Union(
                    variants
                        .iter()
                        .map(|v| Coercion::from_schema(v, defs, depth + 1))
                        .collect(),
                );
            }
        }

        match object.get("type") {
            Some(Value::String(kind)) => Coercion::from_kind(kind, object, defs, depth),
            Some(Value::Array(kinds)) => {
                let kinds: Vec<&str> = kinds.iter().filter_map(Value::as_str).collect();
                let non_null: Vec<&str> = kinds.iter().copied().filter(|k| *k != "null").collect();
                match non_null.as_slice() {
                    [kind] if kinds.len() == 2 => Coercion::Nullable(Box::new(
                        Coercion::from_kind(kind, object, defs, depth),
                    )),
                    [kind] => Coercion::from_kind(kind, object, defs, depth),
                    _ => Coercion::Any,
                }
            }
            _ => Coercion::Any,
        }
    }

    fn from_kind(
        kind: &str,
        object: &Map<String, Value>,
        defs: &Map<String, Value>,
        depth: usize,
    ) -> Coercion {
        match kind {
            "null" => Coercion::Null,
            "string" => Coercion::String,
            "boolean" => Coercion::Boolean,
            "integer" => Coercion::Integer,
            "number" => Coercion::Number,
            "array" => Coercion::Array(Box::new(
                object
                    .get("items")
                    .map(|items| Coercion::from_schema(items, defs, depth + 1))
                    .unwrap_or(Coercion::Any),
            )),
            "object" => match object.get("properties") {
                Some(Value::Object(properties)) => Coercion::Object(
                    properties
                        .iter()
                        .map(|(name, schema)| {
                            (name.clone(), Coercion::from_schema(schema, defs, depth + 1))
                        })
                        .collect(),
                ),
                _ => match object.get("additionalProperties") {
                    Some(values @ Value::Object(_)) => {
                        Coercion::Map(Box::new(Coercion::from_schema(values, defs, depth + 1)))
                    }
                    _ => Coercion::Any,
                },
            },
            _ => Coercion::Any,
        }
    }

    /// Whether the value already has this shape without conversion
    fn matches_exactly(&self, value: &Value) -> bool {
        match (self, value) {
            (Coercion::Any, _) => true,
            (Coercion::Null, Value::Null) => true,
            (Coercion::String, Value::String(_)) => true,
            (Coercion::Boolean, Value::Bool(_)) => true,
            (Coercion::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Coercion::Number, Value::Number(_)) => true,
            (Coercion::Array(_), Value::Array(_)) => true,
            (Coercion::Map(_) | Coercion::Object(_), Value::Object(_)) => true,
            (Coercion::Nullable(_), Value::Null) => true,
            (Coercion::Nullable(inner), other) => inner.matches_exactly(other),
            (Coercion::Union(variants), other) => variants.iter().any(|v| v.matches_exactly(other)),
            _ => false,
        }
    }

    /// Convert the value where a lax conversion exists; otherwise return it
    /// unchanged for the validator to judge.
    pub fn apply(&self, value: Value) -> Value {
        match self {
            Coercion::Any | Coercion::Null | Coercion::String => value,
            Coercion::Boolean => match &value {
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => Value::Bool(true),
                    "false" | "0" | "no" | "off" => Value::Bool(false),
                    _ => value,
                },
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Value::Bool(false),
                    Some(1) => Value::Bool(true),
                    _ => value,
                },
                _ => value,
            },
            Coercion::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => value,
                Value::Number(n) => n.as_f64().and_then(whole_integer).unwrap_or(value),
                Value::String(s) => {
                    let s = s.trim();
                    if let Ok(i) = s.parse::<i64>() {
                        json!(i)
                    } else if let Ok(u) = s.parse::<u64>() {
                        json!(u)
                    } else {
                        s.parse::<f64>().ok().and_then(whole_integer).unwrap_or(value)
                    }
                }
                _ => value,
            },
            Coercion::Number => match &value {
                Value::String(s) => {
                    let s = s.trim();
                    if let Ok(i) = s.parse::<i64>() {
                        json!(i)
                    } else {
                        s.parse::<f64>()
                            .ok()
                            .and_then(serde_json::Number::from_f64)
                            .map(Value::Number)
                            .unwrap_or(value)
                    }
                }
                _ => value,
            },
            Coercion::Array(item) => match value {
                Value::Array(items) => {
                    Value::Array(items.into_iter().map(|v| item.apply(v)).collect())
                }
                other => other,
            },
            Coercion::Map(item) => match value {
                Value::Object(entries) => Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k, item.apply(v)))
                        .collect(),
                ),
                other => other,
            },
            Coercion::Object(properties) => match value {
                Value::Object(mut entries) => {
                    for (name, coercion) in properties {
                        if let Some(v) = entries.remove(name) {
                            entries.insert(name.clone(), coercion.apply(v));
                        }
                    }
                    Value::Object(entries)
                }
                other => other,
            },
            Coercion::Nullable(inner) => match value {
                Value::Null => Value::Null,
                other => inner.apply(other),
            },
            Coercion::Union(variants) => {
                if variants.iter().any(|v| v.matches_exactly(&value)) {
                    return value;
                }
                for variant in variants {
                    let converted = variant.apply(value.clone());
                    if converted != value {
                        return converted;
                    }
                }
                value
            }
        }
    }
}

/// A float holding a whole number that fits `i64` or `u64` exactly.
///
/// Anything else is left to the validator, so out-of-range values are
/// rejected instead of saturating.
fn whole_integer(f: f64) -> Option<Value> {
    // 2^63 and 2^64 are exact as f64; the casts below are lossless in range
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    if (-TWO_POW_63..TWO_POW_63).contains(&f) {
        Some(json!(f as i64))
    } else if (0.0..TWO_POW_64).contains(&f) {
        Some(json!(f as u64))
    } else {
        None
    }
}

/// A compiled validator plus coercion rules for one schema.
#[derive(Clone)]
pub struct TypeAdapter {
    schema: Arc<Value>,
    coercion: Arc<Coercion>,
    validator: Arc<JSONSchema>,
}

impl TypeAdapter {
    /// Compile an adapter; a schema the validator rejects is a definition error
    pub fn new(schema: Value, coercion: Coercion) -> Result<Self, DefinitionError> {
        let validator = JSONSchema::compile(&schema)
            .map_err(|e| DefinitionError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            schema: Arc::new(schema),
            coercion: Arc::new(coercion),
            validator: Arc::new(validator),
        })
    }

    /// Adapter accepting any JSON object (used for schema-valued pins)
    pub fn any_object() -> Result<Self, DefinitionError> {
        Self::new(
            json!({ "type": "object", "additionalProperties": true }),
            Coercion::Any,
        )
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn coercion(&self) -> &Coercion {
        &self.coercion
    }

    /// Coerce then validate, returning the coerced value
    pub fn validate(&self, value: Value) -> Result<Value, String> {
        let coerced = self.coercion.apply(value);
        let outcome = self.validator.validate(&coerced).map_err(|errors| {
            errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        });
        outcome?;
        Ok(coerced)
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.validator.is_valid(&self.coercion.apply(value.clone()))
    }
}

impl fmt::Debug for TypeAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAdapter")
            .field("schema", &self.schema)
            .field("coercion", &self.coercion)
            .finish()
    }
}
