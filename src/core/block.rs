//! Block declarations
//!
//! A [`BlockDefinition`] is the declared shape of a block: its name and
//! version, its fields (ports, tools, config, state), and its step and
//! callback functions. The definition compiles its interface once and keeps
//! the result for its whole lifetime.

use async_trait::async_trait;
use indexmap::IndexMap;
use node_semver::Version;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::error::{DefinitionError, RunError};
use super::interface::{BlockInterface, CompiledBlock};
use super::types::{FieldDecl, ParamDecl, TypeExpr};
use super::Metadata;
use crate::runtime::scope::{BlockScope, FunctionArgs};

/// Domain error raised by a function body, carrying structured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, thiserror::Error)]
#[error("BlockError: {message}")]
pub struct BlockError {
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl BlockError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Executable body of a step or callback.
///
/// The body reads inputs and state through the [`BlockScope`], emits through
/// it, and returns the step's result (ignored for callbacks and for steps
/// without a declared return type).
#[async_trait]
pub trait BlockFunction: Send + Sync {
    async fn call(&self, scope: &mut BlockScope<'_>, args: FunctionArgs) -> Result<Value, RunError>;
}

/// Adapter running a synchronous closure as a [`BlockFunction`].
pub struct FnHandler<F>(F);

/// Wrap a synchronous closure as a function body
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut BlockScope<'_>, FunctionArgs) -> Result<Value, RunError> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> BlockFunction for FnHandler<F>
where
    F: Fn(&mut BlockScope<'_>, FunctionArgs) -> Result<Value, RunError> + Send + Sync,
{
    async fn call(&self, scope: &mut BlockScope<'_>, args: FunctionArgs) -> Result<Value, RunError> {
        (self.0)(scope, args)
    }
}

/// Whether a function is a step or a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Entry point; may declare a return value emitted as an output
    Step,
    /// Continuation invoked by the orchestrator after a tool call
    Callback,
}

/// A declared step or callback.
#[derive(Clone)]
pub struct FunctionDecl {
    pub kind: FunctionKind,
    pub params: Vec<ParamDecl>,
    pub returns: Option<TypeExpr>,
    /// Name of the step's output pin
    pub output_name: String,
    pub metadata: Metadata,
    handler: Arc<dyn BlockFunction>,
}

impl FunctionDecl {
    pub fn new(handler: impl BlockFunction + 'static) -> Self {
        Self {
            kind: FunctionKind::Step,
            params: Vec::new(),
            returns: None,
            output_name: String::new(),
            metadata: Metadata::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.params.push(ParamDecl::new(name, ty));
        self
    }

    pub fn param_with_default(mut self, name: impl Into<String>, ty: TypeExpr, default: Value) -> Self {
        self.params.push(ParamDecl::new(name, ty).with_default(default));
        self
    }

    /// Variadic positional parameter, exposed as a List pin
    pub fn var_list(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.params.push(ParamDecl::var_list(name, ty));
        self
    }

    /// Variadic keyword parameter, exposed as a Dictionary pin
    pub fn var_dict(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.params.push(ParamDecl::var_dict(name, ty));
        self
    }

    pub fn returns(mut self, ty: TypeExpr) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn param_named(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|p| p.name == name)
    }

    pub(crate) fn handler(&self) -> Arc<dyn BlockFunction> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDecl")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("output_name", &self.output_name)
            .finish()
    }
}

/// The declared shape of a block.
pub struct BlockDefinition {
    name: String,
    version: Version,
    metadata: Metadata,
    fields: IndexMap<String, FieldDecl>,
    functions: IndexMap<String, FunctionDecl>,
    compiled: OnceLock<Result<Arc<CompiledBlock>, DefinitionError>>,
}

impl BlockDefinition {
    /// Start a definition from a declared name such as `Summarise_2_1`.
    ///
    /// The registered name is the part before the first `_`; the remaining
    /// parts form the version unless one is set explicitly.
    pub fn builder(declared_name: impl Into<String>) -> BlockBuilder {
        BlockBuilder {
            declared_name: declared_name.into(),
            version: None,
            metadata: Metadata::new(),
            fields: IndexMap::new(),
            functions: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn fields(&self) -> &IndexMap<String, FieldDecl> {
        &self.fields
    }

    pub fn functions(&self) -> &IndexMap<String, FunctionDecl> {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    /// Compile the interface on first access and return the cached result
    pub fn compiled(&self) -> Result<Arc<CompiledBlock>, DefinitionError> {
        self.compiled
            .get_or_init(|| CompiledBlock::compile(self).map(Arc::new))
            .clone()
    }

    /// The block's interface; repeated calls return the same `Arc`
    pub fn interface(&self) -> Result<Arc<BlockInterface>, DefinitionError> {
        Ok(Arc::clone(&self.compiled()?.interface))
    }
}

impl fmt::Debug for BlockDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDefinition")
            .field("name", &self.name)
            .field("version", &self.version.to_string())
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`BlockDefinition`].
pub struct BlockBuilder {
    declared_name: String,
    version: Option<String>,
    metadata: Metadata,
    fields: IndexMap<String, FieldDecl>,
    functions: IndexMap<String, FunctionDecl>,
}

impl BlockBuilder {
    /// Explicit version, overriding any version in the declared name
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: impl Into<FieldDecl>) -> Self {
        self.fields.insert(name.into(), field.into());
        self
    }

    pub fn field_with_default(self, name: impl Into<String>, ty: TypeExpr, default: Value) -> Self {
        self.field(name, FieldDecl::with_default(ty, default))
    }

    /// Inherit fields, functions, and metadata from a parent definition.
    ///
    /// Declarations on this builder win on name collisions; inherited names
    /// keep the parent's position.
    pub fn extends(mut self, parent: &BlockDefinition) -> Self {
        let mut fields = parent.fields.clone();
        for (name, field) in self.fields {
            fields.insert(name, field);
        }
        self.fields = fields;

        let mut functions = parent.functions.clone();
        for (name, function) in self.functions {
            functions.insert(name, function);
        }
        self.functions = functions;

        let mut metadata = parent.metadata.clone();
        metadata.extend(self.metadata);
        self.metadata = metadata;
        self
    }

    pub fn step(mut self, name: impl Into<String>, mut function: FunctionDecl) -> Self {
        function.kind = FunctionKind::Step;
        self.functions.insert(name.into(), function);
        self
    }

    pub fn callback(mut self, name: impl Into<String>, mut function: FunctionDecl) -> Self {
        function.kind = FunctionKind::Callback;
        self.functions.insert(name.into(), function);
        self
    }

    pub fn build(self) -> Result<BlockDefinition, DefinitionError> {
        let mut parts = self.declared_name.split('_');
        let name = parts.next().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(DefinitionError::EmptyName);
        }

        let suffix: Vec<&str> = parts.filter(|p| !p.is_empty()).collect();
        let raw = match self.version {
            Some(version) => version,
            None if !suffix.is_empty() => suffix.join("."),
            None => "1.0.0".to_string(),
        };

        Ok(BlockDefinition {
            name,
            version: coerce_version(&raw)?,
            metadata: self.metadata,
            fields: self.fields,
            functions: self.functions,
            compiled: OnceLock::new(),
        })
    }
}

/// Parse a possibly partial version, zero-padding missing components.
pub fn coerce_version(raw: &str) -> Result<Version, DefinitionError> {
    let trimmed = raw.trim().trim_start_matches('v');
    let split_at = trimmed
        .find(|c| c == '-' || c == '+')
        .unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);

    let mut components: Vec<&str> = core.split('.').filter(|c| !c.is_empty()).collect();
    if components.is_empty() || components.len() > 3 {
        return Err(DefinitionError::InvalidVersion {
            version: raw.to_string(),
            message: "expected one to three numeric components".to_string(),
        });
    }
    while components.len() < 3 {
        components.push("0");
    }

    let normalized = format!("{}{}", components.join("."), suffix);
    Version::parse(&normalized).map_err(|e| DefinitionError::InvalidVersion {
        version: raw.to_string(),
        message: e.to_string(),
    })
}
