//! Tool continuation protocol
//!
//! Calling a tool never returns its result in-process. The call is packaged
//! as outputs on the tool's parameter pins, optionally followed by a redirect
//! that routes the tool's future `return` value into a callback.

use indexmap::IndexMap;
use serde_json::Value;

use crate::core::error::RunError;
use crate::core::message::{BlockMessage, InputValue, OutputValue, PinRedirect};
use crate::core::types::{ParamKind, ToolSignature};
use crate::core::{join_path, BlockPinRef};

/// Arguments for one tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    positional: Vec<Value>,
    keyword: IndexMap<String, Value>,
}

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }
}

/// An argument after binding to its parameter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BoundArg {
    Single(Value),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
}

/// Bind call arguments to a tool's parameters.
///
/// Positional arguments fill the single parameters declared before the
/// variadic list, then spill into it; keywords match single parameters by
/// name, then spill into the variadic dictionary. Missing parameters take
/// their defaults.
pub(crate) fn bind(signature: &ToolSignature, args: ToolArgs) -> Result<Vec<(String, BoundArg)>, RunError> {
    let unexpected = |param: String| RunError::UnexpectedArgument {
        function: signature.name.clone(),
        param,
    };

    let var_list = signature
        .params
        .iter()
        .position(|p| p.kind == ParamKind::VarList);
    let positional_params = signature.params[..var_list.unwrap_or(signature.params.len())]
        .iter()
        .filter(|p| p.kind == ParamKind::Single);

    let mut bound: IndexMap<String, BoundArg> = IndexMap::new();
    let mut positional = args.positional.into_iter().enumerate().peekable();
    for param in positional_params {
        match positional.next() {
            Some((_, value)) => {
                bound.insert(param.name.clone(), BoundArg::Single(value));
            }
            None => break,
        }
    }
    if let Some(&(position, _)) = positional.peek() {
        let Some(index) = var_list else {
            return Err(unexpected(format!("#{position}")));
        };
        let rest = positional.map(|(_, value)| value).collect();
        bound.insert(signature.params[index].name.clone(), BoundArg::List(rest));
    }

    let var_dict = signature.params.iter().find(|p| p.kind == ParamKind::VarDict);
    let mut extra = IndexMap::new();
    for (name, value) in args.keyword {
        let declared = signature
            .params
            .iter()
            .any(|p| p.name == name && p.kind == ParamKind::Single);
        if declared {
            if bound.contains_key(&name) {
                return Err(unexpected(name));
            }
            bound.insert(name, BoundArg::Single(value));
        } else if var_dict.is_some() {
            extra.insert(name, value);
        } else {
            return Err(unexpected(name));
        }
    }
    if let Some(param) = var_dict {
        if !extra.is_empty() {
            bound.insert(param.name.clone(), BoundArg::Dict(extra));
        }
    }

    let mut result = Vec::with_capacity(signature.params.len());
    for param in &signature.params {
        let arg = match (bound.shift_remove(&param.name), param.kind) {
            (Some(arg), _) => arg,
            (None, ParamKind::Single) => match &param.default {
                Some(default) => BoundArg::Single(default.clone()),
                None => {
                    return Err(RunError::MissingArgument {
                        function: signature.name.clone(),
                        param: param.name.clone(),
                    })
                }
            },
            (None, ParamKind::VarList) => BoundArg::List(Vec::new()),
            (None, ParamKind::VarDict) => BoundArg::Dict(IndexMap::new()),
        };
        result.push((param.name.clone(), arg));
    }
    Ok(result)
}

/// Flatten bound arguments into `(param, pin path, value)` triples:
/// singles first, then list items as `name.i`, then dictionary items as
/// `name.key`.
pub(crate) fn flatten(bound: Vec<(String, BoundArg)>) -> Vec<(String, String, Value)> {
    let mut singles = Vec::new();
    let mut lists = Vec::new();
    let mut dicts = Vec::new();

    for (name, arg) in bound {
        match arg {
            BoundArg::Single(value) => singles.push((name.clone(), name, value)),
            BoundArg::List(values) => {
                for (i, value) in values.into_iter().enumerate() {
                    lists.push((name.clone(), join_path(&name, &i.to_string()), value));
                }
            }
            BoundArg::Dict(values) => {
                for (key, value) in values {
                    dicts.push((name.clone(), join_path(&name, &key), value));
                }
            }
        }
    }

    singles.extend(lists);
    singles.extend(dicts);
    singles
}

/// The continuation to run once a tool returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackCall {
    name: String,
    result_param: String,
    args: IndexMap<String, Value>,
}

impl CallbackCall {
    pub(crate) fn new(name: impl Into<String>, result_param: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result_param: result_param.into(),
            args: IndexMap::new(),
        }
    }

    /// A literal argument passed along to the callback
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result_param(&self) -> &str {
        &self.result_param
    }
}

/// A packaged tool call, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    port: String,
    outputs: Vec<OutputValue>,
    inputs: Vec<InputValue>,
    redirects: Vec<PinRedirect>,
}

impl ToolCall {
    pub(crate) fn new(port: impl Into<String>, outputs: Vec<OutputValue>) -> Self {
        Self {
            port: port.into(),
            outputs,
            inputs: Vec::new(),
            redirects: Vec::new(),
        }
    }

    /// Route the tool's result into `callback`; chained calls accumulate
    pub fn then(mut self, callback: CallbackCall) -> Self {
        self.redirects.push(PinRedirect {
            source: BlockPinRef::new(self.port.as_str(), "return"),
            target: BlockPinRef::new(callback.name.as_str(), callback.result_param.as_str()),
        });
        for (param, value) in callback.args {
            self.inputs.push(InputValue {
                target: BlockPinRef::new(callback.name.as_str(), param),
                value,
            });
        }
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn outputs(&self) -> &[OutputValue] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[InputValue] {
        &self.inputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut [InputValue] {
        &mut self.inputs
    }

    pub fn redirects(&self) -> &[PinRedirect] {
        &self.redirects
    }

    pub fn into_message(self) -> BlockMessage {
        BlockMessage {
            outputs: self.outputs,
            inputs: self.inputs,
            redirects: self.redirects,
            states: Vec::new(),
        }
    }
}
