//! Error taxonomy
//!
//! Definition errors are raised while compiling a block's interface and make
//! the block unusable. Run errors are raised while loading or running one
//! instance and are fatal to that invocation only.

use super::block::BlockError;
use super::registry::RegistryError;

/// Errors in a block's declared shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    /// A wrapper such as `Output` was given the wrong number of type arguments
    #[error("{constructor} must have exactly {expected} type argument(s), found {found}")]
    TypeArguments {
        constructor: &'static str,
        expected: usize,
        found: usize,
    },

    /// A dictionary port or pin was declared with a non-string key type
    #[error("Dictionary ports and pins must have str keys (field '{field}')")]
    NonStringKey { field: String },

    /// More than one of Config, Input, and State on one declaration
    #[error("Field '{field}' can only be annotated with one of Config(), Input(), and State()")]
    ConflictingMarkers { field: String },

    /// State fields must declare a default value
    #[error("State '{field}' must have a default value")]
    StateWithoutDefault { field: String },

    /// A port wrapper appeared where a value type was expected
    #[error("{kind} cannot be used as a value type")]
    UnexpectedWrapper { kind: &'static str },

    /// The same generic parameter was declared with different bounds
    #[error("Generic '{name}' is declared with conflicting bounds")]
    GenericConflict { name: String },

    /// A generic's bound refers to another generic
    #[error("The bound of generic '{name}' cannot contain generic parameters")]
    GenericInBound { name: String },

    /// A generic setter names a generic that nothing in the block uses
    #[error("Generic setter '{field}' refers to unknown generic '{name}'")]
    UnknownGeneric { field: String, name: String },

    #[error("Generic setter '{field}' must wrap exactly one generic parameter")]
    SetterTarget { field: String },

    /// A generic reference points at a pin that does not exist
    #[error("Generic '{name}' on {location} points at missing pin {target}")]
    DanglingGeneric {
        name: String,
        location: String,
        target: String,
    },

    /// Two ports ended up with the same name
    #[error("Port '{name}' is declared more than once")]
    PortNameCollision { name: String },

    /// Type nesting exceeded the resolver's depth cap
    #[error("Type nesting exceeds the maximum depth of {max}")]
    TypeTooDeep { max: usize },

    /// The generated schema was rejected by the validator
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A declared default does not satisfy its own type
    #[error("Invalid default for {location}: {message}")]
    InvalidDefault { location: String, message: String },

    /// The block's version could not be parsed
    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    /// The block's name is empty
    #[error("Block name cannot be empty")]
    EmptyName,
}

/// Errors raised while loading or running a block instance.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The function body raised a domain error
    #[error(transparent)]
    Block(#[from] BlockError),

    /// A value failed schema validation or coercion
    #[error("Validation failed for {port}/{pin}: {message}")]
    Validation {
        port: String,
        pin: String,
        message: String,
    },

    #[error("Unknown port '{0}'")]
    UnknownPort(String),

    #[error("Unknown pin '{pin}' on port '{port}'")]
    UnknownPin { port: String, pin: String },

    #[error("Unknown state '{0}'")]
    UnknownState(String),

    #[error("Could not find function '{0}'")]
    UnknownFunction(String),

    #[error("'{0}' is not a callback")]
    NotACallback(String),

    /// A list index was not an integer, or addressed a slot that does not exist
    #[error("Invalid index '{index}' on {path}: {message}")]
    InvalidIndex {
        path: String,
        index: String,
        message: String,
    },

    #[error("Missing argument '{param}' for '{function}'")]
    MissingArgument { function: String, param: String },

    #[error("Unexpected argument '{param}' for '{function}'")]
    UnexpectedArgument { function: String, param: String },

    /// A port was accessed as the wrong kind (e.g. sending on an input)
    #[error("Port '{port}' is not {expected}")]
    PortKind { port: String, expected: &'static str },

    #[error("Output '{0}' is not a channel")]
    NotAChannel(String),

    /// The instance has already run a function
    #[error("Block has already run a function. Each instance of a block can only run once (function '{function}')")]
    AlreadyRun { function: String },

    #[error("Cannot {action} while the instance is {phase}")]
    InvalidPhase { phase: String, action: &'static str },
}

impl RunError {
    pub(crate) fn validation(
        port: impl Into<String>,
        pin: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        RunError::Validation {
            port: port.into(),
            pin: pin.into(),
            message: message.into(),
        }
    }
}
