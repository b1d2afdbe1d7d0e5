//! Flow Blocks - declarative blocks for a flow orchestrator
//!
//! A block declares typed ports, tools, config, state, and step/callback
//! functions. This crate compiles those declarations into a serializable
//! interface and runs one function per block instance, turning everything
//! the function sends into wire messages for the orchestrator.

pub mod config;
pub mod core;
pub mod observability;
pub mod runtime;
#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use crate::config::RuntimeConfig;
pub use crate::core::block::{handler_fn, BlockDefinition, BlockError, BlockFunction, FunctionDecl};
pub use crate::core::error::{DefinitionError, RunError};
pub use crate::core::interface::BlockInterface;
pub use crate::core::message::{BlockMessage, BlockRunData};
pub use crate::core::registry::{BlockRegistry, RegistryError};
pub use crate::core::types::TypeExpr;
pub use crate::core::BlockPinRef;
pub use crate::observability::init_tracing;
pub use crate::runtime::scope::{BlockScope, FunctionArgs};
pub use crate::runtime::BlockRuntime;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
