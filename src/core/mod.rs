//! Core block abstractions and types
//!
//! This module holds everything that describes a block without running it:
//! the declarative type API, the schema resolver, the pin and port builders,
//! the interface compiler, the wire messages, and the registry.

pub mod block;
pub mod error;
pub mod interface;
pub mod message;
pub mod pin;
pub mod port;
pub mod registry;
pub mod schema;
pub mod types;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form annotations attached to ports, pins, and states.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Address of a pin on a block: `(port[.index], pin[.index])`.
///
/// The nameless pin of a single-pin port is `""`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPinRef {
    pub port: String,
    pub pin: String,
}

impl BlockPinRef {
    pub fn new(port: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Display for BlockPinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pin.is_empty() {
            write!(f, "{}", self.port)
        } else {
            write!(f, "{}/{}", self.port, self.pin)
        }
    }
}

/// Whether a port or pin holds one value, an indexed list, or a string-keyed map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    List,
    Dictionary,
}

/// Split an address component into its name and optional index suffix.
///
/// `"items.2"` becomes `("items", "2")`, `"name"` becomes `("name", "")`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.split_once('.') {
        Some((name, index)) => (name, index),
        None => (path, ""),
    }
}

/// Join a name and an optional index back into an address component.
pub fn join_path(name: &str, index: &str) -> String {
    if index.is_empty() {
        name.to_string()
    } else {
        format!("{name}.{index}")
    }
}
