//! Block Registry - Central registry for managing all available blocks
//!
//! This module provides a thread-safe registry constructed by the hosting
//! application. It supports:
//! - Explicit registration under a bare name plus a semantic version
//! - Lookup by npm-style version range, selecting the highest match
//! - Eager interface compilation so broken definitions fail at registration
//! - A read-only snapshot of everything registered

use node_semver::{Range, Version};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::block::BlockDefinition;
use super::error::DefinitionError;
use super::interface::BlockInterface;

/// Block registry for managing all available blocks
///
/// The registry uses `Arc<RwLock<HashMap>>` for thread-safe access to blocks.
/// Each name maps to its registered versions in ascending order.
#[derive(Clone)]
pub struct BlockRegistry {
    blocks: Arc<RwLock<HashMap<String, Vec<Arc<BlockDefinition>>>>>,
}

impl BlockRegistry {
    /// Create a new empty block registry
    ///
    /// # Example
    /// ```
    /// use flow_blocks::core::registry::BlockRegistry;
    ///
    /// let registry = BlockRegistry::new();
    /// assert_eq!(registry.count(), 0);
    /// ```
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a block definition
    ///
    /// The interface is compiled before the block becomes visible, so a
    /// definition error is reported here rather than on first run.
    ///
    /// # Returns
    /// * `Ok(Arc<BlockDefinition>)` the registered definition
    /// * `Err(RegistryError)` if the name and version already exist or the
    ///   definition does not compile
    pub fn register(&self, definition: BlockDefinition) -> Result<Arc<BlockDefinition>, RegistryError> {
        definition.compiled()?;

        let definition = Arc::new(definition);
        let mut blocks = self.blocks.write();
        let versions = blocks.entry(definition.name().to_string()).or_default();

        if versions.iter().any(|d| d.version() == definition.version()) {
            return Err(RegistryError::DuplicateBlock {
                name: definition.name().to_string(),
                version: definition.version().to_string(),
            });
        }

        let position = versions
            .iter()
            .position(|d| d.version() > definition.version())
            .unwrap_or(versions.len());
        versions.insert(position, Arc::clone(&definition));

        tracing::info!(
            block = %definition.name(),
            version = %definition.version(),
            "registered block"
        );
        Ok(definition)
    }

    /// Unregister one version of a block
    ///
    /// # Returns
    /// * `Ok(())` if unregistration succeeds
    /// * `Err(RegistryError)` if the block or version is not found
    pub fn unregister(&self, name: &str, version: &str) -> Result<(), RegistryError> {
        let version = Version::parse(version).map_err(|e| RegistryError::InvalidRange {
            range: version.to_string(),
            message: e.to_string(),
        })?;

        let mut blocks = self.blocks.write();
        let versions = blocks
            .get_mut(name)
            .ok_or_else(|| RegistryError::BlockNotFound(name.to_string()))?;

        let before = versions.len();
        versions.retain(|d| *d.version() != version);
        if versions.len() == before {
            return Err(RegistryError::NoMatchingVersion {
                name: name.to_string(),
                range: version.to_string(),
            });
        }
        if versions.is_empty() {
            blocks.remove(name);
        }
        Ok(())
    }

    /// Find the highest registered version of `name` satisfying `range`
    ///
    /// An empty range matches every version.
    pub fn find(&self, name: &str, range: &str) -> Result<Arc<BlockDefinition>, RegistryError> {
        let range_text = if range.trim().is_empty() { "*" } else { range };
        let parsed = Range::parse(range_text).map_err(|e| RegistryError::InvalidRange {
            range: range.to_string(),
            message: e.to_string(),
        })?;

        let blocks = self.blocks.read();
        let versions = blocks
            .get(name)
            .ok_or_else(|| RegistryError::BlockNotFound(name.to_string()))?;

        versions
            .iter()
            .rev()
            .find(|d| parsed.satisfies(d.version()))
            .cloned()
            .ok_or_else(|| RegistryError::NoMatchingVersion {
                name: name.to_string(),
                range: range.to_string(),
            })
    }

    /// The interface of the highest version matching `range`
    pub fn interface(&self, name: &str, range: &str) -> Result<Arc<BlockInterface>, RegistryError> {
        Ok(self.find(name, range)?.interface()?)
    }

    /// Registered versions of a block, ascending
    pub fn versions(&self, name: &str) -> Vec<Version> {
        let blocks = self.blocks.read();
        blocks
            .get(name)
            .map(|versions| versions.iter().map(|d| d.version().clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of every registered block, by name, with versions ascending
    pub fn all(&self) -> BTreeMap<String, Vec<Arc<BlockDefinition>>> {
        let blocks = self.blocks.read();
        blocks
            .iter()
            .map(|(name, versions)| (name.clone(), versions.clone()))
            .collect()
    }

    /// Get the number of registered definitions across all versions
    pub fn count(&self) -> usize {
        let blocks = self.blocks.read();
        blocks.values().map(Vec::len).sum()
    }

    /// Check if any version of a block is registered
    pub fn contains(&self, name: &str) -> bool {
        let blocks = self.blocks.read();
        blocks.contains_key(name)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry error types
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No block with the given name is registered
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// The block exists but no version satisfies the range
    #[error("No version of block '{name}' matches '{range}'")]
    NoMatchingVersion { name: String, range: String },

    /// The version range could not be parsed
    #[error("Invalid version range '{range}': {message}")]
    InvalidRange { range: String, message: String },

    /// Attempted to register the same name and version twice
    #[error("Duplicate block: {name}@{version}")]
    DuplicateBlock { name: String, version: String },

    /// The definition does not compile
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}
