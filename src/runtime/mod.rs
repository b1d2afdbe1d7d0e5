//! Block runtime
//!
//! Instantiates registered blocks, loads them with the data of one run, and
//! executes a single function per instance.

pub mod channel;
pub mod emitter;
pub mod instance;
pub mod ports;
pub mod scope;
pub mod tool;

use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::core::block::BlockDefinition;
use crate::core::error::RunError;
use crate::core::interface::BlockInterface;
use crate::core::message::{BlockMessage, BlockRunData};
use crate::core::registry::BlockRegistry;
use instance::{BlockInstance, LoadRequest};

/// Entry point for orchestrators: looks blocks up and runs them
pub struct BlockRuntime {
    registry: BlockRegistry,
    config: RuntimeConfig,
}

impl BlockRuntime {
    pub fn new(registry: BlockRegistry) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    pub fn with_config(registry: BlockRegistry, config: RuntimeConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Interface of the highest registered version matching `range`
    pub fn interface(&self, name: &str, range: &str) -> Result<Arc<BlockInterface>, RunError> {
        Ok(self.registry.interface(name, range)?)
    }

    /// A fresh instance of the highest registered version matching `range`
    pub fn instantiate(&self, name: &str, range: &str) -> Result<BlockInstance, RunError> {
        let definition: Arc<BlockDefinition> = self.registry.find(name, range)?;
        BlockInstance::new(definition, self.config.clone())
    }

    /// Look up, instantiate, load, and run one invocation
    pub async fn run(&self, data: BlockRunData) -> Result<Vec<BlockMessage>, RunError> {
        let mut instance = self.instantiate(&data.name, &data.version)?;
        instance.load(LoadRequest::from(&data))?;
        instance.run(&data.function).await
    }
}

impl Default for BlockRuntime {
    fn default() -> Self {
        Self::new(BlockRegistry::new())
    }
}
