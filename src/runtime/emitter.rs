//! Per-run message collector
//!
//! Each run owns one [`Emitter`]; nothing is shared between runs, so
//! concurrent instances never interleave their batches.

use serde_json::Value;

use crate::core::message::BlockMessage;
use crate::core::BlockPinRef;

#[derive(Debug, Default)]
pub struct Emitter {
    messages: Vec<BlockMessage>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message; empty messages are dropped
    pub fn emit(&mut self, message: BlockMessage) {
        if !message.is_empty() {
            self.messages.push(message);
        }
    }

    pub fn output(&mut self, source: BlockPinRef, value: Value, index: u64) {
        self.emit(BlockMessage::output(source, value, index));
    }

    pub fn state(&mut self, state: impl Into<String>, value: Value) {
        self.emit(BlockMessage::state(state, value));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[BlockMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<BlockMessage> {
        self.messages
    }
}
