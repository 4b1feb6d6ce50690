//! Factory for creating operations by type name.
//!
//! Embedding applications that build graphs from configuration files or user
//! input look operations up here instead of naming concrete types.

use crate::error::{EngineError, Result};
use crate::operation::Operation;
use crate::ops;
use std::collections::BTreeMap;

type Factory = fn() -> Box<dyn Operation>;

/// Name-keyed factory table for operation types.
pub struct OperationRegistry {
    factories: BTreeMap<&'static str, Factory>,
}

impl OperationRegistry {
    /// An empty registry. Most callers want [`Self::with_builtins`].
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry pre-populated with every built-in operation type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sequence_generator", || {
            Box::new(ops::SequenceGenerator::new())
        });
        registry.register("frame_source", || Box::new(ops::FrameSource::new()));
        registry.register("threshold", || Box::new(ops::Threshold::new()));
        registry.register("histogram", || Box::new(ops::Histogram::new()));
        registry.register("arithmetic", || Box::new(ops::Arithmetic::new()));
        registry.register("debug", || Box::new(ops::DebugOperation::new()));
        registry
    }

    /// Registers (or replaces) a factory under a type name.
    pub fn register(&mut self, name: &'static str, factory: Factory) {
        self.factories.insert(name, factory);
    }

    /// Instantiates an operation by type name.
    pub fn create(&self, name: &str) -> Result<Box<dyn Operation>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::config(name, "no such operation type"))
    }

    /// Registered type names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
