//! Error types for the pipeline engine.
//!
//! This module defines the engine-wide error enum and a `Result` alias used
//! throughout the crate. Failures raised inside an operation's `process()`
//! abort only that step; the engine treats them as fatal to the running
//! graph and tears everything down in dependency order.

use crate::id::OperationId;
use crate::variant::VariantKind;
use thiserror::Error;

/// Main error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A Variant's discriminator has no handling path in an operation.
    #[error("operation '{operation}' does not support {kind:?} objects")]
    UnsupportedType {
        operation: String,
        kind: VariantKind,
    },

    /// A payload was accessed as the wrong type.
    #[error("type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: VariantKind,
        actual: VariantKind,
    },

    /// Emit was attempted on a required output with no listeners.
    #[error("output '{socket}' of operation '{operation}' is not connected")]
    NotConnected { operation: String, socket: String },

    /// Graph wiring or property validation failed at `check()`.
    #[error("configuration error in '{operation}': {message}")]
    Configuration { operation: String, message: String },

    /// An operation's `process()` reported a runtime failure.
    #[error("execution failure in '{operation}': {message}")]
    Execution { operation: String, message: String },

    /// The requested connection would make the graph cyclic.
    #[error("connection would create a cycle in the pipeline graph")]
    CycleDetected,

    /// A connection request that cannot be satisfied (bad endpoint, type sets
    /// with empty intersection, wiring attempted while running).
    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    /// An operation ID that does not address any operation in the graph.
    #[error("unknown operation {0}")]
    UnknownOperation(OperationId),

    /// A socket name that does not exist on the addressed operation.
    #[error("no socket named '{socket}' on operation '{operation}'")]
    UnknownSocket { operation: String, socket: String },

    /// A property name that does not exist on the addressed operation.
    #[error("no property named '{property}' on operation '{operation}'")]
    UnknownProperty {
        operation: String,
        property: String,
    },

    /// A lifecycle wait did not complete in time.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Property snapshot import/export failed.
    #[error("property serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Shortcut for the common "this operation cannot process that kind"
    /// failure inside dispatch switches.
    pub fn unsupported(operation: &str, kind: VariantKind) -> Self {
        EngineError::UnsupportedType {
            operation: operation.to_string(),
            kind,
        }
    }

    /// Shortcut for configuration failures raised from `check()`.
    pub fn config(operation: &str, message: impl Into<String>) -> Self {
        EngineError::Configuration {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Shortcut for runtime failures raised from `process()`.
    pub fn execution(operation: &str, message: impl Into<String>) -> Self {
        EngineError::Execution {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::NotConnected {
            operation: "threshold".into(),
            socket: "output".into(),
        };
        assert_eq!(
            err.to_string(),
            "output 'output' of operation 'threshold' is not connected"
        );
    }

    #[test]
    fn test_execution_shortcut() {
        let err = EngineError::execution("camera", "read failed");
        assert!(err.to_string().contains("camera"));
        assert!(err.to_string().contains("read failed"));
    }

    #[test]
    fn test_unsupported_shortcut() {
        let err = EngineError::unsupported("histogram", VariantKind::Bool);
        assert!(err.to_string().contains("Bool"));
    }
}
