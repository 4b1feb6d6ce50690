//! Operation configuration properties.
//!
//! Each operation type exposes a property-descriptor table: name, kind, and
//! get/set accessors enumerated at registration time rather than discovered
//! dynamically. Property values are serde-serializable so that a graph's
//! configuration can be handed to an external serialization collaborator and
//! restored round-trip. The engine never interprets property semantics.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// A typed configuration value readable/writable before `start()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::Str(_) => PropertyKind::Str,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// The declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    Str,
}

/// Name and kind of one property, as surfaced to configuration collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: PropertyKind,
}

/// One entry of a per-operation-type property table. The accessors are plain
/// function pointers so tables can live in statics.
pub struct PropertyEntry<O> {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub get: fn(&O) -> PropertyValue,
    /// Returns `false` when the given value has the wrong kind.
    pub set: fn(&mut O, &PropertyValue) -> bool,
}

impl<O> PropertyEntry<O> {
    pub fn spec(&self) -> PropertySpec {
        PropertySpec {
            name: self.name,
            kind: self.kind,
        }
    }
}

/// Enumerate the specs of a property table. Operations delegate their
/// `properties()` trait method here.
pub fn specs<O>(table: &[PropertyEntry<O>]) -> Vec<PropertySpec> {
    table.iter().map(PropertyEntry::spec).collect()
}

/// Read a property through its table entry.
pub fn get<O>(table: &[PropertyEntry<O>], op: &O, name: &str) -> Option<PropertyValue> {
    table.iter().find(|e| e.name == name).map(|e| (e.get)(op))
}

/// Write a property through its table entry, mapping lookup and kind failures
/// to the engine error vocabulary.
pub fn set<O>(
    table: &[PropertyEntry<O>],
    op: &mut O,
    op_name: &str,
    name: &str,
    value: &PropertyValue,
) -> Result<()> {
    let entry = table
        .iter()
        .find(|e| e.name == name)
        .ok_or_else(|| EngineError::UnknownProperty {
            operation: op_name.to_string(),
            property: name.to_string(),
        })?;
    if (entry.set)(op, value) {
        Ok(())
    } else {
        Err(EngineError::config(
            op_name,
            format!(
                "property '{}' expects {:?}, got {:?}",
                name,
                entry.kind,
                value.kind()
            ),
        ))
    }
}
