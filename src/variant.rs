//! Runtime-typed value container flowing on every socket.
//!
//! A [`Variant`] carries either application data (numbers, strings, vectors,
//! matrices, image frames) or a control tag delimiting the data stream.
//! Both categories share the same channel so downstream operations observe
//! control boundaries in correct relative order without a side channel.
//!
//! Bulk payloads (vectors, matrices, images) are held behind `Arc` so that
//! fan-out delivery clones cheaply; mutation goes through `Arc::make_mut`,
//! giving copy-on-write semantics.

use crate::error::{EngineError, Result};
use image::GrayImage;
use ndarray::Array2;
use std::sync::Arc;

/// Control tags interleaved with data on a socket.
///
/// A control Variant carries nothing beyond its tag. `StartOfStream` and
/// `EndOfStream` delimit runs of data; `Pause`, `Resume` and `Stop` drive the
/// receiving operation's state machine before being forwarded downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTag {
    StartOfStream,
    EndOfStream,
    Pause,
    Resume,
    Stop,
}

impl ControlTag {
    /// One-character symbol used by the debug operation's trace output.
    pub fn symbol(self) -> char {
        match self {
            ControlTag::StartOfStream => '<',
            ControlTag::EndOfStream => '>',
            ControlTag::Pause => 'P',
            ControlTag::Resume => 'R',
            ControlTag::Stop => 'S',
        }
    }
}

/// Discriminator over the closed registry of payload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VariantKind {
    Invalid = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Str = 4,
    FloatVector = 5,
    Matrix = 6,
    Image = 7,
    Control = 8,
}

/// A set of [`VariantKind`]s, used by socket declarations to state which
/// payload kinds a socket accepts or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSet(u16);

impl TypeSet {
    pub const EMPTY: TypeSet = TypeSet(0);

    pub const BOOL: TypeSet = TypeSet::of(VariantKind::Bool);
    pub const INT: TypeSet = TypeSet::of(VariantKind::Int);
    pub const FLOAT: TypeSet = TypeSet::of(VariantKind::Float);
    pub const STR: TypeSet = TypeSet::of(VariantKind::Str);
    pub const FLOAT_VECTOR: TypeSet = TypeSet::of(VariantKind::FloatVector);
    pub const MATRIX: TypeSet = TypeSet::of(VariantKind::Matrix);
    pub const IMAGE: TypeSet = TypeSet::of(VariantKind::Image);

    /// Int or Float.
    pub const NUMERIC: TypeSet = TypeSet::INT.union(TypeSet::FLOAT);
    /// Every data kind.
    pub const ANY: TypeSet = TypeSet::BOOL
        .union(TypeSet::NUMERIC)
        .union(TypeSet::STR)
        .union(TypeSet::FLOAT_VECTOR)
        .union(TypeSet::MATRIX)
        .union(TypeSet::IMAGE);

    pub const fn of(kind: VariantKind) -> TypeSet {
        TypeSet(1 << kind as u16)
    }

    pub const fn union(self, other: TypeSet) -> TypeSet {
        TypeSet(self.0 | other.0)
    }

    pub const fn contains(self, kind: VariantKind) -> bool {
        self.0 & (1 << kind as u16) != 0
    }

    pub const fn intersects(self, other: TypeSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A runtime-typed value or control tag flowing on a socket.
///
/// Default-constructs to the `Invalid` sentinel. Typed access via the `as_*`
/// accessors fails with [`EngineError::TypeMismatch`] when the discriminator
/// does not match; dispatch over [`Variant::kind`] is how an operation with
/// heterogeneous input types selects a processing path.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    #[default]
    Invalid,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    FloatVector(Arc<Vec<f64>>),
    Matrix(Arc<Array2<f64>>),
    Image(Arc<GrayImage>),
    Control(ControlTag),
}

impl Variant {
    /// The discriminator of this value.
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Invalid => VariantKind::Invalid,
            Variant::Bool(_) => VariantKind::Bool,
            Variant::Int(_) => VariantKind::Int,
            Variant::Float(_) => VariantKind::Float,
            Variant::Str(_) => VariantKind::Str,
            Variant::FloatVector(_) => VariantKind::FloatVector,
            Variant::Matrix(_) => VariantKind::Matrix,
            Variant::Image(_) => VariantKind::Image,
            Variant::Control(_) => VariantKind::Control,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Variant::Invalid)
    }

    /// Whether this is a control Variant. Usable by any downstream logic
    /// without inspecting payloads.
    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(self, Variant::Control(_))
    }

    /// The control tag, if this is a control Variant.
    #[inline]
    pub fn control(&self) -> Option<ControlTag> {
        match self {
            Variant::Control(tag) => Some(*tag),
            _ => None,
        }
    }

    fn mismatch(&self, expected: VariantKind) -> EngineError {
        EngineError::TypeMismatch {
            expected,
            actual: self.kind(),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Variant::Bool(v) => Ok(*v),
            _ => Err(self.mismatch(VariantKind::Bool)),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Variant::Int(v) => Ok(*v),
            _ => Err(self.mismatch(VariantKind::Int)),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Variant::Float(v) => Ok(*v),
            _ => Err(self.mismatch(VariantKind::Float)),
        }
    }

    /// Numeric coercion: accepts Int or Float. Used by operations that
    /// process either without caring which.
    pub fn as_number(&self) -> Result<f64> {
        match self {
            Variant::Int(v) => Ok(*v as f64),
            Variant::Float(v) => Ok(*v),
            _ => Err(self.mismatch(VariantKind::Float)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Variant::Str(v) => Ok(v),
            _ => Err(self.mismatch(VariantKind::Str)),
        }
    }

    pub fn as_float_vector(&self) -> Result<&[f64]> {
        match self {
            Variant::FloatVector(v) => Ok(v),
            _ => Err(self.mismatch(VariantKind::FloatVector)),
        }
    }

    pub fn as_matrix(&self) -> Result<&Array2<f64>> {
        match self {
            Variant::Matrix(v) => Ok(v),
            _ => Err(self.mismatch(VariantKind::Matrix)),
        }
    }

    pub fn as_image(&self) -> Result<&GrayImage> {
        match self {
            Variant::Image(v) => Ok(v),
            _ => Err(self.mismatch(VariantKind::Image)),
        }
    }

    /// Mutable matrix access. Clones the payload first if it is shared
    /// (copy-on-write).
    pub fn matrix_mut(&mut self) -> Result<&mut Array2<f64>> {
        match self {
            Variant::Matrix(v) => Ok(Arc::make_mut(v)),
            _ => Err(self.mismatch(VariantKind::Matrix)),
        }
    }

    /// Mutable image access with the same copy-on-write behavior.
    pub fn image_mut(&mut self) -> Result<&mut GrayImage> {
        match self {
            Variant::Image(v) => Ok(Arc::make_mut(v)),
            _ => Err(self.mismatch(VariantKind::Image)),
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Invalid, Variant::Invalid) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a == b,
            (Variant::Str(a), Variant::Str(b)) => a == b,
            (Variant::FloatVector(a), Variant::FloatVector(b)) => a == b,
            (Variant::Matrix(a), Variant::Matrix(b)) => a == b,
            (Variant::Image(a), Variant::Image(b)) => {
                a.dimensions() == b.dimensions() && a.as_raw() == b.as_raw()
            }
            (Variant::Control(a), Variant::Control(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::Str(Arc::from(v))
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::Str(Arc::from(v.as_str()))
    }
}

impl From<Vec<f64>> for Variant {
    fn from(v: Vec<f64>) -> Self {
        Variant::FloatVector(Arc::new(v))
    }
}

impl From<Array2<f64>> for Variant {
    fn from(v: Array2<f64>) -> Self {
        Variant::Matrix(Arc::new(v))
    }
}

impl From<GrayImage> for Variant {
    fn from(v: GrayImage) -> Self {
        Variant::Image(Arc::new(v))
    }
}

impl From<ControlTag> for Variant {
    fn from(tag: ControlTag) -> Self {
        Variant::Control(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_invalid() {
        let v = Variant::default();
        assert!(!v.is_valid());
        assert_eq!(v.kind(), VariantKind::Invalid);
    }

    #[test]
    fn test_typed_access() {
        let v = Variant::from(42i64);
        assert_eq!(v.as_int().unwrap(), 42);
        assert_eq!(v.as_number().unwrap(), 42.0);
        assert!(matches!(
            v.as_float(),
            Err(EngineError::TypeMismatch {
                expected: VariantKind::Float,
                actual: VariantKind::Int,
            })
        ));
    }

    #[test]
    fn test_control_predicate() {
        let tag = Variant::from(ControlTag::Pause);
        assert!(tag.is_control());
        assert_eq!(tag.control(), Some(ControlTag::Pause));
        assert!(!Variant::from(1.0).is_control());
        assert_eq!(Variant::from(1.0).control(), None);
    }

    #[test]
    fn test_matrix_copy_on_write() {
        let shared = Arc::new(Array2::<f64>::zeros((2, 2)));
        let mut a = Variant::Matrix(shared.clone());
        let b = Variant::Matrix(shared);

        a.matrix_mut().unwrap()[(0, 0)] = 5.0;
        assert_eq!(a.as_matrix().unwrap()[(0, 0)], 5.0);
        // The sibling still sees the original payload.
        assert_eq!(b.as_matrix().unwrap()[(0, 0)], 0.0);
    }

    #[test]
    fn test_type_set() {
        assert!(TypeSet::NUMERIC.contains(VariantKind::Int));
        assert!(TypeSet::NUMERIC.contains(VariantKind::Float));
        assert!(!TypeSet::NUMERIC.contains(VariantKind::Image));
        assert!(TypeSet::ANY.intersects(TypeSet::MATRIX));
        assert!(!TypeSet::IMAGE.intersects(TypeSet::STR));
        assert!(TypeSet::EMPTY.is_empty());
    }

    #[test]
    fn test_control_symbols() {
        assert_eq!(ControlTag::StartOfStream.symbol(), '<');
        assert_eq!(ControlTag::Stop.symbol(), 'S');
    }

    #[test]
    fn test_image_equality() {
        let a = Variant::from(GrayImage::new(4, 4));
        let b = Variant::from(GrayImage::new(4, 4));
        let c = Variant::from(GrayImage::new(2, 2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
