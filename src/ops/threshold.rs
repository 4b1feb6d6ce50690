//! Binary thresholding over images, matrices and scalars.

use crate::error::{EngineError, Result};
use crate::operation::{Operation, ProcessContext, StepResult};
use crate::properties::{self, PropertyEntry, PropertyKind, PropertySpec, PropertyValue};
use crate::socket::SocketSpec;
use crate::variant::TypeSet;

/// Compares every element of the incoming object against `threshold` and
/// emits the binarized result in the same shape: images stay images (0/255),
/// matrices stay matrices (0.0/1.0) and scalars become `Bool`. The Variant
/// kind is dispatched at runtime; kinds outside the accepted set fail the
/// step.
pub struct Threshold {
    threshold: f64,
    invert: bool,
}

static PROPERTIES: &[PropertyEntry<Threshold>] = &[
    PropertyEntry {
        name: "threshold",
        kind: PropertyKind::Float,
        get: |op| PropertyValue::Float(op.threshold),
        set: |op, v| match v.as_float() {
            Some(f) => {
                op.threshold = f;
                true
            }
            None => false,
        },
    },
    PropertyEntry {
        name: "invert",
        kind: PropertyKind::Bool,
        get: |op| PropertyValue::Bool(op.invert),
        set: |op, v| match v.as_bool() {
            Some(b) => {
                op.invert = b;
                true
            }
            None => false,
        },
    },
];

impl Threshold {
    pub fn new() -> Self {
        Self {
            threshold: 128.0,
            invert: false,
        }
    }

    fn binarize(&self, above: bool) -> bool {
        above != self.invert
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::new()
    }
}

const ACCEPTED: TypeSet = TypeSet::IMAGE
    .union(TypeSet::MATRIX)
    .union(TypeSet::NUMERIC);

impl Operation for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn input_specs(&self) -> &[SocketSpec] {
        static INPUTS: &[SocketSpec] = &[SocketSpec::input("input", ACCEPTED)];
        INPUTS
    }

    fn output_specs(&self) -> &[SocketSpec] {
        static OUTPUTS: &[SocketSpec] = &[SocketSpec::output(
            "output",
            TypeSet::IMAGE.union(TypeSet::MATRIX).union(TypeSet::BOOL),
        )];
        OUTPUTS
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        let mut v = ctx
            .take_input(0)
            .ok_or_else(|| EngineError::execution("threshold", "no object on input"))?;
        match v.kind() {
            crate::variant::VariantKind::Image => {
                let image = v.image_mut()?;
                for pixel in image.pixels_mut() {
                    let above = f64::from(pixel.0[0]) > self.threshold;
                    pixel.0[0] = if self.binarize(above) { 255 } else { 0 };
                }
                ctx.emit(0, v)?;
            }
            crate::variant::VariantKind::Matrix => {
                let matrix = v.matrix_mut()?;
                matrix.mapv_inplace(|x| {
                    if (x > self.threshold) != self.invert {
                        1.0
                    } else {
                        0.0
                    }
                });
                ctx.emit(0, v)?;
            }
            crate::variant::VariantKind::Int | crate::variant::VariantKind::Float => {
                let above = v.as_number()? > self.threshold;
                ctx.emit(0, self.binarize(above))?;
            }
            kind => return Err(EngineError::unsupported("threshold", kind)),
        }
        Ok(StepResult::Continue)
    }

    fn properties(&self) -> Vec<PropertySpec> {
        properties::specs(PROPERTIES)
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        properties::get(PROPERTIES, self, name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        properties::set(PROPERTIES, self, "threshold", name, &value)
    }
}
