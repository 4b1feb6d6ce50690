//! Gray-level histogram with optional region-of-interest masking.

use crate::error::{EngineError, Result};
use crate::operation::{CheckContext, Operation, ProcessContext, StepResult};
use crate::processor::State;
use crate::properties::{self, PropertyEntry, PropertyKind, PropertySpec, PropertyValue};
use crate::socket::SocketSpec;
use crate::variant::{TypeSet, VariantKind};
use image::GrayImage;

/// Computes a gray-level histogram for each incoming image and emits it as a
/// float vector of `levels` bins.
///
/// The `roi` input is optional: when connected, it receives a mask image of
/// the same dimensions in the same synchronization group, and only pixels
/// with a non-zero mask value are counted. With `accumulate` set the bins
/// carry over from frame to frame; the accumulator is released when the
/// operation stops.
pub struct Histogram {
    levels: i64,
    normalized: bool,
    accumulate: bool,
    bins: Vec<f64>,
}

static PROPERTIES: &[PropertyEntry<Histogram>] = &[
    PropertyEntry {
        name: "levels",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.levels),
        set: |op, v| match v.as_int() {
            Some(i) if (2..=256).contains(&i) => {
                op.levels = i;
                true
            }
            _ => false,
        },
    },
    PropertyEntry {
        name: "normalized",
        kind: PropertyKind::Bool,
        get: |op| PropertyValue::Bool(op.normalized),
        set: |op, v| match v.as_bool() {
            Some(b) => {
                op.normalized = b;
                true
            }
            None => false,
        },
    },
    PropertyEntry {
        name: "accumulate",
        kind: PropertyKind::Bool,
        get: |op| PropertyValue::Bool(op.accumulate),
        set: |op, v| match v.as_bool() {
            Some(b) => {
                op.accumulate = b;
                true
            }
            None => false,
        },
    },
];

impl Histogram {
    pub fn new() -> Self {
        Self {
            levels: 256,
            normalized: false,
            accumulate: false,
            bins: Vec::new(),
        }
    }

    /// Counts `image` into `self.bins`, honoring an optional mask.
    fn accumulate_image(&mut self, image: &GrayImage, roi: Option<&GrayImage>) -> Result<()> {
        if let Some(mask) = roi {
            if mask.dimensions() != image.dimensions() {
                return Err(EngineError::execution(
                    "histogram",
                    format!(
                        "roi dimensions {:?} do not match image dimensions {:?}",
                        mask.dimensions(),
                        image.dimensions()
                    ),
                ));
            }
        }
        let levels = self.levels as usize;
        if !self.accumulate || self.bins.len() != levels {
            self.bins = vec![0.0; levels];
        }
        let scale = levels as f64 / 256.0;
        for (i, pixel) in image.pixels().enumerate() {
            if let Some(mask) = roi {
                let x = (i as u32) % image.width();
                let y = (i as u32) / image.width();
                if mask.get_pixel(x, y).0[0] == 0 {
                    continue;
                }
            }
            let bin = (f64::from(pixel.0[0]) * scale) as usize;
            self.bins[bin.min(levels - 1)] += 1.0;
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<f64> {
        if self.normalized {
            let total: f64 = self.bins.iter().sum();
            if total > 0.0 {
                return self.bins.iter().map(|b| b / total).collect();
            }
        }
        self.bins.clone()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for Histogram {
    fn name(&self) -> &str {
        "histogram"
    }

    fn input_specs(&self) -> &[SocketSpec] {
        static INPUTS: &[SocketSpec] = &[
            SocketSpec::input("image", TypeSet::IMAGE),
            SocketSpec::input("roi", TypeSet::IMAGE).optional(),
        ];
        INPUTS
    }

    fn output_specs(&self) -> &[SocketSpec] {
        static OUTPUTS: &[SocketSpec] =
            &[SocketSpec::output("histogram", TypeSet::FLOAT_VECTOR)];
        OUTPUTS
    }

    fn check(&mut self, ctx: &CheckContext) -> Result<()> {
        if ctx.reset() {
            self.bins.clear();
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        let v = ctx
            .take_input(0)
            .ok_or_else(|| EngineError::execution("histogram", "no object on image input"))?;
        if v.kind() != VariantKind::Image {
            return Err(EngineError::unsupported("histogram", v.kind()));
        }
        let roi_v = ctx.take_input(1);
        let roi = match roi_v.as_ref() {
            Some(m) => Some(m.as_image()?),
            None => None,
        };
        self.accumulate_image(v.as_image()?, roi)?;
        ctx.emit(0, self.snapshot())?;
        Ok(StepResult::Continue)
    }

    fn about_to_change_state(&mut self, next: State) {
        if next == State::Stopped {
            self.bins = Vec::new();
        }
    }

    fn properties(&self) -> Vec<PropertySpec> {
        properties::specs(PROPERTIES)
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        properties::get(PROPERTIES, self, name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        properties::set(PROPERTIES, self, "histogram", name, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    #[test]
    fn test_all_pixels_land_in_one_bin() {
        let mut op = Histogram::new();
        op.accumulate_image(&uniform(4, 4, 0), None).unwrap();
        assert_eq!(op.bins[0], 16.0);
        assert_eq!(op.bins.iter().sum::<f64>(), 16.0);
    }

    #[test]
    fn test_roi_masks_pixels_out() {
        let mut op = Histogram::new();
        let image = uniform(2, 2, 10);
        let mut mask = uniform(2, 2, 255);
        mask.put_pixel(0, 0, image::Luma([0]));
        op.accumulate_image(&image, Some(&mask)).unwrap();
        assert_eq!(op.bins.iter().sum::<f64>(), 3.0);
    }

    #[test]
    fn test_roi_dimension_mismatch_fails() {
        let mut op = Histogram::new();
        let err = op
            .accumulate_image(&uniform(2, 2, 0), Some(&uniform(3, 3, 255)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Execution { .. }));
    }

    #[test]
    fn test_normalized_snapshot_sums_to_one() {
        let mut op = Histogram::new();
        op.normalized = true;
        op.accumulate_image(&uniform(4, 4, 128), None).unwrap();
        let snapshot = op.snapshot();
        assert!((snapshot.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_accumulator_released_on_stop() {
        let mut op = Histogram::new();
        op.accumulate = true;
        op.accumulate_image(&uniform(2, 2, 0), None).unwrap();
        op.accumulate_image(&uniform(2, 2, 0), None).unwrap();
        assert_eq!(op.bins[0], 8.0);
        op.about_to_change_state(State::Stopped);
        assert!(op.bins.is_empty());
    }

    #[test]
    fn test_levels_bounds() {
        let mut op = Histogram::new();
        assert!(op.set_property("levels", PropertyValue::Int(1)).is_err());
        assert!(op.set_property("levels", PropertyValue::Int(64)).is_ok());
        op.accumulate_image(&uniform(1, 1, 255), None).unwrap();
        assert_eq!(op.bins.len(), 64);
        assert_eq!(op.bins[63], 1.0);
    }
}
