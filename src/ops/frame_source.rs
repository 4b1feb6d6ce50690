//! Synthetic grayscale frame producer.

use crate::error::Result;
use crate::operation::{CheckContext, Operation, ProcessContext, StepResult};
use crate::processor::State;
use crate::properties::{self, PropertyEntry, PropertyKind, PropertySpec, PropertyValue};
use crate::socket::SocketSpec;
use crate::variant::{ControlTag, TypeSet, Variant};
use image::GrayImage;
use std::time::Duration;

/// Produces `count` synthetic grayscale frames for testing image pipelines
/// without camera hardware. Each frame is a diagonal gradient phase-shifted
/// by the frame index, so consecutive frames differ at every pixel.
pub struct FrameSource {
    width: i64,
    height: i64,
    count: i64,
    interval_ms: i64,
    frame_index: i64,
    stream_open: bool,
}

static PROPERTIES: &[PropertyEntry<FrameSource>] = &[
    PropertyEntry {
        name: "width",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.width),
        set: |op, v| match v.as_int() {
            Some(i) if i > 0 => {
                op.width = i;
                true
            }
            _ => false,
        },
    },
    PropertyEntry {
        name: "height",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.height),
        set: |op, v| match v.as_int() {
            Some(i) if i > 0 => {
                op.height = i;
                true
            }
            _ => false,
        },
    },
    PropertyEntry {
        name: "count",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.count),
        set: |op, v| match v.as_int() {
            Some(i) if i >= 0 => {
                op.count = i;
                true
            }
            _ => false,
        },
    },
    PropertyEntry {
        name: "interval_ms",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.interval_ms),
        set: |op, v| match v.as_int() {
            Some(i) if i >= 0 => {
                op.interval_ms = i;
                true
            }
            _ => false,
        },
    },
];

impl FrameSource {
    pub fn new() -> Self {
        Self {
            width: 64,
            height: 64,
            count: 0,
            interval_ms: 0,
            frame_index: 0,
            stream_open: false,
        }
    }

    fn render_frame(&self) -> GrayImage {
        let phase = self.frame_index as u32;
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            image::Luma([((x + y + phase) % 256) as u8])
        })
    }
}

impl Default for FrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for FrameSource {
    fn name(&self) -> &str {
        "frame_source"
    }

    fn input_specs(&self) -> &[SocketSpec] {
        &[]
    }

    fn output_specs(&self) -> &[SocketSpec] {
        static OUTPUTS: &[SocketSpec] = &[SocketSpec::output("image", TypeSet::IMAGE)];
        OUTPUTS
    }

    fn check(&mut self, ctx: &CheckContext) -> Result<()> {
        if ctx.reset() {
            self.frame_index = 0;
            self.stream_open = false;
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        if !self.stream_open {
            ctx.emit(0, Variant::Control(ControlTag::StartOfStream))?;
            self.stream_open = true;
        }
        if self.count > 0 && self.frame_index >= self.count {
            self.stream_open = false;
            return Ok(StepResult::Finished);
        }
        ctx.emit(0, self.render_frame())?;
        self.frame_index += 1;
        if self.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.interval_ms as u64));
        }
        Ok(StepResult::Continue)
    }

    fn about_to_change_state(&mut self, next: State) {
        if next == State::Stopped {
            self.frame_index = 0;
            self.stream_open = false;
        }
    }

    fn properties(&self) -> Vec<PropertySpec> {
        properties::specs(PROPERTIES)
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        properties::get(PROPERTIES, self, name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        properties::set(PROPERTIES, self, "frame_source", name, &value)
    }
}
