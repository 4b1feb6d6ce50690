//! Arithmetic integer sequence producer.

use crate::error::Result;
use crate::operation::{CheckContext, Operation, ProcessContext, StepResult};
use crate::processor::State;
use crate::properties::{self, PropertyEntry, PropertyKind, PropertySpec, PropertyValue};
use crate::socket::SocketSpec;
use crate::variant::{ControlTag, TypeSet, Variant};
use std::time::Duration;

/// Emits `count` integers starting at `start`, advancing by `step`, then
/// finishes its stream. With `interval_ms` set the worker sleeps between
/// emissions, throttling the whole downstream graph.
///
/// A `count` of zero means unbounded; the sequence then runs until the graph
/// is stopped.
pub struct SequenceGenerator {
    start: i64,
    step: i64,
    count: i64,
    interval_ms: i64,
    next: i64,
    emitted: i64,
    stream_open: bool,
}

static PROPERTIES: &[PropertyEntry<SequenceGenerator>] = &[
    PropertyEntry {
        name: "start",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.start),
        set: |op, v| match v.as_int() {
            Some(i) => {
                op.start = i;
                true
            }
            None => false,
        },
    },
    PropertyEntry {
        name: "step",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.step),
        set: |op, v| match v.as_int() {
            Some(i) => {
                op.step = i;
                true
            }
            None => false,
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

impl SequenceGenerator {
    pub fn new() -> Self {
        Self {
            start: 0,
            step: 1,
            count: 0,
            interval_ms: 0,
            next: 0,
            emitted: 0,
            stream_open: false,
        }
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for SequenceGenerator {
    fn name(&self) -> &str {
        "sequence_generator"
    }

    fn input_specs(&self) -> &[SocketSpec] {
        &[]
    }

    fn output_specs(&self) -> &[SocketSpec] {
        static OUTPUTS: &[SocketSpec] = &[SocketSpec::output("output", TypeSet::INT)];
        OUTPUTS
    }

    fn check(&mut self, ctx: &CheckContext) -> Result<()> {
        if ctx.reset() {
            self.next = self.start;
            self.emitted = 0;
            self.stream_open = false;
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        if !self.stream_open {
            ctx.emit(0, Variant::Control(ControlTag::StartOfStream))?;
            self.stream_open = true;
        }
        if self.count > 0 && self.emitted >= self.count {
            self.stream_open = false;
            return Ok(StepResult::Finished);
        }
        ctx.emit(0, self.next)?;
        self.next += self.step;
        self.emitted += 1;
        if self.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.interval_ms as u64));
        }
        Ok(StepResult::Continue)
    }

    fn about_to_change_state(&mut self, next: State) {
        if next == State::Stopped {
            self.next = self.start;
            self.emitted = 0;
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
        properties::set(PROPERTIES, self, "sequence_generator", name, &value)
    }
}
