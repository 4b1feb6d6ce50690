//! Pass-through probe for inspecting a stream in place.

use crate::error::Result;
use crate::operation::{CheckContext, Operation, ProcessContext, StepResult};
use crate::properties::{self, PropertyEntry, PropertyKind, PropertySpec, PropertyValue};
use crate::socket::SocketSpec;
use crate::variant::{ControlTag, TypeSet, Variant};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// One observation mirrored into the tap channel, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Data(Variant),
    Control(ControlTag),
}

/// Forwards every object unchanged while counting it and logging a
/// one-character symbol per event (`.` for data, the tag symbol for control
/// tags). Splice it between any two operations to watch a stream without
/// disturbing it; the output may be left unconnected to use it as a sink.
///
/// Tests attach a tap channel with [`DebugOperation::tap`] and assert the
/// exact interleaving of data and control tags.
pub struct DebugOperation {
    count: u64,
    show_controls: bool,
    tap: Option<Sender<Observed>>,
}

static PROPERTIES: &[PropertyEntry<DebugOperation>] = &[
    PropertyEntry {
        name: "show_controls",
        kind: PropertyKind::Bool,
        get: |op| PropertyValue::Bool(op.show_controls),
        set: |op, v| match v.as_bool() {
            Some(b) => {
                op.show_controls = b;
                true
            }
            None => false,
        },
    },
    PropertyEntry {
        name: "count",
        kind: PropertyKind::Int,
        get: |op| PropertyValue::Int(op.count as i64),
        // Read-only counter.
        set: |_, _| false,
    },
];

impl DebugOperation {
    pub fn new() -> Self {
        Self {
            count: 0,
            show_controls: false,
            tap: None,
        }
    }

    /// Attaches a channel that mirrors every observed event.
    pub fn tap(&mut self) -> Receiver<Observed> {
        let (tx, rx) = unbounded();
        self.tap = Some(tx);
        rx
    }

    /// Objects observed since the last reset.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for DebugOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for DebugOperation {
    fn name(&self) -> &str {
        "debug"
    }

    fn input_specs(&self) -> &[SocketSpec] {
        static INPUTS: &[SocketSpec] = &[SocketSpec::input("input", TypeSet::ANY)];
        INPUTS
    }

    fn output_specs(&self) -> &[SocketSpec] {
        static OUTPUTS: &[SocketSpec] =
            &[SocketSpec::output("output", TypeSet::ANY).best_effort()];
        OUTPUTS
    }

    fn check(&mut self, ctx: &CheckContext) -> Result<()> {
        if ctx.reset() {
            self.count = 0;
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        if let Some(v) = ctx.take_input(0) {
            self.count += 1;
            tracing::debug!(symbol = ".", count = self.count, kind = ?v.kind(), "object");
            if let Some(tap) = &self.tap {
                let _ = tap.send(Observed::Data(v.clone()));
            }
            ctx.emit(0, v)?;
        }
        Ok(StepResult::Continue)
    }

    fn on_control(&mut self, tag: ControlTag) {
        if self.show_controls {
            tracing::debug!(symbol = %tag.symbol(), tag = ?tag, "control");
        }
        if let Some(tap) = &self.tap {
            let _ = tap.send(Observed::Control(tag));
        }
    }

    fn properties(&self) -> Vec<PropertySpec> {
        properties::specs(PROPERTIES)
    }

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        properties::get(PROPERTIES, self, name)
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        properties::set(PROPERTIES, self, "debug", name, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::OutputSlot;

    fn step(op: &mut DebugOperation, input: Variant) {
        let outputs = vec![OutputSlot::new(&op.output_specs()[0])];
        let mut ctx = ProcessContext::new("debug", 0, vec![Some(input)], &outputs);
        op.process(&mut ctx).unwrap();
    }

    #[test]
    fn test_counts_objects() {
        let mut op = DebugOperation::new();
        step(&mut op, Variant::from(1i64));
        step(&mut op, Variant::from(2i64));
        assert_eq!(op.count(), 2);
        assert_eq!(op.get_property("count"), Some(PropertyValue::Int(2)));
    }

    #[test]
    fn test_reset_clears_count() {
        let mut op = DebugOperation::new();
        step(&mut op, Variant::from(1i64));
        op.check(&CheckContext::new(true, &[true], &[false])).unwrap();
        assert_eq!(op.count(), 0);
    }

    #[test]
    fn test_tap_preserves_interleaving() {
        let mut op = DebugOperation::new();
        let rx = op.tap();
        step(&mut op, Variant::from(1i64));
        op.on_control(ControlTag::Pause);
        step(&mut op, Variant::from(2i64));
        assert_eq!(rx.try_recv().unwrap(), Observed::Data(Variant::Int(1)));
        assert_eq!(rx.try_recv().unwrap(), Observed::Control(ControlTag::Pause));
        assert_eq!(rx.try_recv().unwrap(), Observed::Data(Variant::Int(2)));
    }

    #[test]
    fn test_count_property_is_read_only() {
        let mut op = DebugOperation::new();
        assert!(op.set_property("count", PropertyValue::Int(5)).is_err());
    }
}
