//! The operation plugin contract.
//!
//! External operation implementations (image filters, feature extractors,
//! network senders, camera drivers) plug into the engine purely through the
//! [`Operation`] trait: declare sockets, implement `process()` assuming
//! flow-controller-guaranteed readiness, validate configuration in
//! `check()`, and optionally react to state transitions to release or
//! reallocate per-run resources.

use crate::error::{EngineError, Result};
use crate::processor::State;
use crate::properties::{PropertySpec, PropertyValue};
use crate::socket::{OutputSlot, SocketSpec};
use crate::variant::{ControlTag, Variant};

/// Whether the operation wants to keep running after this step.
///
/// Sources report `Finished` once their configured stream is exhausted; the
/// processor then emits `EndOfStream` and `Stop` tags downstream and settles
/// the operation at `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Finished,
}

/// Context handed to `check()`: the reset flag plus the connection state of
/// every declared socket at validation time.
pub struct CheckContext<'a> {
    reset: bool,
    connected_inputs: &'a [bool],
    connected_outputs: &'a [bool],
}

impl<'a> CheckContext<'a> {
    pub(crate) fn new(
        reset: bool,
        connected_inputs: &'a [bool],
        connected_outputs: &'a [bool],
    ) -> Self {
        Self {
            reset,
            connected_inputs,
            connected_outputs,
        }
    }

    /// True when per-run state (counters, accumulators) should be cleared.
    pub fn reset(&self) -> bool {
        self.reset
    }

    pub fn input_connected(&self, index: usize) -> bool {
        self.connected_inputs.get(index).copied().unwrap_or(false)
    }

    pub fn output_connected(&self, index: usize) -> bool {
        self.connected_outputs.get(index).copied().unwrap_or(false)
    }
}

/// Context for one processing step: the input set selected by the flow
/// controller and the operation's output sockets.
pub struct ProcessContext<'a> {
    op_name: &'a str,
    group: u32,
    items: Vec<Option<Variant>>,
    outputs: &'a [OutputSlot],
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        op_name: &'a str,
        group: u32,
        items: Vec<Option<Variant>>,
        outputs: &'a [OutputSlot],
    ) -> Self {
        Self {
            op_name,
            group,
            items,
            outputs,
        }
    }

    /// The synchronization group this step fired for.
    pub fn group(&self) -> u32 {
        self.group
    }

    /// The Variant consumed from input `index`, or `None` when the socket is
    /// outside the active group or an absent optional value.
    pub fn input(&self, index: usize) -> Option<&Variant> {
        self.items.get(index).and_then(Option::as_ref)
    }

    /// Takes ownership of the Variant at input `index`, avoiding a clone
    /// when the payload is forwarded or transformed in place.
    pub fn take_input(&mut self, index: usize) -> Option<Variant> {
        self.items.get_mut(index).and_then(Option::take)
    }

    /// Like [`Self::input`], but failing with `Execution` when the value is
    /// absent. For non-optional sockets of the active group this never fails.
    pub fn require_input(&self, index: usize) -> Result<&Variant> {
        self.input(index).ok_or_else(|| {
            EngineError::execution(self.op_name, format!("no object on input {index}"))
        })
    }

    pub fn output_connected(&self, index: usize) -> bool {
        self.outputs.get(index).is_some_and(OutputSlot::is_connected)
    }

    /// Emits a Variant on output `index`, delivering to every connected
    /// downstream input in fan-out order before returning.
    pub fn emit(&mut self, index: usize, v: impl Into<Variant>) -> Result<()> {
        let output = self.outputs.get(index).ok_or_else(|| {
            EngineError::UnknownSocket {
                operation: self.op_name.to_string(),
                socket: format!("output #{index}"),
            }
        })?;
        output.emit(self.op_name, &v.into())
    }
}

/// A graph node wrapping one processing step over typed input Variants.
///
/// Implementations must be `Send`: threaded operations execute on a dedicated
/// worker thread, inline operations on whichever thread produced their input.
pub trait Operation: Send {
    /// Human-readable instance name, surfaced in errors and logs.
    fn name(&self) -> &str;

    /// Input socket declarations. Fixed for the lifetime of the operation.
    fn input_specs(&self) -> &[SocketSpec];

    /// Output socket declarations.
    fn output_specs(&self) -> &[SocketSpec];

    /// Validates configuration against current socket connections. Called
    /// before `start()`; `ctx.reset()` requests clearing per-run state.
    fn check(&mut self, _ctx: &CheckContext) -> Result<()> {
        Ok(())
    }

    /// Executes one processing step. The flow controller guarantees that
    /// every connected, non-optional input of the active group has a value.
    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult>;

    /// Invoked just before the operation settles into `next`, while no step
    /// is in flight. Typical use: release accumulators when entering
    /// `Stopped`.
    fn about_to_change_state(&mut self, _next: State) {}

    /// Invoked when the flow controller consumes a control tag on this
    /// operation's inputs, before the tag is forwarded downstream.
    fn on_control(&mut self, _tag: ControlTag) {}

    /// The property set exposed to configuration collaborators.
    fn properties(&self) -> Vec<PropertySpec> {
        Vec::new()
    }

    fn get_property(&self, _name: &str) -> Option<PropertyValue> {
        None
    }

    fn set_property(&mut self, name: &str, _value: PropertyValue) -> Result<()> {
        Err(EngineError::UnknownProperty {
            operation: self.name().to_string(),
            property: name.to_string(),
        })
    }
}
