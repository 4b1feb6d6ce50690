//! Socket endpoints connecting operations.
//!
//! An operation declares its sockets statically via [`SocketSpec`]. At graph
//! build time each declared input becomes an [`InputSlot`] (a FIFO queue
//! shared with upstream producers) and each output an [`OutputSlot`] (an
//! ordered fan-out list of downstream targets).
//!
//! Wiring is mutated only while the graph is stopped. While running, each
//! input queue is the only structure touched from multiple threads: producer
//! threads append, the owning operation's processor pops from the head.

use crate::error::{EngineError, Result};
use crate::processor::{self, NodeSignal, OperationNode};
use crate::variant::{ControlTag, TypeSet, Variant};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering from poisoning. A panicked processing step must
/// not wedge the rest of the graph; teardown still runs through `interrupt()`.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Static descriptor for one socket of an operation type.
///
/// Inputs carry an `optional` flag (the operation runs even if the socket is
/// never connected) and a synchronization `group` tag used by the flow
/// controller for joint readiness. Outputs carry a `required` flag: emitting
/// on a required output with zero listeners is an error, while best-effort
/// outputs silently drop.
#[derive(Debug, Clone)]
pub struct SocketSpec {
    pub name: &'static str,
    pub types: TypeSet,
    pub optional: bool,
    pub group: u32,
    pub required: bool,
}

impl SocketSpec {
    pub const fn input(name: &'static str, types: TypeSet) -> Self {
        Self {
            name,
            types,
            optional: false,
            group: 0,
            required: false,
        }
    }

    pub const fn output(name: &'static str, types: TypeSet) -> Self {
        Self {
            name,
            types,
            optional: false,
            group: 0,
            required: true,
        }
    }

    /// Marks an input as optional: readiness never waits on it.
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Assigns an input to a synchronization group (default 0).
    pub const fn group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    /// Marks an output as best-effort: emitting with no listeners is a no-op.
    pub const fn best_effort(mut self) -> Self {
        self.required = false;
        self
    }
}

/// What sits at the head of an input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Head {
    Empty,
    Data,
    Control(ControlTag),
}

/// Runtime core of one input socket: a FIFO of pending Variants shared
/// between upstream producers and the owning operation's processor.
pub(crate) struct InputSlot {
    name: String,
    optional: bool,
    types: TypeSet,
    queue: Mutex<VecDeque<Variant>>,
    connected: AtomicBool,
    signal: Arc<NodeSignal>,
}

impl InputSlot {
    pub fn new(spec: &SocketSpec, signal: Arc<NodeSignal>) -> Self {
        Self {
            name: spec.name.to_string(),
            optional: spec.optional,
            types: spec.types,
            queue: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
            signal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn optional(&self) -> bool {
        self.optional
    }

    pub fn types(&self) -> TypeSet {
        self.types
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Appends a Variant and wakes the owning operation's processor.
    pub fn push(&self, v: Variant) {
        lock(&self.queue).push_back(v);
        self.signal.notify_delivery();
    }

    /// Observable queue depth for backpressure decisions and tests.
    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn head(&self) -> Head {
        match lock(&self.queue).front() {
            None => Head::Empty,
            Some(v) => match v.control() {
                Some(tag) => Head::Control(tag),
                None => Head::Data,
            },
        }
    }

    /// Pops the head only if it is a data Variant. Consumption happens only
    /// under the owning operation's step lock, so head classification cannot
    /// be invalidated between `head()` and this call.
    pub fn pop_data(&self) -> Option<Variant> {
        let mut queue = lock(&self.queue);
        match queue.front() {
            Some(v) if !v.is_control() => queue.pop_front(),
            _ => None,
        }
    }

    /// Pops the head only if it is the given control tag.
    pub fn pop_control(&self, tag: ControlTag) -> bool {
        let mut queue = lock(&self.queue);
        match queue.front() {
            Some(v) if v.control() == Some(tag) => {
                queue.pop_front();
                true
            }
            _ => false,
        }
    }

    /// Discards all queued Variants (abnormal shutdown).
    pub fn clear(&self) {
        lock(&self.queue).clear();
    }
}

/// One fan-out target of an output socket.
pub(crate) struct Connection {
    pub input: Arc<InputSlot>,
    pub node: Arc<OperationNode>,
}

/// Runtime core of one output socket: an ordered fan-out list. Insertion
/// order is delivery order.
pub(crate) struct OutputSlot {
    name: String,
    types: TypeSet,
    required: bool,
    targets: Vec<Connection>,
}

impl OutputSlot {
    pub fn new(spec: &SocketSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            types: spec.types,
            required: spec.required,
            targets: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> TypeSet {
        self.types
    }

    pub fn is_connected(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn connect(&mut self, connection: Connection) {
        connection.input.set_connected(true);
        self.targets.push(connection);
    }

    /// Delivers `v` to every connected input in fan-out order. Returns once
    /// every target queue has accepted the Variant; downstream inline
    /// operations additionally execute synchronously in this thread before
    /// the call returns.
    pub fn emit(&self, op_name: &str, v: &Variant) -> Result<()> {
        if self.targets.is_empty() {
            if self.required {
                return Err(EngineError::NotConnected {
                    operation: op_name.to_string(),
                    socket: self.name.clone(),
                });
            }
            tracing::trace!(operation = op_name, socket = %self.name, "dropping emit on unconnected output");
            return Ok(());
        }
        for target in &self.targets {
            target.input.push(v.clone());
            processor::deliver(&target.node);
        }
        Ok(())
    }

    /// Forwards a control tag downstream. Unconnected outputs are skipped
    /// regardless of the `required` flag; control forwarding never fails.
    pub fn emit_control(&self, tag: ControlTag) {
        for target in &self.targets {
            target.input.push(Variant::Control(tag));
            processor::deliver(&target.node);
        }
    }
}
