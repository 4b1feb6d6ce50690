//! Execution strategies and the operation state machine.
//!
//! Every operation in a running graph is wrapped in an [`OperationNode`],
//! which owns the operation object, its flow controller, its socket slots and
//! its run state. Two strategies exist, selected by the declared thread
//! count:
//!
//! - **Inline** (0 threads): a delivery into any input socket immediately
//!   runs ready steps in the delivering thread, many call frames deep inside
//!   the original producer. Minimal overhead; `process()` must not block.
//! - **Threaded** (1 thread): a dedicated worker blocks on the node's signal
//!   until the flow controller reports readiness, runs the step, and loops.
//!   Deliveries from other threads only enqueue and wake the worker.
//!
//! Operations with no declared inputs are sources: their worker calls
//! `process()` repeatedly while `Running` instead of waiting on queues.

use crate::engine::EngineEvent;
use crate::error::{EngineError, Result};
use crate::flow::{FlowController, FlowState};
use crate::id::OperationId;
use crate::operation::{Operation, ProcessContext, StepResult};
use crate::socket::{self, Connection, InputSlot, OutputSlot};
use crate::variant::ControlTag;
use crossbeam_channel::Sender;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;

/// Run state of one operation.
///
/// `Pausing`/`Resuming`/`Stopping` are draining states: the operation keeps
/// processing queued data until the corresponding control tag arrives from
/// upstream, then settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Stopped,
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
}

impl State {
    /// Whether queued data may be consumed in this state.
    pub fn processes_data(self) -> bool {
        matches!(
            self,
            State::Running | State::Pausing | State::Resuming | State::Stopping
        )
    }

    pub fn display_name(self) -> &'static str {
        match self {
            State::Stopped => "Stopped",
            State::Starting => "Starting",
            State::Running => "Running",
            State::Pausing => "Pausing",
            State::Paused => "Paused",
            State::Resuming => "Resuming",
            State::Stopping => "Stopping",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

struct SignalState {
    state: State,
    /// Bumped on every delivery and state change; lets waiters detect
    /// activity that happened while they were not holding the lock.
    generation: u64,
}

/// Combined state cell and wakeup channel for one operation node. Producers
/// notify it on every enqueue; `interrupt()` notifies it so no worker stays
/// blocked on a queue.
pub(crate) struct NodeSignal {
    inner: Mutex<SignalState>,
    cond: Condvar,
}

impl NodeSignal {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SignalState {
                state: State::Stopped,
                generation: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn state(&self) -> State {
        socket::lock(&self.inner).state
    }

    pub fn snapshot(&self) -> (State, u64) {
        let guard = socket::lock(&self.inner);
        (guard.state, guard.generation)
    }

    pub fn set_state(&self, state: State) {
        let mut guard = socket::lock(&self.inner);
        guard.state = state;
        guard.generation += 1;
        self.cond.notify_all();
    }

    /// Atomically moves to `to` if the current state is one of `from`.
    pub fn transition(&self, from: &[State], to: State) -> bool {
        let mut guard = socket::lock(&self.inner);
        if from.contains(&guard.state) {
            guard.state = to;
            guard.generation += 1;
            self.cond.notify_all();
            true
        } else {
            false
        }
    }

    pub fn notify_delivery(&self) {
        let mut guard = socket::lock(&self.inner);
        guard.generation += 1;
        self.cond.notify_all();
    }

    /// Blocks until the state differs from `last_state` or any delivery or
    /// transition has happened since `last_gen` was observed.
    pub fn wait_change(&self, last_state: State, last_gen: u64) {
        let mut guard = socket::lock(&self.inner);
        while guard.state == last_state && guard.generation == last_gen {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the node reaches `target`, or `deadline` passes.
    pub fn wait_for_state(&self, target: State, deadline: Instant) -> bool {
        let mut guard = socket::lock(&self.inner);
        while guard.state != target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (g, _timed_out) = self
                .cond
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = g;
        }
        true
    }
}

struct NodeCore {
    op: Box<dyn Operation>,
    flow: FlowController,
}

/// Outcome of one scheduling decision.
enum StepOutcome {
    /// Nothing to do; wait for the next delivery.
    Idle,
    /// A step or control tag was handled; look again.
    Progress,
    /// The operation finished or failed and has left the processing states.
    Halted,
}

/// Runtime wrapper around one operation: sockets, flow controller, state and
/// (for threaded operations) the worker thread.
pub(crate) struct OperationNode {
    pub id: OperationId,
    pub name: String,
    pub threads: usize,
    core: Mutex<NodeCore>,
    inputs: Vec<Arc<InputSlot>>,
    outputs: RwLock<Vec<OutputSlot>>,
    signal: Arc<NodeSignal>,
    events: Sender<EngineEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn read_outputs(outputs: &RwLock<Vec<OutputSlot>>) -> std::sync::RwLockReadGuard<'_, Vec<OutputSlot>> {
    outputs.read().unwrap_or_else(PoisonError::into_inner)
}

impl OperationNode {
    pub fn new(
        id: OperationId,
        name: String,
        op: Box<dyn Operation>,
        threads: usize,
        events: Sender<EngineEvent>,
    ) -> Arc<Self> {
        let signal = Arc::new(NodeSignal::new());
        let inputs = op
            .input_specs()
            .iter()
            .map(|spec| Arc::new(InputSlot::new(spec, signal.clone())))
            .collect();
        let outputs = op.output_specs().iter().map(OutputSlot::new).collect();
        let flow = FlowController::new(op.input_specs());
        Arc::new(Self {
            id,
            name,
            threads,
            core: Mutex::new(NodeCore { op, flow }),
            inputs,
            outputs: RwLock::new(outputs),
            signal,
            events,
            worker: Mutex::new(None),
        })
    }

    // ── Introspection (engine wiring & validation) ──

    pub fn state(&self) -> State {
        self.signal.state()
    }

    pub fn signal(&self) -> &Arc<NodeSignal> {
        &self.signal
    }

    pub fn inputs(&self) -> &[Arc<InputSlot>] {
        &self.inputs
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i.name() == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        read_outputs(&self.outputs).iter().position(|o| o.name() == name)
    }

    pub fn output_count(&self) -> usize {
        read_outputs(&self.outputs).len()
    }

    pub fn output_types(&self, index: usize) -> Option<crate::variant::TypeSet> {
        read_outputs(&self.outputs).get(index).map(OutputSlot::types)
    }

    pub fn output_connected(&self, index: usize) -> bool {
        read_outputs(&self.outputs)
            .get(index)
            .is_some_and(OutputSlot::is_connected)
    }

    pub fn connected_input_count(&self) -> usize {
        self.inputs.iter().filter(|i| i.is_connected()).count()
    }

    /// Source operations produce data with no input; their worker drives
    /// `process()` directly instead of waiting on queues.
    pub fn is_producer(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Wires one fan-out target onto an output. Only called while the graph
    /// is stopped.
    pub fn connect_output(&self, index: usize, connection: Connection) {
        let mut outputs = self.outputs.write().unwrap_or_else(PoisonError::into_inner);
        outputs[index].connect(connection);
    }

    /// Runs a closure against the operation object under the step lock.
    pub fn with_op<R>(&self, f: impl FnOnce(&mut dyn Operation) -> R) -> R {
        let mut core = socket::lock(&self.core);
        f(core.op.as_mut())
    }

    // ── Lifecycle (engine-driven) ──

    pub fn start(self: &Arc<Self>) -> Result<()> {
        if !self.signal.transition(&[State::Stopped], State::Starting) {
            return Err(EngineError::execution(
                &self.name,
                format!("cannot start from state {}", self.signal.state()),
            ));
        }
        self.with_op(|op| op.about_to_change_state(State::Running));
        if self.threads > 0 {
            self.spawn_worker()?;
        }
        self.signal.set_state(State::Running);
        tracing::debug!(operation = %self.name, "started");
        Ok(())
    }

    /// Engine-side pause request. An operation with no connected inputs has
    /// no in-flight data to drain: it settles at `Paused` immediately and
    /// itself emits the `Pause` tag so consumers observe the boundary. Other
    /// operations enter `Pausing` and settle when the tag arrives upstream.
    pub fn pause(self: &Arc<Self>) {
        if self.connected_input_count() == 0 {
            let mut core = socket::lock(&self.core);
            if self.signal.state() == State::Running {
                core.op.about_to_change_state(State::Paused);
                self.signal.set_state(State::Paused);
                self.forward_control(ControlTag::Pause);
                tracing::debug!(operation = %self.name, "paused (boundary)");
            }
        } else {
            self.signal.transition(&[State::Running], State::Pausing);
        }
    }

    /// Engine-side resume request, symmetric to [`Self::pause`].
    pub fn resume(self: &Arc<Self>) {
        if self.connected_input_count() == 0 {
            let mut core = socket::lock(&self.core);
            if self.signal.state() == State::Paused {
                core.op.about_to_change_state(State::Running);
                self.signal.set_state(State::Running);
                self.forward_control(ControlTag::Resume);
                tracing::debug!(operation = %self.name, "resumed (boundary)");
            }
        } else if self
            .signal
            .transition(&[State::Paused, State::Pausing], State::Resuming)
            && self.threads == 0
        {
            // No worker to drain the queues accumulated while paused.
            self.run_ready_steps();
        }
    }

    /// Engine-side stop request. An operation with no connected inputs closes
    /// its stream downstream (`EndOfStream` then `Stop`) and enters
    /// `Stopping`; it is
    /// finalized to `Stopped` by the engine only after its consumers have
    /// drained (see `Engine::join`). Operations with connected inputs drain
    /// until the tag arrives from upstream.
    pub fn request_stop(self: &Arc<Self>) {
        if self.connected_input_count() == 0 {
            let mut core = socket::lock(&self.core);
            let moved = self.signal.transition(
                &[State::Running, State::Paused, State::Pausing, State::Resuming],
                State::Stopping,
            );
            if moved {
                core.op.about_to_change_state(State::Stopping);
                self.forward_control(ControlTag::EndOfStream);
                self.forward_control(ControlTag::Stop);
                tracing::debug!(operation = %self.name, "stopping (boundary)");
            }
        } else {
            let moved = self.signal.transition(
                &[State::Running, State::Paused, State::Pausing, State::Resuming],
                State::Stopping,
            );
            if moved && self.threads == 0 {
                self.run_ready_steps();
            }
        }
    }

    /// Finalizes a `Stopping` operation to `Stopped` and joins its worker.
    /// Leftover queue items (duplicate tags from fan-in producers) are
    /// discarded so a later restart begins from a clean slate.
    pub fn finalize_stop(&self) {
        if self.signal.transition(&[State::Stopping], State::Stopped) {
            self.with_op(|op| op.about_to_change_state(State::Stopped));
            tracing::debug!(operation = %self.name, "stopped");
        }
        for input in &self.inputs {
            input.clear();
        }
        self.join_worker();
    }

    /// Forces an immediate jump to `Stopped`, discarding queued items and
    /// waking any blocked worker. Safe to call concurrently with an in-flight
    /// `process()`: the step completes on its own, then the worker exits.
    pub fn interrupt(&self) {
        self.signal.set_state(State::Stopped);
        for input in &self.inputs {
            input.clear();
        }
        self.join_worker();
        self.with_op(|op| op.about_to_change_state(State::Stopped));
        tracing::debug!(operation = %self.name, "interrupted");
    }

    fn join_worker(&self) {
        if let Some(handle) = socket::lock(&self.worker).take() {
            let _ = handle.join();
        }
    }

    // ── Step execution ──

    /// Runs ready steps until the flow controller reports nothing further.
    /// For inline operations this is the whole execution strategy, invoked
    /// from the delivering thread; the threaded worker uses it to drain.
    pub fn run_ready_steps(self: &Arc<Self>) {
        let mut core = socket::lock(&self.core);
        while let StepOutcome::Progress = self.try_step(&mut core) {}
    }

    /// One scheduling decision. Caller holds the step lock.
    fn try_step(self: &Arc<Self>, core: &mut NodeCore) -> StepOutcome {
        let state = self.signal.state();
        if state == State::Paused {
            // Data stays queued while paused, but control tags at the queue
            // heads are still consumed so a queued Resume or Stop can take
            // effect.
            return match core.flow.prepare_control(&self.inputs) {
                Some(FlowState::Stream(tag)) => {
                    core.op.on_control(tag);
                    self.forward_control(tag);
                    StepOutcome::Progress
                }
                Some(FlowState::Control(tag)) => {
                    self.apply_control(core, tag);
                    StepOutcome::Progress
                }
                _ => StepOutcome::Idle,
            };
        }
        if !state.processes_data() {
            return StepOutcome::Idle;
        }
        match core.flow.prepare(&self.inputs) {
            FlowState::Incomplete => StepOutcome::Idle,
            FlowState::Stream(tag) => {
                core.op.on_control(tag);
                self.forward_control(tag);
                StepOutcome::Progress
            }
            FlowState::Control(tag) => {
                self.apply_control(core, tag);
                StepOutcome::Progress
            }
            FlowState::Ready { group, items } => self.run_process(core, group, items),
        }
    }

    fn run_process(
        self: &Arc<Self>,
        core: &mut NodeCore,
        group: u32,
        items: Vec<Option<crate::variant::Variant>>,
    ) -> StepOutcome {
        let result = {
            let outputs = read_outputs(&self.outputs);
            let mut ctx = ProcessContext::new(&self.name, group, items, &outputs);
            core.op.process(&mut ctx)
        };
        match result {
            Ok(StepResult::Continue) => StepOutcome::Progress,
            Ok(StepResult::Finished) => {
                self.finish(core);
                StepOutcome::Halted
            }
            Err(err) => {
                self.fail(core, err);
                StepOutcome::Halted
            }
        }
    }

    /// Local state transition driven by a consumed control tag, then forward
    /// so downstream sees the boundary in order.
    fn apply_control(&self, core: &mut NodeCore, tag: ControlTag) {
        core.op.on_control(tag);
        let next = match tag {
            ControlTag::Pause => State::Paused,
            ControlTag::Resume => State::Running,
            ControlTag::Stop => State::Stopped,
            // Stream tags never reach here.
            ControlTag::StartOfStream | ControlTag::EndOfStream => return,
        };
        core.op.about_to_change_state(next);
        self.signal.set_state(next);
        self.forward_control(tag);
        tracing::debug!(operation = %self.name, tag = ?tag, state = %next, "control tag applied");
    }

    fn forward_control(&self, tag: ControlTag) {
        let outputs = read_outputs(&self.outputs);
        for output in outputs.iter() {
            output.emit_control(tag);
        }
    }

    /// The operation reported `Finished`: close out its stream.
    fn finish(&self, core: &mut NodeCore) {
        tracing::debug!(operation = %self.name, "stream exhausted");
        self.forward_control(ControlTag::EndOfStream);
        self.forward_control(ControlTag::Stop);
        core.op.about_to_change_state(State::Stopped);
        self.signal.set_state(State::Stopped);
    }

    /// A processing step failed: report to the engine, which treats it as
    /// fatal to the whole graph.
    fn fail(&self, core: &mut NodeCore, err: EngineError) {
        tracing::error!(operation = %self.name, error = %err, "processing step failed");
        core.op.about_to_change_state(State::Stopped);
        self.signal.set_state(State::Stopped);
        let _ = self.events.send(EngineEvent::OperationFailed {
            id: self.id,
            operation: self.name.clone(),
            error: err.to_string(),
        });
    }

    // ── Threaded strategy ──

    fn spawn_worker(self: &Arc<Self>) -> Result<()> {
        let node = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("vf-{}", self.name))
            .spawn(move || node.worker_loop())
            .map_err(|e| EngineError::execution(&self.name, format!("failed to spawn worker: {e}")))?;
        *socket::lock(&self.worker) = Some(handle);
        Ok(())
    }

    fn worker_loop(self: Arc<Self>) {
        tracing::debug!(operation = %self.name, "worker thread started");
        let produces = self.is_producer();
        loop {
            let (state, gen) = self.signal.snapshot();
            match state {
                State::Stopped => break,
                State::Running if produces => {
                    let mut core = socket::lock(&self.core);
                    // Re-check under the step lock: a pause/stop request may
                    // have won the race for it.
                    if self.signal.state() != State::Running {
                        continue;
                    }
                    self.source_step(&mut core);
                }
                s if (s.processes_data() || s == State::Paused) && !produces => {
                    self.run_ready_steps();
                    self.signal.wait_change(state, gen);
                }
                _ => self.signal.wait_change(state, gen),
            }
        }
        tracing::debug!(operation = %self.name, "worker thread exiting");
    }

    fn source_step(self: &Arc<Self>, core: &mut NodeCore) {
        let result = {
            let outputs = read_outputs(&self.outputs);
            let mut ctx = ProcessContext::new(&self.name, 0, Vec::new(), &outputs);
            core.op.process(&mut ctx)
        };
        match result {
            Ok(StepResult::Continue) => {}
            Ok(StepResult::Finished) => self.finish(core),
            Err(err) => self.fail(core, err),
        }
    }
}

/// Delivery hook invoked after a Variant lands in one of the node's input
/// queues. Inline nodes execute synchronously in the delivering thread;
/// threaded nodes were already woken by the enqueue.
pub(crate) fn deliver(node: &Arc<OperationNode>) {
    if node.threads == 0 {
        node.run_ready_steps();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{CheckContext, ProcessContext};
    use crate::socket::SocketSpec;
    use crate::variant::{TypeSet, Variant};
    use crossbeam_channel::unbounded;

    struct Doubler;

    impl Operation for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        fn input_specs(&self) -> &[SocketSpec] {
            static INPUTS: &[SocketSpec] = &[SocketSpec::input("input", TypeSet::NUMERIC)];
            INPUTS
        }

        fn output_specs(&self) -> &[SocketSpec] {
            static OUTPUTS: &[SocketSpec] =
                &[SocketSpec::output("output", TypeSet::NUMERIC).best_effort()];
            OUTPUTS
        }

        fn process(&mut self, ctx: &mut ProcessContext) -> crate::error::Result<StepResult> {
            let v = ctx.require_input(0)?.as_int()?;
            ctx.emit(0, v * 2)?;
            Ok(StepResult::Continue)
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(State::Running.to_string(), "Running");
        assert!(State::Stopping.processes_data());
        assert!(!State::Paused.processes_data());
    }

    #[test]
    fn test_signal_transitions() {
        let signal = NodeSignal::new();
        assert_eq!(signal.state(), State::Stopped);
        assert!(signal.transition(&[State::Stopped], State::Starting));
        assert!(!signal.transition(&[State::Running], State::Paused));
        signal.set_state(State::Running);
        assert_eq!(signal.state(), State::Running);
    }

    #[test]
    fn test_signal_generation_tracks_deliveries() {
        let signal = NodeSignal::new();
        let (s, g) = signal.snapshot();
        signal.notify_delivery();
        let (s2, g2) = signal.snapshot();
        assert_eq!(s, s2);
        assert!(g2 > g);
    }

    #[test]
    fn test_inline_node_processes_on_delivery() {
        let (tx, _rx) = unbounded();
        let node = OperationNode::new(OperationId(0), "doubler".into(), Box::new(Doubler), 0, tx);
        node.inputs()[0].set_connected(true);
        node.with_op(|op| op.check(&CheckContext::new(true, &[true], &[false]))).unwrap();

        node.start().unwrap();
        node.inputs()[0].push(Variant::from(21i64));
        deliver(&node);

        // Inline execution already consumed the item in this thread.
        assert_eq!(node.inputs()[0].len(), 0);
        assert_eq!(node.state(), State::Running);
        node.interrupt();
    }

    #[test]
    fn test_inline_node_holds_data_while_paused() {
        let (tx, _rx) = unbounded();
        let node = OperationNode::new(OperationId(0), "doubler".into(), Box::new(Doubler), 0, tx);
        node.inputs()[0].set_connected(true);
        node.start().unwrap();

        node.signal.set_state(State::Paused);
        node.inputs()[0].push(Variant::from(1i64));
        deliver(&node);
        assert_eq!(node.inputs()[0].len(), 1);

        node.signal.set_state(State::Running);
        node.run_ready_steps();
        assert_eq!(node.inputs()[0].len(), 0);
        node.interrupt();
    }
}
