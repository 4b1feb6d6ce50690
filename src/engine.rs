//! Graph assembly and execution control.
//!
//! The [`Engine`] owns every operation node, the connections between them and
//! the lifecycle of a run. Usage follows a strict order: build (add, connect,
//! expose), validate with [`Engine::check`], then drive with `start`, `pause`,
//! `resume`, `stop`, `join`. Lifecycle commands walk the topological order so
//! control tags propagate producer-to-consumer without reordering against
//! data.
//!
//! # Failure handling
//!
//! A step failure inside any operation is fatal to the whole graph. Nodes
//! report failures on an internal channel; a monitor thread consumes it,
//! interrupts every node and forwards the event to the receiver handed out by
//! [`Engine::events`].

use crate::error::{EngineError, Result};
use crate::id::{OperationId, SocketId};
use crate::operation::{CheckContext, Operation};
use crate::processor::{self, OperationNode, State};
use crate::properties::{PropertySpec, PropertyValue};
use crate::socket::Connection;
use crate::variant::{ControlTag, Variant};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Notifications surfaced to the embedding application.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An operation's processing step returned an error.
    OperationFailed {
        id: OperationId,
        operation: String,
        error: String,
    },
    /// The whole graph was torn down in response to a failure.
    Interrupted { reason: String },
}

struct Edge {
    from: usize,
    to: usize,
}

/// The pipeline graph and its execution driver.
pub struct Engine {
    nodes: Vec<Arc<OperationNode>>,
    edges: Vec<Edge>,
    /// Boundary inputs accepting objects from outside the graph, as
    /// (node index, input index).
    exposed: Vec<(usize, usize)>,
    /// Topological order over node indices, valid while `checked`.
    order: Vec<usize>,
    checked: bool,
    running: bool,
    events_tx: Sender<EngineEvent>,
    internal_rx: Receiver<EngineEvent>,
    user_tx: Sender<EngineEvent>,
    user_rx: Receiver<EngineEvent>,
    monitor: Option<JoinHandle<()>>,
    monitor_stop: Option<Sender<()>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let (events_tx, internal_rx) = unbounded();
        let (user_tx, user_rx) = unbounded();
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            exposed: Vec::new(),
            order: Vec::new(),
            checked: false,
            running: false,
            events_tx,
            internal_rx,
            user_tx,
            user_rx,
            monitor: None,
            monitor_stop: None,
        }
    }

    // ── Graph construction ──

    /// Adds an operation with the given worker thread count (0 = inline,
    /// 1 = dedicated thread). Duplicate names get a numeric suffix, so every
    /// instance is addressable by a unique name.
    pub fn add_operation(&mut self, op: Box<dyn Operation>, threads: usize) -> Result<OperationId> {
        if self.running {
            return Err(EngineError::InvalidConnection(
                "cannot modify a running graph".into(),
            ));
        }
        if threads > 1 {
            return Err(EngineError::config(
                op.name(),
                format!("thread count {threads} not supported (use 0 or 1)"),
            ));
        }
        let base = op.name().to_string();
        let mut name = base.clone();
        let mut suffix = 1u32;
        while self.nodes.iter().any(|n| n.name == name) {
            name = format!("{base}{suffix}");
            suffix += 1;
        }
        let id = OperationId(self.nodes.len() as u32);
        let node = OperationNode::new(id, name, op, threads, self.events_tx.clone());
        tracing::debug!(operation = %node.name, id = %id, threads, "operation added");
        self.nodes.push(node);
        self.checked = false;
        Ok(id)
    }

    /// Looks up an operation by its (possibly suffixed) instance name.
    pub fn operation_id(&self, name: &str) -> Option<OperationId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    pub fn operation_name(&self, id: OperationId) -> Result<&str> {
        Ok(&self.node(id)?.name)
    }

    pub fn operation_state(&self, id: OperationId) -> Result<State> {
        Ok(self.node(id)?.state())
    }

    /// Connects an output socket to an input socket. Multiple outputs may
    /// feed one input (fan-in) and one output may feed many inputs (fan-out).
    pub fn connect(
        &mut self,
        from: OperationId,
        output: &str,
        to: OperationId,
        input: &str,
    ) -> Result<()> {
        if self.running {
            return Err(EngineError::InvalidConnection(
                "cannot modify a running graph".into(),
            ));
        }
        let from_node = Arc::clone(self.node(from)?);
        let to_node = Arc::clone(self.node(to)?);
        let out_idx = from_node
            .output_index(output)
            .ok_or_else(|| EngineError::UnknownSocket {
                operation: from_node.name.clone(),
                socket: output.to_string(),
            })?;
        let in_idx = to_node
            .input_index(input)
            .ok_or_else(|| EngineError::UnknownSocket {
                operation: to_node.name.clone(),
                socket: input.to_string(),
            })?;
        let out_types = from_node
            .output_types(out_idx)
            .unwrap_or(crate::variant::TypeSet::EMPTY);
        let in_types = to_node.inputs()[in_idx].types();
        if !out_types.intersects(in_types) {
            return Err(EngineError::InvalidConnection(format!(
                "'{}.{}' and '{}.{}' share no accepted types",
                from_node.name, output, to_node.name, input
            )));
        }
        if self.reachable(to.index(), from.index()) {
            return Err(EngineError::CycleDetected);
        }
        let slot = Arc::clone(&to_node.inputs()[in_idx]);
        from_node.connect_output(
            out_idx,
            Connection {
                input: slot,
                node: Arc::clone(&to_node),
            },
        );
        tracing::debug!(
            from = %from_node.name, output, to = %to_node.name, input,
            "sockets connected"
        );
        self.edges.push(Edge {
            from: from.index(),
            to: to.index(),
        });
        self.checked = false;
        Ok(())
    }

    /// Marks an input as a graph boundary: it counts as connected for flow
    /// control and receives objects via [`Engine::inject`]. Lifecycle
    /// commands push the matching control tags into exposed inputs so their
    /// consumers settle like any other operation.
    pub fn expose_input(&mut self, op: OperationId, input: &str) -> Result<SocketId> {
        if self.running {
            return Err(EngineError::InvalidConnection(
                "cannot modify a running graph".into(),
            ));
        }
        let node = self.node(op)?;
        let in_idx = node
            .input_index(input)
            .ok_or_else(|| EngineError::UnknownSocket {
                operation: node.name.clone(),
                socket: input.to_string(),
            })?;
        node.inputs()[in_idx].set_connected(true);
        let entry = (op.index(), in_idx);
        if !self.exposed.contains(&entry) {
            self.exposed.push(entry);
        }
        self.checked = false;
        Ok(SocketId::new(op, in_idx as u16))
    }

    /// Pushes one object into an exposed input, addressed by the handle
    /// [`Engine::expose_input`] returned.
    pub fn inject(&self, socket: SocketId, v: impl Into<Variant>) -> Result<()> {
        let node = self.node(socket.operation())?;
        let in_idx = socket.socket_index();
        if !self.exposed.contains(&(socket.operation().index(), in_idx)) {
            return Err(EngineError::config(
                &node.name,
                format!("socket {socket:?} is not an exposed input"),
            ));
        }
        node.inputs()[in_idx].push(v.into());
        processor::deliver(node);
        Ok(())
    }

    /// Current queue depth of an input socket.
    pub fn input_depth(&self, op: OperationId, input: &str) -> Result<usize> {
        let node = self.node(op)?;
        let in_idx = node
            .input_index(input)
            .ok_or_else(|| EngineError::UnknownSocket {
                operation: node.name.clone(),
                socket: input.to_string(),
            })?;
        Ok(node.inputs()[in_idx].len())
    }

    // ── Properties ──

    pub fn properties(&self, op: OperationId) -> Result<Vec<PropertySpec>> {
        Ok(self.node(op)?.with_op(|o| o.properties()))
    }

    pub fn get_property(&self, op: OperationId, name: &str) -> Result<PropertyValue> {
        let node = self.node(op)?;
        node.with_op(|o| o.get_property(name))
            .ok_or_else(|| EngineError::UnknownProperty {
                operation: node.name.clone(),
                property: name.to_string(),
            })
    }

    pub fn set_property(&self, op: OperationId, name: &str, value: PropertyValue) -> Result<()> {
        self.node(op)?.with_op(|o| o.set_property(name, value))
    }

    /// Serializes every operation's properties to a JSON document keyed by
    /// instance name.
    pub fn export_properties(&self) -> Result<String> {
        let mut doc: BTreeMap<String, BTreeMap<String, PropertyValue>> = BTreeMap::new();
        for node in &self.nodes {
            let props = node.with_op(|o| {
                o.properties()
                    .iter()
                    .filter_map(|spec| o.get_property(spec.name).map(|v| (spec.name.to_string(), v)))
                    .collect::<BTreeMap<_, _>>()
            });
            doc.insert(node.name.clone(), props);
        }
        serde_json::to_string_pretty(&doc).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Applies a property snapshot produced by [`Engine::export_properties`].
    /// Operations are addressed by instance name; the graph topology must
    /// already match.
    pub fn import_properties(&mut self, json: &str) -> Result<()> {
        let doc: BTreeMap<String, BTreeMap<String, PropertyValue>> =
            serde_json::from_str(json).map_err(|e| EngineError::Serialization(e.to_string()))?;
        for (op_name, props) in doc {
            let id = self
                .operation_id(&op_name)
                .ok_or_else(|| EngineError::config(&op_name, "no such operation in this graph"))?;
            for (prop, value) in props {
                self.set_property(id, &prop, value)?;
            }
        }
        self.checked = false;
        Ok(())
    }

    // ── Validation ──

    /// Validates the whole graph: acyclicity, connectedness of required
    /// inputs, execution strategy constraints, then each operation's own
    /// `check()`. With `reset` set, operations clear per-run state such as
    /// accumulators and counters. Must succeed before `start()`.
    pub fn check(&mut self, reset: bool) -> Result<()> {
        self.order = self.topological_order()?;
        for node in &self.nodes {
            if node.threads == 0 && node.is_producer() {
                return Err(EngineError::config(
                    &node.name,
                    "producer operations need a worker thread",
                ));
            }
            let in_flags: Vec<bool> = node.inputs().iter().map(|i| i.is_connected()).collect();
            let out_flags: Vec<bool> = (0..node.output_count())
                .map(|i| node.output_connected(i))
                .collect();
            for input in node.inputs() {
                if !input.optional() && !input.is_connected() {
                    return Err(EngineError::config(
                        &node.name,
                        format!("required input '{}' is not connected", input.name()),
                    ));
                }
            }
            let ctx = CheckContext::new(reset, &in_flags, &out_flags);
            node.with_op(|o| o.check(&ctx))?;
        }
        self.checked = true;
        tracing::info!(operations = self.nodes.len(), "graph check passed");
        Ok(())
    }

    // ── Lifecycle ──

    /// Starts every operation, consumers before producers so no object is
    /// emitted into a stopped node. Requires a successful [`Engine::check`]
    /// since the last topology or property change.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(EngineError::execution("engine", "already running"));
        }
        if !self.checked {
            return Err(EngineError::execution(
                "engine",
                "check() must pass before start()",
            ));
        }
        self.spawn_monitor();
        for &idx in self.order.iter().rev() {
            self.nodes[idx].start()?;
        }
        // Objects injected before start sit in their queues; inline nodes
        // have no worker to pick them up.
        for node in &self.nodes {
            if node.threads == 0 {
                node.run_ready_steps();
            }
        }
        self.running = true;
        tracing::info!("pipeline started");
        Ok(())
    }

    /// Pauses the graph. Producers settle immediately and emit a `Pause` tag;
    /// consumers keep processing queued objects until the tag reaches them,
    /// so no data is dropped.
    pub fn pause(&self) {
        if !self.running {
            return;
        }
        for &idx in &self.order {
            self.nodes[idx].pause();
        }
        self.push_boundary_tag(ControlTag::Pause);
        tracing::info!("pipeline pausing");
    }

    /// Resumes a paused graph. Exact mirror of [`Engine::pause`]; the
    /// `Resume` tag travels the same paths so ordering is preserved.
    pub fn resume(&self) {
        if !self.running {
            return;
        }
        for &idx in &self.order {
            self.nodes[idx].resume();
        }
        self.push_boundary_tag(ControlTag::Resume);
        tracing::info!("pipeline resuming");
    }

    /// Requests an orderly stop: producers close their streams with
    /// `EndOfStream` and `Stop` tags and enter `Stopping`; every consumer
    /// drains its queues before settling. Use [`Engine::join`] to wait for
    /// completion.
    pub fn stop(&self) {
        if !self.running {
            return;
        }
        for &idx in &self.order {
            self.nodes[idx].request_stop();
        }
        self.push_boundary_tag(ControlTag::EndOfStream);
        self.push_boundary_tag(ControlTag::Stop);
        tracing::info!("pipeline stopping");
    }

    /// Waits until every operation has drained and reached `Stopped`, then
    /// finalizes producers and joins worker threads. A producer is not
    /// `Stopped` until all of its consumers are.
    pub fn join(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        for &idx in &self.order {
            let node = &self.nodes[idx];
            if node.connected_input_count() == 0 {
                continue;
            }
            if !node.signal().wait_for_state(State::Stopped, deadline) {
                return Err(EngineError::Timeout(format!(
                    "operation '{}' to stop (state {})",
                    node.name,
                    node.state()
                )));
            }
        }
        // Consumers have drained; producers may now leave Stopping.
        for node in &self.nodes {
            node.finalize_stop();
        }
        self.stop_monitor();
        self.running = false;
        tracing::info!("pipeline stopped");
        Ok(())
    }

    /// Hard teardown: every operation jumps to `Stopped` immediately, queued
    /// objects are discarded and worker threads are joined. Producers are
    /// torn down first so no emit lands in an already-cleared queue; no
    /// thread is left blocked.
    pub fn interrupt(&mut self) {
        for node in self.ordered_nodes() {
            node.interrupt();
        }
        self.stop_monitor();
        self.running = false;
        tracing::info!("pipeline interrupted");
    }

    /// Receiver for failure and teardown notifications.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.user_rx.clone()
    }

    // ── Internals ──

    /// Nodes in topological order when one is known, insertion order
    /// otherwise (possible only before the first successful check).
    fn ordered_nodes(&self) -> Vec<Arc<OperationNode>> {
        if self.order.len() == self.nodes.len() {
            self.order.iter().map(|&i| Arc::clone(&self.nodes[i])).collect()
        } else {
            self.nodes.clone()
        }
    }

    fn node(&self, id: OperationId) -> Result<&Arc<OperationNode>> {
        self.nodes
            .get(id.index())
            .filter(|n| n.id == id)
            .ok_or(EngineError::UnknownOperation(id))
    }

    fn push_boundary_tag(&self, tag: ControlTag) {
        for &(node_idx, in_idx) in &self.exposed {
            let node = &self.nodes[node_idx];
            node.inputs()[in_idx].push(Variant::Control(tag));
            processor::deliver(node);
        }
    }

    /// Depth-first reachability over the edge list.
    fn reachable(&self, from: usize, to: usize) -> bool {
        if from == to {
            return true;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if std::mem::replace(&mut visited[n], true) {
                continue;
            }
            for e in &self.edges {
                if e.from == n && !visited[e.to] {
                    stack.push(e.to);
                }
            }
        }
        false
    }

    /// Kahn's algorithm over node indices. Producers come first.
    fn topological_order(&self) -> Result<Vec<usize>> {
        let mut indegree = vec![0usize; self.nodes.len()];
        for e in &self.edges {
            indegree[e.to] += 1;
        }
        let mut queue: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(n) = queue.pop() {
            order.push(n);
            for e in &self.edges {
                if e.from == n {
                    indegree[e.to] -= 1;
                    if indegree[e.to] == 0 {
                        queue.push(e.to);
                    }
                }
            }
        }
        if order.len() != self.nodes.len() {
            return Err(EngineError::CycleDetected);
        }
        Ok(order)
    }

    fn spawn_monitor(&mut self) {
        let nodes = self.ordered_nodes();
        let internal = self.internal_rx.clone();
        let user = self.user_tx.clone();
        let (stop_tx, stop_rx) = bounded::<()>(0);
        self.monitor_stop = Some(stop_tx);
        let handle = std::thread::Builder::new()
            .name("vf-monitor".into())
            .spawn(move || loop {
                select! {
                    recv(internal) -> msg => match msg {
                        Ok(event) => {
                            let reason = match &event {
                                EngineEvent::OperationFailed { operation, error, .. } => {
                                    tracing::error!(operation = %operation, error = %error,
                                        "operation failed, interrupting pipeline");
                                    format!("operation '{operation}' failed: {error}")
                                }
                                EngineEvent::Interrupted { reason } => reason.clone(),
                            };
                            for node in &nodes {
                                node.interrupt();
                            }
                            let _ = user.send(event);
                            let _ = user.send(EngineEvent::Interrupted { reason });
                        }
                        Err(_) => break,
                    },
                    recv(stop_rx) -> _ => break,
                }
            });
        match handle {
            Ok(h) => self.monitor = Some(h),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn monitor thread");
                self.monitor_stop = None;
            }
        }
    }

    fn stop_monitor(&mut self) {
        if let Some(stop) = self.monitor_stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.running {
            self.interrupt();
        } else {
            self.stop_monitor();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{ProcessContext, StepResult};
    use crate::socket::SocketSpec;
    use crate::variant::TypeSet;

    struct PassThrough;

    impl Operation for PassThrough {
        fn name(&self) -> &str {
            "pass"
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

        fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
            if let Some(v) = ctx.take_input(0) {
                ctx.emit(0, v)?;
            }
            Ok(StepResult::Continue)
        }
    }

    struct StrSink;

    impl Operation for StrSink {
        fn name(&self) -> &str {
            "str_sink"
        }

        fn input_specs(&self) -> &[SocketSpec] {
            static INPUTS: &[SocketSpec] = &[SocketSpec::input("input", TypeSet::STR)];
            INPUTS
        }

        fn output_specs(&self) -> &[SocketSpec] {
            &[]
        }

        fn process(&mut self, _ctx: &mut ProcessContext) -> Result<StepResult> {
            Ok(StepResult::Continue)
        }
    }

    #[test]
    fn test_duplicate_names_get_suffixed() {
        let mut engine = Engine::new();
        engine.add_operation(Box::new(PassThrough), 0).unwrap();
        engine.add_operation(Box::new(PassThrough), 0).unwrap();
        assert!(engine.operation_id("pass").is_some());
        assert!(engine.operation_id("pass1").is_some());
    }

    #[test]
    fn test_connect_rejects_disjoint_types() {
        let mut engine = Engine::new();
        let a = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        let b = engine.add_operation(Box::new(StrSink), 0).unwrap();
        let err = engine.connect(a, "output", b, "input").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConnection(_)));
    }

    #[test]
    fn test_connect_rejects_cycles() {
        let mut engine = Engine::new();
        let a = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        let b = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        engine.connect(a, "output", b, "input").unwrap();
        let err = engine.connect(b, "output", a, "input").unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected));
    }

    #[test]
    fn test_check_requires_connected_inputs() {
        let mut engine = Engine::new();
        engine.add_operation(Box::new(PassThrough), 0).unwrap();
        let err = engine.check(false).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn test_check_accepts_exposed_inputs() {
        let mut engine = Engine::new();
        let a = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        engine.expose_input(a, "input").unwrap();
        engine.check(false).unwrap();
    }

    #[test]
    fn test_start_requires_check() {
        let mut engine = Engine::new();
        let a = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        engine.expose_input(a, "input").unwrap();
        assert!(engine.start().is_err());
        engine.check(false).unwrap();
        engine.start().unwrap();
        engine.stop();
        engine.join(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_inject_requires_exposed_input() {
        let mut engine = Engine::new();
        let a = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        let err = engine.inject(SocketId::new(a, 0), 1i64).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn test_exposed_handle_addresses_its_socket() {
        let mut engine = Engine::new();
        let a = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        let port = engine.expose_input(a, "input").unwrap();
        assert_eq!(port.operation(), a);
        assert_eq!(port.socket_index(), 0);
        engine.check(false).unwrap();
        engine.start().unwrap();
        engine.inject(port, 1i64).unwrap();
        assert_eq!(engine.input_depth(a, "input").unwrap(), 0);
        engine.stop();
        engine.join(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_topological_order_producers_first() {
        let mut engine = Engine::new();
        let a = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        let b = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        let c = engine.add_operation(Box::new(PassThrough), 0).unwrap();
        engine.connect(a, "output", b, "input").unwrap();
        engine.connect(b, "output", c, "input").unwrap();
        let order = engine.topological_order().unwrap();
        let pos = |id: OperationId| order.iter().position(|&i| i == id.index()).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }
}
