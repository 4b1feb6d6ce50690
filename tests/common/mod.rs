//! Common test operations and helpers.

#![allow(dead_code)] // Test utilities may not all be used in every test file

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use visionflow::ops::Observed;
use visionflow::{
    ControlTag, Operation, ProcessContext, Result, SocketSpec, StepResult, TypeSet, Variant,
};

pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Installs a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Producer that forwards Variants from a crossbeam channel into the graph,
/// so tests control exactly what enters the pipeline and when. Finishes its
/// stream when the sending side is dropped.
pub struct ChannelSource {
    rx: Receiver<Variant>,
}

impl ChannelSource {
    pub fn new() -> (Self, Sender<Variant>) {
        let (tx, rx) = unbounded();
        (Self { rx }, tx)
    }
}

impl Operation for ChannelSource {
    fn name(&self) -> &str {
        "channel_source"
    }

    fn input_specs(&self) -> &[SocketSpec] {
        &[]
    }

    fn output_specs(&self) -> &[SocketSpec] {
        static OUTPUTS: &[SocketSpec] = &[SocketSpec::output("output", TypeSet::ANY)];
        OUTPUTS
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        // Short timeout keeps the worker responsive to pause/stop requests.
        match self.rx.recv_timeout(Duration::from_millis(10)) {
            Ok(v) => {
                ctx.emit(0, v)?;
                Ok(StepResult::Continue)
            }
            Err(RecvTimeoutError::Timeout) => Ok(StepResult::Continue),
            Err(RecvTimeoutError::Disconnected) => Ok(StepResult::Finished),
        }
    }
}

/// Pass-through that fails its step on the nth object, for exercising the
/// fatal-failure path.
pub struct FailAfter {
    remaining: u64,
}

impl FailAfter {
    pub fn new(successes: u64) -> Self {
        Self {
            remaining: successes,
        }
    }
}

impl Operation for FailAfter {
    fn name(&self) -> &str {
        "fail_after"
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

    fn process(&mut self, ctx: &mut ProcessContext) -> Result<StepResult> {
        if self.remaining == 0 {
            return Err(visionflow::EngineError::execution(
                "fail_after",
                "deliberate test failure",
            ));
        }
        self.remaining -= 1;
        if let Some(v) = ctx.take_input(0) {
            ctx.emit(0, v)?;
        }
        Ok(StepResult::Continue)
    }
}

/// Collects observations from a debug tap until `Stop` arrives or the
/// timeout expires, returning everything seen in order.
pub fn drain_until_stop(rx: &Receiver<Observed>, timeout: Duration) -> Vec<Observed> {
    let mut seen = Vec::new();
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let now = std::time::Instant::now();
        if now >= deadline {
            return seen;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(observed) => {
                let is_stop = observed == Observed::Control(ControlTag::Stop);
                seen.push(observed);
                if is_stop {
                    return seen;
                }
            }
            Err(_) => return seen,
        }
    }
}

/// The integer payloads of a tap trace, data objects only.
pub fn data_ints(seen: &[Observed]) -> Vec<i64> {
    seen.iter()
        .filter_map(|o| match o {
            Observed::Data(Variant::Int(i)) => Some(*i),
            _ => None,
        })
        .collect()
}

/// The control tags of a tap trace, in order.
pub fn control_tags(seen: &[Observed]) -> Vec<ControlTag> {
    seen.iter()
        .filter_map(|o| match o {
            Observed::Control(tag) => Some(*tag),
            _ => None,
        })
        .collect()
}
