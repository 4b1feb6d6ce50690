//! Flow controller: per-operation step readiness.
//!
//! The controller inspects the queued state of an operation's input sockets
//! and decides whether one processing step can fire, and which queued items
//! constitute that step's input set. It also intercepts control Variants
//! before data processing so stream boundaries and state transitions are
//! handled ahead of the data they bracket.
//!
//! Inputs are partitioned into synchronization groups. A step fires only when
//! every connected, non-optional socket of a group has a data Variant at its
//! head. Optional sockets never gate readiness: a disconnected optional input
//! is excluded entirely, and a connected one contributes a value only when it
//! happens to have data queued. When several groups are ready at once they
//! are serviced in declaration order, one step per call, which keeps
//! scheduling deterministic and avoids starving later groups.

use crate::socket::{Head, InputSlot, SocketSpec};
use crate::variant::{ControlTag, Variant};
use std::sync::Arc;

/// Decision produced by one readiness check.
#[derive(Debug)]
pub(crate) enum FlowState {
    /// Not enough queued data for any group; no control tag pending on all
    /// inputs. The processor should wait for the next delivery.
    Incomplete,
    /// One step can fire. `items` is indexed by input-socket position; `None`
    /// marks sockets outside the active group or absent optional values.
    Ready { group: u32, items: Vec<Option<Variant>> },
    /// A stream-boundary tag (`StartOfStream`/`EndOfStream`) was consumed
    /// from every connected input and must be forwarded downstream. It does
    /// not count toward data readiness.
    Stream(ControlTag),
    /// A state-machine tag (`Pause`/`Resume`/`Stop`) was consumed from every
    /// connected input. The owning operation transitions first, then
    /// forwards the tag downstream.
    Control(ControlTag),
}

struct SyncGroup {
    id: u32,
    members: Vec<usize>,
}

/// Readiness policy for one operation instance, derived from its input
/// socket declarations. Scoped to the operation and destroyed with it.
pub(crate) struct FlowController {
    groups: Vec<SyncGroup>,
}

impl FlowController {
    /// Builds the group structure from the input declarations. Groups are
    /// ordered by first appearance, which fixes the service order.
    pub fn new(specs: &[SocketSpec]) -> Self {
        let mut groups: Vec<SyncGroup> = Vec::new();
        for (index, spec) in specs.iter().enumerate() {
            match groups.iter_mut().find(|g| g.id == spec.group) {
                Some(group) => group.members.push(index),
                None => groups.push(SyncGroup {
                    id: spec.group,
                    members: vec![index],
                }),
            }
        }
        Self { groups }
    }

    /// Runs one readiness decision over the current queue state. Must be
    /// called with the owning operation's step lock held; producers may only
    /// append concurrently, so observed heads remain valid until popped.
    pub fn prepare(&self, inputs: &[Arc<InputSlot>]) -> FlowState {
        let connected: Vec<usize> = (0..inputs.len())
            .filter(|&i| inputs[i].is_connected())
            .collect();
        if connected.is_empty() {
            return FlowState::Incomplete;
        }

        // Control consensus: a tag takes effect once it is at the head of
        // every connected input, which prevents duplicate forwarding on
        // fan-in and guarantees all data ahead of the tag drains first.
        if let Some(state) = self.consume_pending(inputs, &connected) {
            return state;
        }

        // Data readiness, groups serviced in declaration order.
        for group in &self.groups {
            if let Some(items) = self.try_group(group, inputs) {
                return FlowState::Ready {
                    group: group.id,
                    items,
                };
            }
        }

        FlowState::Incomplete
    }

    /// Control-only readiness probe, used while the operation is paused:
    /// data stays queued, but a tag at the head of every connected input is
    /// still consumed so that a queued `Resume` or `Stop` takes effect.
    pub fn prepare_control(&self, inputs: &[Arc<InputSlot>]) -> Option<FlowState> {
        let connected: Vec<usize> = (0..inputs.len())
            .filter(|&i| inputs[i].is_connected())
            .collect();
        if connected.is_empty() {
            return None;
        }
        self.consume_pending(inputs, &connected)
    }

    fn consume_pending(&self, inputs: &[Arc<InputSlot>], connected: &[usize]) -> Option<FlowState> {
        let tag = self.pending_control(inputs, connected)?;
        for &i in connected {
            inputs[i].pop_control(tag);
        }
        Some(match tag {
            ControlTag::StartOfStream | ControlTag::EndOfStream => FlowState::Stream(tag),
            _ => FlowState::Control(tag),
        })
    }

    fn pending_control(&self, inputs: &[Arc<InputSlot>], connected: &[usize]) -> Option<ControlTag> {
        let mut tag = None;
        for &i in connected {
            match inputs[i].head() {
                Head::Control(t) => match tag {
                    None => tag = Some(t),
                    Some(prev) if prev == t => {}
                    // Divergent tags at the heads of a fan-in; wait for the
                    // streams to line up.
                    Some(_) => return None,
                },
                _ => return None,
            }
        }
        tag
    }

    fn try_group(&self, group: &SyncGroup, inputs: &[Arc<InputSlot>]) -> Option<Vec<Option<Variant>>> {
        let mut participants = Vec::new();
        for &i in &group.members {
            let input = &inputs[i];
            if !input.is_connected() {
                // A disconnected optional socket is excluded from the check;
                // the operation must treat its absence as "no value".
                continue;
            }
            match input.head() {
                Head::Data => participants.push(i),
                Head::Empty | Head::Control(_) if input.optional() => {}
                _ => return None,
            }
        }
        if participants.is_empty() {
            return None;
        }

        let mut items = vec![None; inputs.len()];
        for &i in &participants {
            items[i] = inputs[i].pop_data();
        }
        Some(items)
    }
}
