//! # VisionFlow: Dataflow Pipeline Engine for Machine Vision
//!
//! A pipeline execution engine where image-processing operations are wired
//! into a directed acyclic graph and driven by data availability. Objects
//! travel as runtime-typed [`Variant`]s; each operation declares typed input
//! and output sockets, and a per-operation flow controller decides when a
//! processing step may fire.
//!
//! ## Architecture
//!
//! ```text
//! [FrameSource] ──► [Threshold] ──► [Histogram] ──► [DebugOperation]
//! ```
//!
//! - **Sockets**: typed, optional or required, with synchronization groups
//!   for joint readiness across inputs.
//! - **Processors**: inline operations execute in the emitting thread,
//!   threaded operations on a dedicated worker.
//! - **Control tags**: pause, resume and stop travel in-band with the data,
//!   so lifecycle boundaries never reorder against objects.
//! - **Engine**: owns the graph, validates it with `check()` and drives the
//!   lifecycle; a failure anywhere tears the whole graph down.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use visionflow::{Engine, OperationRegistry, PropertyValue};
//!
//! fn main() -> visionflow::Result<()> {
//!     let registry = OperationRegistry::with_builtins();
//!     let mut engine = Engine::new();
//!
//!     let source = engine.add_operation(registry.create("frame_source")?, 1)?;
//!     let thresh = engine.add_operation(registry.create("threshold")?, 0)?;
//!     let hist = engine.add_operation(registry.create("histogram")?, 1)?;
//!     let probe = engine.add_operation(registry.create("debug")?, 0)?;
//!
//!     engine.set_property(source, "count", PropertyValue::Int(100))?;
//!     engine.connect(source, "image", thresh, "input")?;
//!     engine.connect(thresh, "output", hist, "image")?;
//!     engine.connect(hist, "histogram", probe, "input")?;
//!
//!     engine.check(true)?;
//!     engine.start()?;
//!     engine.join(Duration::from_secs(10))?;
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod flow;
pub mod id;
pub mod operation;
pub mod ops;
pub mod processor;
pub mod properties;
pub mod registry;
pub mod socket;
pub mod variant;

pub use engine::{Engine, EngineEvent};
pub use error::{EngineError, Result};
pub use id::{OperationId, SocketId};
pub use operation::{CheckContext, Operation, ProcessContext, StepResult};
pub use processor::State;
pub use properties::{PropertyEntry, PropertyKind, PropertySpec, PropertyValue};
pub use registry::OperationRegistry;
pub use socket::SocketSpec;
pub use variant::{ControlTag, TypeSet, Variant, VariantKind};
