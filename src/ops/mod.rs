//! Built-in operation implementations.

pub mod arithmetic;
pub mod debug;
pub mod frame_source;
pub mod histogram;
pub mod sequence_generator;
pub mod threshold;

pub use arithmetic::{Arithmetic, ArithmeticFunction};
pub use debug::{DebugOperation, Observed};
pub use frame_source::FrameSource;
pub use histogram::Histogram;
pub use sequence_generator::SequenceGenerator;
pub use threshold::Threshold;
