//! GPU compute pipeline using wgpu
//!
//! Compiles a compute kernel, dispatches it against a storage buffer, and
//! hands the result to a display texture - with completion tracked by
//! polling, never by blocking the render thread.

pub mod buffer;
pub mod context;
pub mod dispatch;
pub mod display;
pub mod program;

pub use buffer::ComputeBuffer;
pub use context::{GpuContext, SurfaceContext};
pub use dispatch::{DispatchController, PollStats};
pub use display::{create_frame_texture, DisplayPipeline};
pub use program::ComputeProgram;
