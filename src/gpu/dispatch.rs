//! Asynchronous dispatch and completion tracking
//!
//! The [`DispatchController`] issues one compute pass at a time against a
//! program/buffer pair and answers "has it finished?" without ever blocking
//! the calling thread. Completion is tracked by a single owned
//! [`DispatchFence`]: a flag flipped by the queue's submitted-work-done
//! callback, observed through a zero-timeout device poll. Issuing a new
//! dispatch drops the previous fence before installing the next, so at most
//! one fence is ever live.
//!
//! The intended per-frame contract:
//!
//! ```text
//! if controller.is_done(ctx) {
//!     buffer.transfer_to_texture(ctx, &texture, w, h);
//!     program.set_uniform_float("time", t);
//!     controller.dispatch(ctx, &program, &buffer);
//! }
//! // present the texture either way
//! ```
//!
//! With no dispatch outstanding `is_done` is vacuously true, and "done"
//! stays observable on every poll until a new dispatch supersedes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::buffer::ComputeBuffer;
use super::context::GpuContext;
use super::program::ComputeProgram;

/// Completion marker for one in-flight dispatch
///
/// The flag is set from the queue's work-done callback, which fires during a
/// device poll once every command submitted up to and including the dispatch
/// has retired.
struct DispatchFence {
    signaled: Arc<AtomicBool>,
}

/// Poll and dispatch counters for one controller instance
///
/// Attached to the controller rather than kept process-wide so independent
/// controllers report independently.
#[derive(Clone, Copy, Debug, Default)]
pub struct PollStats {
    /// Total `is_done` calls
    pub polls: u64,
    /// Total dispatches issued
    pub dispatches: u64,
    /// Wall-clock cost of the most recent poll
    pub last_poll: Duration,
    /// Worst poll observed over the controller's lifetime
    pub max_poll: Duration,
}

/// Issues compute passes and tracks their completion without blocking
///
/// One controller drives one program/buffer pair with at most one dispatch
/// in flight. CPU/GPU overlap comes from chaining: the caller polls
/// [`is_done`] every frame and re-dispatches the moment the prior pass has
/// retired.
///
/// [`is_done`]: DispatchController::is_done
pub struct DispatchController {
    fence: Option<DispatchFence>,
    stats: PollStats,
}

impl DispatchController {
    pub fn new() -> Self {
        Self {
            fence: None,
            stats: PollStats::default(),
        }
    }

    /// Issue a compute pass sized to cover the whole buffer
    ///
    /// The work-group count is `ceil(buffer.len() / local_size)`, so kernels
    /// whose final group overhangs the buffer must bounds-check their
    /// invocation index.
    pub fn dispatch(&mut self, ctx: &GpuContext, program: &ComputeProgram, buffer: &ComputeBuffer) {
        let groups = (buffer.len() as u32).div_ceil(program.local_size());
        self.dispatch_with_groups(ctx, program, buffer, groups);
    }

    /// Issue a compute pass with an explicit work-group count
    ///
    /// Under-dispatching leaves trailing elements untouched (stale data
    /// persists); over-dispatching is safe only for kernels that bounds-check
    /// their invocation index. Prefer [`Self::dispatch`], which covers the
    /// buffer exactly.
    pub fn dispatch_with_groups(
        &mut self,
        ctx: &GpuContext,
        program: &ComputeProgram,
        buffer: &ComputeBuffer,
        groups: u32,
    ) {
        let Some(pipeline) = program.pipeline() else {
            log::warn!("dispatch on invalid program; ignored");
            return;
        };

        // Parameters are re-sent every dispatch
        program.upload_params(ctx);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dispatch Bind Group"),
            layout: program.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.storage_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: program.params_buffer().as_entire_binding(),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Dispatch Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Dispatch Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups.max(1), 1, 1);
        }

        // Retire the previous fence before installing the new one; the new
        // callback covers all GPU commands up to and including this dispatch
        self.fence = None;
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let signaled = Arc::new(AtomicBool::new(false));
        let flag = signaled.clone();
        ctx.queue.on_submitted_work_done(move || {
            flag.store(true, Ordering::Release);
        });
        self.fence = Some(DispatchFence { signaled });

        self.stats.dispatches += 1;
        log::debug!("Dispatched compute with {} groups", groups.max(1));
    }

    /// Non-blocking completion query
    ///
    /// Performs a zero-timeout device poll and reads the fence flag; never
    /// waits on the GPU. Returns true when no dispatch is outstanding. The
    /// result is level-triggered: once true it stays true on every call
    /// until the next dispatch.
    pub fn is_done(&mut self, ctx: &GpuContext) -> bool {
        let start = Instant::now();

        let done = match &self.fence {
            None => true,
            Some(fence) => {
                // Drives callback delivery without waiting
                let _ = ctx.device.poll(wgpu::Maintain::Poll);
                fence.signaled.load(Ordering::Acquire)
            }
        };

        let elapsed = start.elapsed();
        self.stats.polls += 1;
        self.stats.last_poll = elapsed;
        if elapsed > self.stats.max_poll {
            self.stats.max_poll = elapsed;
        }

        done
    }

    /// True while a dispatch has been issued and not yet observed complete
    pub fn in_flight(&self) -> bool {
        match &self.fence {
            None => false,
            Some(fence) => !fence.signaled.load(Ordering::Acquire),
        }
    }

    /// Counters for this controller instance
    pub fn stats(&self) -> PollStats {
        self.stats
    }
}

impl Default for DispatchController {
    fn default() -> Self {
        Self::new()
    }
}
