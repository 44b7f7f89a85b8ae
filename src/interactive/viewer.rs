//! Interactive viewer: winit render loop driving the compute pipeline
//!
//! Each frame polls the dispatch controller; when the previous dispatch has
//! retired the buffer is transferred into the display texture and the next
//! dispatch is chained immediately, so compute and presentation overlap. If
//! the GPU is still busy the previous frame's texture is presented unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::gpu::{
    create_frame_texture, ComputeBuffer, ComputeProgram, DispatchController, DisplayPipeline,
    SurfaceContext,
};

const KERNEL_SOURCE: &str = include_str!("../gpu/shaders/color_wave.wgsl");
const KERNEL_LOCAL_SIZE: u32 = 256;

/// Configuration for the viewer
#[derive(Clone)]
pub struct ViewerConfig {
    /// Computed frame size in pixels (width must be a multiple of 16)
    pub frame_size: (u32, u32),
    /// Window title
    pub title: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            frame_size: (1440, 900),
            title: "Compute Frame (ESC to exit)".to_string(),
        }
    }
}

/// Viewer state: the core pipeline plus presentation bookkeeping
struct ViewerState {
    config: ViewerConfig,
    ctx: SurfaceContext,
    display: DisplayPipeline,
    frame_texture: wgpu::Texture,

    program: ComputeProgram,
    buffer: ComputeBuffer,
    controller: DispatchController,

    // Animation / overlay state
    time: f32,
    last_frame: Instant,
    fps_frames: u32,
    fps_timer: Instant,
}

impl ViewerState {
    fn new(window: Arc<Window>, config: ViewerConfig) -> Result<Self, String> {
        let ctx = SurfaceContext::new(window)?;
        let (width, height) = config.frame_size;

        let program = ComputeProgram::compile(
            &ctx.gpu,
            KERNEL_SOURCE,
            "main",
            &["time"],
            KERNEL_LOCAL_SIZE,
        );
        if !program.is_valid() {
            return Err("Compute kernel failed to compile".into());
        }

        // One float per channel, four channels per pixel
        let pixel_count = (width * height) as usize;
        let buffer = ComputeBuffer::new(&ctx.gpu, &vec![0.0f32; pixel_count * 4]);

        let frame_texture = create_frame_texture(&ctx.gpu, width, height);
        let mut display = DisplayPipeline::new(&ctx);
        display.attach_texture(&ctx, &frame_texture);

        let mut state = Self {
            config,
            ctx,
            display,
            frame_texture,
            program,
            buffer,
            controller: DispatchController::new(),
            time: 0.0,
            last_frame: Instant::now(),
            fps_frames: 0,
            fps_timer: Instant::now(),
        };

        // Kick off the first dispatch so the loop has work to poll
        state.program.set_uniform_float("time", 0.0);
        state
            .controller
            .dispatch(&state.ctx.gpu, &state.program, &state.buffer);

        Ok(state)
    }

    fn frame(&mut self) {
        let now = Instant::now();
        self.time += (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        if self.controller.is_done(&self.ctx.gpu) {
            let (width, height) = self.config.frame_size;
            self.buffer
                .transfer_to_texture(&self.ctx.gpu, &self.frame_texture, width, height);
            self.program.set_uniform_float("time", self.time);
            self.controller
                .dispatch(&self.ctx.gpu, &self.program, &self.buffer);
        }
        // Not done: present the previous frame's texture unchanged

        if let Err(e) = self.display.render(&self.ctx) {
            log::error!("Render error: {:?}", e);
        }

        self.fps_frames += 1;
        if self.fps_timer.elapsed() >= Duration::from_secs(1) {
            let fps = self.fps_frames as f32 / self.fps_timer.elapsed().as_secs_f32();
            let stats = self.controller.stats();
            self.ctx.set_title(&format!(
                "{} | {:.0} fps | poll {}us (max {}us)",
                self.config.title,
                fps,
                stats.last_poll.as_micros(),
                stats.max_poll.as_micros(),
            ));
            self.fps_frames = 0;
            self.fps_timer = now;
        }
    }
}

/// Application handler for winit event loop
struct ViewerApp {
    config: ViewerConfig,
    state: Option<ViewerState>,
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let (width, height) = self.config.frame_size;
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(width as f64, height as f64));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("Failed to create window"),
        );

        match ViewerState::new(window, self.config.clone()) {
            Ok(state) => self.state = Some(state),
            Err(e) => {
                log::error!("Failed to create viewer state: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let state = match &mut self.state {
            Some(s) => s,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                state.ctx.resize((size.width, size.height));
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                state.frame();
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            // Request continuous redraw for smooth animation
            state.ctx.request_redraw();
        }
    }
}

/// Run the viewer until the window closes
pub fn run_viewer(config: ViewerConfig) -> Result<(), String> {
    let event_loop = EventLoop::new().map_err(|e| format!("Failed to create event loop: {}", e))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp {
        config,
        state: None,
    };
    event_loop
        .run_app(&mut app)
        .map_err(|e| format!("Event loop error: {}", e))?;

    Ok(())
}
