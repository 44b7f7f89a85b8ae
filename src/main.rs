mod gpu;
mod interactive;

#[cfg(test)]
mod tests;

// Re-export public API
pub use gpu::{
    create_frame_texture, ComputeBuffer, ComputeProgram, DispatchController, DisplayPipeline,
    GpuContext, PollStats, SurfaceContext,
};
pub use interactive::{run_viewer, ViewerConfig};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--interactive" {
        run_interactive();
    } else if args.len() > 1 && args[1] == "--benchmark" {
        run_benchmark();
    } else {
        println!("Compute Frame");
        println!("Run with --interactive for the animated viewer");
        println!("Run with --benchmark for headless dispatch/poll timing");
    }
}

fn run_interactive() {
    if let Err(e) = run_viewer(ViewerConfig::default()) {
        eprintln!("Error: {}", e);
    }
}

fn run_benchmark() {
    use std::time::Instant;

    const WIDTH: u32 = 512;
    const HEIGHT: u32 = 512;
    const CYCLES: u64 = 200;

    let ctx = match GpuContext::headless() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("GPU unavailable: {}", e);
            return;
        }
    };

    let mut program = ComputeProgram::compile(
        &ctx,
        include_str!("gpu/shaders/color_wave.wgsl"),
        "main",
        &["time"],
        256,
    );
    if !program.is_valid() {
        eprintln!("Kernel failed to compile");
        return;
    }

    let pixel_count = (WIDTH * HEIGHT) as usize;
    let buffer = ComputeBuffer::new(&ctx, &vec![0.0f32; pixel_count * 4]);
    let texture = create_frame_texture(&ctx, WIDTH, HEIGHT);
    let mut controller = DispatchController::new();

    println!("=== Dispatch/Poll Benchmark ===\n");
    println!("Frame: {}x{} ({} floats)", WIDTH, HEIGHT, pixel_count * 4);
    println!("Cycles: {}", CYCLES);
    println!("-----------------------");

    let start = Instant::now();
    program.set_uniform_float("time", 0.0);
    controller.dispatch(&ctx, &program, &buffer);

    let mut completed = 0u64;
    while completed < CYCLES {
        if controller.is_done(&ctx) {
            buffer.transfer_to_texture(&ctx, &texture, WIDTH, HEIGHT);
            completed += 1;
            program.set_uniform_float("time", completed as f32 * 0.016);
            controller.dispatch(&ctx, &program, &buffer);
        }
        std::hint::spin_loop();
    }
    let elapsed = start.elapsed();

    let stats = controller.stats();
    let avg_ms = elapsed.as_secs_f64() * 1000.0 / CYCLES as f64;

    println!("  Total:      {:.3} s", elapsed.as_secs_f64());
    println!("  Per cycle:  {:.3} ms", avg_ms);
    println!("  Cycles/s:   {:.1}", 1000.0 / avg_ms);
    println!(
        "  Polls:      {} ({:.1} per cycle)",
        stats.polls,
        stats.polls as f64 / CYCLES as f64
    );
    println!("  Last poll:  {} us", stats.last_poll.as_micros());
    println!("  Max poll:   {} us", stats.max_poll.as_micros());
}
