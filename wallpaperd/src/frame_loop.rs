//! Frame Loop (spec §4.G): paces frames, drains input, gates on pause
//! policies, and orchestrates the per-frame acquire/update/submit sequence.
//! Grounded on blade-graphics' own example main loops (poll → resize → step
//! → render) for the overall shape, with the pacing and pause-gating spec.md
//! spells out in its eight numbered steps layered on top.

use std::time::{Duration, Instant};

use wallpaperd_error::WdError;
use wallpaperd_sandbox::SceneInstance;

use crate::pause::battery_discharging;
use crate::surface::WindowSurface;

/// Pause predicates are re-evaluated at most this often (spec §4.G
/// rationale: "pause checks are expensive... 5 Hz is enough to feel responsive").
const PAUSE_CHECK_INTERVAL: Duration = Duration::from_millis(200);
/// Step 3's clamp: "a system sleep longer than 1 s must not produce a
/// physics-breaking time-step".
const MAX_DELTA_SECONDS: f32 = 1.0;

pub struct FrameLoopConfig {
    pub fps_target: Option<u32>,
    pub speed: f32,
    pub pause_hidden: bool,
    pub pause_on_bat: bool,
}

pub fn run(mut surface: WindowSurface, mut scene: SceneInstance, config: FrameLoopConfig) -> Result<(), WdError> {
    let frame_budget = config.fps_target.map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));
    let clock = Instant::now();

    let mut prev = clock.elapsed();
    let mut frame_skipped = false;
    let mut last_pause_check = prev;
    let mut first_draw = true;
    let mut wrote_readiness_file = false;

    loop {
        // 1. now <- monotonic_ns()
        let mut now = clock.elapsed();

        // 2. sleep to respect fps_target.
        if let Some(budget) = frame_budget {
            if now < prev + budget {
                std::thread::sleep(prev + budget - now);
                now = clock.elapsed();
            }
        }

        // 3. delta, clamped; 0 if the previous iteration skipped the frame.
        let delta = if frame_skipped { 0.0 } else { (now - prev).as_secs_f32().min(MAX_DELTA_SECONDS) };
        prev = now;

        // 4. drain the surface's event queue; quit on the shutdown event.
        if surface.pump_events() {
            break;
        }

        // 5. throttled pause-predicate check.
        if !first_draw && now - last_pause_check >= PAUSE_CHECK_INTERVAL {
            last_pause_check = now;
            let paused =
                (config.pause_hidden && surface.output_hidden()) || (config.pause_on_bat && battery_discharging());
            if paused {
                std::thread::sleep(PAUSE_CHECK_INTERVAL);
                frame_skipped = true;
                continue;
            }
        }
        frame_skipped = false;

        // 6. acquire command buffer + swapchain texture.
        let (width, height) = surface.current_size();
        scene.gpu_mut().resize(width, height)?;
        let has_texture = scene.gpu_mut().acquire_frame()?;
        if !has_texture {
            scene.gpu_mut().submit()?;
            continue;
        }

        // 7. call update(delta * speed) through the sandbox host.
        scene.update(delta * config.speed)?;

        // 8. submit.
        scene.gpu_mut().submit()?;

        if first_draw {
            write_readiness_file();
            wrote_readiness_file = true;
            first_draw = false;
        }
    }

    if wrote_readiness_file {
        remove_readiness_file();
    }
    Ok(())
}

/// `/tmp/wallpaperd-<pid>.ready`, zero bytes (spec §6).
fn readiness_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("wallpaperd-{}.ready", std::process::id()))
}

fn write_readiness_file() {
    if let Err(e) = std::fs::write(readiness_path(), []) {
        log::warn!("failed to write readiness file {}: {e}", readiness_path().display());
    }
}

fn remove_readiness_file() {
    let _ = std::fs::remove_file(readiness_path());
}
