//! Daemon entry point: CLI parsing, surface + GPU session setup, scene load,
//! and the Frame Loop. Everything fallible below this point returns
//! `anyhow::Result`, converting the workspace's typed `WdError`s into the
//! single `error: <message>` line spec.md §7 asks for on stderr.

mod cli;
mod frame_loop;
mod pause;
mod surface;

use wallpaperd_archive::ArchiveReader;
use wallpaperd_gpu::{GpuConfig, GpuSession, PresentMode};
use wallpaperd_sandbox::SandboxHost;

const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let opts = cli::parse(args)?;

    if opts.help {
        cli::print_help();
        return Ok(());
    }
    if opts.list_displays {
        for name in surface::list_displays()? {
            println!("{name}");
        }
        return Ok(());
    }

    if opts.display.is_some() && !opts.window {
        log::warn!("--display is only honoured by the Wayland layer-shell backend, which this build does not carry; running windowed");
    }

    let wallpaper_path = opts.wallpaper_path.as_deref().expect("cli::parse requires a path outside help/list modes");

    let window_surface = surface::WindowSurface::new("wallpaperd", DEFAULT_WIDTH, DEFAULT_HEIGHT)?;
    let (width, height) = window_surface.current_size();

    let gpu = GpuSession::new(
        window_surface.window(),
        GpuConfig {
            prefer_dgpu: opts.prefer_dgpu,
            present_mode: if opts.fps.is_some() { PresentMode::Mailbox } else { PresentMode::Vsync },
            width,
            height,
        },
    )?;

    let archive = ArchiveReader::open(wallpaper_path)?;
    let host = SandboxHost::new()?;
    let scene = host.load_scene(gpu, archive, &opts.scene_options)?;

    let loop_config = frame_loop::FrameLoopConfig {
        fps_target: opts.fps,
        speed: opts.speed,
        pause_hidden: opts.pause_hidden,
        pause_on_bat: opts.pause_on_bat,
    };
    frame_loop::run(window_surface, scene, loop_config)?;
    Ok(())
}
