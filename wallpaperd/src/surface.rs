//! Surface backends (spec §1 OUT OF SCOPE: "the platform-specific surface
//! backends (windowed and Wayland layer-shell), described only by the
//! interface the core consumes: 'produce a drawable handle, a current pixel
//! size, an `output_hidden()` predicate, and a teardown hook'"). This module
//! supplies the one concrete implementation that interface needs to run at
//! all: a regular `winit` window. A Wayland layer-shell background surface
//! targets the same interface but lives outside this engine's scope; until
//! it exists, `--window` and the no-compositor-support path both resolve to
//! this backend.

use std::sync::Arc;
use std::time::Duration;

use wallpaperd_error::WdError;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

#[derive(Default)]
struct WindowState {
    size: (u32, u32),
    hidden: bool,
    should_quit: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.should_quit = true,
            WindowEvent::Resized(size) => self.size = (size.width, size.height),
            WindowEvent::Occluded(hidden) => self.hidden = hidden,
            _ => {}
        }
    }
}

pub struct WindowSurface {
    event_loop: EventLoop<()>,
    window: Arc<Window>,
    state: WindowState,
}

impl WindowSurface {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self, WdError> {
        let event_loop = EventLoop::new().map_err(|e| WdError::SurfaceInitFailed(format!("{e}")))?;
        let attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(winit::dpi::PhysicalSize::new(width.max(1), height.max(1)));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| WdError::SurfaceInitFailed(format!("{e}")))?,
        );
        let size = window.inner_size();
        Ok(Self {
            event_loop,
            window,
            state: WindowState { size: (size.width, size.height), hidden: false, should_quit: false },
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn current_size(&self) -> (u32, u32) {
        self.state.size
    }

    pub fn output_hidden(&self) -> bool {
        self.state.hidden
    }

    /// Drain the surface's event queue without blocking (spec §4.G step 4).
    /// Returns `true` on the shutdown event.
    pub fn pump_events(&mut self) -> bool {
        let status = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.state);
        matches!(status, PumpStatus::Exit(_)) || self.state.should_quit
    }
}

/// List available displays for `--list-displays` (spec §6). A throwaway
/// event loop is enough to enumerate monitors; nothing else in the process
/// depends on it.
pub fn list_displays() -> Result<Vec<String>, WdError> {
    let event_loop = EventLoop::new().map_err(|e| WdError::SurfaceInitFailed(format!("{e}")))?;
    #[allow(deprecated)]
    let names = event_loop
        .available_monitors()
        .enumerate()
        .map(|(i, monitor)| monitor.name().unwrap_or_else(|| format!("display-{i}")))
        .collect();
    Ok(names)
}
