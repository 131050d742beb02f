// =============================================================================
// VULKAN BOOTSTRAP - From a bare window to a pipeline layout
// =============================================================================
//
// Opens a window and walks the Vulkan bring-up sequence once, logging each
// stage. Any failure is fatal: it is logged here, at the single boundary,
// and the process exits with a nonzero status.
//
// BOOTSTRAP ORDER:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Instance (+ diagnostics messenger)                             │
// │    └── Surface (window connection)                              │
// │          └── Physical device selection + queue families         │
// │                └── Logical device + queues                      │
// │                      └── Swapchain + image views                │
// │                            └── Pipeline layout                  │
// └─────────────────────────────────────────────────────────────────┘
//
// Teardown runs in exactly the reverse order.
//
// =============================================================================

mod backend;
mod config;

use anyhow::Result;
use backend::GpuContext;
use config::Config;
use std::fs::OpenOptions;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let (config, origin) = Config::load();

    // Initialize logging, then report how the config was loaded
    init_logging(&config);
    log::info!("Starting Vulkan bootstrap");
    origin.report();
    log::info!(
        "Window: {}x{} \"{}\"",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!(
        "Diagnostics: {}",
        if config.diagnostics_enabled() { "enabled" } else { "disabled" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(err) = app.failure.take() {
        drop(app);
        log::error!("{:#}", err);
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize logging, optionally redirected to the configured log file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    let mut file_error = None;
    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }

    builder.init();

    if let Some(e) = file_error {
        log::warn!(
            "Could not open log file {}: {}. Logging to stderr.",
            config.debug.log_file,
            e
        );
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The GPU context must be gone
/// before the window it presents to.
struct App {
    config: Config,
    context: Option<GpuContext>,
    window: Option<Window>,
    /// First fatal error; reported by main after the event loop returns
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            context: None,
            window: None,
            failure: None,
        }
    }

    fn shutdown(&mut self) {
        self.context = None;
        self.window = None;
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(self.config.window.resizable);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                self.failure = Some(anyhow::Error::new(e).context("window creation failed"));
                event_loop.exit();
                return;
            }
        };

        match GpuContext::new(&self.config, &window) {
            Ok(context) => {
                self.context = Some(context);
                self.window = Some(window);
            }
            Err(e) => {
                let context = format!("{} failed [{:?}]", e.stage(), e.category());
                self.failure = Some(anyhow::Error::new(e).context(context));
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                // Swapchain recreation is not handled
                log::debug!("Window resized to {}x{}", size.width, size.height);
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
        log::info!("Cleanup complete");
    }
}
