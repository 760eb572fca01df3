mod app;
mod cli;
mod faces;
mod window;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use winit::event_loop::{ControlFlow, EventLoop};

use crate::{app::App, cli::Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialise_tracing(&cli.log_level);

    let config = cli.viewer_config()?;
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    // Frames are driven by request_redraw, so only wake for events.
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config, cli.vsync());
    event_loop.run_app(&mut app).context("event loop error")?;
    app.finish()
}

fn initialise_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
