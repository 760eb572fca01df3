use std::num::NonZeroU32;

use anyhow::{Context, Result, anyhow};
use cubemap_rs::gl::GlowBackend;
use glutin::{
    config::{Config, ConfigTemplateBuilder},
    context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version},
    display::GetGlDisplay,
    prelude::*,
    surface::{Surface, SwapInterval, WindowSurface},
};
use glutin_winit::{DisplayBuilder, GlWindow as _};
use raw_window_handle::HasWindowHandle;
use tracing::{debug, info, warn};
use winit::{dpi::PhysicalSize, event_loop::ActiveEventLoop, window::Window};

/// A window with a current OpenGL 3.3 core context and depth buffer.
pub struct GlWindow {
    // Dropped in declaration order: the surface and context go before the window.
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    pub window: Window,
}

impl GlWindow {
    pub fn create(
        event_loop: &ActiveEventLoop,
        title: &str,
        size: PhysicalSize<u32>,
        vsync: bool,
    ) -> Result<(Self, GlowBackend)> {
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(size);
        let template = ConfigTemplateBuilder::new().with_depth_size(24);

        let (window, config) = DisplayBuilder::new()
            .with_window_attributes(Some(attributes))
            .build(event_loop, template, pick_config)
            .map_err(|err| anyhow!("failed to create OpenGL window: {err}"))?;
        let window = window.context("display builder returned no window")?;
        debug!(
            "GL config: {} samples, depth {}",
            config.num_samples(),
            config.depth_size()
        );

        let raw_window_handle = window.window_handle()?.as_raw();
        let context_attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .with_profile(GlProfile::Core)
            .build(Some(raw_window_handle));
        let display = config.display();
        let context = unsafe { display.create_context(&config, &context_attributes) }
            .context("failed to create OpenGL 3.3 core context")?;

        let surface_attributes = window
            .build_surface_attributes(Default::default())
            .context("failed to describe window surface")?;
        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .context("failed to create window surface")?;
        let context = context
            .make_current(&surface)
            .context("failed to make context current")?;

        let interval = if vsync {
            SwapInterval::Wait(NonZeroU32::MIN)
        } else {
            SwapInterval::DontWait
        };
        if let Err(err) = surface.set_swap_interval(&context, interval) {
            warn!("Failed to set swap interval: {:?}", err);
        }

        let gl =
            unsafe { glow::Context::from_loader_function_cstr(|s| display.get_proc_address(s)) };
        info!(
            "Created {}x{} window (vsync {})",
            window.inner_size().width,
            window.inner_size().height,
            if vsync { "on" } else { "off" }
        );

        Ok((
            Self {
                surface,
                context,
                window,
            },
            GlowBackend::new(gl),
        ))
    }

    /// Resizes the drawable. Zero-sized (minimised) windows are ignored.
    pub fn resize(&self, size: PhysicalSize<u32>) {
        if let (Some(width), Some(height)) =
            (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        {
            self.surface.resize(&self.context, width, height);
        }
    }

    pub fn swap_buffers(&self) -> Result<()> {
        self.surface
            .swap_buffers(&self.context)
            .context("failed to swap buffers")
    }
}

/// Prefers the config with the most samples.
fn pick_config(configs: Box<dyn Iterator<Item = Config> + '_>) -> Config {
    configs
        .reduce(|best, config| {
            if config.num_samples() > best.num_samples() {
                config
            } else {
                best
            }
        })
        .expect("no matching OpenGL config")
}
