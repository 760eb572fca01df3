use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use cubemap_rs::{
    config::ViewerConfig,
    gl::{GlowBackend, GraphicsApi},
    render::{CUBE_FRAGMENT_SHADER, CUBE_VERTEX_SHADER, CubeFaceSet, FrameScheduler, RenderLoop},
    scene::SceneState,
};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::{
    faces::{self, LoadedFace},
    window::GlWindow,
};

const TITLE: &str = "Cube map";

/// Wheel lines are scaled to pixels the way browsers report `deltaY`.
const PIXELS_PER_LINE: f32 = 100.0;

/// Colours picked with the 1-6 keys.
const PALETTE: [&str; 6] = ["#ff0000", "#00ff00", "#0000ff", "#ffff00", "#00ffff", "#ffffff"];

struct Redraw<'a>(&'a Window);

impl FrameScheduler for Redraw<'_> {
    fn request_frame(&mut self) {
        self.0.request_redraw();
    }
}

struct Gpu {
    render_loop: RenderLoop<GlowBackend>,
    gl: GlowBackend,
    window: GlWindow,
}

pub struct App {
    config: ViewerConfig,
    vsync: bool,
    scene: SceneState,
    pending_faces: CubeFaceSet,
    loader: Option<Receiver<LoadedFace>>,
    gpu: Option<Gpu>,
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: ViewerConfig, vsync: bool) -> Self {
        Self {
            scene: config.scene.clone(),
            config,
            vsync,
            pending_faces: CubeFaceSet::new(),
            loader: None,
            gpu: None,
            error: None,
        }
    }

    /// The error that stopped the event loop, if any.
    pub fn finish(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.error.get_or_insert(err);
        event_loop.exit();
    }

    fn init_gpu(&self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let size = PhysicalSize::new(self.scene.width(), self.scene.height());
        let (window, gl) = GlWindow::create(event_loop, TITLE, size, self.vsync)?;

        let mut render_loop = RenderLoop::new(&gl).context("allocating GPU resources")?;
        let sampler = self.config.sampler_settings()?;
        render_loop
            .configure_cube_sampler(&gl, &sampler)
            .context("configuring cube map sampler")?;
        let program = render_loop.load_program(
            &gl,
            &self.config.program,
            CUBE_VERTEX_SHADER,
            CUBE_FRAGMENT_SHADER,
        );
        if !program.is_usable() {
            warn!("Program '{}' failed to build, frames will be skipped", program.name());
        }

        Ok(Gpu {
            render_loop,
            gl,
            window,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        gpu.window.resize(size);
        if self.scene.resize(size.width, size.height) {
            gpu.gl.viewport(0, 0, size.width as i32, size.height as i32);
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: Key) {
        match key.as_ref() {
            Key::Named(NamedKey::Escape) => event_loop.exit(),
            Key::Named(NamedKey::Space) => {
                let use_color = self.scene.toggle_use_color();
                info!(
                    "Drawing with {}",
                    if use_color { "solid colour" } else { "cube map" }
                );
            }
            Key::Character(digit) => {
                let Some(hex) = digit
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| PALETTE.get(i))
                else {
                    return;
                };
                match self.scene.set_color_hex(hex) {
                    Ok(()) => debug!("Colour set to {}", hex),
                    Err(err) => warn!("{}", err),
                }
            }
            _ => {}
        }
    }

    /// Moves decoded faces into the pending set and uploads them once all six
    /// are present.
    fn receive_faces(&mut self) {
        let (Some(gpu), Some(loader)) = (self.gpu.as_mut(), &self.loader) else {
            return;
        };
        let mut finished = false;
        loop {
            match loader.try_recv() {
                Ok((face, Ok(pixels))) => {
                    debug!("Cube face {} arrived", face);
                    self.pending_faces.insert(face, pixels);
                }
                // Already logged by the loader thread.
                Ok((_, Err(_))) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }

        if let Some(faces) = self.pending_faces.take_complete() {
            match gpu.render_loop.upload_cube_faces(&gpu.gl, &faces) {
                Ok(()) => info!("Cube map ready"),
                Err(err) => error!("Failed to upload cube map: {}", err),
            }
        }
        if finished {
            if !gpu.render_loop.cube_map().is_complete() {
                warn!(
                    "Cube map incomplete, missing {:?}",
                    self.pending_faces.missing()
                );
            }
            self.loader = None;
        }
    }

    fn redraw(&mut self) -> Result<()> {
        self.receive_faces();
        let Some(gpu) = &mut self.gpu else {
            return Ok(());
        };
        let mut scheduler = Redraw(&gpu.window.window);
        gpu.render_loop.tick(&gpu.gl, &self.scene, &mut scheduler);
        gpu.window.swap_buffers()
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        let gpu = match self.init_gpu(event_loop) {
            Ok(gpu) => gpu,
            Err(err) => return self.fail(event_loop, err),
        };
        // Window managers may not honour the requested size.
        let size = gpu.window.window.inner_size();
        self.scene.resize(size.width, size.height);
        gpu.gl
            .viewport(0, 0, self.scene.width() as i32, self.scene.height() as i32);
        gpu.window.window.request_redraw();
        self.gpu = Some(gpu);

        let face_paths: Vec<_> = self
            .config
            .face_paths()
            .into_iter()
            .map(|(face, path)| (face, path.to_path_buf()))
            .collect();
        if face_paths.is_empty() {
            info!("No cube faces configured, cube map mode will skip frames");
        } else {
            self.loader = Some(faces::spawn_loaders(face_paths));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::MouseWheel { delta, .. } => {
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * PIXELS_PER_LINE,
                    MouseScrollDelta::PixelDelta(position) => -position.y as f32,
                };
                self.scene.apply_wheel(delta_y);
                debug!("Field of view {:.2}", self.scene.fov());
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, logical_key),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _: &ActiveEventLoop) {
        if let Some(gpu) = &mut self.gpu {
            gpu.render_loop.dispose(&gpu.gl);
        }
    }
}
