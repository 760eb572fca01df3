use std::time::Instant;

use strum::Display;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    gl::GraphicsApi,
    render::{
        frame::FrameTransforms,
        mesh::{CubeMesh, MeshError},
        program::GpuProgram,
        registry::ProgramRegistry,
        texture::{
            CubeFace, CubeTexture, PixelBuffer, SamplerParameter, SamplerValue, TextureError,
        },
    },
    scene::SceneState,
};

pub const DEFAULT_PROGRAM: &str = "basic";
pub const CUBE_MAP_UNIT: u32 = 0;

pub const DEFAULT_CUBE_SAMPLER: [(SamplerParameter, SamplerValue); 5] = [
    (SamplerParameter::MinFilter, SamplerValue::Linear),
    (SamplerParameter::MagFilter, SamplerValue::Linear),
    (SamplerParameter::WrapS, SamplerValue::ClampToEdge),
    (SamplerParameter::WrapT, SamplerValue::ClampToEdge),
    (SamplerParameter::WrapR, SamplerValue::ClampToEdge),
];

/// The host's once-per-refresh callback.
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LoopPhase {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[strum(serialize = "no program is registered under the active name")]
    ProgramMissing,
    #[strum(serialize = "the active program is not linked")]
    ProgramUnusable,
    #[strum(serialize = "the cube map is missing faces")]
    CubeMapIncomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    Texture(#[from] TextureError),
}

/// Draws the cube once per host refresh.
///
/// A frame that cannot be drawn is skipped, never fatal: the next frame is
/// requested on every path.
pub struct RenderLoop<G: GraphicsApi> {
    registry: ProgramRegistry<G>,
    mesh: CubeMesh<G>,
    cube_map: CubeTexture<G>,
    program_name: String,
    phase: LoopPhase,
    frames: u64,
    drawn: u64,
    started: Option<Instant>,
    last_skip: Option<SkipReason>,
}

impl<G: GraphicsApi> RenderLoop<G> {
    pub fn new(gl: &G) -> Result<Self, RenderError> {
        let mut mesh = CubeMesh::new(gl)?;
        let mut cube_map = match CubeTexture::new(gl) {
            Ok(cube_map) => cube_map,
            Err(err) => {
                mesh.dispose(gl);
                return Err(err.into());
            }
        };
        cube_map.apply_sampler(gl, &DEFAULT_CUBE_SAMPLER)?;

        Ok(Self {
            registry: ProgramRegistry::new(),
            mesh,
            cube_map,
            program_name: DEFAULT_PROGRAM.to_string(),
            phase: LoopPhase::Idle,
            frames: 0,
            drawn: 0,
            started: None,
            last_skip: None,
        })
    }

    /// Builds a program through the registry and makes it the one drawn
    /// with. Returns the program, usable or not.
    pub fn load_program(
        &mut self,
        gl: &G,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> &GpuProgram<G> {
        self.program_name = name.to_string();
        self.registry.create(gl, name, vertex_source, fragment_source)
    }

    pub fn registry(&self) -> &ProgramRegistry<G> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProgramRegistry<G> {
        &mut self.registry
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub fn set_program_name(&mut self, name: impl Into<String>) {
        self.program_name = name.into();
    }

    pub fn cube_map(&self) -> &CubeTexture<G> {
        &self.cube_map
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn drawn_count(&self) -> u64 {
        self.drawn
    }

    pub fn upload_cube_faces(
        &mut self,
        gl: &G,
        faces: &[PixelBuffer; 6],
    ) -> Result<(), TextureError> {
        self.cube_map.upload_faces(gl, faces)
    }

    pub fn upload_cube_face(
        &mut self,
        gl: &G,
        face: CubeFace,
        image: &PixelBuffer,
    ) -> Result<(), TextureError> {
        self.cube_map.upload_face(gl, face, image)
    }

    pub fn configure_cube_sampler(
        &mut self,
        gl: &G,
        settings: &[(SamplerParameter, SamplerValue)],
    ) -> Result<(), TextureError> {
        self.cube_map.apply_sampler(gl, settings)
    }

    /// Renders with the time elapsed since the first tick.
    pub fn tick(
        &mut self,
        gl: &G,
        scene: &SceneState,
        scheduler: &mut impl FrameScheduler,
    ) -> FrameOutcome {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.frame(gl, scene, started.elapsed().as_secs_f32(), scheduler)
    }

    /// Renders one frame at `elapsed` seconds and requests the next one.
    pub fn frame(
        &mut self,
        gl: &G,
        scene: &SceneState,
        elapsed: f32,
        scheduler: &mut impl FrameScheduler,
    ) -> FrameOutcome {
        if self.phase == LoopPhase::Idle {
            gl.enable_depth_test();
            self.phase = LoopPhase::Running;
            info!("Render loop running with program '{}'", self.program_name);
        }
        self.frames += 1;

        gl.clear_color_depth();
        let outcome = self.draw(gl, scene, elapsed);
        match outcome {
            FrameOutcome::Drawn => {
                self.drawn += 1;
                if let Some(reason) = self.last_skip.take() {
                    info!("Drawing resumed after skipping frames ({})", reason);
                }
            }
            FrameOutcome::Skipped(reason) => {
                // Only log when the reason changes, not every refresh.
                if self.last_skip != Some(reason) {
                    warn!("Skipping frame {}: {}", self.frames, reason);
                }
                self.last_skip = Some(reason);
            }
        }

        scheduler.request_frame();
        outcome
    }

    fn draw(&mut self, gl: &G, scene: &SceneState, elapsed: f32) -> FrameOutcome {
        let Some(program) = self.registry.get(&self.program_name) else {
            return FrameOutcome::Skipped(SkipReason::ProgramMissing);
        };
        if !program.is_usable() {
            return FrameOutcome::Skipped(SkipReason::ProgramUnusable);
        }
        let samples_cube_map = !scene.use_color();
        if samples_cube_map && !self.cube_map.is_complete() {
            return FrameOutcome::Skipped(SkipReason::CubeMapIncomplete);
        }
        if program.use_program(gl).is_err() {
            return FrameOutcome::Skipped(SkipReason::ProgramUnusable);
        }

        let transforms = FrameTransforms::compute(scene, elapsed);
        program.set_uniform_mat4(gl, "model", &transforms.model);
        program.set_uniform_mat4(gl, "projection", &transforms.projection);
        program.set_uniform_mat4(gl, "view", &transforms.view);
        program.set_uniform_vec3(gl, "color", scene.color());
        // 1 samples the cube map, 0 the solid colour.
        let use_cube_map = if scene.use_color() { 0 } else { 1 };
        program.set_uniform_int(gl, "use_cube_map", use_cube_map);
        program.set_uniform_int(gl, "cube_map", CUBE_MAP_UNIT as i32);

        if self.cube_map.is_complete() {
            if let Err(err) = self.cube_map.bind(gl, CUBE_MAP_UNIT) {
                debug!("Cube map not bound: {}", err);
            }
        }

        self.mesh.draw(gl);
        FrameOutcome::Drawn
    }

    /// Releases every program, the mesh and the cube map.
    pub fn dispose(&mut self, gl: &G) {
        gl.use_program(None);
        self.registry.dispose(gl);
        self.mesh.dispose(gl);
        self.cube_map.dispose(gl);
        info!(
            "Render loop disposed after {} frames ({} drawn)",
            self.frames, self.drawn
        );
    }
}
