use glam::Mat4;
use strum::Display;
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::gl::{GraphicsApi, ShaderStage, UniformValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProgramStatus {
    /// Stages can still be attached; not yet linked.
    Building,
    Linked,
    /// Link failed (or the program object could not be created). Every GPU
    /// object has been released and the program can never be used.
    LinkFailed,
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link: {0}")]
    Link(String),
    #[error("a {0} shader is already attached")]
    StageAlreadyAttached(ShaderStage),
    #[error("program is {0} and cannot be used")]
    Unusable(ProgramStatus),
    #[error("failed to allocate {what}: {reason}")]
    Allocation { what: &'static str, reason: String },
}

/// One shader program and the shader objects attached to it.
pub struct GpuProgram<G: GraphicsApi> {
    name: String,
    handle: Option<G::Program>,
    shaders: Vec<(ShaderStage, G::Shader)>,
    status: ProgramStatus,
    diagnostics: Vec<ProgramError>,
}

impl<G: GraphicsApi> GpuProgram<G> {
    /// Creates an empty program. If the driver cannot allocate the program
    /// object the result is already unusable, with the failure recorded in
    /// [`diagnostics`](Self::diagnostics).
    pub fn new(gl: &G, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut program = Self {
            name,
            handle: None,
            shaders: Vec::new(),
            status: ProgramStatus::Building,
            diagnostics: Vec::new(),
        };
        match gl.create_program() {
            Ok(handle) => program.handle = Some(handle),
            Err(reason) => {
                error!("Failed to create program '{}': {}", program.name, reason);
                program.status = ProgramStatus::LinkFailed;
                program.diagnostics.push(ProgramError::Allocation {
                    what: "program",
                    reason,
                });
            }
        }
        program
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProgramStatus {
        self.status
    }

    pub fn is_usable(&self) -> bool {
        self.status == ProgramStatus::Linked
    }

    pub fn handle(&self) -> Option<G::Program> {
        self.handle
    }

    pub fn attached_stages(&self) -> Vec<ShaderStage> {
        self.shaders.iter().map(|(stage, _)| *stage).collect()
    }

    /// Every compile, link and allocation failure seen by this program.
    pub fn diagnostics(&self) -> &[ProgramError] {
        &self.diagnostics
    }

    fn unusable(&self) -> Option<ProgramError> {
        match self.status {
            ProgramStatus::LinkFailed | ProgramStatus::Disposed => {
                Some(ProgramError::Unusable(self.status))
            }
            ProgramStatus::Building | ProgramStatus::Linked => None,
        }
    }

    fn fail(&mut self, err: ProgramError) -> Result<(), ProgramError> {
        error!("Program '{}': {}", self.name, err);
        self.diagnostics.push(err.clone());
        Err(err)
    }

    /// Compiles `source` as `stage` and attaches it. A shader that fails to
    /// compile is deleted straight away and never attached.
    pub fn attach(&mut self, gl: &G, stage: ShaderStage, source: &str) -> Result<(), ProgramError> {
        if let Some(err) = self.unusable() {
            return Err(err);
        }
        let Some(program) = self.handle else {
            return Err(ProgramError::Unusable(self.status));
        };
        if self.shaders.iter().any(|(s, _)| *s == stage) {
            return Err(ProgramError::StageAlreadyAttached(stage));
        }

        let shader = match gl.create_shader(stage) {
            Ok(shader) => shader,
            Err(reason) => {
                return self.fail(ProgramError::Allocation {
                    what: "shader",
                    reason,
                });
            }
        };
        if let Err(log) = gl.compile_shader(shader, source) {
            gl.delete_shader(shader);
            return self.fail(ProgramError::Compile { stage, log });
        }

        gl.attach_shader(program, shader);
        self.shaders.push((stage, shader));
        trace!("Attached {} shader to program '{}'", stage, self.name);
        Ok(())
    }

    /// Links the attached stages. On failure the program and all of its
    /// shaders are released and the program stays unusable for good.
    pub fn link(&mut self, gl: &G) -> Result<(), ProgramError> {
        if let Some(err) = self.unusable() {
            return Err(err);
        }
        let Some(program) = self.handle else {
            return Err(ProgramError::Unusable(self.status));
        };

        match gl.link_program(program) {
            Ok(()) => {
                self.status = ProgramStatus::Linked;
                debug!(
                    "Linked program '{}' with stages {:?}",
                    self.name,
                    self.attached_stages()
                );
                Ok(())
            }
            Err(log) => {
                self.release(gl);
                self.status = ProgramStatus::LinkFailed;
                self.fail(ProgramError::Link(log))
            }
        }
    }

    /// Makes this program current for subsequent uniform writes and draws.
    pub fn use_program(&self, gl: &G) -> Result<(), ProgramError> {
        match (self.status, self.handle) {
            (ProgramStatus::Linked, Some(program)) => {
                gl.use_program(Some(program));
                Ok(())
            }
            _ => Err(ProgramError::Unusable(self.status)),
        }
    }

    fn set_uniform(&self, gl: &G, name: &str, value: UniformValue<'_>) {
        let (ProgramStatus::Linked, Some(program)) = (self.status, self.handle) else {
            trace!(
                "Ignoring uniform '{}' on {} program '{}'",
                name, self.status, self.name
            );
            return;
        };
        match gl.uniform_location(program, name) {
            Some(location) => gl.set_uniform(&location, value),
            None => trace!("Uniform '{}' is not active in '{}'", name, self.name),
        }
    }

    pub fn set_uniform_int(&self, gl: &G, name: &str, value: i32) {
        self.set_uniform(gl, name, UniformValue::Int(value));
    }

    pub fn set_uniform_float(&self, gl: &G, name: &str, value: f32) {
        self.set_uniform(gl, name, UniformValue::Float(value));
    }

    pub fn set_uniform_vec3(&self, gl: &G, name: &str, value: [f32; 3]) {
        self.set_uniform(gl, name, UniformValue::Vec3(value));
    }

    pub fn set_uniform_mat4(&self, gl: &G, name: &str, value: &Mat4) {
        let columns = value.to_cols_array();
        self.set_uniform(gl, name, UniformValue::Mat4(&columns));
    }

    fn release(&mut self, gl: &G) {
        for (_, shader) in self.shaders.drain(..) {
            if let Some(program) = self.handle {
                gl.detach_shader(program, shader);
            }
            gl.delete_shader(shader);
        }
        if let Some(program) = self.handle.take() {
            gl.delete_program(program);
        }
    }

    /// Detaches and deletes every shader, then deletes the program. Calling
    /// it again does nothing.
    pub fn dispose(&mut self, gl: &G) {
        if self.status == ProgramStatus::Disposed {
            debug!("Program '{}' already disposed", self.name);
            return;
        }
        self.release(gl);
        self.status = ProgramStatus::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        gl::{
            HeadlessGl,
            headless::{GlError, UniformData},
        },
        render::{CUBE_FRAGMENT_SHADER, CUBE_VERTEX_SHADER},
    };

    #[fixture]
    fn gl() -> HeadlessGl {
        HeadlessGl::new()
    }

    fn linked(gl: &HeadlessGl) -> GpuProgram<HeadlessGl> {
        let mut program = GpuProgram::new(gl, "basic");
        program
            .attach(gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
            .unwrap();
        program
            .attach(gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER)
            .unwrap();
        program.link(gl).unwrap();
        program
    }

    #[rstest]
    fn link_valid_sources(gl: HeadlessGl) {
        let program = linked(&gl);
        assert!(program.is_usable());
        assert_eq!(
            program.attached_stages(),
            vec![ShaderStage::Vertex, ShaderStage::Fragment]
        );
        assert!(program.diagnostics().is_empty());
        assert_eq!(gl.live_programs(), 1);
        assert_eq!(gl.live_shaders(), 2);
    }

    #[rstest]
    #[case("void main() {")]
    #[case("#error not today\nvoid main() {}")]
    #[case("")]
    fn compile_failure_is_not_attached(gl: HeadlessGl, #[case] source: &str) {
        let mut program = GpuProgram::new(&gl, "broken");
        let result = program.attach(&gl, ShaderStage::Vertex, source);

        assert!(matches!(
            result,
            Err(ProgramError::Compile {
                stage: ShaderStage::Vertex,
                ..
            })
        ));
        assert!(program.attached_stages().is_empty());
        assert_eq!(gl.live_shaders(), 0);
        assert_eq!(program.diagnostics().len(), 1);

        // The same stage can still be attached from valid source.
        program
            .attach(&gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
            .unwrap();
        assert_eq!(program.attached_stages(), vec![ShaderStage::Vertex]);
    }

    #[rstest]
    fn second_shader_for_stage_is_refused(gl: HeadlessGl) {
        let mut program = GpuProgram::new(&gl, "basic");
        program
            .attach(&gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER)
            .unwrap();
        assert_eq!(
            program.attach(&gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER),
            Err(ProgramError::StageAlreadyAttached(ShaderStage::Fragment))
        );
        assert_eq!(gl.live_shaders(), 1);
    }

    #[rstest]
    fn link_failure_releases_everything(gl: HeadlessGl) {
        let mut program = GpuProgram::new(&gl, "half");
        program
            .attach(&gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
            .unwrap();

        let result = program.link(&gl);
        assert!(matches!(result, Err(ProgramError::Link(_))));
        assert_eq!(program.status(), ProgramStatus::LinkFailed);
        assert!(program.handle().is_none());
        assert!(program.attached_stages().is_empty());
        assert_eq!(gl.live_programs(), 0);
        assert_eq!(gl.live_shaders(), 0);

        let unusable = Err(ProgramError::Unusable(ProgramStatus::LinkFailed));
        assert_eq!(
            program.attach(&gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER),
            unusable
        );
        assert_eq!(program.link(&gl), unusable);
        assert_eq!(program.use_program(&gl), unusable);
    }

    #[rstest]
    fn use_before_link_is_refused(gl: HeadlessGl) {
        let program = GpuProgram::new(&gl, "basic");
        assert_eq!(
            program.use_program(&gl),
            Err(ProgramError::Unusable(ProgramStatus::Building))
        );
        assert_eq!(gl.current_program(), None);
    }

    #[rstest]
    fn uniform_writes_reach_the_current_program(gl: HeadlessGl) {
        let program = linked(&gl);
        let handle = program.handle().unwrap();
        program.use_program(&gl).unwrap();

        program.set_uniform_vec3(&gl, "color", [1.0, 0.0, 0.0]);
        program.set_uniform_int(&gl, "use_cube_map", 1);
        program.set_uniform_mat4(&gl, "model", &Mat4::IDENTITY);
        program.set_uniform_float(&gl, "not_declared", 2.0);

        assert_eq!(
            gl.uniform_value(handle, "color"),
            Some(UniformData::Vec3([1.0, 0.0, 0.0]))
        );
        assert_eq!(
            gl.uniform_value(handle, "use_cube_map"),
            Some(UniformData::Int(1))
        );
        assert_eq!(
            gl.uniform_value(handle, "model"),
            Some(UniformData::Mat4(Mat4::IDENTITY.to_cols_array()))
        );
        assert_eq!(gl.errors(), Vec::<GlError>::new());
        assert_eq!(gl.current_program(), Some(handle));
        assert_eq!(program.attached_stages().len(), 2);
    }

    #[rstest]
    fn uniforms_on_unlinked_program_are_ignored(gl: HeadlessGl) {
        let mut program = GpuProgram::new(&gl, "basic");
        program
            .attach(&gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
            .unwrap();
        program.set_uniform_vec3(&gl, "color", [0.0, 1.0, 0.0]);
        assert!(gl.errors().is_empty());
    }

    #[rstest]
    fn dispose_twice_releases_once(gl: HeadlessGl) {
        let mut program = linked(&gl);
        program.dispose(&gl);
        program.dispose(&gl);

        assert_eq!(program.status(), ProgramStatus::Disposed);
        assert_eq!(gl.live_programs(), 0);
        assert_eq!(gl.live_shaders(), 0);
        assert_eq!(gl.redundant_deletes(), 0);
        assert!(gl.errors().is_empty());
    }

    #[rstest]
    fn dispose_after_failed_link_deletes_nothing_twice(gl: HeadlessGl) {
        let mut program = GpuProgram::new(&gl, "half");
        program
            .attach(&gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER)
            .unwrap();
        let _ = program.link(&gl);
        program.dispose(&gl);
        assert_eq!(gl.redundant_deletes(), 0);
    }

    #[rstest]
    fn allocation_failure_leaves_program_unusable(gl: HeadlessGl) {
        gl.set_out_of_memory(true);
        let mut program = GpuProgram::new(&gl, "basic");
        gl.set_out_of_memory(false);

        assert_eq!(program.status(), ProgramStatus::LinkFailed);
        assert!(matches!(
            program.diagnostics(),
            [ProgramError::Allocation {
                what: "program",
                ..
            }]
        ));
        assert!(
            program
                .attach(&gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
                .is_err()
        );
    }
}
