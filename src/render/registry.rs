use std::collections::HashMap;

use tracing::{info, warn};

use crate::{
    gl::{GraphicsApi, ShaderStage},
    render::program::GpuProgram,
};

/// Named programs, each built once from a vertex/fragment source pair.
pub struct ProgramRegistry<G: GraphicsApi> {
    programs: HashMap<String, GpuProgram<G>>,
}

impl<G: GraphicsApi> Default for ProgramRegistry<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GraphicsApi> ProgramRegistry<G> {
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
        }
    }

    /// Builds, links and stores a program under `name`.
    ///
    /// Failures do not abort: they are logged, recorded on the program, and
    /// the (unusable) program is stored anyway. Check
    /// [`GpuProgram::is_usable`] before drawing with it. A program already
    /// registered under `name` is disposed and replaced.
    pub fn create(
        &mut self,
        gl: &G,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> &GpuProgram<G> {
        let mut program = GpuProgram::new(gl, name);
        let built = program
            .attach(gl, ShaderStage::Vertex, vertex_source)
            .and_then(|_| program.attach(gl, ShaderStage::Fragment, fragment_source))
            .and_then(|_| program.link(gl));
        match built {
            Ok(()) => info!("Created program '{}'", name),
            Err(err) => warn!("Program '{}' is not usable: {}", name, err),
        }

        if let Some(mut previous) = self.programs.remove(name) {
            warn!("Replacing program '{}'; disposing the previous one", name);
            previous.dispose(gl);
        }
        self.programs.entry(name.to_string()).or_insert(program)
    }

    pub fn get(&self, name: &str) -> Option<&GpuProgram<G>> {
        self.programs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut GpuProgram<G>> {
        self.programs.get_mut(name)
    }

    /// Removes and disposes the program stored under `name`.
    pub fn remove(&mut self, gl: &G, name: &str) -> bool {
        match self.programs.remove(name) {
            Some(mut program) => {
                program.dispose(gl);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.programs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn dispose(&mut self, gl: &G) {
        for (_, mut program) in self.programs.drain() {
            program.dispose(gl);
        }
    }
}
