use thiserror::Error;
use tracing::debug;

use crate::gl::GraphicsApi;

/// Positions of a ±1 cube, two triangles per face, no index buffer.
#[rustfmt::skip]
pub const CUBE_VERTICES: [[f32; 3]; 36] = [
    // Front
    [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
    [-1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0],
    // Back
    [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0],
    [-1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0],
    // Top
    [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0], [ 1.0,  1.0,  1.0],
    [-1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0],
    // Bottom
    [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0],
    [-1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0],
    // Right
    [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0],
    [ 1.0, -1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0],
    // Left
    [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0],
    [-1.0, -1.0, -1.0], [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0],
];

pub const POSITION_LOCATION: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    #[error("failed to allocate {what}: {reason}")]
    Allocation { what: &'static str, reason: String },
}

struct MeshObjects<G: GraphicsApi> {
    vao: G::VertexArray,
    vbo: G::Buffer,
}

pub struct CubeMesh<G: GraphicsApi> {
    objects: Option<MeshObjects<G>>,
    vertex_count: i32,
}

impl<G: GraphicsApi> CubeMesh<G> {
    pub fn new(gl: &G) -> Result<Self, MeshError> {
        let vao = gl
            .create_vertex_array()
            .map_err(|reason| MeshError::Allocation {
                what: "vertex array",
                reason,
            })?;
        let vbo = match gl.create_buffer() {
            Ok(vbo) => vbo,
            Err(reason) => {
                gl.delete_vertex_array(vao);
                return Err(MeshError::Allocation {
                    what: "vertex buffer",
                    reason,
                });
            }
        };

        gl.bind_vertex_array(Some(vao));
        gl.upload_vertex_data(vbo, bytemuck::cast_slice(&CUBE_VERTICES));
        // a_position
        gl.vertex_attrib_f32(POSITION_LOCATION, 3, 3 * 4, 0);
        gl.bind_vertex_array(None);

        debug!("Uploaded cube mesh ({} vertices)", CUBE_VERTICES.len());
        Ok(Self {
            objects: Some(MeshObjects { vao, vbo }),
            vertex_count: CUBE_VERTICES.len() as i32,
        })
    }

    pub fn vertex_count(&self) -> i32 {
        self.vertex_count
    }

    pub fn is_disposed(&self) -> bool {
        self.objects.is_none()
    }

    /// Draws the cube with whatever program is current. Does nothing once
    /// disposed.
    pub fn draw(&self, gl: &G) {
        let Some(objects) = &self.objects else {
            return;
        };
        gl.bind_vertex_array(Some(objects.vao));
        gl.draw_triangles(0, self.vertex_count);
        gl.bind_vertex_array(None);
    }

    pub fn dispose(&mut self, gl: &G) {
        if let Some(objects) = self.objects.take() {
            gl.delete_vertex_array(objects.vao);
            gl.delete_buffer(objects.vbo);
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        gl::{HeadlessGl, ShaderStage},
        render::{CUBE_FRAGMENT_SHADER, CUBE_VERTEX_SHADER, program::GpuProgram},
    };

    #[fixture]
    fn gl() -> HeadlessGl {
        HeadlessGl::new()
    }

    #[rstest]
    fn every_vertex_is_a_cube_corner() {
        assert!(
            CUBE_VERTICES
                .iter()
                .flatten()
                .all(|c| *c == 1.0 || *c == -1.0)
        );
        // Each face is the plane where one coordinate is fixed.
        for face in CUBE_VERTICES.chunks(6) {
            let fixed = (0..3).filter(|axis| face.iter().all(|v| v[*axis] == face[0][*axis]));
            assert_eq!(fixed.count(), 1);
        }
    }

    #[rstest]
    fn draw_issues_thirty_six_vertices(gl: HeadlessGl) {
        let mut program = GpuProgram::new(&gl, "basic");
        program
            .attach(&gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
            .unwrap();
        program
            .attach(&gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER)
            .unwrap();
        program.link(&gl).unwrap();
        program.use_program(&gl).unwrap();

        let mesh = CubeMesh::new(&gl).unwrap();
        mesh.draw(&gl);

        let draws = gl.draw_calls();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].first, 0);
        assert_eq!(draws[0].count, 36);
        assert!(gl.errors().is_empty());
    }

    #[rstest]
    fn dispose_is_idempotent(gl: HeadlessGl) {
        let mut mesh = CubeMesh::new(&gl).unwrap();
        mesh.dispose(&gl);
        mesh.dispose(&gl);
        mesh.draw(&gl);

        assert!(mesh.is_disposed());
        assert_eq!(gl.live_vertex_arrays(), 0);
        assert_eq!(gl.live_buffers(), 0);
        assert_eq!(gl.redundant_deletes(), 0);
        assert!(gl.draw_calls().is_empty());
    }

    #[rstest]
    fn allocation_failure_is_reported(gl: HeadlessGl) {
        gl.set_out_of_memory(true);
        assert!(matches!(
            CubeMesh::new(&gl),
            Err(MeshError::Allocation {
                what: "vertex array",
                ..
            })
        ));
    }
}
