//! The slice of the OpenGL API the renderer depends on.
//!
//! Everything in `render` is generic over [`GraphicsApi`], so the same program,
//! texture and frame code runs against a real context through
//! [`GlowBackend`] or against the in-memory [`HeadlessGl`] in tests.

use std::fmt::{self, Debug};

use crate::render::texture::{CubeFace, PixelBuffer, SamplerParameter, SamplerValue};

pub mod glow_backend;
pub mod headless;

pub use glow_backend::GlowBackend;
pub use headless::HeadlessGl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum ShaderStage {
    #[strum(serialize = "vertex")]
    Vertex,
    #[strum(serialize = "fragment")]
    Fragment,
}

/// Binding point a texture object is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureTarget {
    Texture2D,
    CubeMap,
}

/// Destination of a pixel upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    Texture2D,
    CubeFace(CubeFace),
}

impl ImageTarget {
    pub fn texture_target(self) -> TextureTarget {
        match self {
            ImageTarget::Texture2D => TextureTarget::Texture2D,
            ImageTarget::CubeFace(_) => TextureTarget::CubeMap,
        }
    }
}

/// A value written to a uniform, tagged with its numeric layout.
#[derive(Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Int(i32),
    Float(f32),
    Vec3([f32; 3]),
    /// Column-major.
    Mat4(&'a [f32; 16]),
}

impl Debug for UniformValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformValue::Int(v) => write!(f, "Int({v})"),
            UniformValue::Float(v) => write!(f, "Float({v})"),
            UniformValue::Vec3(v) => write!(f, "Vec3({v:?})"),
            UniformValue::Mat4(_) => write!(f, "Mat4(..)"),
        }
    }
}

/// Narrow GL surface used by the renderer.
///
/// Creation functions report driver failures as `Err(String)`, and
/// [`compile_shader`](GraphicsApi::compile_shader) /
/// [`link_program`](GraphicsApi::link_program) report the info log of a failed
/// compile or link the same way.
pub trait GraphicsApi {
    type Shader: Copy + Debug + PartialEq;
    type Program: Copy + Debug + PartialEq;
    type Texture: Copy + Debug + PartialEq;
    type VertexArray: Copy + Debug + PartialEq;
    type Buffer: Copy + Debug + PartialEq;
    type UniformLocation: Debug;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String>;
    fn compile_shader(&self, shader: Self::Shader, source: &str) -> Result<(), String>;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn link_program(&self, program: Self::Program) -> Result<(), String>;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn uniform_location(&self, program: Self::Program, name: &str)
    -> Option<Self::UniformLocation>;
    fn set_uniform(&self, location: &Self::UniformLocation, value: UniformValue<'_>);

    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: TextureTarget, texture: Option<Self::Texture>);
    fn tex_parameter(
        &self,
        target: TextureTarget,
        parameter: SamplerParameter,
        value: SamplerValue,
    );
    fn tex_image_2d(&self, target: ImageTarget, image: &PixelBuffer);

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String>;
    fn delete_vertex_array(&self, vertex_array: Self::VertexArray);
    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>);
    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);
    /// Binds `buffer` as the array buffer and fills it with static data.
    fn upload_vertex_data(&self, buffer: Self::Buffer, data: &[u8]);
    /// Enables `location` and points it at tightly described `f32` data in the
    /// bound array buffer.
    fn vertex_attrib_f32(&self, location: u32, components: i32, stride: i32, offset: i32);

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn enable_depth_test(&self);
    fn clear_color_depth(&self);
    fn draw_triangles(&self, first: i32, count: i32);
}
