use glow::HasContext;

use crate::{
    gl::{GraphicsApi, ImageTarget, ShaderStage, TextureTarget, UniformValue},
    render::texture::{CubeFace, PixelBuffer, PixelFormat, SamplerParameter, SamplerValue},
};

/// [`GraphicsApi`] over a live `glow` context.
pub struct GlowBackend {
    gl: glow::Context,
}

impl GlowBackend {
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }
}

fn shader_type(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn texture_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2D => glow::TEXTURE_2D,
        TextureTarget::CubeMap => glow::TEXTURE_CUBE_MAP,
    }
}

fn image_target(target: ImageTarget) -> u32 {
    match target {
        ImageTarget::Texture2D => glow::TEXTURE_2D,
        ImageTarget::CubeFace(face) => match face {
            CubeFace::PositiveX => glow::TEXTURE_CUBE_MAP_POSITIVE_X,
            CubeFace::NegativeX => glow::TEXTURE_CUBE_MAP_NEGATIVE_X,
            CubeFace::PositiveY => glow::TEXTURE_CUBE_MAP_POSITIVE_Y,
            CubeFace::NegativeY => glow::TEXTURE_CUBE_MAP_NEGATIVE_Y,
            CubeFace::PositiveZ => glow::TEXTURE_CUBE_MAP_POSITIVE_Z,
            CubeFace::NegativeZ => glow::TEXTURE_CUBE_MAP_NEGATIVE_Z,
        },
    }
}

fn sampler_parameter(parameter: SamplerParameter) -> u32 {
    match parameter {
        SamplerParameter::MinFilter => glow::TEXTURE_MIN_FILTER,
        SamplerParameter::MagFilter => glow::TEXTURE_MAG_FILTER,
        SamplerParameter::WrapS => glow::TEXTURE_WRAP_S,
        SamplerParameter::WrapT => glow::TEXTURE_WRAP_T,
        SamplerParameter::WrapR => glow::TEXTURE_WRAP_R,
    }
}

fn sampler_value(value: SamplerValue) -> u32 {
    match value {
        SamplerValue::Nearest => glow::NEAREST,
        SamplerValue::Linear => glow::LINEAR,
        SamplerValue::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        SamplerValue::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        SamplerValue::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        SamplerValue::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
        SamplerValue::ClampToEdge => glow::CLAMP_TO_EDGE,
        SamplerValue::Repeat => glow::REPEAT,
        SamplerValue::MirroredRepeat => glow::MIRRORED_REPEAT,
    }
}

impl GraphicsApi for GlowBackend {
    type Shader = <glow::Context as HasContext>::Shader;
    type Program = <glow::Context as HasContext>::Program;
    type Texture = <glow::Context as HasContext>::Texture;
    type VertexArray = <glow::Context as HasContext>::VertexArray;
    type Buffer = <glow::Context as HasContext>::Buffer;
    type UniformLocation = <glow::Context as HasContext>::UniformLocation;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String> {
        unsafe { self.gl.create_shader(shader_type(stage)) }
    }

    fn compile_shader(&self, shader: Self::Shader, source: &str) -> Result<(), String> {
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(())
            } else {
                Err(self.gl.get_shader_info_log(shader))
            }
        }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { self.gl.create_program() }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn detach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { self.gl.detach_shader(program, shader) }
    }

    fn link_program(&self, program: Self::Program) -> Result<(), String> {
        unsafe {
            self.gl.link_program(program);
            if self.gl.get_program_link_status(program) {
                Ok(())
            } else {
                Err(self.gl.get_program_info_log(program))
            }
        }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn set_uniform(&self, location: &Self::UniformLocation, value: UniformValue<'_>) {
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32(Some(location), v),
                UniformValue::Float(v) => self.gl.uniform_1_f32(Some(location), v),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32_slice(Some(location), &v),
                UniformValue::Mat4(m) => {
                    self.gl
                        .uniform_matrix_4_f32_slice(Some(location), false, m.as_slice())
                }
            }
        }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { self.gl.create_texture() }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<Self::Texture>) {
        unsafe { self.gl.bind_texture(texture_target(target), texture) }
    }

    fn tex_parameter(
        &self,
        target: TextureTarget,
        parameter: SamplerParameter,
        value: SamplerValue,
    ) {
        unsafe {
            self.gl.tex_parameter_i32(
                texture_target(target),
                sampler_parameter(parameter),
                sampler_value(value) as i32,
            )
        }
    }

    fn tex_image_2d(&self, target: ImageTarget, image: &PixelBuffer) {
        let (internal_format, format) = match image.format() {
            PixelFormat::Rgb8 => (glow::RGB8, glow::RGB),
            PixelFormat::Rgba8 => (glow::RGBA8, glow::RGBA),
        };
        unsafe {
            // Rows of RGB data are not 4-byte aligned in general.
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                image_target(target),
                0,
                internal_format as i32,
                image.width() as i32,
                image.height() as i32,
                0,
                format,
                glow::UNSIGNED_BYTE,
                Some(image.data()),
            );
        }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        unsafe { self.gl.create_vertex_array() }
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { self.gl.create_buffer() }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn upload_vertex_data(&self, buffer: Self::Buffer, data: &[u8]) {
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW);
        }
    }

    fn vertex_attrib_f32(&self, location: u32, components: i32, stride: i32, offset: i32) {
        unsafe {
            self.gl.enable_vertex_attrib_array(location);
            self.gl.vertex_attrib_pointer_f32(
                location,
                components,
                glow::FLOAT,
                false,
                stride,
                offset,
            );
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn enable_depth_test(&self) {
        unsafe { self.gl.enable(glow::DEPTH_TEST) }
    }

    fn clear_color_depth(&self) {
        unsafe { self.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT) }
    }

    fn draw_triangles(&self, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(glow::TRIANGLES, first, count) }
    }
}
