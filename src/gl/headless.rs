//! A display-less [`GraphicsApi`] that keeps GL object state in memory.
//!
//! Shaders get a light GLSL check (a `main` function, balanced brackets,
//! `#error` directives), linking matches fragment inputs against vertex
//! outputs and collects `uniform` declarations as active uniforms. Misuse that
//! a driver would flag with `glGetError` is recorded in [`HeadlessGl::errors`]
//! instead.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, HashSet},
};

use tracing::trace;

use crate::{
    gl::{GraphicsApi, ImageTarget, ShaderStage, TextureTarget, UniformValue},
    render::texture::{PixelBuffer, PixelFormat, SamplerParameter, SamplerValue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessUniformLocation {
    program: ObjectId,
    index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    Int(i32),
    Float(f32),
    Vec3([f32; 3]),
    Mat4([f32; 16]),
}

impl From<UniformValue<'_>> for UniformData {
    fn from(value: UniformValue<'_>) -> Self {
        match value {
            UniformValue::Int(v) => UniformData::Int(v),
            UniformValue::Float(v) => UniformData::Float(v),
            UniformValue::Vec3(v) => UniformData::Vec3(v),
            UniformValue::Mat4(m) => UniformData::Mat4(*m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlError {
    InvalidOperation(String),
    InvalidValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub texture: ObjectId,
    pub target: ImageTarget,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub program: ObjectId,
    pub vertex_array: ObjectId,
    pub first: i32,
    pub count: i32,
    /// `(unit, target, texture)` bindings at the time of the draw.
    pub textures: Vec<(u32, TextureTarget, ObjectId)>,
    pub depth_test: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qualifier {
    In,
    Out,
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    qualifier: Qualifier,
    ty: String,
    name: String,
}

struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<ObjectId>,
    linked: bool,
    /// Active uniforms by location, with their GLSL type.
    uniforms: Vec<(String, String)>,
    values: HashMap<usize, UniformData>,
}

#[derive(Default)]
struct TextureObject {
    target: Option<TextureTarget>,
    parameters: HashMap<SamplerParameter, SamplerValue>,
}

#[derive(Default)]
struct VertexArrayObject {
    attributes: Vec<u32>,
}

#[derive(Default)]
struct State {
    next_id: u32,
    out_of_memory: bool,
    shaders: HashMap<ObjectId, ShaderObject>,
    programs: HashMap<ObjectId, ProgramObject>,
    textures: HashMap<ObjectId, TextureObject>,
    vertex_arrays: HashMap<ObjectId, VertexArrayObject>,
    buffers: HashMap<ObjectId, usize>,
    deleted: HashSet<ObjectId>,
    redundant_deletes: usize,

    current_program: Option<ObjectId>,
    active_unit: u32,
    texture_bindings: BTreeMap<(u32, TextureTarget), ObjectId>,
    bound_vertex_array: Option<ObjectId>,
    bound_array_buffer: Option<ObjectId>,
    viewport: (i32, i32, i32, i32),
    depth_test: bool,
    clears: usize,

    uploads: Vec<UploadRecord>,
    draws: Vec<DrawCall>,
    errors: Vec<GlError>,
}

impl State {
    fn allocate(&mut self, kind: &str) -> Result<ObjectId, String> {
        if self.out_of_memory {
            return Err(format!("GL_OUT_OF_MEMORY while creating {kind}"));
        }
        self.next_id += 1;
        Ok(ObjectId(self.next_id))
    }

    fn invalid_operation(&mut self, message: impl Into<String>) {
        let message = message.into();
        trace!("headless GL error: {}", message);
        self.errors.push(GlError::InvalidOperation(message));
    }

    fn release(&mut self, id: ObjectId, removed: bool) {
        if removed {
            self.deleted.insert(id);
        } else {
            self.redundant_deletes += 1;
        }
    }

    fn bound_texture(&self, target: TextureTarget) -> Option<ObjectId> {
        self.texture_bindings
            .get(&(self.active_unit, target))
            .copied()
    }
}

/// In-memory [`GraphicsApi`]. Uploads, draw calls and errors are recorded
/// until [`clear_records`](Self::clear_records) is called, so long-running
/// users should clear them periodically.
pub struct HeadlessGl {
    state: RefCell<State>,
}

impl Default for HeadlessGl {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessGl {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State::default()),
        }
    }

    /// Makes every subsequent object creation fail.
    pub fn set_out_of_memory(&self, out_of_memory: bool) {
        self.state.borrow_mut().out_of_memory = out_of_memory;
    }

    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Deletes of objects that were already deleted or never existed.
    pub fn redundant_deletes(&self) -> usize {
        self.state.borrow().redundant_deletes
    }

    pub fn attached_shaders(&self, program: ObjectId) -> Vec<ObjectId> {
        self.state
            .borrow()
            .programs
            .get(&program)
            .map(|p| p.attached.clone())
            .unwrap_or_default()
    }

    pub fn is_linked(&self, program: ObjectId) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program)
            .is_some_and(|p| p.linked)
    }

    pub fn current_program(&self) -> Option<ObjectId> {
        self.state.borrow().current_program
    }

    /// Last value written to the uniform `name` of `program`.
    pub fn uniform_value(&self, program: ObjectId, name: &str) -> Option<UniformData> {
        let state = self.state.borrow();
        let program = state.programs.get(&program)?;
        let index = program.uniforms.iter().position(|(n, _)| n == name)?;
        program.values.get(&index).cloned()
    }

    pub fn active_unit(&self) -> u32 {
        self.state.borrow().active_unit
    }

    pub fn bound_texture(&self, unit: u32, target: TextureTarget) -> Option<ObjectId> {
        self.state
            .borrow()
            .texture_bindings
            .get(&(unit, target))
            .copied()
    }

    /// Sampler parameter of the texture bound to `target` on `unit`.
    pub fn texture_parameter(
        &self,
        target: TextureTarget,
        unit: u32,
        parameter: SamplerParameter,
    ) -> Option<SamplerValue> {
        let state = self.state.borrow();
        let texture = state.texture_bindings.get(&(unit, target))?;
        state
            .textures
            .get(texture)?
            .parameters
            .get(&parameter)
            .copied()
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.borrow().uploads.clone()
    }

    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.state.borrow().draws.clone()
    }

    pub fn errors(&self) -> Vec<GlError> {
        self.state.borrow().errors.clone()
    }

    /// Drops recorded uploads, draw calls and errors. Object state is kept.
    pub fn clear_records(&self) {
        let mut state = self.state.borrow_mut();
        state.uploads.clear();
        state.draws.clear();
        state.errors.clear();
    }

    pub fn clear_count(&self) -> usize {
        self.state.borrow().clears
    }

    pub fn viewport_rect(&self) -> (i32, i32, i32, i32) {
        self.state.borrow().viewport
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.state.borrow().depth_test
    }
}

const SKIPPED_QUALIFIERS: [&str; 7] = [
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "highp",
    "mediump",
    "lowp",
];

fn strip_layout(line: &str) -> &str {
    if !line.starts_with("layout") {
        return line;
    }
    match line.find(')') {
        Some(end) => line[end + 1..].trim_start(),
        None => line,
    }
}

/// Global `in`/`out`/`uniform` declarations, one per line.
fn declarations(source: &str) -> Vec<Declaration> {
    let mut found = Vec::new();
    for raw in source.lines() {
        let line = raw.split("//").next().unwrap_or_default().trim();
        let line = strip_layout(line);
        let Some(body) = line.strip_suffix(';') else {
            continue;
        };
        if body.contains('(') || body.contains('{') {
            continue;
        }

        let mut tokens = body
            .split_whitespace()
            .filter(|token| !SKIPPED_QUALIFIERS.contains(token));
        let qualifier = match tokens.next() {
            Some("in") => Qualifier::In,
            Some("out") => Qualifier::Out,
            Some("uniform") => Qualifier::Uniform,
            _ => continue,
        };
        let (Some(ty), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let name = name.split('[').next().unwrap_or(name);
        found.push(Declaration {
            qualifier,
            ty: ty.to_string(),
            name: name.to_string(),
        });
    }
    found
}

fn check_glsl(source: &str) -> Result<(), String> {
    for (number, line) in source.lines().enumerate() {
        if let Some(message) = line.trim().strip_prefix("#error") {
            return Err(format!(
                "ERROR: 0:{}: '#error' : {}",
                number + 1,
                message.trim()
            ));
        }
    }

    let mut depth = [0i32; 2];
    for (number, line) in source.lines().enumerate() {
        for c in line.chars() {
            match c {
                '{' => depth[0] += 1,
                '}' => depth[0] -= 1,
                '(' => depth[1] += 1,
                ')' => depth[1] -= 1,
                _ => {}
            }
            if depth.iter().any(|d| *d < 0) {
                return Err(format!(
                    "ERROR: 0:{}: '{}' : syntax error: unexpected token",
                    number + 1,
                    c
                ));
            }
        }
    }
    if depth != [0, 0] {
        return Err(format!(
            "ERROR: 0:{}: '' : syntax error: unexpected end of file",
            source.lines().count().max(1)
        ));
    }

    let normalized: String = source.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.contains("void main(") && !normalized.contains("void main (") {
        return Err("ERROR: 0:1: 'main' : function not defined".to_string());
    }
    Ok(())
}

fn link_check(shaders: &[&ShaderObject]) -> Result<Vec<(String, String)>, String> {
    for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
        let count = shaders.iter().filter(|s| s.stage == stage).count();
        match count {
            0 => return Err(format!("error: no {stage} shader attached")),
            1 => {}
            _ => return Err(format!("error: more than one {stage} shader attached")),
        }
    }
    if shaders.iter().any(|s| !s.compiled) {
        return Err("error: an attached shader has not been compiled successfully".to_string());
    }

    let stage_declarations = |stage: ShaderStage| {
        shaders
            .iter()
            .filter(|s| s.stage == stage)
            .flat_map(|s| declarations(&s.source))
            .collect::<Vec<_>>()
    };
    let vertex = stage_declarations(ShaderStage::Vertex);
    let fragment = stage_declarations(ShaderStage::Fragment);

    for input in fragment.iter().filter(|d| d.qualifier == Qualifier::In) {
        let output = vertex
            .iter()
            .find(|d| d.qualifier == Qualifier::Out && d.name == input.name);
        match output {
            None => {
                return Err(format!(
                    "error: fragment input '{}' has no matching vertex output",
                    input.name
                ));
            }
            Some(output) if output.ty != input.ty => {
                return Err(format!(
                    "error: type mismatch for '{}': vertex writes {}, fragment reads {}",
                    input.name, output.ty, input.ty
                ));
            }
            Some(_) => {}
        }
    }

    let mut uniforms: BTreeMap<String, String> = BTreeMap::new();
    for uniform in vertex
        .iter()
        .chain(fragment.iter())
        .filter(|d| d.qualifier == Qualifier::Uniform)
    {
        if let Some(existing) = uniforms.get(&uniform.name) {
            if *existing != uniform.ty {
                return Err(format!(
                    "error: uniform '{}' declared as both {} and {}",
                    uniform.name, existing, uniform.ty
                ));
            }
        }
        uniforms.insert(uniform.name.clone(), uniform.ty.clone());
    }
    Ok(uniforms.into_iter().collect())
}

fn accepts(ty: &str, value: &UniformValue<'_>) -> bool {
    match value {
        UniformValue::Int(_) => ty == "int" || ty == "bool" || ty.starts_with("sampler"),
        UniformValue::Float(_) => ty == "float",
        UniformValue::Vec3(_) => ty == "vec3",
        UniformValue::Mat4(_) => ty == "mat4",
    }
}

impl GraphicsApi for HeadlessGl {
    type Shader = ObjectId;
    type Program = ObjectId;
    type Texture = ObjectId;
    type VertexArray = ObjectId;
    type Buffer = ObjectId;
    type UniformLocation = HeadlessUniformLocation;

    fn create_shader(&self, stage: ShaderStage) -> Result<ObjectId, String> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let id = state.allocate("shader")?;
        state.shaders.insert(
            id,
            ShaderObject {
                stage,
                source: String::new(),
                compiled: false,
            },
        );
        Ok(id)
    }

    fn compile_shader(&self, shader: ObjectId, source: &str) -> Result<(), String> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(object) = state.shaders.get_mut(&shader) else {
            state.invalid_operation(format!("compile of unknown shader {shader:?}"));
            return Err("invalid shader object".to_string());
        };
        object.source = source.to_string();
        let result = check_glsl(source);
        object.compiled = result.is_ok();
        result
    }

    fn delete_shader(&self, shader: ObjectId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let removed = state.shaders.remove(&shader).is_some();
        state.release(shader, removed);
    }

    fn create_program(&self) -> Result<ObjectId, String> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let id = state.allocate("program")?;
        state.programs.insert(id, ProgramObject::default());
        Ok(id)
    }

    fn attach_shader(&self, program: ObjectId, shader: ObjectId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.shaders.contains_key(&shader) {
            state.invalid_operation(format!("attach of unknown shader {shader:?}"));
            return;
        }
        let Some(object) = state.programs.get_mut(&program) else {
            state.invalid_operation(format!("attach to unknown program {program:?}"));
            return;
        };
        if object.attached.contains(&shader) {
            state.invalid_operation(format!("shader {shader:?} already attached"));
        } else {
            object.attached.push(shader);
        }
    }

    fn detach_shader(&self, program: ObjectId, shader: ObjectId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let detached = state.programs.get_mut(&program).is_some_and(|object| {
            let before = object.attached.len();
            object.attached.retain(|s| *s != shader);
            object.attached.len() != before
        });
        if !detached {
            state.invalid_operation(format!("{shader:?} is not attached to {program:?}"));
        }
    }

    fn link_program(&self, program: ObjectId) -> Result<(), String> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(object) = state.programs.get(&program) else {
            state.invalid_operation(format!("link of unknown program {program:?}"));
            return Err("invalid program object".to_string());
        };
        let shaders: Vec<&ShaderObject> = object
            .attached
            .iter()
            .filter_map(|id| state.shaders.get(id))
            .collect();
        let result = link_check(&shaders);

        let Some(object) = state.programs.get_mut(&program) else {
            return Err("invalid program object".to_string());
        };
        object.values.clear();
        match result {
            Ok(uniforms) => {
                object.linked = true;
                object.uniforms = uniforms;
                Ok(())
            }
            Err(log) => {
                object.linked = false;
                object.uniforms.clear();
                Err(log)
            }
        }
    }

    fn delete_program(&self, program: ObjectId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let removed = state.programs.remove(&program).is_some();
        if removed && state.current_program == Some(program) {
            state.current_program = None;
        }
        state.release(program, removed);
    }

    fn use_program(&self, program: Option<ObjectId>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match program {
            None => state.current_program = None,
            Some(id) if state.programs.get(&id).is_some_and(|p| p.linked) => {
                state.current_program = Some(id);
            }
            Some(id) => state.invalid_operation(format!("use of unlinked program {id:?}")),
        }
    }

    fn uniform_location(&self, program: ObjectId, name: &str) -> Option<HeadlessUniformLocation> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match state.programs.get(&program) {
            Some(object) if object.linked => object
                .uniforms
                .iter()
                .position(|(n, _)| n == name)
                .map(|index| HeadlessUniformLocation { program, index }),
            _ => {
                state.invalid_operation(format!("uniform lookup on unlinked program {program:?}"));
                None
            }
        }
    }

    fn set_uniform(&self, location: &HeadlessUniformLocation, value: UniformValue<'_>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.current_program != Some(location.program) {
            state.invalid_operation(format!(
                "uniform write for {:?} while {:?} is current",
                location.program, state.current_program
            ));
            return;
        }
        let Some(object) = state.programs.get_mut(&location.program) else {
            return;
        };
        let Some((name, ty)) = object.uniforms.get(location.index) else {
            return;
        };
        if !accepts(ty, &value) {
            let message = format!("{value:?} written to {ty} uniform '{name}'");
            state.invalid_operation(message);
            return;
        }
        object.values.insert(location.index, value.into());
    }

    fn create_texture(&self) -> Result<ObjectId, String> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let id = state.allocate("texture")?;
        state.textures.insert(id, TextureObject::default());
        Ok(id)
    }

    fn delete_texture(&self, texture: ObjectId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let removed = state.textures.remove(&texture).is_some();
        state.texture_bindings.retain(|_, bound| *bound != texture);
        state.release(texture, removed);
    }

    fn active_texture(&self, unit: u32) {
        self.state.borrow_mut().active_unit = unit;
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<ObjectId>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let unit = state.active_unit;
        let Some(id) = texture else {
            state.texture_bindings.remove(&(unit, target));
            return;
        };
        let Some(object) = state.textures.get_mut(&id) else {
            state.invalid_operation(format!("bind of unknown texture {id:?}"));
            return;
        };
        match object.target {
            Some(existing) if existing != target => {
                let message = format!("{id:?} is a {existing:?} texture, bound as {target:?}");
                state.invalid_operation(message);
            }
            _ => {
                object.target = Some(target);
                state.texture_bindings.insert((unit, target), id);
            }
        }
    }

    fn tex_parameter(
        &self,
        target: TextureTarget,
        parameter: SamplerParameter,
        value: SamplerValue,
    ) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(id) = state.bound_texture(target) else {
            state.invalid_operation(format!("{parameter} set with no {target:?} texture bound"));
            return;
        };
        if let Some(object) = state.textures.get_mut(&id) {
            object.parameters.insert(parameter, value);
        }
    }

    fn tex_image_2d(&self, target: ImageTarget, image: &PixelBuffer) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(id) = state.bound_texture(target.texture_target()) else {
            state.invalid_operation(format!("image upload to {target:?} with no texture bound"));
            return;
        };
        state.uploads.push(UploadRecord {
            texture: id,
            target,
            width: image.width(),
            height: image.height(),
            format: image.format(),
        });
    }

    fn create_vertex_array(&self) -> Result<ObjectId, String> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let id = state.allocate("vertex array")?;
        state.vertex_arrays.insert(id, VertexArrayObject::default());
        Ok(id)
    }

    fn delete_vertex_array(&self, vertex_array: ObjectId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let removed = state.vertex_arrays.remove(&vertex_array).is_some();
        if state.bound_vertex_array == Some(vertex_array) {
            state.bound_vertex_array = None;
        }
        state.release(vertex_array, removed);
    }

    fn bind_vertex_array(&self, vertex_array: Option<ObjectId>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match vertex_array {
            Some(id) if !state.vertex_arrays.contains_key(&id) => {
                state.invalid_operation(format!("bind of unknown vertex array {id:?}"));
            }
            other => state.bound_vertex_array = other,
        }
    }

    fn create_buffer(&self) -> Result<ObjectId, String> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let id = state.allocate("buffer")?;
        state.buffers.insert(id, 0);
        Ok(id)
    }

    fn delete_buffer(&self, buffer: ObjectId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let removed = state.buffers.remove(&buffer).is_some();
        if state.bound_array_buffer == Some(buffer) {
            state.bound_array_buffer = None;
        }
        state.release(buffer, removed);
    }

    fn upload_vertex_data(&self, buffer: ObjectId, data: &[u8]) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match state.buffers.get_mut(&buffer) {
            Some(size) => {
                *size = data.len();
                state.bound_array_buffer = Some(buffer);
            }
            None => state.invalid_operation(format!("upload to unknown buffer {buffer:?}")),
        }
    }

    fn vertex_attrib_f32(&self, location: u32, components: i32, _stride: i32, _offset: i32) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !(1..=4).contains(&components) {
            state
                .errors
                .push(GlError::InvalidValue(format!("{components} components")));
            return;
        }
        if state.bound_array_buffer.is_none() {
            state.invalid_operation("attribute pointer with no array buffer bound");
            return;
        }
        let Some(id) = state.bound_vertex_array else {
            state.invalid_operation("attribute pointer with no vertex array bound");
            return;
        };
        if let Some(object) = state.vertex_arrays.get_mut(&id) {
            object.attributes.push(location);
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if width < 0 || height < 0 {
            state
                .errors
                .push(GlError::InvalidValue(format!("viewport {width}x{height}")));
            return;
        }
        state.viewport = (x, y, width, height);
    }

    fn enable_depth_test(&self) {
        self.state.borrow_mut().depth_test = true;
    }

    fn clear_color_depth(&self) {
        self.state.borrow_mut().clears += 1;
    }

    fn draw_triangles(&self, first: i32, count: i32) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let Some(program) = state.current_program else {
            state.invalid_operation("draw with no current program");
            return;
        };
        let Some(vertex_array) = state.bound_vertex_array else {
            state.invalid_operation("draw with no vertex array bound");
            return;
        };
        let has_position = state
            .vertex_arrays
            .get(&vertex_array)
            .is_some_and(|vao| vao.attributes.contains(&0));
        if !has_position {
            state.invalid_operation("draw with attribute 0 disabled");
            return;
        }
        if first < 0 || count < 0 {
            state
                .errors
                .push(GlError::InvalidValue(format!("draw range {first}+{count}")));
            return;
        }
        let textures = state
            .texture_bindings
            .iter()
            .map(|(&(unit, target), &id)| (unit, target, id))
            .collect();
        let depth_test = state.depth_test;
        state.draws.push(DrawCall {
            program,
            vertex_array,
            first,
            count,
            textures,
            depth_test,
        });
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    const VERTEX: &str = "#version 330 core
layout(location = 0) in vec3 a_position;
uniform mat4 model;
out vec3 v_position;
void main() {
    v_position = a_position;
    gl_Position = model * vec4(a_position, 1.0);
}
";

    const FRAGMENT: &str = "#version 330 core
in vec3 v_position;
uniform vec3 color;
out vec4 frag_color;
void main() {
    frag_color = vec4(color * v_position, 1.0);
}
";

    #[fixture]
    fn gl() -> HeadlessGl {
        HeadlessGl::new()
    }

    fn linked_program(gl: &HeadlessGl, vertex: &str, fragment: &str) -> Result<ObjectId, String> {
        let program = gl.create_program()?;
        for (stage, source) in [(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)] {
            let shader = gl.create_shader(stage)?;
            gl.compile_shader(shader, source)?;
            gl.attach_shader(program, shader);
        }
        gl.link_program(program)?;
        Ok(program)
    }

    #[rstest]
    fn declarations_skip_layout_and_precision() {
        let found =
            declarations("layout(location = 0) in highp vec3 a_position;\nflat out int id;");
        assert_eq!(
            found,
            vec![
                Declaration {
                    qualifier: Qualifier::In,
                    ty: "vec3".to_string(),
                    name: "a_position".to_string()
                },
                Declaration {
                    qualifier: Qualifier::Out,
                    ty: "int".to_string(),
                    name: "id".to_string()
                },
            ]
        );
    }

    #[rstest]
    #[case("void main() { gl_Position = vec4(0.0); ", "unexpected end of file")]
    #[case("void helper() {}", "'main' : function not defined")]
    #[case("#error unsupported\nvoid main() {}", "unsupported")]
    #[case("void main() { } }", "unexpected token")]
    fn compile_reports_info_log(gl: HeadlessGl, #[case] source: &str, #[case] expected: &str) {
        let shader = gl.create_shader(ShaderStage::Vertex).unwrap();
        let log = gl.compile_shader(shader, source).unwrap_err();
        assert!(log.contains(expected), "{log}");
    }

    #[rstest]
    fn link_collects_active_uniforms(gl: HeadlessGl) {
        let program = linked_program(&gl, VERTEX, FRAGMENT).unwrap();
        assert!(gl.uniform_location(program, "model").is_some());
        assert!(gl.uniform_location(program, "color").is_some());
        assert!(gl.uniform_location(program, "missing").is_none());
        assert!(gl.errors().is_empty());
    }

    #[rstest]
    fn link_rejects_unmatched_varying(gl: HeadlessGl) {
        let fragment = FRAGMENT.replace("in vec3 v_position;", "in vec3 v_normal;");
        let fragment = fragment.replace("* v_position", "* v_normal");
        let log = linked_program(&gl, VERTEX, &fragment).unwrap_err();
        assert!(log.contains("'v_normal' has no matching vertex output"), "{log}");
    }

    #[rstest]
    fn link_requires_both_stages(gl: HeadlessGl) {
        let program = gl.create_program().unwrap();
        let shader = gl.create_shader(ShaderStage::Vertex).unwrap();
        gl.compile_shader(shader, VERTEX).unwrap();
        gl.attach_shader(program, shader);
        let log = gl.link_program(program).unwrap_err();
        assert_eq!(log, "error: no fragment shader attached");
    }

    #[rstest]
    fn uniform_write_checks_type_and_current_program(gl: HeadlessGl) {
        let program = linked_program(&gl, VERTEX, FRAGMENT).unwrap();
        let color = gl.uniform_location(program, "color").unwrap();

        gl.set_uniform(&color, UniformValue::Vec3([1.0, 0.0, 0.0]));
        assert_eq!(gl.errors().len(), 1);

        gl.use_program(Some(program));
        gl.set_uniform(&color, UniformValue::Int(1));
        assert_eq!(gl.errors().len(), 2);

        gl.set_uniform(&color, UniformValue::Vec3([1.0, 0.0, 0.0]));
        assert_eq!(
            gl.uniform_value(program, "color"),
            Some(UniformData::Vec3([1.0, 0.0, 0.0]))
        );
    }

    #[rstest]
    fn double_delete_is_counted(gl: HeadlessGl) {
        let texture = gl.create_texture().unwrap();
        gl.delete_texture(texture);
        assert_eq!(gl.redundant_deletes(), 0);
        gl.delete_texture(texture);
        assert_eq!(gl.redundant_deletes(), 1);
    }

    #[rstest]
    fn out_of_memory_fails_creation(gl: HeadlessGl) {
        gl.set_out_of_memory(true);
        assert!(gl.create_texture().is_err());
        assert!(gl.create_program().is_err());
        gl.set_out_of_memory(false);
        assert!(gl.create_program().is_ok());
    }

    #[rstest]
    fn texture_target_is_fixed_by_first_bind(gl: HeadlessGl) {
        let texture = gl.create_texture().unwrap();
        gl.bind_texture(TextureTarget::CubeMap, Some(texture));
        gl.bind_texture(TextureTarget::Texture2D, Some(texture));
        assert_eq!(gl.errors().len(), 1);
        assert_eq!(gl.bound_texture(0, TextureTarget::Texture2D), None);
    }

    #[rstest]
    fn clear_records_keeps_objects(gl: HeadlessGl) {
        let texture = gl.create_texture().unwrap();
        gl.bind_texture(TextureTarget::Texture2D, Some(texture));
        let pixels = PixelBuffer::filled(1, 1, PixelFormat::Rgba8, &[0, 0, 0, 255]).unwrap();
        gl.tex_image_2d(ImageTarget::Texture2D, &pixels);
        gl.draw_triangles(0, 3);
        assert_eq!(gl.uploads().len(), 1);
        assert_eq!(gl.errors().len(), 1);

        gl.clear_records();
        assert!(gl.uploads().is_empty());
        assert!(gl.draw_calls().is_empty());
        assert!(gl.errors().is_empty());
        assert_eq!(gl.live_textures(), 1);
        assert_eq!(gl.bound_texture(0, TextureTarget::Texture2D), Some(texture));
    }
}
