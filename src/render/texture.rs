use std::{collections::BTreeMap, fmt, str::FromStr};

use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::{debug, trace};

use crate::gl::{GraphicsApi, ImageTarget, TextureTarget};

/// Cube map faces in upload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum CubeFace {
    #[strum(serialize = "+X")]
    PositiveX,
    #[strum(serialize = "-X")]
    NegativeX,
    #[strum(serialize = "+Y")]
    PositiveY,
    #[strum(serialize = "-Y")]
    NegativeY,
    #[strum(serialize = "+Z")]
    PositiveZ,
    #[strum(serialize = "-Z")]
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Decoded, tightly packed 8-bit pixel rows, top row first.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize * format.channels();
        if width == 0 || height == 0 || data.len() != expected {
            return Err(TextureError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A buffer where every pixel has the same value. `pixel` must hold one
    /// byte per channel of `format`.
    pub fn filled(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixel: &[u8],
    ) -> Result<Self, TextureError> {
        let data = pixel.repeat(width as usize * height as usize);
        Self::new(width, height, format, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Sampler state that can be set on a texture, named as in GL.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, IntoStaticStr, Display,
)]
pub enum SamplerParameter {
    #[strum(serialize = "TEXTURE_MIN_FILTER")]
    MinFilter,
    #[strum(serialize = "TEXTURE_MAG_FILTER")]
    MagFilter,
    #[strum(serialize = "TEXTURE_WRAP_S")]
    WrapS,
    #[strum(serialize = "TEXTURE_WRAP_T")]
    WrapT,
    #[strum(serialize = "TEXTURE_WRAP_R")]
    WrapR,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display)]
pub enum SamplerValue {
    #[strum(serialize = "NEAREST")]
    Nearest,
    #[strum(serialize = "LINEAR")]
    Linear,
    #[strum(serialize = "NEAREST_MIPMAP_NEAREST")]
    NearestMipmapNearest,
    #[strum(serialize = "LINEAR_MIPMAP_NEAREST")]
    LinearMipmapNearest,
    #[strum(serialize = "NEAREST_MIPMAP_LINEAR")]
    NearestMipmapLinear,
    #[strum(serialize = "LINEAR_MIPMAP_LINEAR")]
    LinearMipmapLinear,
    #[strum(serialize = "CLAMP_TO_EDGE")]
    ClampToEdge,
    #[strum(serialize = "REPEAT")]
    Repeat,
    #[strum(serialize = "MIRRORED_REPEAT")]
    MirroredRepeat,
}

impl SamplerParameter {
    /// Whether GL accepts `value` for this parameter.
    pub fn accepts(self, value: SamplerValue) -> bool {
        use SamplerValue::*;
        match self {
            SamplerParameter::MagFilter => matches!(value, Nearest | Linear),
            SamplerParameter::MinFilter => matches!(
                value,
                Nearest
                    | Linear
                    | NearestMipmapNearest
                    | LinearMipmapNearest
                    | NearestMipmapLinear
                    | LinearMipmapLinear
            ),
            SamplerParameter::WrapS | SamplerParameter::WrapT | SamplerParameter::WrapR => {
                matches!(value, ClampToEdge | Repeat | MirroredRepeat)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextureError {
    #[error("failed to create texture object: {0}")]
    Allocation(String),
    #[error("unknown sampler parameter '{0}'")]
    InvalidParameter(String),
    #[error("'{value}' is not a valid value for {parameter}")]
    InvalidValue { parameter: String, value: String },
    #[error("{width}x{height} image needs {expected} bytes, got {actual}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("cube face {face} must be square, got {width}x{height}")]
    NonSquareFace {
        face: CubeFace,
        width: u32,
        height: u32,
    },
    #[error("cube face {face} is {actual}px but the other faces are {expected}px")]
    FaceSizeMismatch {
        face: CubeFace,
        expected: u32,
        actual: u32,
    },
    #[error("cube face {face} is {actual:?} but the other faces are {expected:?}")]
    FaceFormatMismatch {
        face: CubeFace,
        expected: PixelFormat,
        actual: PixelFormat,
    },
    #[error("2D textures take RGBA8 pixels, got {0:?}")]
    NotRgba(PixelFormat),
    #[error("texture has been disposed")]
    Disposed,
}

pub type SamplerSettings = Vec<(SamplerParameter, SamplerValue)>;

/// Resolves parameter names to [`SamplerParameter`]s and checks every value
/// against its parameter. Nothing is applied unless the whole set is valid.
pub fn resolve_sampler_params<'a, I>(params: I) -> Result<SamplerSettings, TextureError>
where
    I: IntoIterator<Item = (&'a str, SamplerValue)>,
{
    params
        .into_iter()
        .map(|(name, value)| {
            let parameter = SamplerParameter::from_str(name)
                .map_err(|_| TextureError::InvalidParameter(name.to_string()))?;
            if !parameter.accepts(value) {
                return Err(TextureError::InvalidValue {
                    parameter: parameter.to_string(),
                    value: value.to_string(),
                });
            }
            Ok((parameter, value))
        })
        .collect()
}

/// Parses a name → value map as found in configuration files.
pub fn parse_sampler_settings(
    settings: &BTreeMap<String, String>,
) -> Result<SamplerSettings, TextureError> {
    let mut resolved = Vec::with_capacity(settings.len());
    for (name, value) in settings {
        let parsed = SamplerValue::from_str(value).map_err(|_| TextureError::InvalidValue {
            parameter: name.clone(),
            value: value.clone(),
        })?;
        resolved.push((name.as_str(), parsed));
    }
    resolve_sampler_params(resolved)
}

/// GL texture object shared by the 2D and cube map wrappers.
struct TextureObject<G: GraphicsApi> {
    handle: Option<G::Texture>,
    target: TextureTarget,
    unit: u32,
}

impl<G: GraphicsApi> TextureObject<G> {
    fn new(gl: &G, target: TextureTarget) -> Result<Self, TextureError> {
        let handle = gl.create_texture().map_err(TextureError::Allocation)?;
        Ok(Self {
            handle: Some(handle),
            target,
            unit: 0,
        })
    }

    fn handle(&self) -> Result<G::Texture, TextureError> {
        self.handle.ok_or(TextureError::Disposed)
    }

    fn bind(&mut self, gl: &G, unit: u32) -> Result<(), TextureError> {
        let handle = self.handle()?;
        gl.active_texture(unit);
        gl.bind_texture(self.target, Some(handle));
        self.unit = unit;
        Ok(())
    }

    /// Re-binds on the last used unit so the following call hits this texture.
    fn bind_current(&mut self, gl: &G) -> Result<(), TextureError> {
        self.bind(gl, self.unit)
    }

    fn configure<'a, I>(&mut self, gl: &G, params: I) -> Result<(), TextureError>
    where
        I: IntoIterator<Item = (&'a str, SamplerValue)>,
    {
        let resolved = resolve_sampler_params(params)?;
        self.apply(gl, &resolved)
    }

    fn apply(
        &mut self,
        gl: &G,
        settings: &[(SamplerParameter, SamplerValue)],
    ) -> Result<(), TextureError> {
        self.bind_current(gl)?;
        for &(parameter, value) in settings {
            trace!("{:?} texture: {} = {}", self.target, parameter, value);
            gl.tex_parameter(self.target, parameter, value);
        }
        Ok(())
    }

    fn dispose(&mut self, gl: &G) {
        match self.handle.take() {
            Some(handle) => gl.delete_texture(handle),
            None => debug!("{:?} texture already disposed", self.target),
        }
    }
}

pub struct Texture2D<G: GraphicsApi> {
    object: TextureObject<G>,
    size: Option<(u32, u32)>,
}

impl<G: GraphicsApi> Texture2D<G> {
    pub fn new(gl: &G) -> Result<Self, TextureError> {
        Ok(Self {
            object: TextureObject::new(gl, TextureTarget::Texture2D)?,
            size: None,
        })
    }

    /// Activates texture unit `unit` and binds this texture to it.
    pub fn bind(&mut self, gl: &G, unit: u32) -> Result<(), TextureError> {
        self.object.bind(gl, unit)
    }

    pub fn configure<'a, I>(&mut self, gl: &G, params: I) -> Result<(), TextureError>
    where
        I: IntoIterator<Item = (&'a str, SamplerValue)>,
    {
        self.object.configure(gl, params)
    }

    pub fn apply_sampler(
        &mut self,
        gl: &G,
        settings: &[(SamplerParameter, SamplerValue)],
    ) -> Result<(), TextureError> {
        self.object.apply(gl, settings)
    }

    /// Replaces the texture contents with `image`, which must be RGBA8.
    pub fn upload(&mut self, gl: &G, image: &PixelBuffer) -> Result<(), TextureError> {
        if image.format() != PixelFormat::Rgba8 {
            return Err(TextureError::NotRgba(image.format()));
        }
        self.object.bind_current(gl)?;
        gl.tex_image_2d(ImageTarget::Texture2D, image);
        self.size = Some((image.width(), image.height()));
        debug!("uploaded {}x{} 2D texture", image.width(), image.height());
        Ok(())
    }

    /// Size of the last upload.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn unit(&self) -> u32 {
        self.object.unit
    }

    pub fn is_disposed(&self) -> bool {
        self.object.handle.is_none()
    }

    pub fn dispose(&mut self, gl: &G) {
        self.object.dispose(gl);
        self.size = None;
    }
}

/// Cube map texture. Sampling is only defined once all six faces are present,
/// see [`CubeTexture::is_complete`].
pub struct CubeTexture<G: GraphicsApi> {
    object: TextureObject<G>,
    uploaded: [bool; 6],
    face_size: Option<u32>,
    face_format: Option<PixelFormat>,
}

impl<G: GraphicsApi> CubeTexture<G> {
    pub fn new(gl: &G) -> Result<Self, TextureError> {
        Ok(Self {
            object: TextureObject::new(gl, TextureTarget::CubeMap)?,
            uploaded: [false; 6],
            face_size: None,
            face_format: None,
        })
    }

    pub fn bind(&mut self, gl: &G, unit: u32) -> Result<(), TextureError> {
        self.object.bind(gl, unit)
    }

    pub fn configure<'a, I>(&mut self, gl: &G, params: I) -> Result<(), TextureError>
    where
        I: IntoIterator<Item = (&'a str, SamplerValue)>,
    {
        self.object.configure(gl, params)
    }

    pub fn apply_sampler(
        &mut self,
        gl: &G,
        settings: &[(SamplerParameter, SamplerValue)],
    ) -> Result<(), TextureError> {
        self.object.apply(gl, settings)
    }

    fn check_square(face: CubeFace, image: &PixelBuffer) -> Result<u32, TextureError> {
        if image.width() != image.height() {
            return Err(TextureError::NonSquareFace {
                face,
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(image.width())
    }

    /// Checks `image` against the size and format shared by the other faces.
    fn check_matches(
        face: CubeFace,
        image: &PixelBuffer,
        expected_size: u32,
        expected_format: PixelFormat,
    ) -> Result<(), TextureError> {
        if image.width() != expected_size {
            return Err(TextureError::FaceSizeMismatch {
                face,
                expected: expected_size,
                actual: image.width(),
            });
        }
        if image.format() != expected_format {
            return Err(TextureError::FaceFormatMismatch {
                face,
                expected: expected_format,
                actual: image.format(),
            });
        }
        Ok(())
    }

    /// Uploads a single face. Every face must share one square size and one
    /// pixel format, otherwise GL treats the cube map as incomplete.
    pub fn upload_face(
        &mut self,
        gl: &G,
        face: CubeFace,
        image: &PixelBuffer,
    ) -> Result<(), TextureError> {
        self.object.handle()?;
        let size = Self::check_square(face, image)?;
        let others_uploaded = CubeFace::ALL
            .iter()
            .any(|other| *other != face && self.uploaded[other.index()]);
        if let (true, Some(expected_size), Some(expected_format)) =
            (others_uploaded, self.face_size, self.face_format)
        {
            Self::check_matches(face, image, expected_size, expected_format)?;
        }

        self.object.bind_current(gl)?;
        gl.tex_image_2d(ImageTarget::CubeFace(face), image);
        self.uploaded[face.index()] = true;
        self.face_size = Some(size);
        self.face_format = Some(image.format());
        debug!(
            "uploaded cube face {} ({}px), {}/6 present",
            face,
            size,
            self.uploaded_faces().len()
        );
        Ok(())
    }

    /// Uploads all six faces, given in [`CubeFace::ALL`] order. The set is
    /// validated before anything is sent to the GPU.
    pub fn upload_faces(
        &mut self,
        gl: &G,
        images: &[PixelBuffer; 6],
    ) -> Result<(), TextureError> {
        self.object.handle()?;
        let mut expected = None;
        for (face, image) in CubeFace::ALL.into_iter().zip(images) {
            let size = Self::check_square(face, image)?;
            match expected {
                None => expected = Some((size, image.format())),
                Some((size, format)) => Self::check_matches(face, image, size, format)?,
            }
        }

        self.uploaded = [false; 6];
        self.face_size = None;
        self.face_format = None;
        for (face, image) in CubeFace::ALL.into_iter().zip(images) {
            self.upload_face(gl, face, image)?;
        }
        Ok(())
    }

    pub fn is_uploaded(&self, face: CubeFace) -> bool {
        self.uploaded[face.index()]
    }

    pub fn uploaded_faces(&self) -> Vec<CubeFace> {
        CubeFace::ALL
            .into_iter()
            .filter(|face| self.is_uploaded(*face))
            .collect()
    }

    /// True once every face holds an image and the texture is still alive.
    pub fn is_complete(&self) -> bool {
        self.object.handle.is_some() && self.uploaded.iter().all(|uploaded| *uploaded)
    }

    pub fn face_size(&self) -> Option<u32> {
        self.face_size
    }

    pub fn unit(&self) -> u32 {
        self.object.unit
    }

    pub fn is_disposed(&self) -> bool {
        self.object.handle.is_none()
    }

    pub fn dispose(&mut self, gl: &G) {
        self.object.dispose(gl);
        self.uploaded = [false; 6];
        self.face_size = None;
        self.face_format = None;
    }
}

/// Collects cube faces that arrive one at a time, in any order.
#[derive(Debug, Default)]
pub struct CubeFaceSet {
    faces: [Option<PixelBuffer>; 6],
}

impl CubeFaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `image` for `face`, returning the image it replaced.
    pub fn insert(&mut self, face: CubeFace, image: PixelBuffer) -> Option<PixelBuffer> {
        self.faces[face.index()].replace(image)
    }

    pub fn contains(&self, face: CubeFace) -> bool {
        self.faces[face.index()].is_some()
    }

    pub fn len(&self) -> usize {
        self.faces.iter().filter(|face| face.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.len() == CubeFace::ALL.len()
    }

    pub fn missing(&self) -> Vec<CubeFace> {
        CubeFace::ALL
            .into_iter()
            .filter(|face| !self.contains(*face))
            .collect()
    }

    /// Hands out the six faces in upload order once all have arrived, leaving
    /// the set empty. An incomplete set is left untouched.
    pub fn take_complete(&mut self) -> Option<[PixelBuffer; 6]> {
        if !self.is_complete() {
            return None;
        }
        match std::mem::take(&mut self.faces) {
            [Some(px), Some(nx), Some(py), Some(ny), Some(pz), Some(nz)] => {
                Some([px, nx, py, ny, pz, nz])
            }
            faces => {
                self.faces = faces;
                None
            }
        }
    }
}
