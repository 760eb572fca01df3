use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
    render::{
        render_loop::{DEFAULT_CUBE_SAMPLER, DEFAULT_PROGRAM},
        texture::{CubeFace, SamplerSettings, TextureError, parse_sampler_settings},
    },
    scene::{SceneError, SceneState},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid scene: {0}")]
    Scene(#[from] SceneError),
    #[error("invalid sampler: {0}")]
    Sampler(#[from] TextureError),
    #[error("expected 6 cube face paths, got {0}")]
    FaceCount(usize),
    #[error("program name must not be empty")]
    EmptyProgramName,
}

/// Viewer settings, read from JSON. Every field is optional.
///
/// ```json
/// {
///   "scene": { "fov": 60.0, "use_color": false },
///   "sampler": { "TEXTURE_MIN_FILTER": "NEAREST" },
///   "faces": ["px.png", "nx.png", "py.png", "ny.png", "pz.png", "nz.png"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub scene: SceneState,
    /// GL parameter name to GL value name, applied to the cube map.
    pub sampler: BTreeMap<String, String>,
    /// Cube face images in +X, -X, +Y, -Y, +Z, -Z order.
    pub faces: Vec<PathBuf>,
    pub program: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scene: SceneState::default(),
            sampler: DEFAULT_CUBE_SAMPLER
                .iter()
                .map(|(parameter, value)| (parameter.to_string(), value.to_string()))
                .collect(),
            faces: Vec::new(),
            program: DEFAULT_PROGRAM.to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let config = Self::from_json_str(&json)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scene.validate()?;
        self.sampler_settings()?;
        if !self.faces.is_empty() && self.faces.len() != CubeFace::ALL.len() {
            return Err(ConfigError::FaceCount(self.faces.len()));
        }
        if self.program.is_empty() {
            return Err(ConfigError::EmptyProgramName);
        }
        Ok(())
    }

    pub fn sampler_settings(&self) -> Result<SamplerSettings, ConfigError> {
        Ok(parse_sampler_settings(&self.sampler)?)
    }

    /// Face paths paired with their face, empty when no faces are configured.
    pub fn face_paths(&self) -> Vec<(CubeFace, &Path)> {
        CubeFace::ALL
            .into_iter()
            .zip(self.faces.iter().map(PathBuf::as_path))
            .collect()
    }
}
