use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cubemap_rs::{config::ViewerConfig, render::CubeFace};

#[derive(Parser, Debug)]
#[command(
    name = "cubemap_gui",
    version,
    about = "Rotating cube, drawn in a solid colour or with a cube map"
)]
pub struct Cli {
    /// JSON viewer config. Flags below override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Cube face image, repeated six times in +X, -X, +Y, -Y, +Z, -Z order.
    #[arg(long = "face", value_name = "PATH")]
    pub faces: Vec<PathBuf>,

    /// Initial solid colour as `#rrggbb`.
    #[arg(long, value_name = "HEX")]
    pub color: Option<String>,

    /// Log filter, e.g. `debug` or `cubemap_rs=trace`. `RUST_LOG` wins when set.
    #[arg(long, value_name = "FILTER", default_value = "info")]
    pub log_level: String,

    /// Present as fast as possible instead of waiting for vblank.
    #[arg(long)]
    pub no_vsync: bool,
}

impl Cli {
    /// The config file (or the defaults) with the command line applied on top.
    pub fn viewer_config(&self) -> Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => ViewerConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ViewerConfig::default(),
        };

        if !self.faces.is_empty() {
            if self.faces.len() != CubeFace::ALL.len() {
                bail!(
                    "--face must be given {} times, got {}",
                    CubeFace::ALL.len(),
                    self.faces.len()
                );
            }
            config.faces = self.faces.clone();
        }
        if let Some(color) = &self.color {
            config
                .scene
                .set_color_hex(color)
                .context("parsing --color")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn vsync(&self) -> bool {
        !self.no_vsync
    }
}
