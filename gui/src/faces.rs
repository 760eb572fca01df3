use std::{
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, unbounded};
use cubemap_rs::render::{CubeFace, PixelBuffer, PixelFormat};
use tracing::{debug, error};

pub type LoadedFace = (CubeFace, Result<PixelBuffer>);

/// Decodes each face on its own thread. Results arrive in completion order;
/// the channel disconnects once every loader has finished.
pub fn spawn_loaders(faces: Vec<(CubeFace, PathBuf)>) -> Receiver<LoadedFace> {
    let (sender, receiver) = unbounded();
    for (face, path) in faces {
        let sender = sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("face-loader {face}"))
            .spawn(move || {
                let result = decode(&path);
                if let Err(err) = &result {
                    error!("Failed to load cube face {}: {:#}", face, err);
                }
                // The receiver is gone when the window closed mid-load.
                let _ = sender.send((face, result));
            });
        if let Err(err) = spawned {
            error!("Failed to start loader for cube face {}: {}", face, err);
        }
    }
    receiver
}

pub fn decode(path: &Path) -> Result<PixelBuffer> {
    let image = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    debug!("Decoded {} ({}x{})", path.display(), width, height);
    Ok(PixelBuffer::new(
        width,
        height,
        PixelFormat::Rgba8,
        image.into_raw(),
    )?)
}
