pub mod frame;
pub mod mesh;
pub mod program;
pub mod registry;
pub mod render_loop;
pub mod texture;

pub use frame::FrameTransforms;
pub use mesh::CubeMesh;
pub use program::{GpuProgram, ProgramError, ProgramStatus};
pub use registry::ProgramRegistry;
pub use render_loop::{FrameOutcome, FrameScheduler, LoopPhase, RenderLoop, SkipReason};
pub use texture::{CubeFace, CubeFaceSet, CubeTexture, PixelBuffer, PixelFormat, Texture2D};

pub const CUBE_VERTEX_SHADER: &str = include_str!("shaders/cube.vert");
pub const CUBE_FRAGMENT_SHADER: &str = include_str!("shaders/cube.frag");
