pub mod state;

pub use state::{SceneError, SceneState};
