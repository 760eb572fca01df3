use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const MIN_FOV: f32 = 1.0;
pub const MAX_FOV: f32 = 90.0;
/// Degrees of field of view per unit of wheel delta.
pub const WHEEL_FOV_SCALE: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("invalid colour '{0}', expected #rrggbb")]
    InvalidColor(String),
    #[error("invalid clip planes near={near} far={far}, expected 0 < near < far")]
    InvalidClipPlanes { near: f32, far: f32 },
    #[error("invalid viewport {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },
    #[error("field of view {0} is outside [1, 90]")]
    InvalidFov(f32),
}

/// Everything the frame reads that input can change.
///
/// Fields are only written through the setters below, which keep the
/// invariants (positive viewport, clamped fov, `0 < near < far`, colour in
/// `[0, 1]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneState {
    width: u32,
    height: u32,
    /// Degrees.
    fov: f32,
    near: f32,
    far: f32,
    color: [f32; 3],
    /// Solid colour when set, cube map otherwise.
    use_color: bool,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fov: 45.0,
            near: 0.1,
            far: 100.0,
            color: [0.0, 0.0, 0.0],
            use_color: true,
        }
    }
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Checks a state that did not come through the setters, e.g. one
    /// deserialized from a config file.
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.width == 0 || self.height == 0 {
            return Err(SceneError::InvalidViewport {
                width: self.width,
                height: self.height,
            });
        }
        if !(MIN_FOV..=MAX_FOV).contains(&self.fov) {
            return Err(SceneError::InvalidFov(self.fov));
        }
        check_clip_planes(self.near, self.far)?;
        if self.color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(SceneError::InvalidColor(format!("{:?}", self.color)));
        }
        Ok(())
    }

    /// Stores a new viewport size. Zero-sized viewports (minimised windows)
    /// are ignored. Returns whether the size changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            warn!("Ignoring resize to {}x{}", width, height);
            return false;
        }
        if (width, height) == (self.width, self.height) {
            return false;
        }
        debug!("Viewport resized to {}x{}", width, height);
        self.width = width;
        self.height = height;
        true
    }

    /// Adds `delta` degrees to the field of view, clamped to
    /// [`MIN_FOV`]..=[`MAX_FOV`].
    pub fn apply_fov_delta(&mut self, delta: f32) {
        if !delta.is_finite() {
            warn!("Ignoring non-finite fov delta {}", delta);
            return;
        }
        self.fov = (self.fov + delta).clamp(MIN_FOV, MAX_FOV);
    }

    /// Maps a mouse wheel delta onto the field of view:
    /// `fov -= delta_y * 0.01`.
    pub fn apply_wheel(&mut self, delta_y: f32) {
        self.apply_fov_delta(-delta_y * WHEEL_FOV_SCALE);
    }

    pub fn set_fov(&mut self, fov: f32) {
        if fov.is_finite() {
            self.fov = fov.clamp(MIN_FOV, MAX_FOV);
        }
    }

    pub fn set_color(&mut self, color: [f32; 3]) {
        self.color = color.map(|c| if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) });
    }

    /// Parses the colour picker's `#rrggbb` format.
    pub fn set_color_hex(&mut self, hex: &str) -> Result<(), SceneError> {
        let invalid = || SceneError::InvalidColor(hex.to_string());
        let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut color = [0.0; 3];
        for (channel, value) in color.iter_mut().enumerate() {
            let pair = &digits[channel * 2..channel * 2 + 2];
            let byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
            *value = f32::from(byte) / 255.0;
        }
        self.color = color;
        Ok(())
    }

    pub fn set_use_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    pub fn toggle_use_color(&mut self) -> bool {
        self.use_color = !self.use_color;
        self.use_color
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) -> Result<(), SceneError> {
        check_clip_planes(near, far)?;
        self.near = near;
        self.far = far;
        Ok(())
    }
}

fn check_clip_planes(near: f32, far: f32) -> Result<(), SceneError> {
    // Also rejects NaN.
    if near > 0.0 && far > near && far.is_finite() {
        Ok(())
    } else {
        Err(SceneError::InvalidClipPlanes { near, far })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults() {
        let scene = SceneState::default();
        assert_eq!((scene.width(), scene.height()), (800, 600));
        assert_eq!(scene.fov(), 45.0);
        assert_eq!((scene.near(), scene.far()), (0.1, 100.0));
        assert_eq!(scene.color(), [0.0, 0.0, 0.0]);
        assert!(scene.use_color());
        assert_eq!(scene.validate(), Ok(()));
    }

    #[rstest]
    #[case(10000.0, 90.0)]
    #[case(-10000.0, 1.0)]
    #[case(5.0, 50.0)]
    #[case(f32::INFINITY, 45.0)]
    #[case(f32::NAN, 45.0)]
    fn fov_delta_is_clamped(#[case] delta: f32, #[case] expected: f32) {
        let mut scene = SceneState::default();
        scene.apply_fov_delta(delta);
        assert_eq!(scene.fov(), expected);
    }

    #[rstest]
    #[case(100.0, 44.0)]
    #[case(-100.0, 46.0)]
    #[case(1_000_000.0, 1.0)]
    fn wheel_moves_fov_against_scroll(#[case] delta_y: f32, #[case] expected: f32) {
        let mut scene = SceneState::default();
        scene.apply_wheel(delta_y);
        assert!((scene.fov() - expected).abs() < 1e-4, "{}", scene.fov());
    }

    #[rstest]
    fn resize_ignores_zero_and_unchanged_sizes() {
        let mut scene = SceneState::default();
        assert!(!scene.resize(0, 600));
        assert!(!scene.resize(800, 600));
        assert!(scene.resize(1920, 1080));
        assert_eq!(scene.aspect(), 1920.0 / 1080.0);
    }

    #[rstest]
    #[case("#ff0000", [1.0, 0.0, 0.0])]
    #[case("#00FF80", [0.0, 1.0, 128.0 / 255.0])]
    #[case("#000000", [0.0, 0.0, 0.0])]
    fn color_hex_parses(#[case] hex: &str, #[case] expected: [f32; 3]) {
        let mut scene = SceneState::default();
        scene.set_color_hex(hex).unwrap();
        assert_eq!(scene.color(), expected);
    }

    #[rstest]
    #[case("ff0000")]
    #[case("#ff00")]
    #[case("#gg0000")]
    #[case("#+f0000")]
    #[case("#ff00000")]
    fn color_hex_rejects_malformed(#[case] hex: &str) {
        let mut scene = SceneState::default();
        scene.set_color([0.2, 0.4, 0.6]);
        assert_eq!(
            scene.set_color_hex(hex),
            Err(SceneError::InvalidColor(hex.to_string()))
        );
        assert_eq!(scene.color(), [0.2, 0.4, 0.6]);
    }

    #[rstest]
    fn set_color_clamps_components() {
        let mut scene = SceneState::default();
        scene.set_color([-1.0, 0.5, 3.0]);
        assert_eq!(scene.color(), [0.0, 0.5, 1.0]);
    }

    #[rstest]
    fn toggle_flips_mode() {
        let mut scene = SceneState::default();
        assert!(!scene.toggle_use_color());
        assert!(scene.toggle_use_color());
        scene.set_use_color(false);
        assert!(!scene.use_color());
    }

    #[rstest]
    #[case(0.0, 100.0)]
    #[case(-1.0, 100.0)]
    #[case(10.0, 10.0)]
    #[case(10.0, 1.0)]
    #[case(f32::NAN, 100.0)]
    fn clip_planes_must_be_ordered(#[case] near: f32, #[case] far: f32) {
        let mut scene = SceneState::default();
        assert!(matches!(
            scene.set_clip_planes(near, far),
            Err(SceneError::InvalidClipPlanes { .. })
        ));
        assert_eq!((scene.near(), scene.far()), (0.1, 100.0));
    }

    #[rstest]
    fn partial_json_takes_defaults() {
        let scene: SceneState =
            serde_json::from_str(r#"{ "fov": 60.0, "use_color": false }"#).unwrap();
        assert_eq!(scene.fov(), 60.0);
        assert!(!scene.use_color());
        assert_eq!(scene.width(), 800);
    }

    #[rstest]
    fn validate_rejects_bad_deserialized_state() {
        let scene: SceneState = serde_json::from_str(r#"{ "near": 5.0, "far": 1.0 }"#).unwrap();
        assert_eq!(
            scene.validate(),
            Err(SceneError::InvalidClipPlanes {
                near: 5.0,
                far: 1.0
            })
        );
        let scene: SceneState = serde_json::from_str(r#"{ "fov": 120.0 }"#).unwrap();
        assert_eq!(scene.validate(), Err(SceneError::InvalidFov(120.0)));
    }
}
