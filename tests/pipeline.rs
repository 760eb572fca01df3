extern crate cubemap_rs;

#[cfg(test)]
mod tests {
    use cubemap_rs::gl::headless::{GlError, UniformData};
    use cubemap_rs::gl::{HeadlessGl, ShaderStage};
    use cubemap_rs::render::render_loop::DEFAULT_PROGRAM;
    use cubemap_rs::render::*;
    use cubemap_rs::scene::SceneState;
    use rstest::{fixture, rstest};

    struct Refresh {
        requested: usize,
    }

    impl FrameScheduler for Refresh {
        fn request_frame(&mut self) {
            self.requested += 1;
        }
    }

    #[fixture]
    fn gl() -> HeadlessGl {
        // Ignore the error when another test already installed it.
        let _ = tracing_subscriber::fmt()
            .with_env_filter("cubemap_rs=debug")
            .with_test_writer()
            .try_init();
        HeadlessGl::new()
    }

    #[rstest]
    fn test_basic_program_draws_solid_colour(gl: HeadlessGl) {
        let mut registry = ProgramRegistry::new();
        let program = registry.create(&gl, "basic", CUBE_VERTEX_SHADER, CUBE_FRAGMENT_SHADER);
        assert!(program.is_usable());

        program.use_program(&gl).unwrap();
        program.set_uniform_vec3(&gl, "color", [1.0, 0.0, 0.0]);

        let mesh = CubeMesh::new(&gl).unwrap();
        program.set_uniform_int(&gl, "use_cube_map", 0);
        mesh.draw(&gl);

        let handle = program.handle().unwrap();
        assert_eq!(gl.errors(), Vec::<GlError>::new());
        assert_eq!(gl.current_program(), Some(handle));
        assert_eq!(gl.draw_calls().len(), 1);
        assert_eq!(
            gl.uniform_value(handle, "color"),
            Some(UniformData::Vec3([1.0, 0.0, 0.0]))
        );
    }

    #[rstest]
    fn test_render_loop_end_to_end(gl: HeadlessGl) {
        let mut render_loop = RenderLoop::new(&gl).unwrap();
        let usable = render_loop
            .load_program(&gl, DEFAULT_PROGRAM, CUBE_VERTEX_SHADER, CUBE_FRAGMENT_SHADER)
            .is_usable();
        assert!(usable);

        let mut scene = SceneState::default();
        scene.set_color_hex("#ff0000").unwrap();
        let mut refresh = Refresh { requested: 0 };

        for frame in 0..10 {
            let outcome = render_loop.frame(&gl, &scene, frame as f32 / 60.0, &mut refresh);
            assert_eq!(outcome, FrameOutcome::Drawn);
        }

        assert_eq!(refresh.requested, 10);
        assert_eq!(render_loop.drawn_count(), 10);
        assert_eq!(gl.draw_calls().len(), 10);
        assert!(gl.draw_calls().iter().all(|draw| draw.count == 36 && draw.depth_test));
        assert!(gl.errors().is_empty());

        let handle = render_loop
            .registry()
            .get(DEFAULT_PROGRAM)
            .and_then(GpuProgram::handle)
            .unwrap();
        assert_eq!(gl.current_program(), Some(handle));
    }

    #[rstest]
    #[case("void main() {")]
    #[case("#error broken\nvoid main() {}")]
    #[case("int helper() { return 1; }")]
    fn test_invalid_source_then_retry(gl: HeadlessGl, #[case] source: &str) {
        let mut program = GpuProgram::new(&gl, "retry");
        let err = program
            .attach(&gl, ShaderStage::Fragment, source)
            .unwrap_err();
        assert!(matches!(err, ProgramError::Compile { .. }));
        assert!(program.attached_stages().is_empty());

        program
            .attach(&gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER)
            .unwrap();
        program
            .attach(&gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
            .unwrap();
        program.link(&gl).unwrap();
        assert!(program.is_usable());
        assert_eq!(program.diagnostics().len(), 1);
    }

    #[rstest]
    fn test_bad_frames_never_stall_the_loop(gl: HeadlessGl) {
        let mut render_loop = RenderLoop::new(&gl).unwrap();
        let mut refresh = Refresh { requested: 0 };
        let mut scene = SceneState::default();

        render_loop.load_program(&gl, DEFAULT_PROGRAM, CUBE_VERTEX_SHADER, "");
        for _ in 0..5 {
            assert_eq!(
                render_loop.frame(&gl, &scene, 0.0, &mut refresh),
                FrameOutcome::Skipped(SkipReason::ProgramUnusable)
            );
        }

        render_loop.load_program(&gl, DEFAULT_PROGRAM, CUBE_VERTEX_SHADER, CUBE_FRAGMENT_SHADER);
        scene.toggle_use_color();
        assert_eq!(
            render_loop.frame(&gl, &scene, 0.0, &mut refresh),
            FrameOutcome::Skipped(SkipReason::CubeMapIncomplete)
        );
        scene.toggle_use_color();
        assert_eq!(
            render_loop.frame(&gl, &scene, 0.0, &mut refresh),
            FrameOutcome::Drawn
        );

        assert_eq!(refresh.requested, 7);
        assert_eq!(render_loop.frame_count(), 7);
        assert_eq!(render_loop.drawn_count(), 1);
    }

    #[rstest]
    fn test_fov_clamp_from_default() {
        let mut scene = SceneState::default();
        scene.apply_fov_delta(10000.0);
        assert_eq!(scene.fov(), 90.0);

        let mut scene = SceneState::default();
        scene.apply_fov_delta(-10000.0);
        assert_eq!(scene.fov(), 1.0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.016)]
    #[case(3600.0)]
    fn test_frame_transforms_are_reproducible(#[case] elapsed: f32) {
        let scene = SceneState::default();
        assert_eq!((scene.width(), scene.height()), (800, 600));
        assert_eq!((scene.fov(), scene.near(), scene.far()), (45.0, 0.1, 100.0));

        let first = FrameTransforms::compute(&scene, elapsed);
        for _ in 0..100 {
            let again = FrameTransforms::compute(&scene, elapsed);
            assert_eq!(
                first.projection.to_cols_array().map(f32::to_bits),
                again.projection.to_cols_array().map(f32::to_bits)
            );
            assert_eq!(
                first.view.to_cols_array().map(f32::to_bits),
                again.view.to_cols_array().map(f32::to_bits)
            );
        }
    }

    #[rstest]
    fn test_dispose_twice_is_harmless(gl: HeadlessGl) {
        let mut program = GpuProgram::new(&gl, "basic");
        program
            .attach(&gl, ShaderStage::Vertex, CUBE_VERTEX_SHADER)
            .unwrap();
        program
            .attach(&gl, ShaderStage::Fragment, CUBE_FRAGMENT_SHADER)
            .unwrap();
        program.link(&gl).unwrap();

        let mut texture = Texture2D::new(&gl).unwrap();
        let mut cube = CubeTexture::new(&gl).unwrap();

        for _ in 0..2 {
            program.dispose(&gl);
            texture.dispose(&gl);
            cube.dispose(&gl);
        }

        assert_eq!(program.status(), ProgramStatus::Disposed);
        assert!(texture.is_disposed() && cube.is_disposed());
        assert_eq!(gl.live_programs() + gl.live_shaders() + gl.live_textures(), 0);
        assert_eq!(gl.redundant_deletes(), 0);
    }

    #[rstest]
    fn test_uniforms_leave_attached_stages_alone(gl: HeadlessGl) {
        let mut registry = ProgramRegistry::new();
        registry.create(&gl, "basic", CUBE_VERTEX_SHADER, CUBE_FRAGMENT_SHADER);
        let program = registry.get("basic").unwrap();
        let before = program.attached_stages();

        program.use_program(&gl).unwrap();
        let transforms = FrameTransforms::compute(&SceneState::default(), 1.0);
        program.set_uniform_mat4(&gl, "model", &transforms.model);
        program.set_uniform_mat4(&gl, "view", &transforms.view);
        program.set_uniform_mat4(&gl, "projection", &transforms.projection);
        program.set_uniform_int(&gl, "cube_map", 0);
        program.set_uniform_float(&gl, "optimized_out", 0.5);

        assert_eq!(program.attached_stages(), before);
        assert!(gl.errors().is_empty());
    }
}
