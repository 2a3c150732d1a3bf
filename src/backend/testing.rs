//! A backend that allocates nothing and remembers everything.

use std::path::{Path, PathBuf};

use glam::UVec2;
use image::RgbaImage;

use super::GraphBackend;
use crate::config::BACKGROUND_COUNT;
use crate::error::GraphError;
use crate::render_graph::PassKind;
use crate::uniforms::{FrameUniforms, Viewport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestLayout(pub u32);

/// Off-screen targets default to this layout; the surface uses [`SURFACE_LAYOUT`].
pub const TARGET_LAYOUT: TestLayout = TestLayout(16);
pub const SURFACE_LAYOUT: TestLayout = TestLayout(8);

#[derive(Debug, PartialEq, Eq)]
pub struct TestImage {
    pub id: usize,
    pub size: UVec2,
    pub layout: TestLayout,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TestBindings {
    pub id: usize,
    pub pass: usize,
    pub input: usize,
    pub backgrounds: [usize; BACKGROUND_COUNT],
}

#[derive(Debug, PartialEq, Eq)]
pub struct TestPipeline {
    pub id: usize,
    pub pass: usize,
    pub layout: TestLayout,
    pub kind: PassKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Draw {
    Offscreen { target: usize, pipeline: usize, bindings: usize },
    Composite { pipeline: usize, bindings: usize, viewport: Viewport },
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: usize,
    pub targets_created: usize,
    pub backgrounds_created: usize,
    pub bindings_created: usize,
    pub pipelines_created: usize,
    /// Successful and failed pipeline builds.
    pub pipeline_attempts: usize,
    pub uniforms: Vec<FrameUniforms>,
    /// Pipelines for these shaders fail to build.
    pub broken_shaders: Vec<PathBuf>,
    /// Target allocation fails for this pass index.
    pub fail_target: Option<usize>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broken_shader(mut self, shader: impl Into<PathBuf>) -> Self {
        self.broken_shaders.push(shader.into());
        self
    }

    fn next(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphBackend for RecordingBackend {
    type Image = TestImage;
    type Layout = TestLayout;
    type Bindings = TestBindings;
    type Pipeline = TestPipeline;
    type Encoder = Vec<Draw>;
    type ScreenPass<'a> = Vec<Draw>;

    fn create_target(
        &mut self,
        pass: usize,
        size: UVec2,
        layout: Option<&TestLayout>,
    ) -> Result<TestImage, GraphError> {
        if self.fail_target == Some(pass) {
            return Err(GraphError::Target {
                pass,
                reason: "out of memory".to_string(),
            });
        }
        self.targets_created += 1;
        Ok(TestImage {
            id: self.next(),
            size,
            layout: layout.copied().unwrap_or(TARGET_LAYOUT),
        })
    }

    fn image_size(&self, image: &TestImage) -> UVec2 {
        image.size
    }

    fn target_layout(&self, image: &TestImage) -> TestLayout {
        image.layout
    }

    fn surface_layout(&self) -> TestLayout {
        SURFACE_LAYOUT
    }

    fn create_background(&mut self, _slot: usize, image: &RgbaImage) -> TestImage {
        self.backgrounds_created += 1;
        TestImage {
            id: self.next(),
            size: UVec2::from(image.dimensions()),
            layout: TARGET_LAYOUT,
        }
    }

    fn create_bindings(
        &mut self,
        pass: usize,
        input: &TestImage,
        backgrounds: &[TestImage; BACKGROUND_COUNT],
    ) -> TestBindings {
        self.bindings_created += 1;
        TestBindings {
            id: self.next(),
            pass,
            input: input.id,
            backgrounds: std::array::from_fn(|slot| backgrounds[slot].id),
        }
    }

    fn create_pipeline(
        &mut self,
        pass: usize,
        shader: &Path,
        layout: &TestLayout,
        kind: PassKind,
    ) -> Result<TestPipeline, GraphError> {
        self.pipeline_attempts += 1;
        if self.broken_shaders.iter().any(|broken| broken == shader) {
            return Err(GraphError::Pipeline {
                pass,
                reason: "entry point missing".to_string(),
            });
        }
        self.pipelines_created += 1;
        Ok(TestPipeline {
            id: self.next(),
            pass,
            layout: *layout,
            kind,
        })
    }

    fn write_uniforms(&mut self, uniforms: &FrameUniforms) {
        self.uniforms.push(*uniforms);
    }

    fn draw_offscreen(
        &self,
        encoder: &mut Vec<Draw>,
        target: &TestImage,
        pipeline: &TestPipeline,
        bindings: &TestBindings,
    ) {
        encoder.push(Draw::Offscreen {
            target: target.id,
            pipeline: pipeline.id,
            bindings: bindings.id,
        });
    }

    fn draw_composite(
        &self,
        pass: &mut Vec<Draw>,
        pipeline: &TestPipeline,
        bindings: &TestBindings,
        viewport: Viewport,
    ) {
        pass.push(Draw::Composite {
            pipeline: pipeline.id,
            bindings: bindings.id,
            viewport,
        });
    }
}
