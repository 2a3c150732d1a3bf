//! GPU backend abstraction for the render graph.
//!
//! The engine only decides *what* exists and *when* it is drawn; everything that
//! touches a device goes through [`GraphBackend`]. Two implementations exist:
//!
//! - [`WgpuBackend`]: the real thing, built on a [`GpuContext`](crate::GpuContext).
//! - `testing::RecordingBackend` (tests only): hands out numbered fake resources
//!   and records every allocation and draw, so rebuild logic can be checked
//!   without a GPU.

mod wgpu;

#[cfg(test)]
pub(crate) mod testing;

pub use self::wgpu::{GpuImage, OFFSCREEN_FORMAT, WgpuBackend};

use std::path::Path;

use glam::UVec2;
use image::RgbaImage;

use crate::config::BACKGROUND_COUNT;
use crate::error::GraphError;
use crate::render_graph::PassKind;
use crate::uniforms::{FrameUniforms, Viewport};

/// Resource creation and command recording for one device.
///
/// Creation methods take `&mut self` and are only called with the engine's
/// lock held. Draw methods record into a host-owned encoder or render pass.
pub trait GraphBackend {
    /// A sampled image that can also serve as a render target.
    type Image;
    /// Whatever a pipeline needs to know about the attachment it renders into.
    type Layout: Clone;
    /// Per-pass resource binding set.
    type Bindings;
    /// Compiled pipeline state.
    type Pipeline;
    /// Recorder for off-screen passes.
    type Encoder;
    /// The presentation render pass the host has already begun.
    type ScreenPass<'a>;

    /// Allocates an intermediate image of `size` for pass `pass`.
    ///
    /// `layout` is the shared off-screen layout once the first target of a
    /// generation exists; `None` lets the backend pick its default.
    fn create_target(
        &mut self,
        pass: usize,
        size: UVec2,
        layout: Option<&Self::Layout>,
    ) -> Result<Self::Image, GraphError>;

    /// Pixel size of an image.
    fn image_size(&self, image: &Self::Image) -> UVec2;

    /// Layout describing an off-screen target, reused by later targets.
    fn target_layout(&self, image: &Self::Image) -> Self::Layout;

    /// Layout of the presentation surface.
    fn surface_layout(&self) -> Self::Layout;

    /// Uploads a background image into background slot `slot`.
    fn create_background(&mut self, slot: usize, image: &RgbaImage) -> Self::Image;

    /// Creates the binding set for `pass`: uniforms, the dynamic `input`, and
    /// the fixed backgrounds.
    fn create_bindings(
        &mut self,
        pass: usize,
        input: &Self::Image,
        backgrounds: &[Self::Image; BACKGROUND_COUNT],
    ) -> Self::Bindings;

    /// Builds the pipeline for `pass` from the compiled shader at `shader`.
    fn create_pipeline(
        &mut self,
        pass: usize,
        shader: &Path,
        layout: &Self::Layout,
        kind: PassKind,
    ) -> Result<Self::Pipeline, GraphError>;

    /// Uploads this frame's uniform block.
    fn write_uniforms(&mut self, uniforms: &FrameUniforms);

    /// Records one off-screen pass: begin target, bind, full-screen draw, end.
    fn draw_offscreen(
        &self,
        encoder: &mut Self::Encoder,
        target: &Self::Image,
        pipeline: &Self::Pipeline,
        bindings: &Self::Bindings,
    );

    /// Records the final pass into the presentation pass. Does not end it.
    fn draw_composite(
        &self,
        pass: &mut Self::ScreenPass<'_>,
        pipeline: &Self::Pipeline,
        bindings: &Self::Bindings,
        viewport: Viewport,
    );
}
