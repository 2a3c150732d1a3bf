//! Per-frame inputs and the uniform block every pass receives.
//!
//! The block follows the familiar ShaderToy layout so existing fragment shaders
//! port with little more than a binding declaration:
//!
//! ```wgsl
//! struct Uniforms {
//!     resolution: vec2f,
//!     time: f32,
//!     time_delta: f32,
//!     mouse: vec4f,
//!     frame: i32,
//!     channel_resolution: array<vec4f, 4>,
//! }
//! @group(0) @binding(0) var<uniform> u: Uniforms;
//! ```

use glam::{UVec2, Vec2};

/// Frames per second assumed when deriving a frame index from elapsed time.
const FRAME_RATE: f32 = 60.0;

/// Animation and pointer state written by the control side.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameParams {
    /// Elapsed time in seconds.
    pub time: f32,
    /// Seconds since the previous time update.
    pub time_delta: f32,
    /// Frame index derived from `time`.
    pub frame: i32,
    /// Pointer position in logical (unscaled) window coordinates.
    pub pointer: Vec2,
    /// Whether the primary pointer button is held.
    pub pressed: bool,
}

impl FrameParams {
    /// Advances the clock to `time`, updating the delta and frame index.
    pub fn advance(&mut self, time: f32) {
        self.time_delta = (time - self.time).max(0.0);
        self.time = time;
        self.frame = (time * FRAME_RATE) as i32;
    }
}

/// Output rectangle in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// A viewport covering `width` × `height` pixels from the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }

    /// Size in whole pixels; intermediate images are allocated at this size.
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width.max(0.0) as u32, self.height.max(0.0) as u32)
    }

    pub fn is_empty(&self) -> bool {
        let size = self.size();
        size.x == 0 || size.y == 0
    }
}

/// What the host knows about the presentation surface this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceState {
    /// Where the composite lands, in physical pixels.
    pub viewport: Viewport,
    /// Physical pixels per logical pixel.
    pub device_pixel_ratio: f32,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            viewport: Viewport::from_size(100, 100),
            device_pixel_ratio: 1.0,
        }
    }
}

/// Uniform block uploaded once per frame and bound at `@binding(0)` of every pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    /// Output resolution in pixels `[width, height]`.
    pub resolution: [f32; 2],
    pub time: f32,
    pub time_delta: f32,
    /// Pointer `[x, y]` in physical pixels, `z` is `1.0` while pressed and
    /// `-1.0` otherwise, `w` unused.
    pub mouse: [f32; 4],
    pub frame: i32,
    pub _padding: [f32; 3],
    /// `[width, height, 1.0, 0.0]` for each of the four channels.
    pub channel_resolution: [[f32; 4]; 4],
}

impl FrameUniforms {
    /// Builds the block for an output of `resolution` pixels.
    pub fn compute(resolution: UVec2, params: &FrameParams, device_pixel_ratio: f32) -> Self {
        let size = resolution.as_vec2();
        let pointer = params.pointer * device_pixel_ratio;
        let pressed = if params.pressed { 1.0 } else { -1.0 };

        Self {
            resolution: size.to_array(),
            time: params.time,
            time_delta: params.time_delta,
            mouse: [pointer.x, pointer.y, pressed, 0.0],
            frame: params.frame,
            _padding: [0.0; 3],
            channel_resolution: [[size.x, size.y, 1.0, 0.0]; 4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_sixteen_byte_aligned() {
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 112);
    }

    #[test]
    fn pointer_scales_with_pixel_ratio() {
        let params = FrameParams {
            pointer: Vec2::new(10.0, 20.0),
            pressed: true,
            ..Default::default()
        };
        let uniforms = FrameUniforms::compute(UVec2::new(640, 480), &params, 2.0);
        assert_eq!(uniforms.mouse, [20.0, 40.0, 1.0, 0.0]);
        assert_eq!(uniforms.resolution, [640.0, 480.0]);
        assert_eq!(uniforms.channel_resolution[3], [640.0, 480.0, 1.0, 0.0]);
    }

    #[test]
    fn released_pointer_is_negative() {
        let uniforms = FrameUniforms::compute(UVec2::ONE, &FrameParams::default(), 1.0);
        assert_eq!(uniforms.mouse[2], -1.0);
    }

    #[test]
    fn advance_tracks_delta_and_frame() {
        let mut params = FrameParams::default();
        params.advance(1.0);
        params.advance(1.5);
        assert_eq!(params.time_delta, 0.5);
        assert_eq!(params.frame, 90);

        params.advance(0.25);
        assert_eq!(params.time_delta, 0.0);
    }

    #[test]
    fn empty_viewport() {
        assert!(Viewport::from_size(0, 720).is_empty());
        assert!(!Viewport::from_size(1, 1).is_empty());
    }
}
