//! # Shaderloom
//!
//! **A multi-pass shader pipeline you can rewire while it runs.**
//!
//! Give it a list of fragment shaders and a topology saying which pass samples
//! which other pass's output; it compiles the shaders with an external tool,
//! allocates one intermediate image per pass and composites the last pass into
//! your window. Change the shader list, the topology or the background images
//! at any time: the graph is rebuilt between frames and a frame never sees a
//! half-built graph.
//!
//! ## Quick Start
//!
//! ```no_run
//! use shaderloom::*;
//!
//! # fn frame(gpu: &GpuContext, encoder: &mut wgpu::CommandEncoder, pass: &mut wgpu::RenderPass<'_>) -> Result<(), LifecycleError> {
//! let lifecycle: GraphLifecycle<WgpuBackend, _> =
//!     GraphLifecycle::new(ExternalCompiler::default(), Redraw::default());
//!
//! lifecycle.set_shader_list(["plasma.wgsl", "blur.wgsl", "composite.wgsl"])?;
//! lifecycle.set_topology(&[-1, 0, 1])?;
//!
//! // every frame, on the render side
//! let surface = SurfaceState {
//!     viewport: Viewport::from_size(gpu.width(), gpu.height()),
//!     device_pixel_ratio: 1.0,
//! };
//! if let Some(graph) = lifecycle.sync(surface, || WgpuBackend::new(gpu)) {
//!     graph.execute_offscreen(encoder);
//!     graph.execute_composite(pass);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Shader interface
//!
//! Compiled shaders are WGSL modules with a single `@fragment` entry point.
//! Every pass sees the same bind group:
//!
//! ```wgsl
//! @group(0) @binding(0) var<uniform> u: Uniforms;      // see FrameUniforms
//! @group(0) @binding(1) var input: texture_2d<f32>;    // the pass named in the topology
//! @group(0) @binding(2) var background0: texture_2d<f32>;
//! @group(0) @binding(3) var background1: texture_2d<f32>;
//! @group(0) @binding(4) var background2: texture_2d<f32>;
//! @group(0) @binding(5) var linear: sampler;
//! ```

mod background;
mod backend;
mod compiler;
mod config;
mod error;
mod gpu;
mod lifecycle;
mod render_graph;
mod uniforms;

pub use backend::{GpuImage, GraphBackend, OFFSCREEN_FORMAT, WgpuBackend};
pub use background::{PLACEHOLDER_SIZE, cover, cover_extent, placeholder};
pub use compiler::{CompilerConfig, ExternalCompiler, ShaderCompiler};
pub use config::{BACKGROUND_COUNT, BufferSlot, GraphConfig, PassSpec, parse_topology};
pub use error::{CompileError, ConfigError, GpuError, GraphError, LifecycleError};
pub use gpu::GpuContext;
pub use lifecycle::{CachedConfig, GraphLifecycle};
pub use render_graph::{
    InputSource, PassKind, PassSummary, PipelineState, PipelineStatus, Redraw, RenderGraph,
};
pub use uniforms::{FrameParams, FrameUniforms, SurfaceState, Viewport};

// Re-export glam math types for convenience
pub use glam::{UVec2, Vec2};
