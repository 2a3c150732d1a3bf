//! Runtime-reconfigurable multi-pass render graph.
//!
//! A graph is a list of full-screen shader passes plus a topology saying which
//! pass each one samples as its dynamic input. Every pass also sees the same
//! three background images. The last pass composites into the host's surface;
//! all earlier ones render to intermediate images of viewport size.
//!
//! # Architecture
//!
//! ```text
//!  control side                      render side (per frame)
//!  ────────────                      ───────────────────────
//!  GraphConfig::replace_*  ──lock──▶ execute_offscreen
//!    (sets dirty flags)                ├─ rebuild if dirty / resized
//!                                      ├─ load backgrounds if dirty
//!                                      ├─ create missing bindings, pipelines
//!                                      ├─ upload FrameUniforms
//!                                      └─ draw passes 0..n-1 to images
//!                                    execute_composite
//!                                      └─ draw pass n-1 into the surface
//! ```
//!
//! # Example
//!
//! ```ignore
//! use shaderloom::{BufferSlot, RenderGraph, Redraw, WgpuBackend};
//!
//! let graph = RenderGraph::new(WgpuBackend::new(&gpu), Redraw::default());
//! graph.update_config(|config| {
//!     config.replace_shaders(vec!["blur.wgsl".into(), "tone.wgsl".into()]);
//!     config.replace_topology(vec![BufferSlot::Unbound, BufferSlot::Bound(0)]);
//! });
//!
//! // In render loop:
//! graph.execute_offscreen(&mut encoder);
//! graph.execute_composite(&mut surface_pass);
//! ```

mod graph;
mod pass;

use std::fmt;
use std::sync::Arc;

pub use graph::RenderGraph;
pub use pass::{InputSource, PassKind, PassSummary, PipelineState, PipelineStatus};

/// Callback asking the host for another frame.
#[derive(Clone)]
pub struct Redraw(Arc<dyn Fn() + Send + Sync>);

impl Redraw {
    pub fn new(request: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(request))
    }

    pub fn request(&self) {
        (self.0)()
    }
}

impl Default for Redraw {
    /// Does nothing; for hosts that redraw continuously anyway.
    fn default() -> Self {
        Self::new(|| {})
    }
}

impl fmt::Debug for Redraw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Redraw")
    }
}
