//! The render graph engine.

use parking_lot::Mutex;

use super::Redraw;
use super::pass::{InputSource, PassKind, PassResource, PassSummary, PipelineState};
use crate::background;
use crate::backend::GraphBackend;
use crate::config::{BACKGROUND_COUNT, BufferSlot, GraphConfig, PassSpec};
use crate::error::GraphError;
use crate::uniforms::{FrameParams, FrameUniforms, SurfaceState};

/// A runtime-reconfigurable chain of full-screen shader passes.
///
/// The last pass draws into the host's presentation pass; every other pass
/// renders into its own intermediate image, which any other pass may sample
/// through its dynamic input binding. Each frame the host calls
/// [`execute_offscreen`](Self::execute_offscreen) and then
/// [`execute_composite`](Self::execute_composite).
///
/// All state sits behind a single mutex. Configuration updates from the
/// control side and frame execution on the render side serialize on it, so a
/// frame either sees the previous graph or the fully rebuilt one, never a mix.
///
/// ```text
///  background 0 ──┐
///                 ▼
///  Pass 0 ──▶ image 0 ──▶ Pass 1 ──▶ image 1 ──▶ Pass 2 ──▶ screen
///    (input -1)             (input 0)              (input 1)
/// ```
pub struct RenderGraph<B: GraphBackend> {
    state: Mutex<GraphState<B>>,
    redraw: Redraw,
}

struct GraphState<B: GraphBackend> {
    backend: B,
    config: GraphConfig,
    passes: Vec<PassResource<B>>,
    /// Layout of the first off-screen target in the current generation.
    shared_layout: Option<B::Layout>,
    backgrounds: Option<[B::Image; BACKGROUND_COUNT]>,
    surface: SurfaceState,
    params: FrameParams,
    generation: u64,
}

impl<B: GraphBackend> RenderGraph<B> {
    /// Creates an empty graph. Nothing is built until the configuration names
    /// at least one pass and carries a complete binding array.
    ///
    /// # Arguments
    ///
    /// * `backend` - Creates and records every GPU resource of the graph
    /// * `redraw` - Called after each composite to schedule the next frame
    pub fn new(backend: B, redraw: Redraw) -> Self {
        Self {
            state: Mutex::new(GraphState {
                backend,
                config: GraphConfig::default(),
                passes: Vec::new(),
                shared_layout: None,
                backgrounds: None,
                surface: SurfaceState::default(),
                params: FrameParams::default(),
                generation: 0,
            }),
            redraw,
        }
    }

    /// Edits the configuration under the engine lock.
    ///
    /// ```ignore
    /// graph.update_config(|config| config.replace_backgrounds(paths));
    /// ```
    pub fn update_config<R>(&self, f: impl FnOnce(&mut GraphConfig) -> R) -> R {
        f(&mut self.state.lock().config)
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> GraphConfig {
        self.state.lock().config.clone()
    }

    /// Updates the viewport and device pixel ratio used by the next frame.
    ///
    /// A different viewport size rebuilds every intermediate image and reloads
    /// the backgrounds on the next [`execute_offscreen`](Self::execute_offscreen).
    ///
    /// # Arguments
    ///
    /// * `surface` - Current presentation area in physical pixels
    pub fn set_surface(&self, surface: SurfaceState) {
        self.state.lock().surface = surface;
    }

    /// Replaces the time and pointer state the next uniform upload is built from.
    pub fn set_frame_params(&self, params: FrameParams) {
        self.state.lock().params = params;
    }

    /// Number of completed rebuilds.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Snapshot of every pass in the current generation, in execution order.
    ///
    /// # Example
    ///
    /// ```ignore
    /// for (index, pass) in graph.summary().iter().enumerate() {
    ///     log::info!("pass {index}: {:?} {:?}", pass.input_source, pass.pipeline);
    /// }
    /// ```
    pub fn summary(&self) -> Vec<PassSummary> {
        self.state
            .lock()
            .passes
            .iter()
            .map(PassResource::summary)
            .collect()
    }

    /// Drops every pipeline, keeping targets and bindings. They are recreated
    /// on the next off-screen execution, including ones that had failed.
    pub fn release_pipelines(&self) {
        let mut state = self.state.lock();
        for pass in &mut state.passes {
            pass.pipeline = PipelineState::Pending;
        }
        log::debug!("[graph] released {} pipelines", state.passes.len());
    }

    /// Rebuilds if needed, prepares resources, uploads uniforms and records
    /// every off-screen pass into `encoder`.
    ///
    /// Must run before the host begins its presentation pass, since the
    /// intermediate images are written here and sampled by the final pass.
    ///
    /// # Arguments
    ///
    /// * `encoder` - Command encoder for the current frame
    pub fn execute_offscreen(&self, encoder: &mut B::Encoder) {
        let mut state = self.state.lock();

        state.rebuild_if_needed();
        state.prepare_backgrounds();
        state.prepare_passes();

        if state.passes.is_empty() {
            return;
        }

        let uniforms = state.uniforms();
        state.backend.write_uniforms(&uniforms);

        let state = &*state;
        for pass in &state.passes {
            if let (Some(target), Some(pipeline), Some(bindings)) =
                (&pass.target, pass.pipeline.ready(), &pass.bindings)
            {
                state
                    .backend
                    .draw_offscreen(encoder, target, pipeline, bindings);
            }
        }
    }

    /// Draws the final pass into `pass` and requests the next frame.
    ///
    /// # Arguments
    ///
    /// * `pass` - The host's presentation pass, already begun
    ///
    /// # Returns
    ///
    /// `false` without drawing when there is no pass or the final pass is not
    /// ready, `true` once the final pass was recorded.
    pub fn execute_composite(&self, pass: &mut B::ScreenPass<'_>) -> bool {
        {
            let state = self.state.lock();
            let Some(last) = state.passes.last() else {
                return false;
            };
            let (Some(pipeline), Some(bindings)) = (last.pipeline.ready(), &last.bindings) else {
                return false;
            };
            state
                .backend
                .draw_composite(pass, pipeline, bindings, state.surface.viewport);
        }

        self.redraw.request();
        true
    }

    #[cfg(test)]
    pub(crate) fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.state.lock().backend)
    }
}

impl<B: GraphBackend> GraphState<B> {
    fn needs_rebuild(&self) -> bool {
        if self.passes.is_empty() || self.config.topology_dirty() {
            return true;
        }
        let viewport = self.surface.viewport.size();
        self.passes
            .first()
            .and_then(|pass| pass.target.as_ref())
            .is_some_and(|target| self.backend.image_size(target) != viewport)
    }

    fn rebuild_if_needed(&mut self) {
        if !self.needs_rebuild() {
            return;
        }

        if self.config.pass_count() == 0 {
            return;
        }
        if !self.config.bindings_complete() {
            log::debug!(
                "[graph] rebuild deferred: {} bindings for {} passes",
                self.config.input_bind_order().len(),
                self.config.pass_count()
            );
            return;
        }
        if self.surface.viewport.is_empty() {
            log::debug!("[graph] rebuild deferred: viewport is empty");
            return;
        }

        self.rebuild();
    }

    /// Replaces every pass with a fresh generation built from the config.
    fn rebuild(&mut self) {
        let size = self.surface.viewport.size();
        let count = self.config.buildable_passes();
        log::info!(
            "[graph] rebuilding {} passes at {}x{}",
            count,
            size.x,
            size.y
        );

        self.passes.clear();
        self.shared_layout = None;

        let mut passes = Vec::with_capacity(count);
        for index in 0..count {
            let is_screen = index + 1 == count;
            let desc = PassSpec {
                shader: self.config.shader_paths()[index].clone(),
                output_slot: if is_screen {
                    BufferSlot::Unbound
                } else {
                    BufferSlot::Bound(index)
                },
                input_slot: self
                    .config
                    .input_bind_order()
                    .get(index)
                    .copied()
                    .unwrap_or_default(),
            };

            let target = if is_screen {
                None
            } else {
                match self
                    .backend
                    .create_target(index, size, self.shared_layout.as_ref())
                {
                    Ok(image) => {
                        if self.shared_layout.is_none() {
                            self.shared_layout = Some(self.backend.target_layout(&image));
                        }
                        Some(image)
                    }
                    Err(e) => {
                        log::error!("[graph] rebuild aborted: {e}");
                        self.shared_layout = None;
                        return;
                    }
                }
            };

            log::debug!(
                "[graph] pass {} -> {:?}, input {:?}",
                index,
                desc.output_slot,
                desc.input_slot
            );
            passes.push(PassResource::new(desc, target));
        }

        self.passes = passes;
        self.generation += 1;
        self.config.mark_topology_clean();
        log::info!("[graph] generation {} ready", self.generation);
    }

    /// Loads background images on first use, whenever their paths change and
    /// whenever the viewport size changes.
    fn prepare_backgrounds(&mut self) {
        let size = self.surface.viewport.size();
        // Backgrounds are cropped to the viewport, so a new size reloads them.
        let resized = !self.surface.viewport.is_empty()
            && self
                .backgrounds
                .as_ref()
                .is_some_and(|images| self.backend.image_size(&images[0]) != size);
        if self.config.take_images_dirty() || resized {
            self.backgrounds = None;
        }
        if self.backgrounds.is_some() || self.surface.viewport.is_empty() {
            return;
        }

        let images = background::load_all(self.config.background_paths(), size);
        let backend = &mut self.backend;
        self.backgrounds = Some(std::array::from_fn(|slot| {
            backend.create_background(slot, &images[slot])
        }));

        // Binding sets reference the old images.
        for pass in &mut self.passes {
            pass.bindings = None;
            pass.input_source = None;
        }
        log::debug!("[graph] background images loaded");
    }

    /// Creates missing binding sets and pipelines.
    fn prepare_passes(&mut self) {
        let GraphState {
            backend,
            passes,
            shared_layout,
            backgrounds,
            ..
        } = self;
        let Some(backgrounds) = backgrounds.as_ref() else {
            return;
        };

        for index in 0..passes.len() {
            if passes[index].bindings.is_none() {
                let (source, input) = resolve_input(passes, index, backgrounds);
                let bindings = backend.create_bindings(index, input, backgrounds);
                passes[index].bindings = Some(bindings);
                passes[index].input_source = Some(source);
            }

            if !passes[index].pipeline.is_pending() {
                continue;
            }

            let pass = &mut passes[index];
            let kind = pass.kind();
            let layout = match kind {
                PassKind::Screen => Some(backend.surface_layout()),
                PassKind::Offscreen => shared_layout.clone(),
            };
            let result = match layout {
                Some(layout) => backend.create_pipeline(index, &pass.desc.shader, &layout, kind),
                None => Err(GraphError::Pipeline {
                    pass: index,
                    reason: "no render target layout".to_string(),
                }),
            };

            pass.pipeline = match result {
                Ok(pipeline) => {
                    log::debug!("[graph] pipeline {} ready ({:?})", index, kind);
                    PipelineState::Ready(pipeline)
                }
                Err(e) => {
                    log::error!("[graph] {e}");
                    PipelineState::Failed
                }
            };
        }
    }

    fn uniforms(&self) -> FrameUniforms {
        let resolution = self
            .passes
            .first()
            .and_then(|pass| pass.target.as_ref())
            .map(|target| self.backend.image_size(target))
            .unwrap_or_else(|| self.surface.viewport.size());
        FrameUniforms::compute(resolution, &self.params, self.surface.device_pixel_ratio)
    }
}

/// The image pass `index` samples as its dynamic input.
///
/// An unbound slot, one that points at itself, past the end, or at a pass
/// without an intermediate image all fall back to the first background.
fn resolve_input<'a, B: GraphBackend>(
    passes: &'a [PassResource<B>],
    index: usize,
    backgrounds: &'a [B::Image; BACKGROUND_COUNT],
) -> (InputSource, &'a B::Image) {
    let slot = passes[index].desc.input_slot;
    if let Some(source) = slot.index() {
        if let Some(target) = passes
            .get(source)
            .filter(|_| source != index)
            .and_then(|pass| pass.target.as_ref())
        {
            return (InputSource::Pass(source), target);
        }
        log::warn!(
            "[graph] pass {} input {:?} has no image, using background 0",
            index,
            slot
        );
    }
    (InputSource::Background, &backgrounds[0])
}
