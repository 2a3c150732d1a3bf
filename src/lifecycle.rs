//! Engine lifecycle and the configuration cache that outlives it.
//!
//! The host may tear the [`RenderGraph`] down at any time (the window is hidden,
//! the surface is lost, the user pauses), but the configuration the user built
//! must survive. [`GraphLifecycle`] keeps that configuration in a
//! [`CachedConfig`], forwards every change to the live engine if there is one,
//! and restores a fresh engine from the cache when the render side asks for it.
//!
//! Control-side methods (`set_*`) may be called from any thread. [`sync`] and
//! [`surface_invalidated`] belong to the render side and are called at the
//! start of a frame, when no GPU work of the old engine is being recorded.
//!
//! Locks are always taken in the order cache, engine slot, engine.
//!
//! [`sync`]: GraphLifecycle::sync
//! [`surface_invalidated`]: GraphLifecycle::surface_invalidated

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec2;
use parking_lot::Mutex;

use crate::backend::GraphBackend;
use crate::compiler::ShaderCompiler;
use crate::config::{GraphConfig, parse_topology, to_paths};
use crate::error::{ConfigError, LifecycleError};
use crate::render_graph::{Redraw, RenderGraph};
use crate::uniforms::{FrameParams, SurfaceState};

/// Everything needed to rebuild an engine from scratch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CachedConfig {
    /// Compiled shader paths, bindings and background paths.
    pub graph: GraphConfig,
    /// Latest time and pointer state from the control side.
    pub params: FrameParams,
}

enum EngineSlot<B: GraphBackend> {
    Empty,
    Live(Arc<RenderGraph<B>>),
    /// Released by the control side; dropped at the next render-side sync.
    PendingDestroy(Arc<RenderGraph<B>>),
}

/// Owns the configuration cache and the engine built from it.
pub struct GraphLifecycle<B: GraphBackend, C> {
    compiler: C,
    cache: Mutex<CachedConfig>,
    slot: Mutex<EngineSlot<B>>,
    running: AtomicBool,
    redraw: Redraw,
}

impl<B: GraphBackend, C: ShaderCompiler> GraphLifecycle<B, C> {
    /// Creates a running lifecycle with an empty configuration.
    ///
    /// `redraw` is handed to every engine and is also called whenever the
    /// configuration changes.
    pub fn new(compiler: C, redraw: Redraw) -> Self {
        Self {
            compiler,
            cache: Mutex::new(CachedConfig::default()),
            slot: Mutex::new(EngineSlot::Empty),
            running: AtomicBool::new(true),
            redraw,
        }
    }

    /// The compiler every shader list goes through.
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Whether [`sync`](Self::sync) may create an engine.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// A copy of the cached configuration.
    pub fn cached(&self) -> CachedConfig {
        self.cache.lock().clone()
    }

    /// The live engine, if one exists and is not scheduled for destruction.
    pub fn engine(&self) -> Option<Arc<RenderGraph<B>>> {
        match &*self.slot.lock() {
            EngineSlot::Live(engine) => Some(engine.clone()),
            _ => None,
        }
    }

    /// Compiles every shader and installs the results as the new pass list.
    ///
    /// Nothing changes unless all shaders compile. A new list invalidates the
    /// current binding array, so the graph stays empty until
    /// [`set_topology`](Self::set_topology) supplies a new one.
    ///
    /// # Arguments
    ///
    /// * `sources` - Shader source paths or `file://` URLs, one per pass
    ///
    /// # Returns
    ///
    /// The first compile error, or [`ConfigError::EmptyShaderList`] for an
    /// empty list.
    pub fn set_shader_list<I, P>(&self, sources: I) -> Result<(), LifecycleError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let sources = to_paths(sources);
        if sources.is_empty() {
            return Err(ConfigError::EmptyShaderList.into());
        }

        let compiled = sources
            .iter()
            .map(|source| self.compiler.compile(source))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("[lifecycle] {} shaders compiled", compiled.len());

        let mut cache = self.cache.lock();
        cache.graph.replace_shaders(compiled.clone());
        self.push_live(|config| config.replace_shaders(compiled));
        Ok(())
    }

    /// Validates and installs a binding array in the `-1`-sentinel form.
    ///
    /// # Arguments
    ///
    /// * `raw` - Entry `i` is the pass whose image pass `i` samples, or `-1`
    ///
    /// # Example
    ///
    /// ```ignore
    /// lifecycle.set_shader_list(["noise.frag", "blur.frag", "mix.frag"])?;
    /// lifecycle.set_topology(&[-1, 0, 1])?;
    /// ```
    pub fn set_topology(&self, raw: &[i32]) -> Result<(), LifecycleError> {
        let mut cache = self.cache.lock();
        let slots = parse_topology(raw, cache.graph.pass_count())?;

        cache.graph.replace_topology(slots.clone());
        self.push_live(|config| config.replace_topology(slots));
        Ok(())
    }

    /// Installs new background image paths. Missing slots use a placeholder.
    pub fn set_background_images<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths = to_paths(paths);
        let mut cache = self.cache.lock();
        cache.graph.replace_backgrounds(paths.clone());
        self.push_live(|config| config.replace_backgrounds(paths));
    }

    /// Starts or stops rendering.
    ///
    /// Stopping schedules the engine for destruction at the next [`sync`](Self::sync);
    /// starting requests a frame so that `sync` can recreate it from the cache.
    pub fn set_running(&self, running: bool) {
        if self.running.swap(running, Ordering::AcqRel) == running {
            return;
        }

        if !running {
            let mut slot = self.slot.lock();
            *slot = match std::mem::replace(&mut *slot, EngineSlot::Empty) {
                EngineSlot::Live(engine) => EngineSlot::PendingDestroy(engine),
                other => other,
            };
        }
        log::info!(
            "[lifecycle] {}",
            if running { "running" } else { "stopped" }
        );
        self.redraw.request();
    }

    /// Seconds since the host started. The frame delta comes from the previous
    /// call and the frame index from the time itself.
    pub fn set_time(&self, seconds: f32) {
        self.cache.lock().params.advance(seconds);
    }

    /// Pointer position in logical window coordinates.
    pub fn set_pointer(&self, pointer: Vec2) {
        self.cache.lock().params.pointer = pointer;
    }

    /// Primary button state.
    pub fn set_pressed(&self, pressed: bool) {
        self.cache.lock().params.pressed = pressed;
    }

    /// Render-side frame start.
    ///
    /// Drops an engine scheduled for destruction (and returns `None` for this
    /// frame), creates one from the cache when running and none exists, then
    /// hands it the current surface state and frame parameters.
    pub fn sync(
        &self,
        surface: SurfaceState,
        make_backend: impl FnOnce() -> B,
    ) -> Option<Arc<RenderGraph<B>>> {
        let cache = self.cache.lock();
        let mut slot = self.slot.lock();

        let engine = match std::mem::replace(&mut *slot, EngineSlot::Empty) {
            EngineSlot::PendingDestroy(engine) => {
                drop(engine);
                log::info!("[lifecycle] engine released");
                return None;
            }
            EngineSlot::Live(engine) => engine,
            EngineSlot::Empty => {
                if !self.is_running() {
                    return None;
                }
                let engine = Arc::new(RenderGraph::new(make_backend(), self.redraw.clone()));
                engine.update_config(|config| config.restore(&cache.graph));
                log::info!(
                    "[lifecycle] engine created with {} cached passes",
                    cache.graph.pass_count()
                );
                engine
            }
        };

        engine.set_surface(surface);
        engine.set_frame_params(cache.params);
        *slot = EngineSlot::Live(engine.clone());
        Some(engine)
    }

    /// The presentation surface is gone; drop the engine now.
    ///
    /// The next [`sync`](Self::sync) builds a new one from the cache.
    pub fn surface_invalidated(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock(), EngineSlot::Empty);
        if !matches!(previous, EngineSlot::Empty) {
            log::info!("[lifecycle] surface invalidated, engine dropped");
        }
    }

    /// Applies `f` to the live engine's configuration and asks for a frame.
    fn push_live(&self, f: impl FnOnce(&mut GraphConfig)) {
        if let EngineSlot::Live(engine) = &*self.slot.lock() {
            engine.update_config(f);
        }
        self.redraw.request();
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::backend::testing::RecordingBackend;
    use crate::config::BufferSlot;
    use crate::error::CompileError;
    use crate::uniforms::Viewport;

    /// Maps `x` to `compiled/x`; sources named `slow*` time out.
    #[derive(Default)]
    struct FakeCompiler {
        calls: AtomicUsize,
    }

    impl ShaderCompiler for FakeCompiler {
        fn compile(&self, source: &Path) -> Result<PathBuf, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = source.to_string_lossy();
            if name.starts_with("slow") {
                return Err(CompileError::Timeout {
                    shader: source.to_path_buf(),
                    after: Duration::from_secs(5),
                });
            }
            Ok(Path::new("compiled").join(source))
        }
    }

    type Lifecycle = GraphLifecycle<RecordingBackend, FakeCompiler>;

    fn lifecycle() -> (Lifecycle, Arc<AtomicUsize>) {
        let redraws = Arc::new(AtomicUsize::new(0));
        let counter = redraws.clone();
        let lifecycle = GraphLifecycle::new(
            FakeCompiler::default(),
            Redraw::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (lifecycle, redraws)
    }

    fn surface() -> SurfaceState {
        SurfaceState {
            viewport: Viewport::from_size(32, 32),
            device_pixel_ratio: 1.0,
        }
    }

    fn sync(lifecycle: &Lifecycle) -> Option<Arc<RenderGraph<RecordingBackend>>> {
        lifecycle.sync(surface(), RecordingBackend::new)
    }

    fn draw(engine: &RenderGraph<RecordingBackend>) -> usize {
        let mut encoder = Vec::new();
        let mut screen = Vec::new();
        engine.execute_offscreen(&mut encoder);
        engine.execute_composite(&mut screen);
        encoder.len() + screen.len()
    }

    #[test]
    fn compiled_paths_are_cached() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a.frag", "b.frag"]).unwrap();

        let cached = lifecycle.cached();
        assert_eq!(cached.graph.pass_count(), 2);
        assert_eq!(
            cached.graph.shader_paths(),
            [
                PathBuf::from("compiled/a.frag"),
                PathBuf::from("compiled/b.frag")
            ]
        );
    }

    #[test]
    fn compile_failure_keeps_previous_list() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a", "b"]).unwrap();
        lifecycle.set_topology(&[-1, 0]).unwrap();
        let engine = sync(&lifecycle).unwrap();
        assert_eq!(draw(&engine), 2);

        let err = lifecycle.set_shader_list(["a", "slow", "c"]).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Compile(CompileError::Timeout { .. })
        ));

        let cached = lifecycle.cached();
        assert_eq!(cached.graph.pass_count(), 2);
        assert_eq!(cached.graph.input_bind_order().len(), 2);
        let live = engine.config();
        assert_eq!(live.shader_paths(), cached.graph.shader_paths());
        assert!(!live.topology_dirty());
        assert_eq!(draw(&engine), 2);
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn empty_shader_list_is_rejected() {
        let (lifecycle, _) = lifecycle();
        let err = lifecycle.set_shader_list(Vec::<PathBuf>::new()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Config(ConfigError::EmptyShaderList)
        ));
        assert_eq!(lifecycle.compiler().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn topology_checked_against_cached_count() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a", "b"]).unwrap();

        let err = lifecycle.set_topology(&[-1, 0, 1]).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Config(ConfigError::OutOfRange { pass: 2, .. })
        ));
        assert!(lifecycle.cached().graph.input_bind_order().is_empty());

        lifecycle.set_topology(&[1, -1]).unwrap();
        assert_eq!(
            lifecycle.cached().graph.input_bind_order(),
            [BufferSlot::Bound(1), BufferSlot::Unbound]
        );
    }

    #[test]
    fn new_shaders_clear_live_bindings() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a", "b"]).unwrap();
        lifecycle.set_topology(&[-1, 0]).unwrap();
        let engine = sync(&lifecycle).unwrap();
        draw(&engine);

        lifecycle.set_shader_list(["a", "b", "c"]).unwrap();
        assert!(engine.config().input_bind_order().is_empty());
        assert_eq!(engine.config().pass_count(), 3);

        // old generation stays visible until the new bindings arrive
        assert_eq!(draw(&engine), 2);

        lifecycle.set_topology(&[-1, 0, 1]).unwrap();
        assert_eq!(draw(&engine), 3);
        assert_eq!(engine.generation(), 2);
    }

    #[test]
    fn engine_restored_from_cache() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_background_images(["/missing/bg.png"]);
        lifecycle.set_shader_list(["a", "b", "c"]).unwrap();
        lifecycle.set_topology(&[-1, 0, 1]).unwrap();

        let engine = sync(&lifecycle).unwrap();
        let config = engine.config();
        assert_eq!(config.pass_count(), 3);
        assert!(config.topology_dirty());
        assert!(config.images_dirty());
        assert_eq!(config.background_paths(), [PathBuf::from("/missing/bg.png")]);
        assert_eq!(draw(&engine), 3);
    }

    #[test]
    fn cache_without_bindings_waits() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a", "b"]).unwrap();

        let engine = sync(&lifecycle).unwrap();
        assert!(!engine.config().topology_dirty());
        assert_eq!(draw(&engine), 0);
    }

    #[test]
    fn stop_destroys_on_next_sync() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a", "b"]).unwrap();
        lifecycle.set_topology(&[-1, 0]).unwrap();

        let engine = sync(&lifecycle).unwrap();
        let weak = Arc::downgrade(&engine);
        draw(&engine);
        drop(engine);

        lifecycle.set_running(false);
        assert!(lifecycle.engine().is_none());
        // still alive until the render side gets to it
        assert!(weak.upgrade().is_some());

        assert!(sync(&lifecycle).is_none());
        assert!(weak.upgrade().is_none());
        assert!(sync(&lifecycle).is_none());
    }

    #[test]
    fn restart_recreates_from_cache() {
        let (lifecycle, redraws) = lifecycle();
        lifecycle.set_shader_list(["a", "b"]).unwrap();
        lifecycle.set_topology(&[-1, 0]).unwrap();
        let first = sync(&lifecycle).unwrap();
        draw(&first);
        drop(first);

        lifecycle.set_running(false);
        sync(&lifecycle);

        // accepted while stopped, picked up on restart
        lifecycle.set_topology(&[-1, -1]).unwrap();

        let before = redraws.load(Ordering::SeqCst);
        lifecycle.set_running(true);
        assert_eq!(redraws.load(Ordering::SeqCst), before + 1);

        let engine = sync(&lifecycle).unwrap();
        assert_eq!(
            engine.config().input_bind_order(),
            [BufferSlot::Unbound, BufferSlot::Unbound]
        );
        assert_eq!(draw(&engine), 2);
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn surface_loss_drops_immediately() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a"]).unwrap();
        lifecycle.set_topology(&[-1]).unwrap();

        let engine = sync(&lifecycle).unwrap();
        let weak = Arc::downgrade(&engine);
        drop(engine);

        lifecycle.surface_invalidated();
        assert!(weak.upgrade().is_none());

        let engine = sync(&lifecycle).unwrap();
        assert_eq!(draw(&engine), 1);
    }

    #[test]
    fn changes_request_redraw() {
        let (lifecycle, redraws) = lifecycle();
        lifecycle.set_shader_list(["a"]).unwrap();
        lifecycle.set_topology(&[-1]).unwrap();
        lifecycle.set_background_images(["bg.png"]);
        assert_eq!(redraws.load(Ordering::SeqCst), 3);

        assert!(lifecycle.set_topology(&[0]).is_err());
        assert_eq!(redraws.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn frame_params_reach_engine() {
        let (lifecycle, _) = lifecycle();
        lifecycle.set_shader_list(["a", "b"]).unwrap();
        lifecycle.set_topology(&[-1, 0]).unwrap();
        lifecycle.set_time(1.0);
        lifecycle.set_pointer(Vec2::new(4.0, 2.0));
        lifecycle.set_pressed(true);

        let engine = sync(&lifecycle).unwrap();
        draw(&engine);
        engine.with_backend(|backend| {
            let uniforms = backend.uniforms[0];
            assert_eq!(uniforms.time, 1.0);
            assert_eq!(uniforms.frame, 60);
            assert_eq!(uniforms.mouse, [4.0, 2.0, 1.0, 0.0]);
        });
    }

    #[test]
    fn engine_shared_across_threads() {
        let (lifecycle, _) = lifecycle();
        let lifecycle = Arc::new(lifecycle);
        lifecycle.set_shader_list(["a", "b"]).unwrap();
        lifecycle.set_topology(&[-1, 0]).unwrap();
        let engine = sync(&lifecycle).unwrap();

        let control = {
            let lifecycle = lifecycle.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    let raw = if i % 2 == 0 { [-1, 0] } else { [-1, -1] };
                    lifecycle.set_topology(&raw).unwrap();
                }
            })
        };
        for _ in 0..50 {
            let drawn = draw(&engine);
            assert_eq!(drawn, 2);
        }
        control.join().unwrap();
    }
}
