//! Shaderloom viewer
//!
//! Compiles the given shaders, wires them into a pass graph and renders it into
//! a window. Space pauses (tearing the engine down) and resumes (rebuilding it
//! from the cached configuration).
//!
//! ```text
//! shaderloom demos/shaders/plasma.wgsl demos/shaders/blur.wgsl \
//!     --topology=-1,0 --background noise.png
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use shaderloom::{
    CompilerConfig, ExternalCompiler, GpuContext, GraphLifecycle, Redraw, SurfaceState, Vec2,
    Viewport, WgpuBackend,
};

/// Runtime-reconfigurable multi-pass shader viewer
#[derive(Parser, Debug)]
#[command(name = "shaderloom")]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Shader sources, one per pass; the last one draws to the window
    #[arg(required = true)]
    shaders: Vec<PathBuf>,

    /// Input pass of each pass, -1 for none [default: a chain]
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    topology: Vec<i32>,

    /// Background images (up to three)
    #[arg(short, long = "background")]
    backgrounds: Vec<PathBuf>,

    /// Shader compiler executable
    #[arg(long, default_value = "naga")]
    compiler: PathBuf,

    /// Extra arguments passed to the compiler before the input and output
    #[arg(long = "compiler-arg", allow_hyphen_values = true)]
    compiler_args: Vec<String>,

    /// Where compiled shaders are written [default: compiled/ next to the executable]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Compiler timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Window title
    #[arg(long, default_value = "Shaderloom")]
    title: String,

    /// Window width
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Window height
    #[arg(long, default_value = "720")]
    height: u32,
}

impl AppConfig {
    fn compiler_config(&self) -> CompilerConfig {
        let mut config = CompilerConfig::new()
            .program(&self.compiler)
            .args(self.compiler_args.iter().cloned())
            .timeout(Duration::from_millis(self.timeout_ms));
        if let Some(dir) = &self.output_dir {
            config = config.output_dir(dir);
        }
        config
    }

    /// The explicit topology, or a chain where each pass reads the previous one.
    fn topology(&self) -> Vec<i32> {
        if self.topology.is_empty() {
            (0..self.shaders.len() as i32).map(|i| i - 1).collect()
        } else {
            self.topology.clone()
        }
    }
}

type Lifecycle = GraphLifecycle<WgpuBackend, ExternalCompiler>;

struct App {
    config: AppConfig,
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    lifecycle: Option<Lifecycle>,
    start_time: Instant,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            gpu: None,
            lifecycle: None,
            start_time: Instant::now(),
        }
    }

    fn create_lifecycle(&self, window: &Arc<Window>) -> Lifecycle {
        let redraw_window = window.clone();
        let lifecycle = GraphLifecycle::new(
            ExternalCompiler::new(self.config.compiler_config()),
            Redraw::new(move || redraw_window.request_redraw()),
        );

        lifecycle.set_background_images(self.config.backgrounds.iter().cloned());
        if let Err(e) = lifecycle.set_shader_list(self.config.shaders.iter().cloned()) {
            log::error!("shader list rejected: {e}");
        }
        if let Err(e) = lifecycle.set_topology(&self.config.topology()) {
            log::error!("topology rejected: {e}");
        }
        lifecycle
    }

    fn redraw(&self) {
        let (Some(window), Some(gpu), Some(lifecycle)) = (&self.window, &self.gpu, &self.lifecycle)
        else {
            return;
        };

        lifecycle.set_time(self.start_time.elapsed().as_secs_f32());
        let surface = SurfaceState {
            viewport: Viewport::from_size(gpu.width(), gpu.height()),
            device_pixel_ratio: window.scale_factor() as f32,
        };
        let engine = lifecycle.sync(surface, || WgpuBackend::new(gpu));

        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, rebuilding");
                lifecycle.surface_invalidated();
                gpu.reconfigure();
                window.request_redraw();
                return;
            }
            Err(e) => {
                log::warn!("skipping frame: {e}");
                window.request_redraw();
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        if let Some(engine) = &engine {
            engine.execute_offscreen(&mut encoder);
        }

        let composited = {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Surface Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            engine
                .as_ref()
                .is_some_and(|engine| engine.execute_composite(&mut render_pass))
        };

        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        // The composite schedules the next frame itself; until it can, keep
        // polling so a pending rebuild or recreation gets its chance.
        if !composited && lifecycle.is_running() {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.config.width,
                self.config.height,
            ));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("cannot create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let gpu = match GpuContext::new(window.clone()) {
            Ok(gpu) => gpu,
            Err(e) => {
                log::error!("{e}");
                event_loop.exit();
                return;
            }
        };

        self.lifecycle = Some(self.create_lifecycle(&window));
        self.gpu = Some(gpu);
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(size.width, size.height);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (Some(window), Some(lifecycle)) = (&self.window, &self.lifecycle) {
                    let logical = position.to_logical::<f32>(window.scale_factor());
                    lifecycle.set_pointer(Vec2::new(logical.x, logical.y));
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(lifecycle) = &self.lifecycle {
                    lifecycle.set_pressed(state == ElementState::Pressed);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && event.physical_key == PhysicalKey::Code(KeyCode::Space)
                {
                    if let Some(lifecycle) = &self.lifecycle {
                        lifecycle.set_running(!lifecycle.is_running());
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::parse();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("cannot create event loop: {e}");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop failed: {e}");
        std::process::exit(1);
    }
}
