//! Error types for configuration, shader compilation and GPU resource creation.
//!
//! None of these are fatal. Configuration and compile errors are returned to the
//! control side and leave the previous state untouched; graph errors are logged by
//! the engine and degrade to a skipped pass.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A topology or shader list was rejected when it was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The shader list was empty.
    #[error("shader list is empty")]
    EmptyShaderList,

    /// A binding entry was neither `-1` nor a valid pass index, or sits past the last pass.
    #[error("pass {pass} reads from {input}, but the graph has {pass_count} passes")]
    OutOfRange {
        pass: usize,
        input: i32,
        pass_count: usize,
    },

    /// A pass was bound to its own output.
    #[error("pass {pass} reads from its own output")]
    SelfReference { pass: usize },

    /// Following input bindings from `pass` leads back to `pass`.
    #[error("binding cycle through pass {pass}")]
    Cycle { pass: usize },
}

/// The external shader compiler could not produce a compiled file.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The compiler executable does not exist.
    #[error("shader compiler not found at {}", .0.display())]
    ToolMissing(PathBuf),

    /// The shader source file does not exist.
    #[error("shader source not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The output directory could not be created.
    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler process could not be started or waited on.
    #[error("failed to run shader compiler: {0}")]
    Spawn(#[from] std::io::Error),

    /// The compiler ran longer than the configured timeout and was killed.
    #[error("compiling {} timed out after {after:?}", .shader.display())]
    Timeout { shader: PathBuf, after: Duration },

    /// The compiler exited unsuccessfully.
    #[error("compiling {} failed (exit code {code:?}): {stderr}", .shader.display())]
    Failed {
        shader: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

/// A GPU resource for a pass could not be created.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The intermediate image or its render target could not be allocated.
    #[error("render target for pass {pass} could not be created: {reason}")]
    Target { pass: usize, reason: String },

    /// The compiled shader file could not be read.
    #[error("cannot read compiled shader {}: {source}", .path.display())]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The pipeline for a pass failed validation.
    #[error("pipeline for pass {pass} could not be created: {reason}")]
    Pipeline { pass: usize, reason: String },
}

/// The window's GPU context could not be set up.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("cannot create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("cannot create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// Errors returned by the control-side API of [`GraphLifecycle`](crate::GraphLifecycle).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}
