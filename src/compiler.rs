//! Adapter for the external shader compiler.
//!
//! Shader authors hand over source files; the pipeline consumes compiled WGSL.
//! [`ExternalCompiler`] runs a command-line tool (the `naga` CLI by default) once
//! per source and waits for it with a timeout, writing one output per source
//! into a fixed directory as `<file name><suffix>`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::CompileError;

/// How often a running compiler is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Turns a shader source file into a file the GPU backend can load.
pub trait ShaderCompiler: Send + Sync {
    /// Compiles `source` and returns the path of the compiled output.
    fn compile(&self, source: &Path) -> Result<PathBuf, CompileError>;
}

/// Settings for [`ExternalCompiler`].
#[derive(Clone, Debug)]
pub struct CompilerConfig {
    /// Compiler executable. Bare names are looked up on `PATH`.
    pub program: PathBuf,
    /// Arguments placed before the input and output paths.
    pub args: Vec<String>,
    /// Directory compiled files are written to.
    pub output_dir: PathBuf,
    /// Appended to the source file name to form the output name.
    pub suffix: String,
    /// Maximum time a single invocation may take.
    pub timeout: Duration,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let output_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default()
            .join("compiled");

        Self {
            program: PathBuf::from("naga"),
            args: Vec::new(),
            output_dir,
            suffix: ".wgsl".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs an external tool as `program [args..] <source> <output>`.
#[derive(Clone, Debug, Default)]
pub struct ExternalCompiler {
    config: CompilerConfig,
}

impl ExternalCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Where the compiled form of `source` is written.
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let mut name = source
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(&self.config.suffix);
        self.config.output_dir.join(name)
    }

    /// Explicit paths must exist; bare program names are resolved by the OS.
    fn check_program(&self) -> Result<(), CompileError> {
        let program = &self.config.program;
        if program.components().count() > 1 && !program.exists() {
            return Err(CompileError::ToolMissing(program.clone()));
        }
        Ok(())
    }
}

impl ShaderCompiler for ExternalCompiler {
    fn compile(&self, source: &Path) -> Result<PathBuf, CompileError> {
        self.check_program()?;

        let source = local_path(source);
        if !source.exists() {
            return Err(CompileError::SourceMissing(source));
        }

        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| CompileError::OutputDir {
            path: self.config.output_dir.clone(),
            source: e,
        })?;

        let output = self.output_path(&source);
        log::debug!(
            "[compiler] {} {:?} {} {}",
            self.config.program.display(),
            self.config.args,
            source.display(),
            output.display()
        );

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(&source)
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CompileError::ToolMissing(self.config.program.clone())
                } else {
                    CompileError::Spawn(e)
                }
            })?;

        // Drained concurrently so a chatty compiler never blocks on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).ok();
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let deadline = Instant::now() + self.config.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                child.kill().ok();
                child.wait().ok();
                log::error!(
                    "[compiler] {} timed out after {:?}",
                    source.display(),
                    self.config.timeout
                );
                return Err(CompileError::Timeout {
                    shader: source,
                    after: self.config.timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            log::error!("[compiler] {} failed: {}", source.display(), stderr.trim());
            return Err(CompileError::Failed {
                shader: source,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        log::info!("[compiler] compiled {} -> {}", source.display(), output.display());
        Ok(output)
    }
}

/// Accepts both plain paths and `file://` URLs.
fn local_path(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("file://")) {
        Some(stripped) => PathBuf::from(stripped),
        None => path.to_path_buf(),
    }
}
