//! Per-pass GPU resources for one rebuild generation.

use crate::backend::GraphBackend;
use crate::config::PassSpec;

/// Where a pass renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// Renders into its own intermediate image.
    Offscreen,
    /// The last pass; renders into the host's presentation pass.
    Screen,
}

/// What a pass's dynamic input binding resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    /// The intermediate image of the pass at this index.
    Pass(usize),
    /// The first background image.
    Background,
}

/// Pipeline lifecycle within a generation.
///
/// `Failed` is sticky: a pipeline that failed is not retried until the next
/// rebuild or an explicit [`release_pipelines`](super::RenderGraph::release_pipelines).
#[derive(Debug, Default)]
pub enum PipelineState<P> {
    #[default]
    Pending,
    Ready(P),
    Failed,
}

impl<P> PipelineState<P> {
    pub fn ready(&self) -> Option<&P> {
        match self {
            Self::Ready(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// GPU-side state of one pass.
pub(crate) struct PassResource<B: GraphBackend> {
    pub desc: PassSpec,
    /// `None` for the screen pass.
    pub target: Option<B::Image>,
    pub bindings: Option<B::Bindings>,
    pub input_source: Option<InputSource>,
    pub pipeline: PipelineState<B::Pipeline>,
}

impl<B: GraphBackend> PassResource<B> {
    pub fn new(desc: PassSpec, target: Option<B::Image>) -> Self {
        Self {
            desc,
            target,
            bindings: None,
            input_source: None,
            pipeline: PipelineState::Pending,
        }
    }

    pub fn kind(&self) -> PassKind {
        if self.target.is_some() {
            PassKind::Offscreen
        } else {
            PassKind::Screen
        }
    }

    pub fn summary(&self) -> PassSummary {
        PassSummary {
            desc: self.desc.clone(),
            kind: self.kind(),
            input_source: self.input_source,
            has_bindings: self.bindings.is_some(),
            pipeline: match self.pipeline {
                PipelineState::Pending => PipelineStatus::Pending,
                PipelineState::Ready(_) => PipelineStatus::Ready,
                PipelineState::Failed => PipelineStatus::Failed,
            },
        }
    }
}

/// [`PipelineState`] without the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    Ready,
    Failed,
}

/// A resource-free snapshot of one pass, for diagnostics and overlays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassSummary {
    pub desc: PassSpec,
    pub kind: PassKind,
    pub input_source: Option<InputSource>,
    pub has_bindings: bool,
    pub pipeline: PipelineStatus,
}
