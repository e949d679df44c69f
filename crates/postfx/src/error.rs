use resources::ResourceLoadError;

use crate::device::{FramebufferStatus, ObjectKind, ShaderStage};

/// Everything that can abort pipeline construction. Per-frame rendering has no
/// error path once construction succeeded.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0} allocation failed")]
    Allocation(ObjectKind),
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link:\n{log}")]
    Link { log: String },
    #[error(transparent)]
    ResourceLoad(#[from] ResourceLoadError),
    #[error("framebuffer is incomplete: {0}")]
    FramebufferIncomplete(FramebufferStatus),
}
