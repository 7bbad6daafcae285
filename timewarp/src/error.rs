use glam::UVec2;
use thiserror::Error;

use crate::Pass;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no shader has been provided for the {0} pass")]
    MissingPass(Pass),

    #[error("texture format {0:?} is not supported")]
    UnsupportedFormat(wgpu::TextureFormat),

    #[error("texture is not known to this backend")]
    UnknownTexture,

    #[error("couldn't allocate texture `{label}`: {reason}")]
    AllocationFailed { label: String, reason: String },

    #[error("{pass} pass failed: {reason}")]
    PassFailed { pass: Pass, reason: String },

    #[error("readback failed: {0}")]
    ReadbackFailed(String),
}

/// Reason a tick fell back to passing the source image through.
#[derive(Debug, Error)]
pub enum Degradation {
    #[error("no reference frame is available")]
    MissingReference,

    #[error(
        "reference frame is {}x{}, but the frame is {}x{}",
        .reference.x, .reference.y, .frame.x, .frame.y
    )]
    ResolutionMismatch { reference: UVec2, frame: UVec2 },

    #[error("couldn't allocate the reference frame")]
    AllocationFailed(#[source] BackendError),

    #[error("{pass} pass failed")]
    PassFailed {
        pass: Pass,

        #[source]
        error: BackendError,
    },
}
