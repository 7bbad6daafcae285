//! Temporal reprojection ("timewarp") for real-time renderers.
//!
//! The [`Engine`] holds a reference frame (color + motion/depth, together with
//! the camera it was rendered from) and, while the host keeps the hold toggle
//! enabled, reprojects it onto each following frame instead of presenting the
//! freshly rendered image.
//!
//! Everything GPU-specific goes through a [`Backend`]; see [`CpuBackend`] and
//! [`WgpuBackend`].

mod backend;
mod backends;
mod camera;
mod capture;
mod config;
mod engine;
mod error;
mod reference_frame;
#[cfg(test)]
mod testing;
mod toggle;

pub use timewarp_gpu as gpu;

pub use self::backend::*;
pub use self::backends::*;
pub use self::camera::*;
pub use self::capture::*;
pub use self::config::*;
pub use self::engine::*;
pub use self::error::*;
pub(crate) use self::reference_frame::*;
pub use self::toggle::*;
