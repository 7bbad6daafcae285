//! Common structs and math shared by Timewarp's passes: uniform layouts,
//! texel encodings and the reprojection itself.
//!
//! Everything here is plain old data (or pure functions over it), so that GPU
//! kernels can mirror it and the CPU backend can execute it directly.

#![allow(clippy::manual_range_contains)]

mod camera;
mod color;
mod motion_depth;
mod reprojection;
mod uniforms;

pub use self::camera::*;
pub use self::color::*;
pub use self::motion_depth::*;
pub use self::reprojection::*;
pub use self::uniforms::*;
