mod cpu_backend;
mod wgpu_backend;

pub use self::cpu_backend::*;
pub use self::wgpu_backend::*;
