use std::fmt;

use glam::{UVec2, Vec4};

use crate::{gpu, BackendError};

/// Format of the reference frame's textures.
pub const REFERENCE_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Rgba16Float;

/// GPU programs run by the engine; the shaders themselves are provided by the
/// backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Reads source + motion/depth, writes both reference textures.
    Initialize,

    /// Reads source + reference textures, writes the destination.
    Timewarp,

    /// Copies source into the destination.
    Display,
}

impl Pass {
    pub fn label(self) -> &'static str {
        match self {
            Pass::Initialize => "initialize",
            Pass::Timewarp => "timewarp",
            Pass::Display => "display",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: &'static str,
    pub size: UVec2,
    pub format: wgpu::TextureFormat,
    pub layers: u32,
}

impl TextureDescriptor {
    /// Describes a single-layer texture in [`REFERENCE_FORMAT`].
    pub fn new(label: &'static str, size: UVec2) -> Self {
        Self {
            label,
            size,
            format: REFERENCE_FORMAT,
            layers: 1,
        }
    }
}

/// Inputs of a pass.
#[derive(Debug)]
pub struct Bindings<'a, T> {
    pub source: &'a T,
    pub motion_depth: Option<&'a T>,
    pub reference: Option<ReferenceTextures<'a, T>>,
    pub uniforms: gpu::TimewarpUniforms,
}

impl<'a, T> Bindings<'a, T> {
    pub fn new(source: &'a T) -> Self {
        Self {
            source,
            motion_depth: None,
            reference: None,
            uniforms: Default::default(),
        }
    }

    pub fn with_motion_depth(mut self, motion_depth: &'a T) -> Self {
        self.motion_depth = Some(motion_depth);
        self
    }

    pub fn with_reference(mut self, color: &'a T, motion_depth: &'a T) -> Self {
        self.reference = Some(ReferenceTextures {
            color,
            motion_depth,
        });
        self
    }

    pub fn with_uniforms(mut self, uniforms: gpu::TimewarpUniforms) -> Self {
        self.uniforms = uniforms;
        self
    }
}

#[derive(Debug)]
pub struct ReferenceTextures<'a, T> {
    pub color: &'a T,
    pub motion_depth: &'a T,
}

/// Pixels downloaded from a texture, in linear color space.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadbackImage {
    pub size: UVec2,
    pub pixels: Vec<Vec4>,
}

/// Graphics API the engine issues its work to.
///
/// All methods are expected to only *record* work; the engine never waits for
/// the GPU.
pub trait Backend {
    type Texture;
    type Readback;

    /// Allocates a temporary texture; each texture returned from here is
    /// passed back to [`Self::release()`] exactly once.
    fn allocate(
        &mut self,
        desc: &TextureDescriptor,
    ) -> Result<Self::Texture, BackendError>;

    fn release(&mut self, texture: Self::Texture);

    /// Runs given pass over a fullscreen triangle, writing into `targets`.
    fn run_pass(
        &mut self,
        pass: Pass,
        bindings: &Bindings<'_, Self::Texture>,
        targets: &[&Self::Texture],
    ) -> Result<(), BackendError>;

    fn blit(
        &mut self,
        source: &Self::Texture,
        destination: &Self::Texture,
        pass: Pass,
        uniforms: gpu::TimewarpUniforms,
    ) -> Result<(), BackendError> {
        self.run_pass(
            pass,
            &Bindings::new(source).with_uniforms(uniforms),
            &[destination],
        )
    }

    /// Starts downloading given texture into the CPU memory.
    fn read_back(
        &mut self,
        texture: &Self::Texture,
    ) -> Result<Self::Readback, BackendError>;

    /// Returns the downloaded image, if it's ready.
    fn poll_read_back(
        &mut self,
        readback: &mut Self::Readback,
    ) -> Option<Result<ReadbackImage, BackendError>>;
}
