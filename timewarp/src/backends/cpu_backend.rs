use fxhash::{FxHashMap, FxHashSet};
use glam::{uvec2, UVec2, Vec2, Vec4};
use log::warn;

use crate::gpu::{MotionDepth, Reprojection, TimewarpUniforms};
use crate::{
    Backend, BackendError, Bindings, Pass, ReadbackImage, TextureDescriptor,
    REFERENCE_FORMAT,
};

/// Software implementation of [`Backend`].
///
/// Executes all passes on the CPU, synchronously; meant for tests, tooling and
/// as a reference for GPU implementations.
#[derive(Debug, Default)]
pub struct CpuBackend {
    images: FxHashMap<CpuTexture, CpuImage>,
    temporaries: FxHashSet<CpuTexture>,
    failing_passes: FxHashSet<Pass>,
    stats: CpuBackendStats,
    next_id: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CpuBackendStats {
    pub allocations: usize,
    pub releases: usize,

    /// Passes run so far, together with uniforms they've been given.
    pub passes: Vec<(Pass, TimewarpUniforms)>,
}

impl CpuBackendStats {
    pub fn pass_kinds(&self) -> Vec<Pass> {
        self.passes.iter().map(|(pass, _)| *pass).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CpuTexture(u32);

#[derive(Clone, Debug)]
pub struct CpuReadback(Option<ReadbackImage>);

impl CpuBackend {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers host-owned texture (e.g. a source or destination image).
    pub fn create_texture(&mut self, image: CpuImage) -> CpuTexture {
        let texture = CpuTexture(self.next_id);

        self.next_id += 1;
        self.images.insert(texture, image);

        texture
    }

    pub fn image(&self, texture: CpuTexture) -> Option<&CpuImage> {
        self.images.get(&texture)
    }

    pub fn write(
        &mut self,
        texture: CpuTexture,
        image: CpuImage,
    ) -> Result<(), BackendError> {
        *self
            .images
            .get_mut(&texture)
            .ok_or(BackendError::UnknownTexture)? = image;

        Ok(())
    }

    /// Makes given pass fail until [`Self::repair_pass()`] is called.
    pub fn fail_pass(&mut self, pass: Pass) {
        self.failing_passes.insert(pass);
    }

    pub fn repair_pass(&mut self, pass: Pass) {
        self.failing_passes.remove(&pass);
    }

    pub fn stats(&self) -> &CpuBackendStats {
        &self.stats
    }

    /// Returns the number of textures allocated through [`Backend::allocate()`]
    /// that haven't been released yet.
    pub fn live_allocations(&self) -> usize {
        self.temporaries.len()
    }

    fn get(&self, texture: &CpuTexture) -> Result<&CpuImage, BackendError> {
        self.images.get(texture).ok_or(BackendError::UnknownTexture)
    }

    fn initialize(
        &mut self,
        bindings: &Bindings<'_, CpuTexture>,
        targets: &[&CpuTexture],
    ) -> Result<(), BackendError> {
        let [color, motion_depth] = targets else {
            return Err(failure(Pass::Initialize, "expected two targets"));
        };

        let source_motion_depth = bindings.motion_depth.ok_or_else(|| {
            failure(Pass::Initialize, "missing motion/depth input")
        })?;

        let new_color = self
            .get(color)?
            .resampled_from(self.get(bindings.source)?);

        let new_motion_depth = self
            .get(motion_depth)?
            .resampled_from(self.get(source_motion_depth)?);

        self.write(**color, new_color)?;
        self.write(**motion_depth, new_motion_depth)?;

        Ok(())
    }

    fn timewarp(
        &mut self,
        bindings: &Bindings<'_, CpuTexture>,
        targets: &[&CpuTexture],
    ) -> Result<(), BackendError> {
        let [destination] = targets else {
            return Err(failure(Pass::Timewarp, "expected one target"));
        };

        let reference = bindings.reference.as_ref().ok_or_else(|| {
            failure(Pass::Timewarp, "missing reference textures")
        })?;

        let image = warp(
            self.get(reference.color)?,
            self.get(reference.motion_depth)?,
            self.get(destination)?.size(),
            &bindings.uniforms,
        );

        self.write(**destination, image)
    }

    fn display(
        &mut self,
        bindings: &Bindings<'_, CpuTexture>,
        targets: &[&CpuTexture],
    ) -> Result<(), BackendError> {
        let [destination] = targets else {
            return Err(failure(Pass::Display, "expected one target"));
        };

        let image = self
            .get(destination)?
            .resampled_from(self.get(bindings.source)?);

        self.write(**destination, image)
    }
}

impl Backend for CpuBackend {
    type Texture = CpuTexture;
    type Readback = CpuReadback;

    fn allocate(
        &mut self,
        desc: &TextureDescriptor,
    ) -> Result<CpuTexture, BackendError> {
        if desc.format != REFERENCE_FORMAT {
            return Err(BackendError::UnsupportedFormat(desc.format));
        }

        if desc.size.x == 0 || desc.size.y == 0 || desc.layers != 1 {
            return Err(BackendError::AllocationFailed {
                label: desc.label.into(),
                reason: format!(
                    "invalid size: {}x{}x{}",
                    desc.size.x, desc.size.y, desc.layers
                ),
            });
        }

        let texture = self.create_texture(CpuImage::new(desc.size));

        self.temporaries.insert(texture);
        self.stats.allocations += 1;

        Ok(texture)
    }

    fn release(&mut self, texture: CpuTexture) {
        if !self.temporaries.remove(&texture) {
            warn!("Tried to release unknown texture: {texture:?}");
            return;
        }

        self.images.remove(&texture);
        self.stats.releases += 1;
    }

    fn run_pass(
        &mut self,
        pass: Pass,
        bindings: &Bindings<'_, CpuTexture>,
        targets: &[&CpuTexture],
    ) -> Result<(), BackendError> {
        if self.failing_passes.contains(&pass) {
            return Err(failure(pass, "pass has been disabled"));
        }

        self.stats.passes.push((pass, bindings.uniforms));

        match pass {
            Pass::Initialize => self.initialize(bindings, targets),
            Pass::Timewarp => self.timewarp(bindings, targets),
            Pass::Display => self.display(bindings, targets),
        }
    }

    fn read_back(
        &mut self,
        texture: &CpuTexture,
    ) -> Result<CpuReadback, BackendError> {
        let image = self.get(texture)?;

        Ok(CpuReadback(Some(ReadbackImage {
            size: image.size,
            pixels: image.pixels.clone(),
        })))
    }

    fn poll_read_back(
        &mut self,
        readback: &mut CpuReadback,
    ) -> Option<Result<ReadbackImage, BackendError>> {
        readback.0.take().map(Ok)
    }
}

fn failure(pass: Pass, reason: &str) -> BackendError {
    BackendError::PassFailed {
        pass,
        reason: reason.into(),
    }
}

/// Forward-warps the reference frame into an image of given size.
///
/// Each reference texel lands where [`Reprojection`] puts it, with the closest
/// one winning; texels nothing landed on keep the reference color.
fn warp(
    color: &CpuImage,
    motion_depth: &CpuImage,
    size: UVec2,
    uniforms: &TimewarpUniforms,
) -> CpuImage {
    let mut image = CpuImage::new(size).resampled_from(color);
    let mut depths = vec![f32::INFINITY; image.pixels.len()];

    for y in 0..color.size.y {
        for x in 0..color.size.x {
            let pos = uvec2(x, y);
            let uv = (pos.as_vec2() + 0.5) / color.size.as_vec2();
            let texel = MotionDepth::deserialize(motion_depth.sample(uv));

            let Some(reprojection) = Reprojection::of(uv, texel, uniforms)
            else {
                continue;
            };

            let idx = image.idx(image.texel_at(reprojection.uv));

            if reprojection.depth < depths[idx] {
                depths[idx] = reprojection.depth;
                image.pixels[idx] = color.get(pos);
            }
        }
    }

    image
}

/// Image stored by [`CpuBackend`], in linear color space.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuImage {
    size: UVec2,
    pixels: Vec<Vec4>,
}

impl CpuImage {
    pub fn new(size: UVec2) -> Self {
        Self::filled(size, Vec4::ZERO)
    }

    pub fn filled(size: UVec2, color: Vec4) -> Self {
        Self {
            size,
            pixels: vec![color; (size.x * size.y) as usize],
        }
    }

    pub fn from_fn(size: UVec2, f: impl Fn(UVec2) -> Vec4) -> Self {
        let pixels = (0..size.y)
            .flat_map(|y| (0..size.x).map(move |x| uvec2(x, y)))
            .map(f)
            .collect();

        Self { size, pixels }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn get(&self, pos: UVec2) -> Vec4 {
        self.pixels[self.idx(pos)]
    }

    pub fn set(&mut self, pos: UVec2, color: Vec4) {
        let idx = self.idx(pos);

        self.pixels[idx] = color;
    }

    /// Samples the image at given UV-coordinates, using the nearest texel.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        if self.pixels.is_empty() {
            return Vec4::ZERO;
        }

        self.get(self.texel_at(uv))
    }

    /// Returns an image of the same size as `self`, with contents of `other`
    /// stretched over it.
    fn resampled_from(&self, other: &CpuImage) -> CpuImage {
        if self.size == other.size {
            return other.clone();
        }

        let size = self.size.as_vec2();

        CpuImage::from_fn(self.size, |pos| {
            other.sample((pos.as_vec2() + 0.5) / size)
        })
    }

    fn texel_at(&self, uv: Vec2) -> UVec2 {
        let max = uvec2(
            self.size.x.saturating_sub(1),
            self.size.y.saturating_sub(1),
        );

        (uv * self.size.as_vec2()).as_uvec2().min(max)
    }

    fn idx(&self, pos: UVec2) -> usize {
        (pos.y * self.size.x + pos.x) as usize
    }
}
