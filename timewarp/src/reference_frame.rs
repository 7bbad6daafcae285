use glam::UVec2;
use log::{debug, info};

use crate::{
    gpu, Backend, Bindings, CameraSnapshot, Degradation, Frame, Pass,
    TextureDescriptor,
};

/// Frame captured on the hold toggle's rising edge, warped onto the following
/// ticks.
pub(crate) struct ReferenceFrame<T> {
    pub color: T,
    pub motion_depth: T,
    pub size: UVec2,
    pub camera: CameraSnapshot,
    pub captured_at: u32,
}

impl<T> ReferenceFrame<T> {
    /// Allocates the reference textures and fills them from the current
    /// frame.
    ///
    /// On failure, everything allocated here is released before returning.
    pub fn capture<B>(
        backend: &mut B,
        frame: &Frame<'_, T>,
        camera: CameraSnapshot,
        tick: u32,
    ) -> Result<Self, Degradation>
    where
        B: Backend<Texture = T>,
    {
        info!(
            "Allocating reference frame; size={}x{}",
            frame.size.x, frame.size.y
        );

        let color = backend
            .allocate(&TextureDescriptor::new(
                "timewarp_reference_color",
                frame.size,
            ))
            .map_err(Degradation::AllocationFailed)?;

        let motion_depth = match backend.allocate(&TextureDescriptor::new(
            "timewarp_reference_motion_depth",
            frame.size,
        )) {
            Ok(motion_depth) => motion_depth,

            Err(err) => {
                backend.release(color);

                return Err(Degradation::AllocationFailed(err));
            }
        };

        let uniforms = gpu::TimewarpUniforms::new(
            camera.serialize(),
            camera.serialize(),
            0,
            frame.size,
        );

        let bindings = Bindings::new(frame.source)
            .with_motion_depth(frame.motion_depth)
            .with_uniforms(uniforms);

        let result = backend.run_pass(
            Pass::Initialize,
            &bindings,
            &[&color, &motion_depth],
        );

        if let Err(error) = result {
            backend.release(color);
            backend.release(motion_depth);

            return Err(Degradation::PassFailed {
                pass: Pass::Initialize,
                error,
            });
        }

        Ok(Self {
            color,
            motion_depth,
            size: frame.size,
            camera,
            captured_at: tick,
        })
    }

    pub fn release<B>(self, backend: &mut B)
    where
        B: Backend<Texture = T>,
    {
        debug!(
            "Releasing reference frame; size={}x{}, captured_at={}",
            self.size.x, self.size.y, self.captured_at
        );

        backend.release(self.color);
        backend.release(self.motion_depth);
    }
}
