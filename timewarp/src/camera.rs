use glam::{Mat4, Vec3};

use crate::gpu;

/// Camera of the frame being processed, as reported by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Camera's position in world-coordinates.
    pub position: Vec3,

    /// World-to-view matrix.
    pub view: Mat4,

    /// Projection matrix, including temporal anti-aliasing jitter (if any).
    pub projection: Mat4,

    /// Projection matrix without the jitter.
    pub non_jittered_projection: Mat4,
}

impl Camera {
    /// Builds a camera without any jitter applied.
    pub fn new(position: Vec3, view: Mat4, projection: Mat4) -> Self {
        Self {
            position,
            view,
            projection,
            non_jittered_projection: projection,
        }
    }

    pub fn with_jitter(mut self, projection: Mat4) -> Self {
        self.projection = projection;
        self
    }

    /// Computes matrices used by the reprojection.
    ///
    /// The view and projection matrices must be invertible; that's always the
    /// case for a camera with a non-degenerate frustum.
    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            position: self.position,
            inv_view: self.view.inverse(),
            inv_projection: self.projection.inverse(),
            projection_view: self.non_jittered_projection * self.view,
        }
    }

    pub(crate) fn describe(&self) -> String {
        format!(
            "position={:.2}x{:.2}x{:.2}",
            self.position.x, self.position.y, self.position.z
        )
    }
}

/// Matrices derived from a [`Camera`]; see [`Camera::snapshot()`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSnapshot {
    pub position: Vec3,
    pub inv_view: Mat4,
    pub inv_projection: Mat4,
    pub projection_view: Mat4,
}

impl CameraSnapshot {
    pub fn serialize(&self) -> gpu::CameraMatrices {
        gpu::CameraMatrices {
            position: self.position.extend(1.0),
            inv_view: self.inv_view,
            inv_projection: self.inv_projection,
            projection_view: self.projection_view,
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{vec3, Quat};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn random_camera(rng: &mut StdRng) -> Camera {
        let position = vec3(
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
        );

        let rotation = Quat::from_euler(
            glam::EulerRot::YXZ,
            rng.gen_range(-3.1..3.1),
            rng.gen_range(-1.5..1.5),
            rng.gen_range(-0.5..0.5),
        );

        let view =
            Mat4::from_rotation_translation(rotation, position).inverse();

        let projection = Mat4::perspective_rh(
            rng.gen_range(30f32..110.0).to_radians(),
            rng.gen_range(0.5..2.5),
            rng.gen_range(0.1..1.0),
            rng.gen_range(50.0..500.0),
        );

        Camera::new(position, view, projection)
    }

    #[test]
    fn snapshot() {
        let view =
            Mat4::look_at_rh(vec3(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y);

        let projection =
            Mat4::perspective_rh(60f32.to_radians(), 1.5, 0.1, 100.0);

        let jittered = Mat4::from_translation(vec3(0.001, -0.001, 0.0))
            * projection;

        let target = Camera::new(vec3(0.0, 1.0, 5.0), view, projection)
            .with_jitter(jittered)
            .snapshot();

        assert_eq!(vec3(0.0, 1.0, 5.0), target.position);
        assert!((target.inv_view * view).abs_diff_eq(Mat4::IDENTITY, 1e-5));

        assert!((target.inv_projection * jittered)
            .abs_diff_eq(Mat4::IDENTITY, 1e-5));

        assert_eq!(projection * view, target.projection_view);
    }

    #[test]
    fn snapshot_inverses_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..128 {
            let camera = random_camera(&mut rng);
            let target = camera.snapshot();

            assert!(target
                .inv_view
                .inverse()
                .abs_diff_eq(camera.view, 1e-3));

            assert!(target
                .inv_projection
                .inverse()
                .abs_diff_eq(camera.projection, 1e-3));
        }
    }

    #[test]
    fn serialize() {
        let target = Camera::new(
            vec3(1.0, 2.0, 3.0),
            Mat4::IDENTITY,
            Mat4::perspective_rh(1.0, 1.0, 0.1, 10.0),
        )
        .snapshot()
        .serialize();

        assert_eq!(vec3(1.0, 2.0, 3.0), target.position());
        assert_eq!(Mat4::IDENTITY, target.inv_view);
    }
}
