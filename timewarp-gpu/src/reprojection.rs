use glam::{Vec2, Vec3Swizzles, Vec4Swizzles};

use crate::{ndc_to_uv, MotionDepth, TimewarpUniforms};

/// Where a reference-frame texel lands in the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reprojection {
    pub uv: Vec2,
    pub depth: f32,
}

impl Reprojection {
    /// Reprojects a texel of the reference frame into the current frame.
    ///
    /// The texel is first moved along its motion vector, once per tick since
    /// the capture, so that objects which were moving keep moving. Its
    /// world-space position is then reconstructed from depth using the
    /// previous camera's inverse projection and view matrices, and projected
    /// through the current camera's projection-view matrix.
    ///
    /// Returns `None` for texels that land behind the current camera or
    /// outside of the screen.
    pub fn of(
        uv: Vec2,
        texel: MotionDepth,
        uniforms: &TimewarpUniforms,
    ) -> Option<Self> {
        let ticks = uniforms.ticks_since_capture() as f32;
        let uv = uv + texel.motion * ticks;
        let world = uniforms.prev.uv_to_world(uv, texel.depth);
        let clip = uniforms.curr.world_to_clip(world);

        if clip.w <= 0.0 {
            return None;
        }

        let ndc = clip.xyz() / clip.w;

        if ndc.z < 0.0 || ndc.z > 1.0 {
            return None;
        }

        let uv = ndc_to_uv(ndc.xy());

        if uv.x < 0.0 || uv.y < 0.0 || uv.x >= 1.0 || uv.y >= 1.0 {
            return None;
        }

        Some(Self { uv, depth: ndc.z })
    }
}

#[cfg(test)]
mod tests {
    use glam::{vec2, vec3, Mat4, UVec2, Vec3};

    use super::*;
    use crate::CameraMatrices;

    fn camera(eye: Vec3, target: Vec3) -> CameraMatrices {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let projection =
            Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);

        CameraMatrices {
            position: eye.extend(1.0),
            inv_view: view.inverse(),
            inv_projection: projection.inverse(),
            projection_view: projection * view,
        }
    }

    fn texel(depth: f32) -> MotionDepth {
        MotionDepth {
            motion: Vec2::ZERO,
            depth,
        }
    }

    #[test]
    fn stationary_camera() {
        let cam = camera(vec3(0.0, 0.0, 5.0), Vec3::ZERO);
        let uniforms = TimewarpUniforms::new(cam, cam, 1, UVec2::splat(64));

        for uv in [vec2(0.5, 0.5), vec2(0.1, 0.9), vec2(0.75, 0.25)] {
            let target = Reprojection::of(uv, texel(0.99), &uniforms).unwrap();

            assert!(target.uv.abs_diff_eq(uv, 1e-4));
            assert!((target.depth - 0.99).abs() < 1e-4);
        }
    }

    #[test]
    fn camera_moving_right() {
        let prev = camera(vec3(0.0, 0.0, 5.0), Vec3::ZERO);
        let curr = camera(vec3(1.0, 0.0, 5.0), vec3(1.0, 0.0, 0.0));
        let uniforms = TimewarpUniforms::new(prev, curr, 1, UVec2::splat(64));

        let target =
            Reprojection::of(vec2(0.5, 0.5), texel(0.99), &uniforms).unwrap();

        // Scene moves left when the camera moves right
        assert!(target.uv.x < 0.5);
        assert!((target.uv.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn camera_moving_forward() {
        let prev = camera(vec3(0.0, 0.0, 5.0), Vec3::ZERO);
        let curr = camera(vec3(0.0, 0.0, 4.0), vec3(0.0, 0.0, -1.0));
        let uniforms = TimewarpUniforms::new(prev, curr, 1, UVec2::splat(64));

        let target =
            Reprojection::of(vec2(0.75, 0.5), texel(0.99), &uniforms).unwrap();

        // Points spread away from the center when approaching them
        assert!(target.uv.x > 0.75);
    }

    #[test]
    fn moving_object() {
        let cam = camera(vec3(0.0, 0.0, 5.0), Vec3::ZERO);
        let uniforms = TimewarpUniforms::new(cam, cam, 4, UVec2::splat(64));

        let texel = MotionDepth {
            motion: vec2(0.05, -0.025),
            depth: 0.99,
        };

        let target =
            Reprojection::of(vec2(0.5, 0.5), texel, &uniforms).unwrap();

        assert!(target.uv.abs_diff_eq(vec2(0.7, 0.4), 1e-4));
        assert!((target.depth - 0.99).abs() < 1e-4);
    }

    #[test]
    fn moving_object_and_camera() {
        let prev = camera(vec3(0.0, 0.0, 5.0), Vec3::ZERO);
        let curr = camera(vec3(1.0, 0.0, 5.0), vec3(1.0, 0.0, 0.0));
        let uniforms = TimewarpUniforms::new(prev, curr, 2, UVec2::splat(64));

        let still = Reprojection::of(vec2(0.5, 0.5), texel(0.99), &uniforms)
            .unwrap();

        let texel = MotionDepth {
            motion: vec2(0.1, 0.0),
            depth: 0.99,
        };

        let moving =
            Reprojection::of(vec2(0.5, 0.5), texel, &uniforms).unwrap();

        assert!(moving.uv.x > still.uv.x);
        assert!((moving.uv.y - still.uv.y).abs() < 1e-4);
    }

    #[test]
    fn object_moving_off_screen() {
        let cam = camera(vec3(0.0, 0.0, 5.0), Vec3::ZERO);
        let uniforms = TimewarpUniforms::new(cam, cam, 10, UVec2::splat(64));

        let texel = MotionDepth {
            motion: vec2(0.1, 0.0),
            depth: 0.99,
        };

        assert_eq!(None, Reprojection::of(vec2(0.5, 0.5), texel, &uniforms));
    }

    #[test]
    fn point_behind_camera() {
        let prev = camera(vec3(0.0, 0.0, 5.0), Vec3::ZERO);
        let curr = camera(vec3(0.0, 0.0, -5.0), vec3(0.0, 0.0, -10.0));
        let uniforms = TimewarpUniforms::new(prev, curr, 1, UVec2::splat(64));

        assert_eq!(
            None,
            Reprojection::of(vec2(0.5, 0.5), texel(0.99), &uniforms)
        );
    }
}
