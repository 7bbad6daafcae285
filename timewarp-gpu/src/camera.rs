use bytemuck::{Pod, Zeroable};
use glam::{vec2, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Camera matrices as seen by the passes.
///
/// Timewarp keeps two of these around: one captured together with the
/// reference frame ("previous") and one built fresh for each tick
/// ("current").
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraMatrices {
    /// Camera's position in world-coordinates; `w` is unused.
    pub position: Vec4,

    /// Inverse of the world-to-view matrix.
    pub inv_view: Mat4,

    /// Inverse of the (possibly jittered) projection matrix.
    pub inv_projection: Mat4,

    /// Non-jittered projection multiplied by the world-to-view matrix.
    pub projection_view: Mat4,
}

impl CameraMatrices {
    pub fn position(&self) -> Vec3 {
        self.position.xyz()
    }

    /// Given a point in UV-coordinates and its device depth, returns it in
    /// world-coordinates.
    pub fn uv_to_world(&self, uv: Vec2, depth: f32) -> Vec3 {
        let ndc = uv_to_ndc(uv).extend(depth);

        (self.inv_view * self.inv_projection).project_point3(ndc)
    }

    /// Given a point in world-coordinates, returns it in clip-coordinates.
    pub fn world_to_clip(&self, pos: Vec3) -> Vec4 {
        self.projection_view * pos.extend(1.0)
    }
}

/// Maps UV-coordinates (`0..1`, y pointing down) into NDC (`-1..1`, y pointing
/// up).
pub fn uv_to_ndc(uv: Vec2) -> Vec2 {
    vec2(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

/// Inverse of [`uv_to_ndc()`].
pub fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    vec2(0.5 * ndc.x + 0.5, 0.5 - 0.5 * ndc.y)
}

#[cfg(test)]
mod tests {
    use glam::{vec3, Vec3Swizzles};

    use super::*;

    #[test]
    fn uv_ndc_round_trip() {
        for uv in [vec2(0.0, 0.0), vec2(0.25, 0.75), vec2(1.0, 0.5)] {
            assert!(ndc_to_uv(uv_to_ndc(uv)).abs_diff_eq(uv, 1e-6));
        }

        assert_eq!(vec2(-1.0, 1.0), uv_to_ndc(vec2(0.0, 0.0)));
        assert_eq!(vec2(1.0, -1.0), uv_to_ndc(vec2(1.0, 1.0)));
    }

    #[test]
    fn uv_to_world() {
        let view = Mat4::look_at_rh(
            vec3(1.0, 2.0, 5.0),
            vec3(0.0, 0.0, 0.0),
            Vec3::Y,
        );

        let projection =
            Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);

        let target = CameraMatrices {
            position: vec3(1.0, 2.0, 5.0).extend(1.0),
            inv_view: view.inverse(),
            inv_projection: projection.inverse(),
            projection_view: projection * view,
        };

        let point = vec3(0.3, -0.2, 0.5);
        let clip = target.world_to_clip(point);
        let ndc = clip.xyz() / clip.w;
        let uv = ndc_to_uv(ndc.xy());

        assert!(target.uv_to_world(uv, ndc.z).abs_diff_eq(point, 1e-3));
    }
}
