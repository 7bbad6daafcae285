use glam::{vec2, Vec2, Vec4};

/// Single texel of the motion/depth buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionDepth {
    /// Screen-space motion in UV units per frame (current minus previous).
    pub motion: Vec2,

    /// Device depth, `0..1`.
    pub depth: f32,
}

impl MotionDepth {
    pub fn serialize(&self) -> Vec4 {
        self.motion.extend(self.depth).extend(0.0)
    }

    pub fn deserialize(d0: Vec4) -> Self {
        Self {
            motion: vec2(d0.x, d0.y),
            depth: d0.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization() {
        let target = MotionDepth {
            motion: vec2(0.125, -0.5),
            depth: 0.75,
        };

        let target = MotionDepth::deserialize(target.serialize());

        assert_eq!(vec2(0.125, -0.5), target.motion);
        assert_eq!(0.75, target.depth);
    }
}
