use bytemuck::{Pod, Zeroable};
use glam::{vec4, UVec2, Vec4};

use crate::CameraMatrices;

/// Uniforms bound to every pass.
///
/// For passes other than the timewarp one, `prev` mirrors `curr`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TimewarpUniforms {
    pub prev: CameraMatrices,
    pub curr: CameraMatrices,

    /// x - number of ticks elapsed since the reference frame was captured
    /// y - screen width
    /// z - screen height
    /// w - unused
    pub data: Vec4,
}

impl TimewarpUniforms {
    pub fn new(
        prev: CameraMatrices,
        curr: CameraMatrices,
        ticks_since_capture: u32,
        screen_size: UVec2,
    ) -> Self {
        Self {
            prev,
            curr,
            data: vec4(
                ticks_since_capture as f32,
                screen_size.x as f32,
                screen_size.y as f32,
                0.0,
            ),
        }
    }

    pub fn ticks_since_capture(&self) -> u32 {
        self.data.x as u32
    }

    pub fn screen_size(&self) -> UVec2 {
        UVec2::new(self.data.y as u32, self.data.z as u32)
    }
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    #[test]
    fn layout() {
        assert_eq!(208, mem::size_of::<CameraMatrices>());
        assert_eq!(432, mem::size_of::<TimewarpUniforms>());
        assert_eq!(0, mem::size_of::<TimewarpUniforms>() % 16);
    }

    #[test]
    fn data() {
        let target = TimewarpUniforms::new(
            Default::default(),
            Default::default(),
            7,
            UVec2::new(1920, 1080),
        );

        assert_eq!(7, target.ticks_since_capture());
        assert_eq!(UVec2::new(1920, 1080), target.screen_size());
    }
}
