/// Host-controlled settings, sampled by [`crate::Engine::tick()`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// `1` keeps presenting the reference frame (reprojected), `0` passes
    /// frames through; each `0 -> 1` transition captures a new reference
    /// frame.
    pub hold_frame: i32,

    /// Each `0 -> 1` transition exports the next warped frame through the
    /// capture sink, if there is one.
    pub capture_frame: i32,

    pub mode: ReprojectionMode,
}

impl EngineConfig {
    pub fn with_hold_frame(mut self, hold_frame: i32) -> Self {
        self.hold_frame = hold_frame;
        self
    }

    pub fn with_capture_frame(mut self, capture_frame: i32) -> Self {
        self.capture_frame = capture_frame;
        self
    }

    pub fn with_mode(mut self, mode: ReprojectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Out-of-range values are clamped, the same way the toggles see them.
    pub fn is_holding(&self) -> bool {
        self.hold_frame.clamp(0, 1) == 1
    }
}

/// Strategy driving the engine's per-tick state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ReprojectionMode {
    /// Hold a reference frame and warp it onto every tick until the hold
    /// toggle is released.
    #[default]
    Timewarp,
}
