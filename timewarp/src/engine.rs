use std::mem;

use derivative::Derivative;
use fxhash::FxHashSet;
use glam::UVec2;
use log::{debug, error, info, trace, warn};

use crate::{
    gpu, to_display_image, Backend, BackendError, Bindings, Camera,
    CameraSnapshot, CaptureSink, Degradation, EngineConfig, Pass,
    ReferenceFrame, ReprojectionMode, Toggle,
};

/// Auxiliary buffers the host has to render for the engine to work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuxiliaryBuffers {
    pub motion_vectors: bool,
    pub depth: bool,
}

/// Everything the host provides for a single tick.
#[derive(Debug)]
pub struct Frame<'a, T> {
    /// Output resolution; `source`, `motion_depth` and `destination` are all
    /// expected to match it.
    pub size: UVec2,
    pub camera: Camera,
    pub source: &'a T,
    pub motion_depth: &'a T,
    pub destination: &'a T,
}

/// What a tick ended up doing with the frame.
#[derive(Debug)]
pub enum Outcome {
    /// Source has been displayed as-is.
    PassedThrough,

    /// A new reference frame has been captured and the source has been
    /// displayed as-is.
    Recaptured,

    /// Reference frame has been reprojected into the destination.
    Warped,

    /// Something went wrong; the source has been displayed as-is (unless the
    /// display pass itself has failed).
    Degraded(Degradation),
}

impl Outcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Failure {
    Allocation,
    Pass(Pass),
    Readback,
}

/// Temporal reprojection engine.
///
/// Call [`Engine::tick()`] once per rendered frame.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Engine<B>
where
    B: Backend,
{
    #[derivative(Debug = "ignore")]
    backend: B,
    hold: Toggle,
    capture: Toggle,
    #[derivative(Debug = "ignore")]
    reference: Option<ReferenceFrame<B::Texture>>,
    #[derivative(Debug = "ignore")]
    sink: Option<Box<dyn CaptureSink>>,
    #[derivative(Debug = "ignore")]
    pending_captures: Vec<B::Readback>,
    reported_failures: FxHashSet<Failure>,
    frame: u32,
}

impl<B> Engine<B>
where
    B: Backend,
{
    pub const REQUIRED_BUFFERS: AuxiliaryBuffers = AuxiliaryBuffers {
        motion_vectors: true,
        depth: true,
    };

    pub fn new(backend: B) -> Self {
        info!("Initializing");

        Self {
            backend,
            hold: Toggle::new("hold_frame"),
            capture: Toggle::new("capture_frame"),
            reference: None,
            sink: None,
            pending_captures: Default::default(),
            reported_failures: Default::default(),
            frame: 0,
        }
    }

    pub fn with_capture_sink(
        mut self,
        sink: impl CaptureSink + 'static,
    ) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Returns the size of the current reference frame, if there's one.
    pub fn reference_size(&self) -> Option<UVec2> {
        self.reference.as_ref().map(|reference| reference.size)
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Returns camera captured together with the current reference frame.
    pub fn reference_camera(&self) -> Option<&CameraSnapshot> {
        self.reference.as_ref().map(|reference| &reference.camera)
    }

    pub fn pending_captures(&self) -> usize {
        self.pending_captures.len()
    }

    pub fn tick(
        &mut self,
        config: &EngineConfig,
        frame: Frame<'_, B::Texture>,
    ) -> Outcome {
        self.frame = self.frame.wrapping_add(1);

        let hold_edge = self.hold.check_rising_edge(config.hold_frame);
        let capture_edge =
            self.capture.check_rising_edge(config.capture_frame);
        let mismatch = self.validate_reference(frame.size);

        let outcome = match config.mode {
            ReprojectionMode::Timewarp => {
                self.tick_timewarp(config, hold_edge, mismatch, &frame)
            }
        };

        if capture_edge {
            self.request_capture(&outcome, frame.destination);
        }

        self.poll_captures();

        trace!("Tick {} finished: {:?}", self.frame, outcome);

        outcome
    }

    fn tick_timewarp(
        &mut self,
        config: &EngineConfig,
        hold_edge: bool,
        mismatch: Option<Degradation>,
        frame: &Frame<'_, B::Texture>,
    ) -> Outcome {
        let camera = frame.camera.snapshot();

        if hold_edge {
            self.recapture(frame, camera)
        } else if config.is_holding() {
            self.warp(frame, camera, mismatch)
        } else {
            match self.display(frame, camera) {
                Ok(()) => Outcome::PassedThrough,
                Err(error) => Outcome::Degraded(Degradation::PassFailed {
                    pass: Pass::Display,
                    error,
                }),
            }
        }
    }

    fn recapture(
        &mut self,
        frame: &Frame<'_, B::Texture>,
        camera: CameraSnapshot,
    ) -> Outcome {
        if let Some(reference) = self.reference.take() {
            reference.release(&mut self.backend);
        }

        debug!(
            "Capturing reference frame; frame={}, camera: {}",
            self.frame,
            frame.camera.describe()
        );

        let reference = ReferenceFrame::capture(
            &mut self.backend,
            frame,
            camera,
            self.frame,
        );

        match reference {
            Ok(reference) => {
                self.reference = Some(reference);
                self.recover(Failure::Allocation);
                self.recover(Failure::Pass(Pass::Initialize));

                match self.display(frame, camera) {
                    Ok(()) => Outcome::Recaptured,
                    Err(error) => Outcome::Degraded(Degradation::PassFailed {
                        pass: Pass::Display,
                        error,
                    }),
                }
            }

            Err(degradation) => self.degrade(frame, camera, degradation),
        }
    }

    fn warp(
        &mut self,
        frame: &Frame<'_, B::Texture>,
        camera: CameraSnapshot,
        mismatch: Option<Degradation>,
    ) -> Outcome {
        let Some(reference) = &self.reference else {
            let degradation = mismatch.unwrap_or(Degradation::MissingReference);

            return self.degrade(frame, camera, degradation);
        };

        let uniforms = gpu::TimewarpUniforms::new(
            reference.camera.serialize(),
            camera.serialize(),
            self.frame.wrapping_sub(reference.captured_at),
            frame.size,
        );

        let bindings = Bindings::new(frame.source)
            .with_motion_depth(frame.motion_depth)
            .with_reference(&reference.color, &reference.motion_depth)
            .with_uniforms(uniforms);

        let result = self.backend.run_pass(
            Pass::Timewarp,
            &bindings,
            &[frame.destination],
        );

        match result {
            Ok(()) => {
                self.recover(Failure::Pass(Pass::Timewarp));
                Outcome::Warped
            }

            Err(error) => self.degrade(
                frame,
                camera,
                Degradation::PassFailed {
                    pass: Pass::Timewarp,
                    error,
                },
            ),
        }
    }

    /// Reports given degradation and falls back to displaying the source.
    fn degrade(
        &mut self,
        frame: &Frame<'_, B::Texture>,
        camera: CameraSnapshot,
        degradation: Degradation,
    ) -> Outcome {
        match &degradation {
            Degradation::MissingReference => {
                trace!("No reference frame; passing frame through");
            }

            Degradation::ResolutionMismatch { .. } => {
                debug!("{degradation}; passing frame through");
            }

            Degradation::AllocationFailed(error) => {
                self.report(Failure::Allocation, error);
            }

            Degradation::PassFailed { pass, error } => {
                self.report(Failure::Pass(*pass), error);
            }
        }

        // The display pass reports its own failures
        _ = self.display(frame, camera);

        Outcome::Degraded(degradation)
    }

    fn display(
        &mut self,
        frame: &Frame<'_, B::Texture>,
        camera: CameraSnapshot,
    ) -> Result<(), BackendError> {
        let uniforms = gpu::TimewarpUniforms::new(
            camera.serialize(),
            camera.serialize(),
            0,
            frame.size,
        );

        let result = self.backend.blit(
            frame.source,
            frame.destination,
            Pass::Display,
            uniforms,
        );

        match &result {
            Ok(()) => self.recover(Failure::Pass(Pass::Display)),
            Err(error) => self.report(Failure::Pass(Pass::Display), error),
        }

        result
    }

    /// Releases the reference frame if it no longer matches the output size.
    fn validate_reference(&mut self, size: UVec2) -> Option<Degradation> {
        let reference = self.reference.take()?;

        if reference.size == size {
            self.reference = Some(reference);
            return None;
        }

        warn!(
            "Output size changed from {}x{} to {}x{}; dropping reference frame",
            reference.size.x, reference.size.y, size.x, size.y
        );

        let degradation = Degradation::ResolutionMismatch {
            reference: reference.size,
            frame: size,
        };

        reference.release(&mut self.backend);

        Some(degradation)
    }

    fn request_capture(
        &mut self,
        outcome: &Outcome,
        destination: &B::Texture,
    ) {
        if self.sink.is_none() {
            debug!("Capture requested, but there's no capture sink; ignoring");
            return;
        }

        if !matches!(outcome, Outcome::Warped) {
            debug!("Capture requested on a frame that wasn't warped; ignoring");
            return;
        }

        match self.backend.read_back(destination) {
            Ok(readback) => {
                self.pending_captures.push(readback);
            }
            Err(error) => {
                self.report(Failure::Readback, &error);
            }
        }
    }

    fn poll_captures(&mut self) {
        let mut idx = 0;

        while idx < self.pending_captures.len() {
            let Some(result) =
                self.backend.poll_read_back(&mut self.pending_captures[idx])
            else {
                idx += 1;
                continue;
            };

            self.pending_captures.remove(idx);

            match result {
                Ok(image) => {
                    self.recover(Failure::Readback);

                    if let Some(sink) = &mut self.sink {
                        sink.save(to_display_image(&image));
                    }
                }
                Err(error) => {
                    self.report(Failure::Readback, &error);
                }
            }
        }
    }

    /// Logs given failure, once per its kind.
    fn report(&mut self, failure: Failure, error: &BackendError) {
        if self.reported_failures.insert(failure) {
            error!("{error}; falling back to pass-through");
        } else {
            trace!("{error}");
        }
    }

    /// Forgets about given failure, so that it gets reported again if it
    /// happens once more.
    fn recover(&mut self, failure: Failure) {
        if self.reported_failures.remove(&failure) {
            info!("Recovered from {failure:?} failure");
        }
    }

    /// Releases the reference frame; can be called many times.
    pub fn release(&mut self) {
        if let Some(reference) = self.reference.take() {
            reference.release(&mut self.backend);
        }

        let dropped = mem::take(&mut self.pending_captures).len();

        if dropped > 0 {
            debug!("Dropping {dropped} pending capture(s)");
        }
    }
}

impl<B> Drop for Engine<B>
where
    B: Backend,
{
    fn drop(&mut self) {
        info!("Releasing");

        self.release();
    }
}
