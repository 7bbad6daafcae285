//! Renders a synthetic scene on the CPU, holds the first frame and then warps
//! it while the camera keeps moving; the last warped frame gets saved into
//! `orbit.png`.

use std::env;
use std::f32::consts::PI;

use glam::{uvec2, vec3, vec4, Mat4, UVec2, Vec3};
use timewarp::{
    Camera, CpuBackend, CpuImage, Engine, EngineConfig, Frame, Outcome,
    PngSink,
};

const SIZE: UVec2 = uvec2(256, 256);
const TICKS: u32 = 60;

fn main() {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| "orbit.png".into());
    let mut backend = CpuBackend::new();

    let source = backend.create_texture(scene());
    let motion_depth = backend.create_texture(CpuImage::filled(
        SIZE,
        vec4(0.0, 0.0, 0.98, 0.0),
    ));
    let destination = backend.create_texture(CpuImage::new(SIZE));

    let mut engine =
        Engine::new(backend).with_capture_sink(PngSink::new(&path));
    let mut warped = 0;

    for tick in 0..TICKS {
        let config = EngineConfig::default()
            .with_hold_frame(1)
            .with_capture_frame((tick == TICKS - 1) as i32);

        let outcome = engine.tick(
            &config,
            Frame {
                size: SIZE,
                camera: camera(tick),
                source: &source,
                motion_depth: &motion_depth,
                destination: &destination,
            },
        );

        match outcome {
            Outcome::Warped => warped += 1,
            Outcome::Degraded(degradation) => {
                panic!("Tick {tick} got degraded: {degradation}");
            }
            _ => (),
        }
    }

    println!("Warped {warped} of {TICKS} frames; saving into `{path}`");

    // Dropping the engine drops the sink, which waits for the PNG writer
    drop(engine);
}

fn camera(tick: u32) -> Camera {
    let angle = (tick as f32) / (TICKS as f32) * PI / 8.0;
    let eye = vec3(angle.sin(), 0.0, angle.cos()) * 5.0;

    Camera::new(
        eye,
        Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
        Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0),
    )
}

fn scene() -> CpuImage {
    CpuImage::from_fn(SIZE, |pos| {
        let checker = (pos.x / 32 + pos.y / 32) % 2 == 0;

        if checker {
            vec4(0.9, 0.5, 0.1, 1.0)
        } else {
            vec4(0.1, 0.2, 0.6, 1.0)
        }
    })
}
