use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use image::{ImageFormat, Rgba, RgbaImage};
use log::{error, info, warn};

use crate::{gpu, ReadbackImage};

/// Receives warped frames exported through the capture toggle.
///
/// Called from within [`crate::Engine::tick()`], so implementations shouldn't
/// block.
pub trait CaptureSink {
    fn save(&mut self, image: RgbaImage);
}

impl CaptureSink for mpsc::Sender<RgbaImage> {
    fn save(&mut self, image: RgbaImage) {
        if self.send(image).is_err() {
            warn!("Capture dropped - receiver is gone");
        }
    }
}

/// Writes captures as PNG into a fixed path, on a background thread.
///
/// Each capture overwrites the previous one; captures are written in the
/// order they were saved, so after [`Self::flush()`] the file holds the most
/// recent one.
#[derive(Debug)]
pub struct PngSink {
    path: PathBuf,
    writer: Option<PngWriter>,
}

#[derive(Debug)]
struct PngWriter {
    tx: mpsc::Sender<RgbaImage>,
    handle: JoinHandle<()>,
}

impl PngSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits until all captures issued so far are written.
    pub fn flush(&mut self) {
        let Some(PngWriter { tx, handle }) = self.writer.take() else {
            return;
        };

        drop(tx);

        if handle.join().is_err() {
            error!("Capture writer panicked");
        }
    }

    fn spawn_writer(&self) -> PngWriter {
        let (tx, rx) = mpsc::channel::<RgbaImage>();
        let path = self.path.clone();

        let handle = thread::spawn(move || {
            for image in rx {
                write_png(&path, &image);
            }
        });

        PngWriter { tx, handle }
    }
}

impl CaptureSink for PngSink {
    fn save(&mut self, mut image: RgbaImage) {
        if let Some(writer) = &self.writer {
            match writer.tx.send(image) {
                Ok(()) => return,
                Err(mpsc::SendError(unsent)) => {
                    warn!("Capture writer is gone; restarting it");
                    image = unsent;
                    self.flush();
                }
            }
        }

        let writer = self.spawn_writer();

        if writer.tx.send(image).is_err() {
            error!("Couldn't hand capture over to the writer");
        }

        self.writer = Some(writer);
    }
}

impl Drop for PngSink {
    fn drop(&mut self) {
        self.flush();
    }
}

fn write_png(path: &Path, image: &RgbaImage) {
    match image.save_with_format(path, ImageFormat::Png) {
        Ok(()) => {
            info!("Capture saved to `{}`", path.display());
        }
        Err(err) => {
            error!("Couldn't save capture to `{}`: {err}", path.display());
        }
    }
}

/// Converts linear pixels into an 8-bit image in display (gamma) encoding.
pub fn to_display_image(readback: &ReadbackImage) -> RgbaImage {
    let width = readback.size.x;

    if readback.pixels.len() != (readback.size.x * readback.size.y) as usize {
        warn!(
            "Readback has {} pixels, expected {}x{}; missing ones will be black",
            readback.pixels.len(),
            readback.size.x,
            readback.size.y,
        );
    }

    RgbaImage::from_fn(readback.size.x, readback.size.y, |x, y| {
        let color = readback
            .pixels
            .get((y * width + x) as usize)
            .copied()
            .unwrap_or_default();

        Rgba(gpu::encode_display(color))
    })
}

#[cfg(test)]
mod tests {
    use std::env;

    use glam::{uvec2, vec4, Vec4};

    use super::*;

    #[test]
    fn display_image() {
        let readback = ReadbackImage {
            size: uvec2(2, 1),
            pixels: vec![vec4(1.0, 0.0, 0.5, 1.0), Vec4::ZERO],
        };

        let target = to_display_image(&readback);

        assert_eq!((2, 1), target.dimensions());
        assert_eq!(Rgba([255, 0, 188, 255]), *target.get_pixel(0, 0));
        assert_eq!(Rgba([0, 0, 0, 0]), *target.get_pixel(1, 0));
    }

    #[test]
    fn display_image_with_missing_pixels() {
        let readback = ReadbackImage {
            size: uvec2(2, 2),
            pixels: vec![Vec4::ONE],
        };

        let target = to_display_image(&readback);

        assert_eq!(Rgba([255, 255, 255, 255]), *target.get_pixel(0, 0));
        assert_eq!(Rgba([0, 0, 0, 0]), *target.get_pixel(1, 1));
    }

    #[test]
    fn channel_sink() {
        let (tx, rx) = mpsc::channel();
        let mut target = tx;

        target.save(RgbaImage::new(3, 2));

        assert_eq!((3, 2), rx.try_recv().unwrap().dimensions());
    }

    #[test]
    fn png_sink() {
        let path = env::temp_dir()
            .join(format!("timewarp-capture-{}.png", std::process::id()));

        let mut target = PngSink::new(&path);

        target.save(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])));
        target.flush();

        let image = image::open(&path).unwrap().to_rgba8();

        assert_eq!((4, 4), image.dimensions());
        assert_eq!(Rgba([10, 20, 30, 255]), *image.get_pixel(3, 3));

        _ = std::fs::remove_file(&path);
    }

    #[test]
    fn png_sink_keeps_latest_capture() {
        let path = env::temp_dir().join(format!(
            "timewarp-capture-latest-{}.png",
            std::process::id()
        ));

        let mut target = PngSink::new(&path);

        for idx in 0..=20u8 {
            target.save(RgbaImage::from_pixel(64, 64, Rgba([idx, 0, 0, 255])));
        }

        target.flush();

        let image = image::open(&path).unwrap().to_rgba8();

        assert_eq!(Rgba([20, 0, 0, 255]), *image.get_pixel(0, 0));

        // Sink stays usable after flushing
        target.save(RgbaImage::from_pixel(64, 64, Rgba([99, 0, 0, 255])));
        drop(target);

        let image = image::open(&path).unwrap().to_rgba8();

        assert_eq!(Rgba([99, 0, 0, 255]), *image.get_pixel(0, 0));

        _ = std::fs::remove_file(&path);
    }
}
