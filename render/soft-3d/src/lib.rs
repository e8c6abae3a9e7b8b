#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::used_underscore_binding,
    clippy::too_many_lines,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::similar_names,
)]

pub mod config;
pub mod raster;
#[cfg(feature = "threaded")]
pub mod threaded;

use tachyon_core::gpu::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// A complete RGB565 frame, assembled from every worker's slice.
#[derive(Clone)]
pub struct Frame {
    pixels: Box<[u16]>,
}

impl Frame {
    pub fn new() -> Self {
        Frame {
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[u16] {
        &self.pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u16] {
        &mut self.pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH]
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// The host side of rendering: receives finished frames and signals the emulated machine.
pub trait Presenter {
    fn submit_frame(&mut self, frame: &Frame);

    /// Called once a frame has been submitted, whether it rendered cleanly or not.
    fn interrupt(&mut self);
}
