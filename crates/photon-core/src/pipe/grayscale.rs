use image::{imageops, GrayImage};

use super::Pipe;
use crate::frame::FrameImage;

/// Converts to single-channel luma. Single-channel input passes through.
#[derive(Debug, Default)]
pub struct GrayscalePipe;

impl<'a> Pipe<&'a FrameImage> for GrayscalePipe {
    type Output = GrayImage;

    fn process(&mut self, input: &'a FrameImage) -> GrayImage {
        match input {
            FrameImage::Color(img) => imageops::grayscale(img),
            FrameImage::Gray(img) => img.clone(),
        }
    }
}
