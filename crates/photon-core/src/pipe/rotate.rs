use image::imageops;

use super::{Configure, Pipe};
use crate::frame::{FrameImage, ImageRotationMode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotateImageParams {
    pub rotation: ImageRotationMode,
}

/// Rotates the input clockwise by the configured quarter turns.
#[derive(Debug, Default)]
pub struct RotateImagePipe {
    params: RotateImageParams,
}

impl Configure for RotateImagePipe {
    type Params = RotateImageParams;

    fn set_params(&mut self, params: RotateImageParams) {
        self.params = params;
    }
}

impl Pipe<FrameImage> for RotateImagePipe {
    type Output = FrameImage;

    fn process(&mut self, input: FrameImage) -> FrameImage {
        match (self.params.rotation, input) {
            (ImageRotationMode::Deg0, image) => image,
            (ImageRotationMode::Deg90, FrameImage::Color(img)) => {
                FrameImage::Color(imageops::rotate90(&img))
            }
            (ImageRotationMode::Deg180, FrameImage::Color(img)) => {
                FrameImage::Color(imageops::rotate180(&img))
            }
            (ImageRotationMode::Deg270, FrameImage::Color(img)) => {
                FrameImage::Color(imageops::rotate270(&img))
            }
            (ImageRotationMode::Deg90, FrameImage::Gray(img)) => {
                FrameImage::Gray(imageops::rotate90(&img))
            }
            (ImageRotationMode::Deg180, FrameImage::Gray(img)) => {
                FrameImage::Gray(imageops::rotate180(&img))
            }
            (ImageRotationMode::Deg270, FrameImage::Gray(img)) => {
                FrameImage::Gray(imageops::rotate270(&img))
            }
        }
    }
}
