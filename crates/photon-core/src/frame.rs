use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::{GrayImage, RgbImage};

use crate::calibration::{CameraCalibration, Intrinsics};
use crate::time::monotonic_nanos;

/// Pixel data of a frame. Accelerated capture paths deliver single-channel
/// images that are already rotated and converted.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameImage {
    Color(RgbImage),
    Gray(GrayImage),
}

impl FrameImage {
    pub fn channels(&self) -> u8 {
        match self {
            FrameImage::Color(_) => 3,
            FrameImage::Gray(_) => 1,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            FrameImage::Color(img) => img.width(),
            FrameImage::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            FrameImage::Color(img) => img.height(),
            FrameImage::Gray(img) => img.height(),
        }
    }

    /// The color image, expanding gray pixels if needed.
    pub fn into_rgb(self) -> RgbImage {
        match self {
            FrameImage::Color(img) => img,
            FrameImage::Gray(img) => image::DynamicImage::ImageLuma8(img).into_rgb8(),
        }
    }

    /// A color copy, expanding gray pixels if needed.
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            FrameImage::Color(img) => img.clone(),
            FrameImage::Gray(img) => image::DynamicImage::ImageLuma8(img.clone()).into_rgb8(),
        }
    }
}

/// Input rotation applied before processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageRotationMode {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl ImageRotationMode {
    /// Quarter turns clockwise; the value handed to capture hardware.
    pub fn quarter_turns(self) -> u8 {
        match self {
            ImageRotationMode::Deg0 => 0,
            ImageRotationMode::Deg90 => 1,
            ImageRotationMode::Deg180 => 2,
            ImageRotationMode::Deg270 => 3,
        }
    }

    /// Whether width and height swap.
    pub fn is_transposed(self) -> bool {
        matches!(self, ImageRotationMode::Deg90 | ImageRotationMode::Deg270)
    }
}

impl fmt::Display for ImageRotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u32::from(self.quarter_turns()) * 90)
    }
}

impl FromStr for ImageRotationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("deg") {
            "0" => Ok(ImageRotationMode::Deg0),
            "90" => Ok(ImageRotationMode::Deg90),
            "180" => Ok(ImageRotationMode::Deg180),
            "270" => Ok(ImageRotationMode::Deg270),
            other => Err(format!("unsupported rotation '{other}', expected 0, 90, 180 or 270")),
        }
    }
}

/// Capture-time context shared by every frame of one camera configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStaticProperties {
    pub width: u32,
    pub height: u32,
    pub horizontal_fov_degrees: f64,
    pub calibration: Option<CameraCalibration>,
    /// Rotation the capture path has already applied to single-channel
    /// frames. Color frames are always delivered unrotated.
    pub rotation: ImageRotationMode,
}

impl FrameStaticProperties {
    pub fn new(width: u32, height: u32, horizontal_fov_degrees: f64) -> Self {
        assert!(width > 0 && height > 0, "invalid frame size {width}x{height}");
        Self {
            width,
            height,
            horizontal_fov_degrees,
            calibration: None,
            rotation: ImageRotationMode::Deg0,
        }
    }

    pub fn with_calibration(mut self, calibration: Option<CameraCalibration>) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_rotation(mut self, rotation: ImageRotationMode) -> Self {
        self.rotation = rotation;
        self
    }

    /// Intrinsics good enough for yaw/pitch when no calibration is usable.
    pub fn approximate_intrinsics(&self, width: u32, height: u32) -> Intrinsics {
        Intrinsics::from_fov(width, height, self.horizontal_fov_degrees)
    }
}

/// One captured image plus its capture-time metadata.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: FrameImage,
    /// `time::monotonic_nanos()` at capture.
    pub timestamp_nanos: u64,
    pub static_props: Arc<FrameStaticProperties>,
}

impl Frame {
    pub fn new(
        image: FrameImage,
        timestamp_nanos: u64,
        static_props: Arc<FrameStaticProperties>,
    ) -> Self {
        Self {
            image,
            timestamp_nanos,
            static_props,
        }
    }

    /// Stamp `image` with the current monotonic time.
    pub fn captured_now(image: FrameImage, static_props: Arc<FrameStaticProperties>) -> Self {
        Self::new(image, monotonic_nanos(), static_props)
    }

    /// A derived frame that keeps this frame's timestamp and properties.
    pub fn with_image(&self, image: FrameImage) -> Self {
        Self::new(image, self.timestamp_nanos, Arc::clone(&self.static_props))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_parses_degrees() {
        assert_eq!("90".parse::<ImageRotationMode>().unwrap(), ImageRotationMode::Deg90);
        assert_eq!("deg270".parse::<ImageRotationMode>().unwrap(), ImageRotationMode::Deg270);
        assert!("45".parse::<ImageRotationMode>().is_err());
        assert_eq!(ImageRotationMode::Deg180.to_string(), "180");
    }

    #[test]
    fn gray_image_expands_to_rgb() {
        let gray = FrameImage::Gray(GrayImage::from_pixel(2, 1, image::Luma([77])));
        let rgb = gray.to_rgb();
        assert_eq!(rgb.get_pixel(1, 0).0, [77, 77, 77]);
        assert_eq!(gray.channels(), 1);
    }

    #[test]
    fn derived_frame_keeps_metadata() {
        let props = Arc::new(FrameStaticProperties::new(4, 4, 70.0));
        let frame = Frame::new(FrameImage::Color(RgbImage::new(4, 4)), 42, props);
        let derived = frame.with_image(FrameImage::Gray(GrayImage::new(4, 4)));
        assert_eq!(derived.timestamp_nanos, 42);
        assert!(Arc::ptr_eq(&derived.static_props, &frame.static_props));
    }
}
