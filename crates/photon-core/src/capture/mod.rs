//! Seams to the capture collaborator.

pub mod decoder;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;

use crate::frame::{Frame, FrameStaticProperties, ImageRotationMode};

/// A hardware-specific trait of a camera that can change which stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraQuirk {
    /// Capture hardware rotates and converts to single-channel itself.
    GpuGrayscale,
    /// Exposes a gain control.
    Gain,
    /// Cannot exceed 100 fps.
    FpsCap100,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuirkSet(HashSet<CameraQuirk>);

impl QuirkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, quirk: CameraQuirk) -> bool {
        self.0.contains(&quirk)
    }

    pub fn insert(&mut self, quirk: CameraQuirk) {
        self.0.insert(quirk);
    }
}

impl FromIterator<CameraQuirk> for QuirkSet {
    fn from_iter<I: IntoIterator<Item = CameraQuirk>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Delivers frames from one camera, in capture order.
pub trait FrameSource {
    fn quirks(&self) -> &QuirkSet;

    fn static_properties(&self) -> Arc<FrameStaticProperties>;

    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Capability-specific capture path that rotates and converts on the capture
/// hardware and can hand back a color copy of the current frame.
pub trait AcceleratedCapture: Send {
    /// Probe whether the accelerated path is usable on this machine.
    fn is_supported(&self) -> bool;

    fn set_rotation(&mut self, rotation: ImageRotationMode);

    /// Whether frames should be delivered single-channel.
    fn set_grayscale_output(&mut self, grayscale: bool);

    /// Whether a color copy of each frame should be kept for `grab_color_frame`.
    fn set_copy_color(&mut self, copy_color: bool);

    /// An owned copy of the color image matching the current frame, if one was
    /// kept. The capture path retains ownership of its own buffer.
    fn grab_color_frame(&mut self) -> Option<RgbImage>;
}
