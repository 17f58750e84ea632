use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_line_segment_mut, draw_text_mut};
use nalgebra::Vector3;
use tracing::{info, warn};

use photon_targeting::coordinate::CoordinateSystem;
use photon_targeting::{TargetCorner, TrackedTarget, Transform3d};

use super::{Configure, Pipe};
use crate::calibration::Intrinsics;

const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const AXIS_COLORS: [Rgb<u8>; 3] = [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255])];
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_SCALE: f32 = 18.0;
const CROSSHAIR_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Downscale factor applied to streamed output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameDivisor {
    #[default]
    None,
    Half,
    Quarter,
    Sixth,
}

impl FrameDivisor {
    pub fn factor(self) -> u32 {
        match self {
            FrameDivisor::None => 1,
            FrameDivisor::Half => 2,
            FrameDivisor::Quarter => 4,
            FrameDivisor::Sixth => 6,
        }
    }

    fn apply(self, img: RgbImage) -> RgbImage {
        let factor = self.factor();
        if factor == 1 {
            return img;
        }
        let w = (img.width() / factor).max(1);
        let h = (img.height() / factor).max(1);
        imageops::resize(&img, w, h, FilterType::Triangle)
    }
}

/// Load an optional label font. A missing or unreadable font only disables
/// text labels.
pub fn load_font(path: &Path) -> Option<FontVec> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(?path, error = %e, "failed to read font file");
            return None;
        }
    };
    match FontVec::try_from_vec(data) {
        Ok(font) => {
            info!(?path, "loaded label font");
            Some(font)
        }
        Err(e) => {
            warn!(?path, error = %e, "failed to parse font file");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawTargetsParams {
    pub should_draw: bool,
    /// Needed to draw pose axes; `None` draws outlines only.
    pub intrinsics: Option<Intrinsics>,
    pub tag_size_meters: f64,
    pub divisor: FrameDivisor,
}

impl Default for DrawTargetsParams {
    fn default() -> Self {
        Self {
            should_draw: true,
            intrinsics: None,
            tag_size_meters: 0.1651,
            divisor: FrameDivisor::None,
        }
    }
}

/// Annotates the color output with target outlines, ids and pose axes,
/// then applies the stream divisor.
#[derive(Default)]
pub struct DrawTargetsPipe {
    params: DrawTargetsParams,
    font: Option<FontVec>,
}

impl DrawTargetsPipe {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            params: DrawTargetsParams::default(),
            font,
        }
    }

    fn draw_target(&self, img: &mut RgbImage, target: &TrackedTarget) {
        let corners = target.corners();
        for (i, a) in corners.iter().enumerate() {
            let b = corners[(i + 1) % corners.len()];
            draw_line_segment_mut(img, point(a), point(&b), OUTLINE_COLOR);
        }

        if let (Some(font), Some(first)) = (&self.font, corners.first()) {
            let label = target.fiducial_id().to_string();
            draw_text_mut(
                img,
                TEXT_COLOR,
                first.x as i32,
                first.y as i32,
                PxScale::from(TEXT_SCALE),
                font,
                &label,
            );
        }

        if let (Some(k), Some(pose)) = (&self.params.intrinsics, target.pose()) {
            self.draw_axes(img, k, pose);
        }
    }

    /// Project the tag's X/Y/Z axes, each one tag side long.
    fn draw_axes(&self, img: &mut RgbImage, k: &Intrinsics, pose_nwu: &Transform3d) {
        let edn = CoordinateSystem::convert_transform(
            pose_nwu,
            &CoordinateSystem::nwu(),
            &CoordinateSystem::edn(),
        );
        let len = self.params.tag_size_meters;
        let Some(origin) = project(k, &edn, Vector3::zeros()) else {
            return;
        };
        let axes = [Vector3::x() * len, Vector3::y() * len, -Vector3::z() * len];
        for (axis, color) in axes.into_iter().zip(AXIS_COLORS) {
            if let Some(end) = project(k, &edn, axis) {
                draw_line_segment_mut(img, origin, end, color);
            }
        }
    }
}

impl Configure for DrawTargetsPipe {
    type Params = DrawTargetsParams;

    fn set_params(&mut self, params: DrawTargetsParams) {
        self.params = params;
    }
}

impl<'a> Pipe<(RgbImage, &'a [TrackedTarget])> for DrawTargetsPipe {
    type Output = RgbImage;

    fn process(&mut self, (mut img, targets): (RgbImage, &'a [TrackedTarget])) -> RgbImage {
        if self.params.should_draw {
            for target in targets {
                self.draw_target(&mut img, target);
            }
        }
        self.params.divisor.apply(img)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCrosshairParams {
    pub enabled: bool,
    pub divisor: FrameDivisor,
}

impl Default for DrawCrosshairParams {
    fn default() -> Self {
        Self {
            enabled: true,
            divisor: FrameDivisor::None,
        }
    }
}

/// Driver-mode overlay: a crosshair across the image center.
#[derive(Debug, Default)]
pub struct DrawCrosshairPipe {
    params: DrawCrosshairParams,
}

impl Configure for DrawCrosshairPipe {
    type Params = DrawCrosshairParams;

    fn set_params(&mut self, params: DrawCrosshairParams) {
        self.params = params;
    }
}

impl Pipe<RgbImage> for DrawCrosshairPipe {
    type Output = RgbImage;

    fn process(&mut self, mut img: RgbImage) -> RgbImage {
        if self.params.enabled && img.width() > 0 && img.height() > 0 {
            let (cx, cy) = (img.width() / 2, img.height() / 2);
            let (right, bottom) = ((img.width() - 1) as f32, (img.height() - 1) as f32);
            draw_line_segment_mut(&mut img, (0.0, cy as f32), (right, cy as f32), CROSSHAIR_COLOR);
            draw_line_segment_mut(&mut img, (cx as f32, 0.0), (cx as f32, bottom), CROSSHAIR_COLOR);
            draw_cross_mut(&mut img, CROSSHAIR_COLOR, cx as i32, cy as i32);
        }
        self.params.divisor.apply(img)
    }
}

fn point(c: &TargetCorner) -> (f32, f32) {
    (c.x as f32, c.y as f32)
}

/// Pixel position of a tag-frame point, or `None` behind the camera.
fn project(k: &Intrinsics, camera_to_tag: &Transform3d, p: Vector3<f64>) -> Option<(f32, f32)> {
    let c = camera_to_tag.rotation * p + camera_to_tag.translation;
    if c.z <= f64::EPSILON {
        return None;
    }
    Some(((k.fx * c.x / c.z + k.cx) as f32, (k.fy * c.y / c.z + k.cy) as f32))
}
