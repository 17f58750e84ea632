//! A recorded video replayed as a camera, decoded by the ffmpeg CLI.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::{FrameSource, QuirkSet};
use crate::calibration::CalibrationSet;
use crate::frame::{Frame, FrameImage, FrameStaticProperties};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
    r_frame_rate: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StreamInfo {
    width: u32,
    height: u32,
    fps: f64,
}

fn probe(path: &Path) -> Result<StreamInfo> {
    debug!(?path, "probing video stream");
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height,r_frame_rate", "-of", "json"])
        .arg(path)
        .output()
        .context("failed to run ffprobe, is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        bail!("ffprobe failed on {}: {stderr}", path.display());
    }
    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_json(json: &str) -> Result<StreamInfo> {
    let probe: ProbeOutput = serde_json::from_str(json).context("unexpected ffprobe output")?;
    let Some(stream) = probe.streams.into_iter().next() else {
        bail!("file has no video stream");
    };
    if stream.width == 0 || stream.height == 0 {
        bail!("invalid video dimensions {}x{}", stream.width, stream.height);
    }

    let fps = parse_frame_rate(&stream.r_frame_rate)?;
    if fps <= 0.0 {
        warn!(rate = %stream.r_frame_rate, "video reports no frame rate");
    }
    Ok(StreamInfo {
        width: stream.width,
        height: stream.height,
        fps,
    })
}

/// `num/den` or a plain number; a zero denominator means unknown (0).
fn parse_frame_rate(rate: &str) -> Result<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().context("bad frame rate numerator")?;
            let den: f64 = den.trim().parse().context("bad frame rate denominator")?;
            Ok(if den > 0.0 { num / den } else { 0.0 })
        }
        None => rate.trim().parse().context("bad frame rate"),
    }
}

/// Fill `buf` from `reader`, returning how many bytes arrived before EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Frames are raw RGB24 read from ffmpeg's stdout, stamped with the
/// monotonic clock as they arrive, the same way a live camera stamps them.
pub struct VideoFileSource {
    decoder: Child,
    static_props: Arc<FrameStaticProperties>,
    quirks: QuirkSet,
    fps: f64,
    frames_read: u64,
}

impl VideoFileSource {
    /// Open `path`. The calibration matching the video's resolution, if any,
    /// is attached to every frame.
    pub fn open(
        path: &Path,
        horizontal_fov_degrees: f64,
        calibrations: &CalibrationSet,
    ) -> Result<Self> {
        if !path.exists() {
            bail!("video file does not exist: {}", path.display());
        }
        let stream = probe(path)?;

        let decoder = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn ffmpeg, is ffmpeg installed?")?;

        let calibration = calibrations.for_resolution(stream.width, stream.height).cloned();
        let static_props = Arc::new(
            FrameStaticProperties::new(stream.width, stream.height, horizontal_fov_degrees)
                .with_calibration(calibration),
        );

        info!(
            ?path,
            width = stream.width,
            height = stream.height,
            fps = stream.fps,
            calibrated = static_props.calibration.is_some(),
            "video source opened"
        );
        Ok(Self {
            decoder,
            static_props,
            quirks: QuirkSet::new(),
            fps: stream.fps,
            frames_read: 0,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn frame_bytes(&self) -> usize {
        self.static_props.width as usize * self.static_props.height as usize * 3
    }
}

impl FrameSource for VideoFileSource {
    fn quirks(&self) -> &QuirkSet {
        &self.quirks
    }

    fn static_properties(&self) -> Arc<FrameStaticProperties> {
        Arc::clone(&self.static_props)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut buf = vec![0u8; self.frame_bytes()];
        let Some(stdout) = self.decoder.stdout.as_mut() else {
            bail!("ffmpeg stdout is not available");
        };
        let filled = read_full(stdout, &mut buf).context("failed to read from ffmpeg")?;

        if filled == 0 {
            info!(frames = self.frames_read, "video stream ended");
            return Ok(None);
        }
        if filled < buf.len() {
            error!(filled, expected = buf.len(), frame = self.frames_read, "truncated frame");
            bail!("ffmpeg stream ended mid-frame ({filled}/{} bytes)", buf.len());
        }

        let (width, height) = (self.static_props.width, self.static_props.height);
        let Some(image) = RgbImage::from_raw(width, height, buf) else {
            bail!("frame buffer does not match {width}x{height}");
        };
        let frame = Frame::captured_now(FrameImage::Color(image), Arc::clone(&self.static_props));
        debug!(frame = self.frames_read, timestamp_nanos = frame.timestamp_nanos, "frame decoded");
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        debug!(frames = self.frames_read, "stopping ffmpeg");
        let _ = self.decoder.kill();
        let _ = self.decoder.wait();
    }
}
