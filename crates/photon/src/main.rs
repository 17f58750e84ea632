mod cli;
mod replay;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use photon_core::calibration::CalibrationSet;
use photon_core::capture::decoder::VideoFileSource;
use photon_core::capture::FrameSource;
use photon_core::frame::{FrameImage, ImageRotationMode};
use photon_core::pipe::detect::TagFamily;
use photon_core::pipe::draw::load_font;
use photon_core::pipeline::apriltag::AprilTagPipeline;
use photon_core::pipeline::driver::DriverModePipeline;
use photon_core::pipeline::{
    AprilTagPipelineSettings, CvPipeline, CvPipelineResult, DriverModePipelineSettings,
};
use photon_core::runner::{FrameSink, PacketPublisher, VisionRunner};
use photon_targeting::message::{decode_message, peek_kind, read_delimited, MessageKind};
use photon_targeting::{PipelineResult, TrackedTarget};

use crate::replay::ReplayDetector;

struct ReplayOptions {
    input: PathBuf,
    output: PathBuf,
    detections: Option<PathBuf>,
    calibration: Option<PathBuf>,
    rotation: ImageRotationMode,
    family: TagFamily,
    pose: bool,
    tag_size: f64,
    fov: f64,
    annotated_dir: Option<PathBuf>,
    driver_mode: bool,
    font: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Replay {
            input,
            output,
            detections,
            calibration,
            rotation,
            family,
            pose,
            tag_size,
            fov,
            annotated_dir,
            driver_mode,
            font,
        } => replay(ReplayOptions {
            input,
            output,
            detections,
            calibration,
            rotation,
            family,
            pose,
            tag_size,
            fov,
            annotated_dir,
            driver_mode,
            font,
        }),
        cli::Command::Inspect { input } => inspect(&input),
    }
}

fn replay(opts: ReplayOptions) -> Result<()> {
    info!(
        input = ?opts.input,
        output = ?opts.output,
        driver_mode = opts.driver_mode,
        "starting replay"
    );

    let calibrations = match &opts.calibration {
        Some(path) => CalibrationSet::load(path)?,
        None => CalibrationSet::default(),
    };
    let mut source = VideoFileSource::open(&opts.input, opts.fov, &calibrations)
        .context("failed to open video")?;
    let props = source.static_properties();
    if opts.pose && !opts.driver_mode && props.calibration.is_none() {
        warn!(
            width = props.width,
            height = props.height,
            "pose requested but no calibration matches the video, targets will be 2-D only"
        );
    }
    let pipeline = build_pipeline(&opts, &source)?;

    if let Some(parent) = opts.output.parent() {
        std::fs::create_dir_all(parent).context("failed to create output directory")?;
    }
    let file = File::create(&opts.output)
        .with_context(|| format!("failed to create {}", opts.output.display()))?;

    let name = opts
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "camera".to_owned());
    let publisher = Box::new(PacketPublisher::new(BufWriter::new(file)));
    let mut runner = VisionRunner::new(name, pipeline, publisher);
    if let Some(dir) = &opts.annotated_dir {
        std::fs::create_dir_all(dir).context("failed to create annotated frames directory")?;
        info!(?dir, "annotated frames directory ready");
        runner = runner.with_frame_sink(annotated_frame_sink(dir.clone()));
    }

    let summary = runner.run(&mut source).context("replay failed")?;
    if summary.frames_with_targets == 0 && !opts.driver_mode {
        warn!("no targets found in any frame");
    }
    info!(
        frames = summary.frames,
        targets = summary.targets,
        mean_latency_ms = summary.mean_latency_millis,
        decoded = source.frames_read(),
        source_fps = source.fps(),
        output = ?opts.output,
        "replay complete"
    );
    Ok(())
}

fn build_pipeline(opts: &ReplayOptions, source: &VideoFileSource) -> Result<Box<dyn CvPipeline>> {
    if opts.driver_mode {
        return Ok(Box::new(DriverModePipeline::new(DriverModePipelineSettings {
            input_rotation: opts.rotation,
            ..DriverModePipelineSettings::default()
        })));
    }

    let detector = match &opts.detections {
        Some(path) => ReplayDetector::load(path)?,
        None => {
            warn!("no recorded detections given, frames will have no targets");
            ReplayDetector::empty()
        }
    };
    let settings = AprilTagPipelineSettings {
        input_rotation: opts.rotation,
        stream_frames: opts.annotated_dir.is_some(),
        tag_family: opts.family,
        solve_pnp: opts.pose,
        tag_size_meters: opts.tag_size,
        ..AprilTagPipelineSettings::default()
    };
    let pipeline = AprilTagPipeline::new(settings, Box::new(detector))
        .with_capture(source.quirks().clone(), None)
        .with_font(opts.font.as_deref().and_then(load_font));
    Ok(Box::new(pipeline))
}

/// Save each annotated frame as `frame_<sequence>.png` under `dir`.
fn annotated_frame_sink(dir: PathBuf) -> FrameSink {
    Box::new(move |sequence_id: i64, result: &CvPipelineResult| -> Result<()> {
        let Some(frame) = &result.input_frame else {
            return Ok(());
        };
        let path = dir.join(format!("frame_{sequence_id:06}.png"));
        let saved = match &frame.image {
            FrameImage::Color(img) => img.save(&path),
            FrameImage::Gray(img) => img.save(&path),
        };
        saved.with_context(|| format!("failed to save {}", path.display()))
    })
}

/// Print every message of a result file.
fn inspect(input: &Path) -> Result<()> {
    let file = File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let mut reader = BufReader::new(file);

    let mut count = 0usize;
    while let Some(message) = read_delimited(&mut reader).context("failed to read message")? {
        match peek_kind(&message)? {
            MessageKind::PipelineResult => {
                print_result(&decode_message::<PipelineResult>(&message)?)
            }
            MessageKind::TrackedTarget => print_target(&decode_message::<TrackedTarget>(&message)?),
        }
        count += 1;
    }
    info!(?input, messages = count, "inspection complete");
    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!(
        "result #{} latency={:.2}ms targets={}",
        result.sequence_id,
        result.latency_millis,
        result.targets.len()
    );
    for target in &result.targets {
        print_target(target);
    }
}

fn print_target(t: &TrackedTarget) {
    print!(
        "  id={} yaw={:.2} pitch={:.2} area={:.3}% skew={:.1}",
        t.fiducial_id(),
        t.yaw(),
        t.pitch(),
        t.area(),
        t.skew()
    );
    if let Some(pose) = t.pose() {
        let p = pose.translation;
        print!(
            " pose=({:.3}, {:.3}, {:.3}) yaw={:.1}deg ambiguity={:.3}",
            p.x,
            p.y,
            p.z,
            pose.yaw().to_degrees(),
            t.pose_ambiguity()
        );
    }
    println!();
}
