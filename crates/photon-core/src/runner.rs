//! Drives one pipeline from one camera and hands results to a publisher.
//!
//! Each camera gets its own runner, usually on its own thread. Runners share
//! no per-frame state; settings reach a running pipeline only through its
//! [`SettingsHandle`], drained between frames.

use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use photon_targeting::message::{encode_message, write_delimited};
use photon_targeting::PipelineResult;

use crate::capture::FrameSource;
use crate::frame::Frame;
use crate::pipeline::{CvPipeline, CvPipelineResult, SettingsHandle};

/// Destination for wire results.
pub trait ResultPublisher: Send {
    fn publish(&mut self, result: &PipelineResult) -> Result<()>;
}

/// Writes each result as a versioned, length-delimited message.
pub struct PacketPublisher<W: Write> {
    writer: W,
}

impl<W: Write> PacketPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ResultPublisher for PacketPublisher<W> {
    fn publish(&mut self, result: &PipelineResult) -> Result<()> {
        let message = encode_message(result);
        write_delimited(&mut self.writer, &message).context("failed to write result message")?;
        self.writer.flush().context("failed to flush result stream")?;
        Ok(())
    }
}

/// Called with every processed frame, e.g. to save annotated images.
pub type FrameSink = Box<dyn FnMut(i64, &CvPipelineResult) -> Result<()> + Send>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub frames_with_targets: u64,
    pub targets: u64,
    pub mean_latency_millis: f64,
}

pub struct VisionRunner {
    name: String,
    pipeline: Box<dyn CvPipeline>,
    publisher: Box<dyn ResultPublisher>,
    settings: SettingsHandle,
    frame_sink: Option<FrameSink>,
    next_sequence_id: i64,
}

impl VisionRunner {
    pub fn new(
        name: impl Into<String>,
        pipeline: Box<dyn CvPipeline>,
        publisher: Box<dyn ResultPublisher>,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline,
            publisher,
            settings: SettingsHandle::new(),
            frame_sink: None,
            next_sequence_id: 1,
        }
    }

    /// Share an existing handle instead of the runner's own.
    pub fn with_settings_handle(mut self, settings: SettingsHandle) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_frame_sink(mut self, sink: FrameSink) -> Self {
        self.frame_sink = Some(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings_handle(&self) -> SettingsHandle {
        self.settings.clone()
    }

    fn apply_pending_settings(&mut self) {
        let Some(settings) = self.settings.take_pending() else {
            return;
        };
        let kind = settings.pipeline_type();
        match self.pipeline.set_settings(settings) {
            Ok(()) => info!(camera = %self.name, pipeline = %kind, "settings applied"),
            Err(e) => warn!(camera = %self.name, error = %e, "settings update ignored"),
        }
    }

    /// Process and publish one frame.
    pub fn step(&mut self, frame: Frame) -> Result<CvPipelineResult> {
        self.apply_pending_settings();

        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;

        let result = self.pipeline.process(frame);
        let wire = result.to_wire(sequence_id);
        self.publisher
            .publish(&wire)
            .with_context(|| format!("failed to publish result {sequence_id}"))?;
        if let Some(sink) = self.frame_sink.as_mut() {
            sink(sequence_id, &result)?;
        }

        debug!(
            camera = %self.name,
            sequence_id,
            targets = wire.targets.len(),
            latency_ms = wire.latency_millis,
            "result published"
        );
        Ok(result)
    }

    /// Process every frame of `source`, strictly in capture order.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<RunSummary> {
        info!(camera = %self.name, pipeline = %self.pipeline.pipeline_type(), "runner starting");

        let mut summary = RunSummary::default();
        let mut latency_total = 0.0;
        while let Some(frame) = source.next_frame().context("failed to read frame")? {
            let result = self.step(frame)?;
            summary.frames += 1;
            summary.targets += result.targets.len() as u64;
            if result.has_targets() {
                summary.frames_with_targets += 1;
            }
            latency_total += result.latency_millis();
        }
        if summary.frames > 0 {
            summary.mean_latency_millis = latency_total / summary.frames as f64;
        }

        info!(
            camera = %self.name,
            frames = summary.frames,
            frames_with_targets = summary.frames_with_targets,
            mean_latency_ms = summary.mean_latency_millis,
            "runner finished"
        );
        Ok(summary)
    }
}

/// Run `runner` over `source` on a thread named after the runner.
pub fn spawn_runner<S>(
    mut runner: VisionRunner,
    mut source: S,
) -> io::Result<JoinHandle<Result<RunSummary>>>
where
    S: FrameSource + Send + 'static,
{
    thread::Builder::new()
        .name(runner.name().to_owned())
        .spawn(move || runner.run(&mut source))
}
