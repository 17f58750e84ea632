use std::path::PathBuf;

use clap::{Parser, Subcommand};

use photon_core::frame::ImageRotationMode;
use photon_core::pipe::detect::TagFamily;

#[derive(Parser)]
#[command(name = "photon", about = "Vision coprocessor pipeline runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a pipeline over a recorded video and write its results.
    Replay {
        /// Path to the input video file.
        #[arg(short, long)]
        input: PathBuf,

        /// Path to write the length-delimited result messages.
        #[arg(short, long)]
        output: PathBuf,

        /// JSON file of recorded detections, one list per frame.
        #[arg(short, long)]
        detections: Option<PathBuf>,

        /// JSON file with the camera's calibrations.
        #[arg(short, long)]
        calibration: Option<PathBuf>,

        /// Clockwise input rotation in degrees (0, 90, 180 or 270).
        #[arg(long, default_value = "0")]
        rotation: ImageRotationMode,

        /// Fiducial family to detect.
        #[arg(long, default_value = "tag36h11")]
        family: TagFamily,

        /// Attach a 3-D pose to targets (needs a matching calibration).
        #[arg(long)]
        pose: bool,

        /// Tag side length in meters.
        #[arg(long, default_value_t = 0.1651)]
        tag_size: f64,

        /// Horizontal field of view in degrees, used without a calibration.
        #[arg(long, default_value_t = 70.0)]
        fov: f64,

        /// Directory to save annotated frames.
        #[arg(long)]
        annotated_dir: Option<PathBuf>,

        /// Run the driver-mode pipeline instead of fiducial tracking.
        #[arg(long)]
        driver_mode: bool,

        /// TrueType font for target labels.
        #[arg(long)]
        font: Option<PathBuf>,
    },

    /// Decode and print a file of result messages.
    Inspect {
        #[arg(short, long)]
        input: PathBuf,
    },
}
