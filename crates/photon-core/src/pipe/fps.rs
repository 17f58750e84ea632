use std::time::Instant;

use super::Pipe;

/// Weight of the newest sample in the moving average.
const SMOOTHING: f64 = 0.2;

/// Frames per second over successive runs, smoothed. Zero until two frames
/// have been seen; never negative.
#[derive(Debug, Default)]
pub struct CalculateFpsPipe {
    last: Option<Instant>,
    fps: f64,
}

impl CalculateFpsPipe {
    /// Feed the time of a frame boundary.
    fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let sample = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    sample
                } else {
                    SMOOTHING * sample + (1.0 - SMOOTHING) * self.fps
                };
            }
        }
        self.last = Some(now);
        self.fps.max(0.0)
    }
}

impl Pipe<()> for CalculateFpsPipe {
    type Output = f64;

    fn process(&mut self, _input: ()) -> f64 {
        self.tick(Instant::now())
    }
}
