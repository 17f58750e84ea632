//! Single-responsibility processing stages.
//!
//! A pipe is a function of its current parameters and its input. Parameters
//! are replaced through [`Configure::set_params`] between frames, never while
//! a frame is in flight. A pipe that cannot produce a meaningful output
//! returns a safe default (no detections, an unannotated image) instead of
//! failing, so one bad stage never drops the frame.

pub mod collect;
pub mod detect;
pub mod draw;
pub mod fps;
pub mod grayscale;
pub mod rotate;

use std::time::Instant;

use crate::time::elapsed_nanos;

/// A stage's output plus how long the stage took.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeResult<T> {
    pub output: T,
    pub nanos_elapsed: u64,
}

pub trait Pipe<I> {
    type Output;

    fn process(&mut self, input: I) -> Self::Output;

    /// `process`, timed with the monotonic clock.
    fn run(&mut self, input: I) -> PipeResult<Self::Output> {
        let start = Instant::now();
        let output = self.process(input);
        PipeResult {
            output,
            nanos_elapsed: elapsed_nanos(start),
        }
    }
}

/// Out-of-band parameter updates.
pub trait Configure {
    type Params;

    fn set_params(&mut self, params: Self::Params);
}
