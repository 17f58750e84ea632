pub mod calibration;
pub mod capture;
pub mod frame;
pub mod pipe;
pub mod pipeline;
pub mod pose;
pub mod runner;
pub mod time;
