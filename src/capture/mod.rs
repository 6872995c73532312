pub mod controller;
pub mod event;
pub mod loop_worker;
pub mod source;

pub use controller::{CaptureController, CaptureIntervals};
pub use event::{CaptureEvent, CaptureMessage};
pub use loop_worker::IngestStats;
