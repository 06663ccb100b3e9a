//! Capture glue between the data layer and the pipeline.

mod observer;

pub use observer::CaptureObserver;
