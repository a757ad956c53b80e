//! V4L2 single-frame grabber
//!
//! Opens a V4L2 capture device, prints its capabilities and current format,
//! maps one kernel buffer, runs a short streaming cycle to fill it and writes
//! the raw bytes to disk. The OS primitives sit behind the [`CameraDevice`]
//! trait so the capture sequence can be exercised against a mock device.

pub mod config;
pub mod device;
pub mod logging;
pub mod report;
pub mod selector;
pub mod session;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use config::{CaptureConfig, DEFAULT_READY_TIMEOUT, DEFAULT_REPEAT_COUNT, USAGE};
pub use device::{MmapRegion, V4L2Device};
pub use selector::DeviceSelector;
pub use session::{grab, CaptureSession};
pub use traits::{
    BufferDescriptor, CameraDevice, CameraError, CapabilityRecord, CaptureState, FieldOrder,
    FormatDescriptor, FourCC, MappedBuffer, Readiness,
};
