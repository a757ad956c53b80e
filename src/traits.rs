//! Core traits and types for the single-buffer V4L2 capture sequence.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
}

impl fmt::Display for FourCC {
    /// Prints the code up to the first NUL byte.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        let code = self.0.get(..end).unwrap_or_default();
        f.write_str(&String::from_utf8_lossy(code))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

/// Field order of the captured frame, as reported by the driver.
///
/// Values the kernel headers do not name are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrder {
    /// Driver may choose (`V4L2_FIELD_ANY`).
    Any,
    /// Progressive frames (`V4L2_FIELD_NONE`).
    Progressive,
    /// Top field only.
    Top,
    /// Bottom field only.
    Bottom,
    /// Both fields interleaved.
    Interlaced,
    /// Both fields stored sequentially, top first.
    SequentialTopBottom,
    /// Both fields stored sequentially, bottom first.
    SequentialBottomTop,
    /// Fields delivered in alternating buffers.
    Alternate,
    /// Interleaved, top field transmitted first.
    InterlacedTopBottom,
    /// Interleaved, bottom field transmitted first.
    InterlacedBottomTop,
    /// Unknown raw value.
    Other(u32),
}

impl FieldOrder {
    /// Decode the raw `v4l2_field` value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Any,
            1 => Self::Progressive,
            2 => Self::Top,
            3 => Self::Bottom,
            4 => Self::Interlaced,
            5 => Self::SequentialTopBottom,
            6 => Self::SequentialBottomTop,
            7 => Self::Alternate,
            8 => Self::InterlacedTopBottom,
            9 => Self::InterlacedBottomTop,
            other => Self::Other(other),
        }
    }

    /// The raw `v4l2_field` value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::Any => 0,
            Self::Progressive => 1,
            Self::Top => 2,
            Self::Bottom => 3,
            Self::Interlaced => 4,
            Self::SequentialTopBottom => 5,
            Self::SequentialBottomTop => 6,
            Self::Alternate => 7,
            Self::InterlacedTopBottom => 8,
            Self::InterlacedBottomTop => 9,
            Self::Other(other) => other,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Progressive => "none",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Interlaced => "interlaced",
            Self::SequentialTopBottom => "seq-tb",
            Self::SequentialBottomTop => "seq-bt",
            Self::Alternate => "alternate",
            Self::InterlacedTopBottom => "interlaced-tb",
            Self::InterlacedBottomTop => "interlaced-bt",
            Self::Other(_) => "unknown",
        }
    }
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.raw(), self.name())
    }
}

/// Snapshot of `VIDIOC_QUERYCAP`, read once and printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityRecord {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Packed driver version number.
    pub version: u32,
    /// Capability bitmask.
    pub capabilities: u32,
    /// Symbolic names of the set capability bits, if the backend knows them.
    pub flag_names: Option<String>,
}

impl CapabilityRecord {
    /// The two printed version components: bits 16..24 and bits 24..32.
    #[must_use]
    pub const fn version_components(&self) -> (u32, u32) {
        ((self.version >> 16) & 0xff, (self.version >> 24) & 0xff)
    }
}

/// Snapshot of the current video-capture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Field order.
    pub field: FieldOrder,
}

/// The one kernel-side capture buffer (video-capture, mmap memory).
///
/// A session owns exactly one of these and mutates it in place across the
/// request, query, queue and dequeue steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Buffer index. Always 0.
    pub index: u32,
    /// Buffer length in bytes, filled by the query step.
    pub length: u32,
    /// Offset to pass to `mmap`, filled by the query step.
    pub offset: u32,
    /// Bytes written by the driver, filled by dequeue.
    pub bytes_used: u32,
    /// Driver frame sequence number, filled by dequeue.
    pub sequence: u32,
}

impl BufferDescriptor {
    /// Descriptor for the buffer at `index` with no metadata yet.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            length: 0,
            offset: 0,
            bytes_used: 0,
            sequence: 0,
        }
    }
}

/// Outcome of waiting for the device to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A filled buffer can be dequeued.
    Ready,
    /// The wait expired first.
    TimedOut,
}

/// Steps of the capture cycle over the single buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Nothing issued yet.
    Idle,
    /// Stream-on succeeded.
    Streaming,
    /// Buffer handed to the driver.
    Queued,
    /// Device reported readable.
    Ready,
    /// Filled buffer returned by the driver.
    Dequeued,
}

impl CaptureState {
    /// Whether the cycle may move from `self` to `next`.
    ///
    /// `Dequeued -> Streaming` re-arms the stream for the next pass without
    /// a stream-off in between.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Dequeued, Self::Streaming)
                | (Self::Streaming, Self::Queued)
                | (Self::Queued, Self::Ready)
                | (Self::Ready, Self::Dequeued)
        )
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error type for capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Bad command line.
    #[error("{0}")]
    Invocation(String),
    /// Selector is not one of the known device names.
    #[error("Unsupported device selector: {0}")]
    UnsupportedSelector(String),
    /// Failed to open the device node.
    #[error("Failed to open video device {}: {source}", .path.display())]
    DeviceOpen {
        /// Device node path.
        path: PathBuf,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// `VIDIOC_QUERYCAP` failed.
    #[error("Querying capabilities failed: {0}")]
    CapabilityQuery(#[source] io::Error),
    /// `VIDIOC_G_FMT` failed.
    #[error("Getting pixel format failed: {0}")]
    FormatQuery(#[source] io::Error),
    /// `VIDIOC_REQBUFS` failed or granted nothing.
    #[error("Requesting buffer failed: {0}")]
    BufferAllocation(#[source] io::Error),
    /// `VIDIOC_QUERYBUF` failed or described an unusable buffer.
    #[error("Querying buffer failed: {0}")]
    BufferQuery(#[source] io::Error),
    /// `mmap` failed.
    #[error("Mapping buffer failed: {0}")]
    Mapping(#[source] io::Error),
    /// `VIDIOC_STREAMON` failed.
    #[error("Stream on failed: {0}")]
    StreamOn(#[source] io::Error),
    /// `VIDIOC_QBUF` failed.
    #[error("Queueing buffer failed: {0}")]
    Enqueue(#[source] io::Error),
    /// The readiness wait itself failed.
    #[error("Waiting for frame failed: {0}")]
    Wait(#[source] io::Error),
    /// No frame became ready in time.
    #[error("No frame ready within {0:?}")]
    CaptureTimeout(Duration),
    /// `VIDIOC_DQBUF` failed.
    #[error("Retrieving frame failed: {0}")]
    Dequeue(#[source] io::Error),
    /// Capture attempted before the buffer was mapped.
    #[error("Capture buffer is not mapped")]
    NotMapped,
    /// The buffer was already requested and mapped by this session.
    #[error("Capture buffer is already mapped")]
    AlreadyMapped,
    /// Save attempted before a frame was dequeued.
    #[error("No frame has been captured")]
    NoFrame,
    /// Operation issued out of order.
    #[error("Invalid capture state transition: {from} -> {to}")]
    InvalidState {
        /// Current state.
        from: CaptureState,
        /// Requested state.
        to: CaptureState,
    },
    /// Writing the output file failed.
    #[error("Writing {} failed: {source}", .path.display())]
    FileWrite {
        /// Output file path.
        path: PathBuf,
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// Console I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Read access to a mapped capture buffer.
///
/// Implementations release the mapping when dropped.
pub trait MappedBuffer {
    /// The mapped bytes.
    fn data(&self) -> &[u8];
}

/// The OS primitives the capture sequence drives, one method per call.
pub trait CameraDevice {
    /// The mapping returned by `map_buffer`.
    type Mapping: MappedBuffer;

    /// Query driver identity and capability flags.
    fn query_capabilities(&self) -> Result<CapabilityRecord>;

    /// Query the current video-capture format.
    fn query_format(&self) -> Result<FormatDescriptor>;

    /// Ask the driver for `count` mmap buffers. Returns the granted count.
    fn request_buffers(&mut self, count: u32) -> Result<u32>;

    /// Fill in `buffer.length` and `buffer.offset` for `buffer.index`.
    fn query_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()>;

    /// Map `buffer.length` bytes at `buffer.offset`, shared read/write.
    fn map_buffer(&mut self, buffer: &BufferDescriptor) -> Result<Self::Mapping>;

    /// Start the capture pipeline.
    fn stream_on(&mut self) -> Result<()>;

    /// Hand `buffer` to the driver for filling.
    fn queue_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()>;

    /// Block until the device is readable or `timeout` expires.
    fn wait_ready(&mut self, timeout: Duration) -> Result<Readiness>;

    /// Take the filled buffer back from the driver.
    fn dequeue_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()>;
}
