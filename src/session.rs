//! Single-buffer capture session.
//!
//! A [`CaptureSession`] owns the device, the one buffer descriptor and the
//! mapping of that buffer, and drives them through
//! request -> query -> map, then `repeat_count` passes of
//! stream-on -> queue -> wait -> dequeue. Stream-off is never issued.
//!
//! Dropping the session unmaps the buffer and then closes the device, so
//! every early return releases both.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::config::CaptureConfig;
use crate::report;
use crate::traits::{
    BufferDescriptor, CameraDevice, CameraError, CaptureState, MappedBuffer, Readiness, Result,
};

/// Buffers requested from the driver. Only index 0 is ever used.
pub const BUFFER_COUNT: u32 = 1;

/// Capture state for one device and its single mmap buffer.
pub struct CaptureSession<D: CameraDevice> {
    // Declared before `device` so it is dropped (unmapped) first.
    mapping: Option<D::Mapping>,
    buffer: BufferDescriptor,
    state: CaptureState,
    device: D,
}

impl<D: CameraDevice> CaptureSession<D> {
    /// Start a session on an opened device.
    pub const fn new(device: D) -> Self {
        Self {
            mapping: None,
            buffer: BufferDescriptor::new(0),
            state: CaptureState::Idle,
            device,
        }
    }

    /// The buffer descriptor as last updated by the driver.
    pub const fn buffer(&self) -> &BufferDescriptor {
        &self.buffer
    }

    /// Current step of the capture cycle.
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Request one mmap buffer, query it and map it.
    pub fn map_buffer(&mut self) -> Result<()> {
        if self.mapping.is_some() {
            return Err(CameraError::AlreadyMapped);
        }

        tracing::info!("requesting buffers");
        let granted = self.device.request_buffers(BUFFER_COUNT)?;
        if granted == 0 {
            return Err(CameraError::BufferAllocation(io::Error::other(
                "driver granted no buffers",
            )));
        }

        tracing::info!("querying buffer");
        self.device.query_buffer(&mut self.buffer)?;
        if self.buffer.length == 0 {
            return Err(CameraError::BufferQuery(io::Error::new(
                io::ErrorKind::InvalidData,
                "driver reported a zero-length buffer",
            )));
        }

        tracing::info!("mapping memory");
        let mapping = self.device.map_buffer(&self.buffer)?;
        tracing::info!(
            length = self.buffer.length,
            offset = self.buffer.offset,
            "mapped buffer"
        );

        self.mapping = Some(mapping);
        Ok(())
    }

    /// Run `repeat_count` stream-on/queue/wait/dequeue passes.
    ///
    /// A pass whose wait expires fails with [`CameraError::CaptureTimeout`]
    /// and nothing is dequeued.
    pub fn capture(&mut self, repeat_count: u32, timeout: Duration) -> Result<()> {
        if self.mapping.is_none() {
            return Err(CameraError::NotMapped);
        }

        for pass in 1..=repeat_count {
            tracing::info!(pass, "turning stream on");
            self.advance(CaptureState::Streaming, |device, _| device.stream_on())?;

            tracing::info!(pass, "queueing the buffer");
            self.advance(CaptureState::Queued, |device, buffer| {
                device.queue_buffer(buffer)
            })?;

            self.advance(CaptureState::Ready, |device, _| {
                match device.wait_ready(timeout)? {
                    Readiness::Ready => Ok(()),
                    Readiness::TimedOut => Err(CameraError::CaptureTimeout(timeout)),
                }
            })?;

            tracing::info!(pass, "dequeueing buffer");
            self.advance(CaptureState::Dequeued, |device, buffer| {
                device.dequeue_buffer(buffer)
            })?;

            tracing::debug!(
                pass,
                bytes_used = self.buffer.bytes_used,
                sequence = self.buffer.sequence,
                "buffer dequeued"
            );
        }

        Ok(())
    }

    /// Write the whole mapped buffer to `dir/file_name`.
    pub fn save(&self, dir: &Path, file_name: &str) -> Result<PathBuf> {
        if self.state != CaptureState::Dequeued {
            return Err(CameraError::NoFrame);
        }
        let mapping = self.mapping.as_ref().ok_or(CameraError::NotMapped)?;

        let data = mapping.data();
        let data = data.get(..self.buffer.length as usize).unwrap_or(data);
        let path = dir.join(file_name);

        tracing::info!(bytes = data.len(), path = %path.display(), "writing frame");
        write_file(&path, data).map_err(|source| CameraError::FileWrite {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }

    fn advance<F>(&mut self, next: CaptureState, op: F) -> Result<()>
    where
        F: FnOnce(&mut D, &mut BufferDescriptor) -> Result<()>,
    {
        if !self.state.can_advance_to(next) {
            return Err(CameraError::InvalidState {
                from: self.state,
                to: next,
            });
        }

        op(&mut self.device, &mut self.buffer)?;
        self.state = next;
        Ok(())
    }
}

/// Write `data` to a temporary file next to `path` and rename it into place.
///
/// On any failure the temporary file is removed and `path` is left untouched.
fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.flush()?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Report, map, capture and save one frame from `device`.
///
/// Returns the path of the written file. The device is closed before this
/// returns, on success or failure.
pub fn grab<D, W>(device: D, config: &CaptureConfig, out: &mut W) -> Result<PathBuf>
where
    D: CameraDevice,
    W: Write,
{
    tracing::info!("querying capabilities");
    report::query_capabilities(&device, out)?;
    report::query_format(&device, out)?;

    let mut session = CaptureSession::new(device);
    session.map_buffer()?;

    tracing::info!(passes = config.repeat_count, "capturing image");
    session.capture(config.repeat_count, config.ready_timeout)?;

    session.save(&config.output_dir, &config.selector.output_file_name())
}
