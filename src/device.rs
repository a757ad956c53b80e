//! V4L2 device implementation using the v4l crate.
//!
//! Capability and format queries go through the v4l crate's safe API. The
//! buffer lifecycle is driven with raw ioctls on the device handle, because
//! the single-buffer sequence re-issues stream-on without a stream-off and
//! never stops the stream, which the crate's `mmap::Stream` does on drop.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::os::raw::c_int;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::time::Duration;
use std::{io, mem, slice};

use v4l::buffer::Type;
use v4l::device::Handle;
use v4l::memory::Memory;
use v4l::v4l2;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::video::Capture;
use v4l::Device;

use crate::selector::DeviceSelector;
use crate::traits::{
    BufferDescriptor, CameraDevice, CameraError, CapabilityRecord, FieldOrder, FormatDescriptor,
    FourCC, MappedBuffer, Readiness, Result,
};

/// V4L2 device implementation wrapping the v4l crate.
///
/// The device node is closed when the last reference to its handle is
/// dropped, which includes any live [`MmapRegion`].
pub struct V4L2Device {
    device: Device,
    handle: Arc<Handle>,
}

impl V4L2Device {
    /// Open the device node named by `selector` for read/write.
    pub fn open(selector: DeviceSelector) -> Result<Self> {
        Self::with_path(selector.path())
    }

    /// Open a V4L2 device node by path.
    pub fn with_path(path: &Path) -> Result<Self> {
        let device = Device::with_path(path).map_err(|source| CameraError::DeviceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let handle = device.handle();

        Ok(Self { device, handle })
    }

    fn fd(&self) -> c_int {
        self.handle.fd()
    }

    /// Raw descriptor for the video-capture mmap buffer at `buffer.index`.
    fn raw_buffer(buffer: &BufferDescriptor) -> v4l2_buffer {
        v4l2_buffer {
            index: buffer.index,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            // SAFETY: v4l2_buffer is a plain C struct, all-zero is a valid value.
            ..unsafe { mem::zeroed() }
        }
    }
}

fn arg_ptr<T>(arg: &mut T) -> *mut c_void {
    ptr::from_mut(arg).cast::<c_void>()
}

impl CameraDevice for V4L2Device {
    type Mapping = MmapRegion;

    fn query_capabilities(&self) -> Result<CapabilityRecord> {
        let caps = self
            .device
            .query_caps()
            .map_err(CameraError::CapabilityQuery)?;

        // The crate unpacks KERNEL_VERSION(a, b, c); pack it back.
        let (major, minor, patch) = caps.version;
        let version = (u32::from(major) << 16) | (u32::from(minor) << 8) | u32::from(patch);

        Ok(CapabilityRecord {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            version,
            capabilities: caps.capabilities.bits(),
            flag_names: Some(format!("{:?}", caps.capabilities)),
        })
    }

    fn query_format(&self) -> Result<FormatDescriptor> {
        let fmt = self.device.format().map_err(CameraError::FormatQuery)?;

        Ok(FormatDescriptor {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            field: FieldOrder::from_raw(fmt.field_order as u32),
        })
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32> {
        let mut req = v4l2_requestbuffers {
            count,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            // SAFETY: v4l2_requestbuffers is a plain C struct, all-zero is valid.
            ..unsafe { mem::zeroed() }
        };

        // SAFETY: VIDIOC_REQBUFS takes a v4l2_requestbuffers.
        unsafe { v4l2::ioctl(self.fd(), v4l2::vidioc::VIDIOC_REQBUFS, arg_ptr(&mut req)) }
            .map_err(CameraError::BufferAllocation)?;

        Ok(req.count)
    }

    fn query_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()> {
        let mut raw = Self::raw_buffer(buffer);

        // SAFETY: VIDIOC_QUERYBUF takes a v4l2_buffer.
        unsafe { v4l2::ioctl(self.fd(), v4l2::vidioc::VIDIOC_QUERYBUF, arg_ptr(&mut raw)) }
            .map_err(CameraError::BufferQuery)?;

        buffer.length = raw.length;
        // SAFETY: for MMAP memory the driver fills the `offset` member.
        buffer.offset = unsafe { raw.m.offset };
        Ok(())
    }

    fn map_buffer(&mut self, buffer: &BufferDescriptor) -> Result<MmapRegion> {
        let len = usize::try_from(buffer.length).map_err(|err| {
            CameraError::Mapping(io::Error::new(io::ErrorKind::InvalidInput, err))
        })?;

        // SAFETY: maps a fresh region; the kernel validates fd, offset and length.
        #[allow(clippy::cast_possible_wrap)]
        let addr = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                buffer.offset as libc::off_t,
            )
        }
        .map_err(CameraError::Mapping)?;

        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
            CameraError::Mapping(io::Error::other("mmap returned a null address"))
        })?;

        Ok(MmapRegion {
            ptr,
            len,
            _handle: Arc::clone(&self.handle),
        })
    }

    fn stream_on(&mut self) -> Result<()> {
        let mut buf_type = Type::VideoCapture as u32;

        // SAFETY: VIDIOC_STREAMON takes the buffer type as a u32.
        unsafe { v4l2::ioctl(self.fd(), v4l2::vidioc::VIDIOC_STREAMON, arg_ptr(&mut buf_type)) }
            .map_err(CameraError::StreamOn)
    }

    fn queue_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()> {
        let mut raw = Self::raw_buffer(buffer);

        // SAFETY: VIDIOC_QBUF takes a v4l2_buffer.
        unsafe { v4l2::ioctl(self.fd(), v4l2::vidioc::VIDIOC_QBUF, arg_ptr(&mut raw)) }
            .map_err(CameraError::Enqueue)
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<Readiness> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        match self
            .handle
            .poll(libc::POLLIN, timeout_ms)
            .map_err(CameraError::Wait)?
        {
            0 => Ok(Readiness::TimedOut),
            _ => Ok(Readiness::Ready),
        }
    }

    fn dequeue_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()> {
        let mut raw = Self::raw_buffer(buffer);

        // SAFETY: VIDIOC_DQBUF takes a v4l2_buffer.
        unsafe { v4l2::ioctl(self.fd(), v4l2::vidioc::VIDIOC_DQBUF, arg_ptr(&mut raw)) }
            .map_err(CameraError::Dequeue)?;

        buffer.index = raw.index;
        buffer.bytes_used = raw.bytesused;
        buffer.sequence = raw.sequence;
        Ok(())
    }
}

/// A capture buffer mapped shared read/write into this process.
///
/// Unmapped on drop. Holds the device handle so the descriptor outlives the
/// mapping.
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
    _handle: Arc<Handle>,
}

impl MappedBuffer for MmapRegion {
    fn data(&self) -> &[u8] {
        // SAFETY: `ptr` is a live mapping of `len` bytes until `drop`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` are exactly what mmap returned, unmapped once here.
        let result = unsafe { v4l2::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) };

        match result {
            Ok(()) => tracing::debug!(len = self.len, "unmapped capture buffer"),
            Err(err) => tracing::warn!(%err, "munmap failed"),
        }
    }
}
