//! Mock device implementation for testing without hardware.
//!
//! Records every primitive call, can fail any of them on demand, and tracks
//! whether the device handle and mapping were released.

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::traits::{
    BufferDescriptor, CameraDevice, CameraError, CapabilityRecord, FieldOrder, FormatDescriptor,
    FourCC, MappedBuffer, Readiness, Result,
};

/// Primitive calls the mock records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    QueryCapabilities,
    QueryFormat,
    RequestBuffers,
    QueryBuffer,
    MapBuffer,
    StreamOn,
    QueueBuffer,
    WaitReady,
    DequeueBuffer,
}

/// Shared view of what happened to a mock device after it was moved.
#[derive(Debug, Default)]
pub struct MockProbe {
    calls: RefCell<Vec<MockOp>>,
    closes: Cell<u32>,
    maps: Cell<u32>,
    unmaps: Cell<u32>,
    last_timeout: Cell<Option<Duration>>,
}

impl MockProbe {
    pub fn calls(&self) -> Vec<MockOp> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, op: MockOp) -> usize {
        self.calls.borrow().iter().filter(|&&c| c == op).count()
    }

    pub fn closes(&self) -> u32 {
        self.closes.get()
    }

    pub fn maps(&self) -> u32 {
        self.maps.get()
    }

    pub fn unmaps(&self) -> u32 {
        self.unmaps.get()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.last_timeout.get()
    }

    /// Every acquired resource was released exactly once.
    pub fn all_released(&self) -> bool {
        self.closes() == 1 && self.maps() == self.unmaps()
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Byte `i` holds `i % 251`.
    Counter,
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: CapabilityRecord,
    format: FormatDescriptor,
    buffer_length: u32,
    granted_buffers: u32,
    pattern: TestPattern,
    ready: bool,
    fail: Option<(MockOp, usize)>,
    requested: bool,
    queried: bool,
    queued: bool,
    sequence: u32,
    probe: Rc<MockProbe>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        let format = FormatDescriptor {
            width: 64,
            height: 48,
            fourcc: FourCC::YUYV,
            field: FieldOrder::Progressive,
        };

        Self {
            capabilities: Self::default_capabilities(),
            buffer_length: format.width * format.height * 2,
            format,
            granted_buffers: 1,
            pattern: TestPattern::ColorBars,
            ready: true,
            fail: None,
            requested: false,
            queried: false,
            queued: false,
            sequence: 0,
            probe: Rc::new(MockProbe::default()),
        }
    }

    pub fn default_capabilities() -> CapabilityRecord {
        CapabilityRecord {
            driver: "mock".to_owned(),
            card: "Mock Camera".to_owned(),
            bus_info: "mock:0".to_owned(),
            version: 0x0006_0100,
            capabilities: 0x0400_0001,
            flag_names: None,
        }
    }

    /// Set the format for this mock device. The buffer length follows it.
    #[must_use]
    pub fn with_format(mut self, format: FormatDescriptor) -> Self {
        self.buffer_length = format.width * format.height * 2;
        self.format = format;
        self
    }

    /// Set the capabilities for this mock device.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilityRecord) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_buffer_length(mut self, length: u32) -> Self {
        self.buffer_length = length;
        self
    }

    #[must_use]
    pub fn with_granted_buffers(mut self, count: u32) -> Self {
        self.granted_buffers = count;
        self
    }

    /// Set the test pattern the mapped buffer holds.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Never report the device readable.
    #[must_use]
    pub fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Fail the first call to `op`.
    #[must_use]
    pub fn fail_at(self, op: MockOp) -> Self {
        self.fail_on_call(op, 1)
    }

    /// Fail the `nth` (1-based) call to `op`.
    #[must_use]
    pub fn fail_on_call(mut self, op: MockOp, nth: usize) -> Self {
        self.fail = Some((op, nth));
        self
    }

    pub fn probe(&self) -> Rc<MockProbe> {
        Rc::clone(&self.probe)
    }

    /// The bytes a mapping of this device holds.
    pub fn expected_frame(&self) -> Vec<u8> {
        generate_test_frame(&self.format, self.buffer_length as usize, self.pattern)
    }

    fn record(&self, op: MockOp) -> io::Result<()> {
        self.probe.calls.borrow_mut().push(op);
        match self.fail {
            Some((fail_op, nth)) if fail_op == op && self.probe.count(op) == nth => {
                Err(io::Error::from_raw_os_error(libc::EIO))
            }
            _ => Ok(()),
        }
    }
}

fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.probe.closes.set(self.probe.closes.get() + 1);
    }
}

impl CameraDevice for MockDevice {
    type Mapping = MockMapping;

    fn query_capabilities(&self) -> Result<CapabilityRecord> {
        self.record(MockOp::QueryCapabilities)
            .map_err(CameraError::CapabilityQuery)?;
        Ok(self.capabilities.clone())
    }

    fn query_format(&self) -> Result<FormatDescriptor> {
        self.record(MockOp::QueryFormat)
            .map_err(CameraError::FormatQuery)?;
        Ok(self.format)
    }

    fn request_buffers(&mut self, _count: u32) -> Result<u32> {
        self.record(MockOp::RequestBuffers)
            .map_err(CameraError::BufferAllocation)?;
        self.requested = self.granted_buffers > 0;
        Ok(self.granted_buffers)
    }

    fn query_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()> {
        self.record(MockOp::QueryBuffer)
            .map_err(CameraError::BufferQuery)?;
        if !self.requested || buffer.index >= self.granted_buffers {
            return Err(CameraError::BufferQuery(einval()));
        }
        buffer.length = self.buffer_length;
        buffer.offset = 0;
        self.queried = true;
        Ok(())
    }

    fn map_buffer(&mut self, buffer: &BufferDescriptor) -> Result<MockMapping> {
        self.record(MockOp::MapBuffer).map_err(CameraError::Mapping)?;
        if !self.queried || buffer.length != self.buffer_length {
            return Err(CameraError::Mapping(einval()));
        }
        self.probe.maps.set(self.probe.maps.get() + 1);

        Ok(MockMapping {
            data: self.expected_frame(),
            probe: Rc::clone(&self.probe),
        })
    }

    fn stream_on(&mut self) -> Result<()> {
        self.record(MockOp::StreamOn).map_err(CameraError::StreamOn)?;
        if !self.requested {
            return Err(CameraError::StreamOn(einval()));
        }
        Ok(())
    }

    fn queue_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()> {
        self.record(MockOp::QueueBuffer)
            .map_err(CameraError::Enqueue)?;
        if !self.requested || self.queued || buffer.index >= self.granted_buffers {
            return Err(CameraError::Enqueue(einval()));
        }
        self.queued = true;
        Ok(())
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<Readiness> {
        self.record(MockOp::WaitReady).map_err(CameraError::Wait)?;
        self.probe.last_timeout.set(Some(timeout));
        if self.ready && self.queued {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::TimedOut)
        }
    }

    fn dequeue_buffer(&mut self, buffer: &mut BufferDescriptor) -> Result<()> {
        self.record(MockOp::DequeueBuffer)
            .map_err(CameraError::Dequeue)?;
        if !self.queued {
            return Err(CameraError::Dequeue(io::Error::from_raw_os_error(
                libc::EAGAIN,
            )));
        }
        self.queued = false;
        buffer.bytes_used = self.buffer_length;
        buffer.sequence = self.sequence;
        self.sequence += 1;
        Ok(())
    }
}

/// Mapped buffer handed out by [`MockDevice`].
pub struct MockMapping {
    data: Vec<u8>,
    probe: Rc<MockProbe>,
}

impl MappedBuffer for MockMapping {
    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockMapping {
    fn drop(&mut self) {
        self.probe.unmaps.set(self.probe.unmaps.get() + 1);
    }
}

/// Generate `len` bytes of frame data based on pattern.
fn generate_test_frame(format: &FormatDescriptor, len: usize, pattern: TestPattern) -> Vec<u8> {
    let mut data = vec![0u8; len];

    match pattern {
        TestPattern::ColorBars => {
            generate_color_bars(&mut data, format.width, format.height);
        }
        TestPattern::Counter => {
            for (i, byte) in data.iter_mut().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                {
                    *byte = (i % 251) as u8;
                }
            }
        }
    }

    data
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32, height: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];

    let bar_width = (width / 8).max(1);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let (y_val, u_val, v_val) = bars[(x / bar_width).min(7) as usize];
            let offset = ((y * width + x) * 2) as usize;
            if let Some(px) = data.get_mut(offset..offset + 4) {
                px.copy_from_slice(&[y_val, u_val, y_val, v_val]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_rejects_out_of_order_calls() {
        let mut device = MockDevice::new();
        let mut buffer = BufferDescriptor::new(0);

        assert!(matches!(
            device.query_buffer(&mut buffer),
            Err(CameraError::BufferQuery(_))
        ));
        assert!(matches!(device.stream_on(), Err(CameraError::StreamOn(_))));
        assert!(matches!(
            device.dequeue_buffer(&mut buffer),
            Err(CameraError::Dequeue(_))
        ));
    }

    #[test]
    fn test_mock_tracks_release() {
        let mut device = MockDevice::new();
        let probe = device.probe();
        let mut buffer = BufferDescriptor::new(0);

        device.request_buffers(1).expect("request should succeed");
        device.query_buffer(&mut buffer).expect("query should succeed");
        let mapping = device.map_buffer(&buffer).expect("map should succeed");
        assert_eq!(mapping.data().len(), 64 * 48 * 2);

        drop(mapping);
        drop(device);
        assert!(probe.all_released());
    }
}
