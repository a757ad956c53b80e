//! Capability and format reporting.
//!
//! Both queries are read-only with respect to the device; their only side
//! effect is the snapshot written to `out`.

use std::io::Write;

use crate::traits::{CameraDevice, CapabilityRecord, FormatDescriptor, Result};

/// Query the driver identity and print it to `out`.
pub fn query_capabilities<D, W>(device: &D, out: &mut W) -> Result<CapabilityRecord>
where
    D: CameraDevice,
    W: Write,
{
    let caps = device.query_capabilities()?;
    write_capabilities(&caps, out)?;
    Ok(caps)
}

/// Query the current capture format and print it to `out`.
pub fn query_format<D, W>(device: &D, out: &mut W) -> Result<FormatDescriptor>
where
    D: CameraDevice,
    W: Write,
{
    let format = device.query_format()?;
    write_format(&format, out)?;
    Ok(format)
}

fn write_capabilities<W: Write>(caps: &CapabilityRecord, out: &mut W) -> std::io::Result<()> {
    let (hi, lo) = caps.version_components();

    writeln!(out, "Camera Driver Capabilities:")?;
    writeln!(out, "  Driver: {}", caps.driver)?;
    writeln!(out, "  Card: {}", caps.card)?;
    writeln!(out, "  Bus: {}", caps.bus_info)?;
    writeln!(out, "  Version: {hi}.{lo}")?;
    writeln!(out, "  Capabilities: {:#x}", caps.capabilities)?;
    if let Some(names) = &caps.flag_names {
        writeln!(out, "  Flags: {names}")?;
    }
    Ok(())
}

fn write_format<W: Write>(format: &FormatDescriptor, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "Camera Parameters:")?;
    writeln!(out, "  Width: {}", format.width)?;
    writeln!(out, "  Height: {}", format.height)?;
    writeln!(out, "  PixFmt: {}", format.fourcc)?;
    writeln!(out, "  Field: {}", format.field)?;
    Ok(())
}
