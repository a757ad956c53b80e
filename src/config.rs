//! Command line parsing and run configuration.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::selector::DeviceSelector;
use crate::traits::{CameraError, Result};

/// Printed for any bad invocation.
pub const USAGE: &str = "usage:  enter video0, video1, or video2 after program name...";

/// Number of stream-on/queue/wait/dequeue passes per capture.
///
/// Some drivers only hand back a filled buffer on the second pass, and a
/// stream-off between passes hangs them, so the stream is re-armed instead.
pub const DEFAULT_REPEAT_COUNT: u32 = 2;

/// How long to wait for the device to become readable on each pass.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Grab a single raw frame from a V4L2 device.
#[derive(Debug, Parser)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Device to capture from: video0, video1 or video2.
    #[arg(value_parser = parse_selector)]
    pub selector: DeviceSelector,
}

fn parse_selector(value: &str) -> std::result::Result<DeviceSelector, String> {
    value.parse().map_err(|err: CameraError| err.to_string())
}

/// Everything a capture run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device to open.
    pub selector: DeviceSelector,
    /// Capture passes, see [`DEFAULT_REPEAT_COUNT`].
    pub repeat_count: u32,
    /// Readiness wait per pass.
    pub ready_timeout: Duration,
    /// Directory the frame file is written to.
    pub output_dir: PathBuf,
}

impl CaptureConfig {
    /// Defaults for `selector`, writing into the current directory.
    #[must_use]
    pub fn new(selector: DeviceSelector) -> Self {
        Self {
            selector,
            repeat_count: DEFAULT_REPEAT_COUNT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            output_dir: PathBuf::from("."),
        }
    }

    /// Write the frame file into `dir` instead of the current directory.
    #[must_use]
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the number of capture passes.
    #[must_use]
    pub fn with_repeat_count(mut self, count: u32) -> Self {
        self.repeat_count = count;
        self
    }

    /// Set the readiness wait used on each pass.
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Parse the full argument list, program name first.
    ///
    /// Exactly two arguments are accepted. The count is checked before clap
    /// sees them, so a `--` separator cannot pad out a valid selector.
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if args.len() != 2 {
            tracing::debug!(count = args.len(), "wrong argument count");
            return Err(CameraError::Invocation(USAGE.to_owned()));
        }

        let cli = Cli::try_parse_from(args).map_err(|err| {
            tracing::debug!(%err, "argument parsing failed");
            CameraError::Invocation(USAGE.to_owned())
        })?;

        Ok(Self::new(cli.selector))
    }
}
