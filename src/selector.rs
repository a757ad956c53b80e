//! Device selector lookup.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::traits::CameraError;

/// One of the device nodes this tool is allowed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    /// `/dev/video0`
    Video0,
    /// `/dev/video1`
    Video1,
    /// `/dev/video2`
    Video2,
}

/// Selector names accepted on the command line.
const SELECTORS: [(&str, DeviceSelector); 3] = [
    ("video0", DeviceSelector::Video0),
    ("video1", DeviceSelector::Video1),
    ("video2", DeviceSelector::Video2),
];

impl DeviceSelector {
    /// Selector name as typed on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Video0 => "video0",
            Self::Video1 => "video1",
            Self::Video2 => "video2",
        }
    }

    /// Device node path.
    #[must_use]
    pub fn path(self) -> &'static Path {
        Path::new(match self {
            Self::Video0 => "/dev/video0",
            Self::Video1 => "/dev/video1",
            Self::Video2 => "/dev/video2",
        })
    }

    /// Name of the file the captured frame is written to.
    #[must_use]
    pub fn output_file_name(self) -> String {
        format!("{}Data.bin", self.name())
    }
}

impl FromStr for DeviceSelector {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SELECTORS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, selector)| selector)
            .ok_or_else(|| CameraError::UnsupportedSelector(s.to_owned()))
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
