use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vision task selected for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Detection,
    Segmentation,
    Pose,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Detection, Mode::Segmentation, Mode::Pose];

    /// Number of extra per-anchor channels the YOLO head carries after the
    /// class scores.
    pub(crate) fn extra_channels(self) -> usize {
        match self {
            Mode::Detection => 0,
            Mode::Segmentation => 32,
            Mode::Pose => 17 * 3,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Detection => "detection",
            Mode::Segmentation => "segmentation",
            Mode::Pose => "pose",
        };
        f.write_str(name)
    }
}
