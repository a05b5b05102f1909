use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Identifies one compute device: an (OpenCL-style) platform id and the
/// device id within that platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub platform: u32,
    pub device: u32,
}

impl DeviceId {
    pub fn new(platform: u32, device: u32) -> Self {
        Self { platform, device }
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GPU[{}:{}]", self.platform, self.device)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseDeviceIdError {
    #[error("expected <platform>:<device>, got `{0}`")]
    MissingSeparator(String),

    #[error("invalid id `{0}`")]
    InvalidNumber(String),
}

impl FromStr for DeviceId {
    type Err = ParseDeviceIdError;

    /// parses `<platform>:<device>`, e.g. `0:1`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((platform, device)) = s.split_once(':') else {
            return Err(ParseDeviceIdError::MissingSeparator(s.to_owned()));
        };
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| ParseDeviceIdError::InvalidNumber(v.to_owned()))
        };

        Ok(Self::new(parse(platform)?, parse(device)?))
    }
}
