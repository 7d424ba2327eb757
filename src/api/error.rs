//! Scheduler errors.

use std::fmt;

use crate::device::DeviceError;

/// Errors returned by the frame scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// The configuration cannot work (pool or batch sizes, single-queue spacing)
    Config(String),
    /// The device lacks a feature the requested mode needs
    MissingCapability(&'static str),
    /// The device failed; nothing is retried
    Device(DeviceError),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            SchedError::MissingCapability(what) => write!(f, "Device does not support {}", what),
            SchedError::Device(err) => write!(f, "Device error: {}", err),
        }
    }
}

impl std::error::Error for SchedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for SchedError {
    fn from(err: DeviceError) -> Self {
        SchedError::Device(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            SchedError::MissingCapability("timeline semaphores").to_string(),
            "Device does not support timeline semaphores"
        );
        assert_eq!(
            SchedError::from(DeviceError::Timeout).to_string(),
            "Device error: Host wait timed out"
        );
    }
}
