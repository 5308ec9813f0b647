//! Common error types for the multi-zone audio policy

use crate::devices::{OutputDevices, Zones};
use thiserror::Error;

/// Common result type for policy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by policy entry points and configuration loading
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range argument
    #[error("Bad value: {0}")]
    BadValue(String),

    /// Valid argument that is illegal in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A zone argument that must name exactly one zone does not
    #[error("Zone selection {zones:?} must name exactly one zone")]
    InvalidZoneCount { zones: Zones },

    /// A zone cannot be assigned an empty device set
    #[error("No devices given for zone {zone:?}")]
    NoDevices { zone: Zones },

    /// Devices are already claimed by another zone
    #[error("Devices {devices:?} already belong to zone {owner:?}")]
    DeviceAlreadyOwned { devices: OutputDevices, owner: Zones },

    /// Devices fall outside the zone's affinity
    #[error("Devices {devices:?} are not supported by zone {zone:?}")]
    DeviceNotSupported { devices: OutputDevices, zone: Zones },

    /// Attached devices cannot leave their zone
    #[error("Attached devices {devices:?} cannot be removed from zone {zone:?}")]
    DeviceAttached { devices: OutputDevices, zone: Zones },

    /// No output or input port could be opened for a request
    #[error("No output available: {0}")]
    NoOutput(String),

    /// The policy has no primary output
    #[error("Policy not initialized: {0}")]
    NoInit(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file syntax error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Coarse classification of [`Error`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadValue,
    InvalidOperation,
    NoResources,
    NoInit,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadValue(_) | Error::InvalidZoneCount { .. } | Error::NoDevices { .. } => {
                ErrorKind::BadValue
            }
            Error::InvalidOperation(_)
            | Error::DeviceAlreadyOwned { .. }
            | Error::DeviceNotSupported { .. }
            | Error::DeviceAttached { .. } => ErrorKind::InvalidOperation,
            Error::NoOutput(_) => ErrorKind::NoResources,
            Error::NoInit(_) => ErrorKind::NoInit,
            Error::Config(_) | Error::Io(_) | Error::Toml(_) => ErrorKind::Config,
        }
    }
}
