//! Shared vocabulary for the multi-zone audio policy
//!
//! Device, zone and channel masks, stream classifications, HAL parameter
//! strings, volume curves, configuration and the common error type.

pub mod config;
pub mod devices;
pub mod error;
pub mod format;
pub mod parameters;
pub mod streams;
pub mod volume_curves;

pub use config::{PolicyConfig, HwModuleConfig, InputProfile, OutputProfile, ZoneAffinity};
pub use devices::{Device, DeviceState, InputDevices, OutputDevices, Zones};
pub use error::{Error, ErrorKind, Result};
pub use format::{
    AudioFormat, ChannelMask, InputChannelMask, IoHandle, ModuleHandle, OutputFlags, SessionId,
};
pub use parameters::AudioParameter;
pub use streams::{
    DeviceCategory, ForceUse, ForcedConfig, InputSource, PerStream, PhoneState, RoutingStrategy,
    StreamType, ToneType,
};
pub use volume_curves::VolumeCurve;
