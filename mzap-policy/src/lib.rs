//! # Multi-Zone Audio Policy (mzap-policy)
//!
//! Audio routing and volume policy for a vehicle cabin plus two rear-seat
//! zones.
//!
//! **Purpose:** Decide which output ports each playback session uses, which
//! physical devices they are routed to, and at what volume, while keeping
//! every output device owned by exactly one zone.
//!
//! **Architecture:** [`AudioPolicyManager`] is a synchronous state machine
//! generic over an [`AudioPolicyClient`] (the audio HAL). [`SimulatedHal`]
//! stands in for the hardware in the diagnostic binary and the tests.

pub mod client;
pub mod policy;
pub mod scenario;
pub mod simulated;
pub mod state;

pub use client::{AudioPolicyClient, InputConfig, OutputConfig};
pub use mzap_common::{Error, Result};
pub use policy::{AudioPolicyManager, EffectInfo, InputRequest, OutputRequest, PolicySnapshot};
pub use scenario::{Scenario, Step, StepReport};
pub use simulated::{HalCall, SimulatedHal};
pub use state::SharedPolicy;
