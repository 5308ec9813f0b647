//! Test helpers for mzap-policy integration tests
//!
//! Provides reusable test infrastructure components:
//! - VEHICLE_TOML: a cabin plus two backseat headphone zones with USB, A2DP,
//!   HDMI and multichannel ports
//! - VehicleBuilder: builds a manager over the simulated HAL from that inventory

#![allow(dead_code)]

pub mod vehicle;

pub use vehicle::{output_on, playing_output, VehicleBuilder, VEHICLE_TOML};
