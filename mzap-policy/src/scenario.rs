//! Scripted policy scenarios
//!
//! A scenario is a TOML list of steps replayed against a manager:
//!
//! ```toml
//! [[steps]]
//! op = "connect"
//! device = { output = "USB_DEVICE" }
//!
//! [[steps]]
//! op = "play"
//! stream = "MUSIC"
//! session = 7
//! ```
//!
//! Every step runs even when an earlier one fails; policy violations are
//! part of what scenarios exercise. Each step yields a [`StepReport`].

use crate::client::AudioPolicyClient;
use crate::policy::{AudioPolicyManager, OutputRequest};
use mzap_common::{
    Device, DeviceState, Error, ForceUse, ForcedConfig, IoHandle, OutputDevices, PhoneState,
    Result, SessionId, StreamType, Zones,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// One scripted policy call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Connect {
        device: Device,
        #[serde(default)]
        address: String,
    },
    Disconnect {
        device: Device,
        #[serde(default)]
        address: String,
    },
    SetZoneDevices {
        zone: Zones,
        devices: OutputDevices,
    },
    SetZoneVolume {
        zone: Zones,
        volume: f32,
    },
    SetSessionZones {
        session: SessionId,
        zones: Zones,
    },
    SetSessionVolume {
        session: SessionId,
        zones: Zones,
        volume: f32,
    },
    PhoneState {
        state: PhoneState,
    },
    ForceUse {
        usage: ForceUse,
        config: ForcedConfig,
    },
    InitStreamVolume {
        stream: StreamType,
        min: i32,
        max: i32,
    },
    StreamVolume {
        stream: StreamType,
        index: i32,
        #[serde(default = "default_volume_device")]
        device: OutputDevices,
    },
    /// Get an output for the stream and start one track on it
    Play {
        stream: StreamType,
        session: SessionId,
        #[serde(default)]
        request: OutputRequest,
    },
    /// Stop the most recent playing track of the stream in the session
    Stop {
        stream: StreamType,
        session: SessionId,
    },
    /// Stop whatever still plays in the session and release its outputs
    Release {
        session: SessionId,
    },
}

fn default_volume_device() -> OutputDevices {
    OutputDevices::SPEAKER
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Connect { .. } => "connect",
            Step::Disconnect { .. } => "disconnect",
            Step::SetZoneDevices { .. } => "set_zone_devices",
            Step::SetZoneVolume { .. } => "set_zone_volume",
            Step::SetSessionZones { .. } => "set_session_zones",
            Step::SetSessionVolume { .. } => "set_session_volume",
            Step::PhoneState { .. } => "phone_state",
            Step::ForceUse { .. } => "force_use",
            Step::InitStreamVolume { .. } => "init_stream_volume",
            Step::StreamVolume { .. } => "stream_volume",
            Step::Play { .. } => "play",
            Step::Stop { .. } => "stop",
            Step::Release { .. } => "release",
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    /// Result detail, or the error message
    pub detail: String,
}

/// Ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A track started by a `play` step
#[derive(Debug, Clone, Copy)]
struct Track {
    output: IoHandle,
    stream: StreamType,
    playing: bool,
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scenario = Self::from_toml_str(&content)?;
        info!(
            "Loaded scenario {} ({} steps)",
            path.display(),
            scenario.steps.len()
        );
        Ok(scenario)
    }

    /// Replay every step against `manager`
    pub fn run<C: AudioPolicyClient>(&self, manager: &mut AudioPolicyManager<C>) -> Vec<StepReport> {
        let mut tracks: BTreeMap<SessionId, Vec<Track>> = BTreeMap::new();
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let outcome = run_step(manager, step, &mut tracks);
                match &outcome {
                    Ok(detail) => debug!("Step {} {}: {}", index, step.name(), detail),
                    Err(e) => warn!("Step {} {} failed: {}", index, step.name(), e),
                }
                StepReport {
                    index,
                    op: step.name(),
                    ok: outcome.is_ok(),
                    detail: outcome.unwrap_or_else(|e| e.to_string()),
                }
            })
            .collect()
    }
}

fn run_step<C: AudioPolicyClient>(
    manager: &mut AudioPolicyManager<C>,
    step: &Step,
    tracks: &mut BTreeMap<SessionId, Vec<Track>>,
) -> Result<String> {
    match step {
        Step::Connect { device, address } => {
            manager.set_device_connection_state(*device, DeviceState::Available, address)?;
            Ok(format!("{:?} connected", device))
        }
        Step::Disconnect { device, address } => {
            manager.set_device_connection_state(*device, DeviceState::Unavailable, address)?;
            Ok(format!("{:?} disconnected", device))
        }
        Step::SetZoneDevices { zone, devices } => {
            manager.set_zone_devices(*zone, *devices)?;
            Ok(format!("{:?} -> {:?}", zone, manager.zone_devices(*zone)))
        }
        Step::SetZoneVolume { zone, volume } => {
            manager.set_zone_volume(*zone, *volume)?;
            Ok(format!("{:?} volume {}", zone, manager.zone_volume(*zone)?))
        }
        Step::SetSessionZones { session, zones } => {
            manager.set_session_zones(*session, *zones)?;
            Ok(format!("session {} -> {:?}", session, manager.session_zones(*session)))
        }
        Step::SetSessionVolume {
            session,
            zones,
            volume,
        } => {
            manager.set_session_volume(*session, *zones, *volume)?;
            Ok(format!("session {} volume {} in {:?}", session, volume, zones))
        }
        Step::PhoneState { state } => {
            manager.set_phone_state(*state);
            Ok(format!("{:?}", manager.phone_state()))
        }
        Step::ForceUse { usage, config } => {
            manager.set_force_use(*usage, *config)?;
            Ok(format!("{:?} = {:?}", usage, config))
        }
        Step::InitStreamVolume { stream, min, max } => {
            manager.init_stream_volume(*stream, *min, *max)?;
            Ok(format!("{} range {}..{}", stream.name(), min, max))
        }
        Step::StreamVolume {
            stream,
            index,
            device,
        } => {
            manager.set_stream_volume_index(*stream, *index, *device)?;
            Ok(format!("{} index {}", stream.name(), index))
        }
        Step::Play {
            stream,
            session,
            request,
        } => {
            let output = manager.get_output(*stream, *request, *session)?;
            if let Err(e) = manager.start_output(output, *stream, *session) {
                manager.release_output(output, *session)?;
                return Err(e);
            }
            tracks.entry(*session).or_default().push(Track {
                output,
                stream: *stream,
                playing: true,
            });
            Ok(format!(
                "{} on output {} ({:?})",
                stream.name(),
                output,
                manager.output_device(output)
            ))
        }
        Step::Stop { stream, session } => {
            let track = tracks
                .get_mut(session)
                .and_then(|list| {
                    list.iter_mut()
                        .rev()
                        .find(|track| track.stream == *stream && track.playing)
                })
                .ok_or_else(|| {
                    Error::InvalidOperation(format!(
                        "no {} track playing in session {}",
                        stream.name(),
                        session
                    ))
                })?;
            manager.stop_output(track.output, *stream, *session)?;
            track.playing = false;
            Ok(format!("{} stopped on output {}", stream.name(), track.output))
        }
        Step::Release { session } => {
            let list = tracks.remove(session).ok_or_else(|| {
                Error::InvalidOperation(format!("session {} has no outputs", session))
            })?;
            for track in &list {
                if track.playing {
                    manager.stop_output(track.output, track.stream, *session)?;
                }
                manager.release_output(track.output, *session)?;
            }
            Ok(format!("session {} released {} outputs", session, list.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_toml_str(
            r#"
            [[steps]]
            op = "connect"
            device = { output = "USB_DEVICE" }
            address = "card=1;device=0"

            [[steps]]
            op = "set_zone_devices"
            zone = "BACKSEAT1"
            devices = "WIRED_HEADPHONE"

            [[steps]]
            op = "play"
            stream = "MUSIC"
            session = 7
            request = { format = "AC3" }

            [[steps]]
            op = "phone_state"
            state = "in_call"
            "#,
        )
        .unwrap();

        assert_eq!(scenario.steps.len(), 4);
        assert_eq!(
            scenario.steps[0],
            Step::Connect {
                device: Device::Output(OutputDevices::USB_DEVICE),
                address: "card=1;device=0".to_string(),
            }
        );
        assert_eq!(
            scenario.steps[1],
            Step::SetZoneDevices {
                zone: Zones::BACKSEAT1,
                devices: OutputDevices::WIRED_HEADPHONE,
            }
        );
        match &scenario.steps[2] {
            Step::Play {
                stream, request, ..
            } => {
                assert_eq!(*stream, StreamType::Music);
                assert_eq!(request.format, mzap_common::AudioFormat::Ac3);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(scenario.steps[3].name(), "phone_state");
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let err = Scenario::from_toml_str("[[steps]]\nop = \"explode\"\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_empty_document_has_no_steps() {
        assert!(Scenario::from_toml_str("").unwrap().steps.is_empty());
    }
}
