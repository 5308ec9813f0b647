//! In-process HAL used by the command-line driver and the tests
//!
//! [`SimulatedHal`] hands out sequential handles, fills unspecified port
//! parameters with platform defaults and records every request as a
//! [`HalCall`], so callers can assert on exactly what the policy asked
//! the hardware to do.

use crate::client::{AudioPolicyClient, InputConfig, OutputConfig};
use mzap_common::parameters::KEY_ROUTING;
use mzap_common::{
    AudioFormat, AudioParameter, ChannelMask, InputChannelMask, InputDevices, IoHandle,
    ModuleHandle, OutputDevices, OutputFlags, SessionId, StreamType, ToneType,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

const DEFAULT_SAMPLING_RATE: u32 = 48000;
const DEFAULT_LATENCY_MS: u32 = 20;

/// One request the policy made of the HAL
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum HalCall {
    LoadHwModule {
        name: String,
        module: Option<ModuleHandle>,
    },
    OpenOutput {
        module: ModuleHandle,
        output: IoHandle,
        devices: OutputDevices,
        flags: OutputFlags,
    },
    OpenDuplicateOutput {
        output: IoHandle,
        children: Vec<IoHandle>,
    },
    CloseOutput {
        output: IoHandle,
    },
    SuspendOutput {
        output: IoHandle,
    },
    RestoreOutput {
        output: IoHandle,
    },
    OpenInput {
        module: ModuleHandle,
        input: IoHandle,
        device: InputDevices,
    },
    CloseInput {
        input: IoHandle,
    },
    SetParameters {
        io: IoHandle,
        params: String,
        delay_ms: u32,
    },
    SetStreamVolume {
        stream: StreamType,
        volume: f32,
        output: IoHandle,
        delay_ms: u32,
    },
    SetVoiceVolume {
        volume: f32,
        delay_ms: u32,
    },
    SetDuplicatingVolume {
        duplicating: IoHandle,
        output: IoHandle,
        volume: f32,
    },
    SetZoneVolume {
        output: IoHandle,
        session: SessionId,
        volume: f32,
    },
    SetStreamOutput {
        stream: StreamType,
        output: IoHandle,
    },
    StartTone {
        tone: ToneType,
        stream: StreamType,
    },
    StopTone,
}

/// Recording stand-in for the audio HAL
#[derive(Debug, Default)]
pub struct SimulatedHal {
    next_handle: u32,
    calls: Vec<HalCall>,
    open_outputs: BTreeSet<IoHandle>,
    open_inputs: BTreeSet<IoHandle>,
    suspended: BTreeSet<IoHandle>,
    missing_modules: Vec<String>,
    refused_devices: OutputDevices,
    refuse_duplicates: bool,
    replies: HashMap<String, String>,
}

impl SimulatedHal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load_hw_module` fail for `name`
    pub fn without_module(mut self, name: &str) -> Self {
        self.missing_modules.push(name.to_string());
        self
    }

    /// Make `open_output` fail for any request touching `devices`
    pub fn refuse_devices(&mut self, devices: OutputDevices) {
        self.refused_devices |= devices;
    }

    /// Make `open_duplicate_output` fail
    pub fn refuse_duplicates(&mut self, refuse: bool) {
        self.refuse_duplicates = refuse;
    }

    /// Script the value returned for `key` by `get_parameters`
    pub fn reply(&mut self, key: &str, value: &str) {
        self.replies.insert(key.to_string(), value.to_string());
    }

    pub fn calls(&self) -> &[HalCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn open_outputs(&self) -> &BTreeSet<IoHandle> {
        &self.open_outputs
    }

    pub fn open_inputs(&self) -> &BTreeSet<IoHandle> {
        &self.open_inputs
    }

    pub fn is_suspended(&self, output: IoHandle) -> bool {
        self.suspended.contains(&output)
    }

    /// Routing values sent to `output`, oldest first
    pub fn routing_history(&self, output: IoHandle) -> Vec<OutputDevices> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HalCall::SetParameters { io, params, .. } if *io == output => {
                    let param: AudioParameter = params.parse().ok()?;
                    let bits = param.get_int(KEY_ROUTING)?;
                    Some(OutputDevices::from_bits_retain(bits as u32))
                }
                _ => None,
            })
            .collect()
    }

    /// Last volume pushed for `stream` on `output`
    pub fn last_stream_volume(&self, stream: StreamType, output: IoHandle) -> Option<f32> {
        self.calls.iter().rev().find_map(|call| match call {
            HalCall::SetStreamVolume {
                stream: s,
                volume,
                output: o,
                ..
            } if *s == stream && *o == output => Some(*volume),
            _ => None,
        })
    }

    /// Last per-session volume pushed for `session` on `output`
    pub fn last_zone_volume(&self, output: IoHandle, session: SessionId) -> Option<f32> {
        self.calls.iter().rev().find_map(|call| match call {
            HalCall::SetZoneVolume {
                output: o,
                session: s,
                volume,
            } if *o == output && *s == session => Some(*volume),
            _ => None,
        })
    }

    fn allocate(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record(&mut self, call: HalCall) {
        trace!("HAL call: {:?}", call);
        self.calls.push(call);
    }
}

impl AudioPolicyClient for SimulatedHal {
    fn load_hw_module(&mut self, name: &str) -> Option<ModuleHandle> {
        let module = if self.missing_modules.iter().any(|m| m == name) {
            None
        } else {
            Some(ModuleHandle(self.allocate()))
        };
        self.record(HalCall::LoadHwModule {
            name: name.to_string(),
            module,
        });
        module
    }

    fn open_output(
        &mut self,
        module: ModuleHandle,
        config: &mut OutputConfig,
        flags: OutputFlags,
    ) -> Option<IoHandle> {
        if config.devices.intersects(self.refused_devices) {
            return None;
        }
        if config.sampling_rate == 0 {
            config.sampling_rate = DEFAULT_SAMPLING_RATE;
        }
        if config.format == AudioFormat::Default {
            config.format = AudioFormat::Pcm16Bit;
        }
        if config.channel_mask.is_empty() {
            config.channel_mask = ChannelMask::STEREO;
        }
        if config.latency_ms == 0 {
            config.latency_ms = DEFAULT_LATENCY_MS;
        }
        let output = IoHandle(self.allocate());
        self.open_outputs.insert(output);
        self.record(HalCall::OpenOutput {
            module,
            output,
            devices: config.devices,
            flags,
        });
        Some(output)
    }

    fn open_duplicate_output(&mut self, outputs: &[IoHandle]) -> Option<IoHandle> {
        if self.refuse_duplicates || outputs.iter().any(|o| !self.open_outputs.contains(o)) {
            return None;
        }
        let output = IoHandle(self.allocate());
        self.open_outputs.insert(output);
        self.record(HalCall::OpenDuplicateOutput {
            output,
            children: outputs.to_vec(),
        });
        Some(output)
    }

    fn close_output(&mut self, output: IoHandle) {
        self.open_outputs.remove(&output);
        self.suspended.remove(&output);
        self.record(HalCall::CloseOutput { output });
    }

    fn suspend_output(&mut self, output: IoHandle) {
        self.suspended.insert(output);
        self.record(HalCall::SuspendOutput { output });
    }

    fn restore_output(&mut self, output: IoHandle) {
        self.suspended.remove(&output);
        self.record(HalCall::RestoreOutput { output });
    }

    fn open_input(&mut self, module: ModuleHandle, config: &mut InputConfig) -> Option<IoHandle> {
        if config.sampling_rate == 0 {
            config.sampling_rate = DEFAULT_SAMPLING_RATE;
        }
        if config.format == AudioFormat::Default {
            config.format = AudioFormat::Pcm16Bit;
        }
        if config.channel_mask.is_empty() {
            config.channel_mask = InputChannelMask::MONO;
        }
        let input = IoHandle(self.allocate());
        self.open_inputs.insert(input);
        self.record(HalCall::OpenInput {
            module,
            input,
            device: config.device,
        });
        Some(input)
    }

    fn close_input(&mut self, input: IoHandle) {
        self.open_inputs.remove(&input);
        self.record(HalCall::CloseInput { input });
    }

    fn set_parameters(&mut self, io: IoHandle, params: &str, delay_ms: u32) {
        self.record(HalCall::SetParameters {
            io,
            params: params.to_string(),
            delay_ms,
        });
    }

    fn get_parameters(&mut self, _io: IoHandle, keys: &str) -> String {
        let mut reply = AudioParameter::new();
        for key in keys.split(';').map(str::trim).filter(|k| !k.is_empty()) {
            if let Some(value) = self.replies.get(key) {
                reply.add(key, value);
            }
        }
        reply.to_string()
    }

    fn set_stream_volume(&mut self, stream: StreamType, volume: f32, output: IoHandle, delay_ms: u32) {
        self.record(HalCall::SetStreamVolume {
            stream,
            volume,
            output,
            delay_ms,
        });
    }

    fn set_voice_volume(&mut self, volume: f32, delay_ms: u32) {
        self.record(HalCall::SetVoiceVolume { volume, delay_ms });
    }

    fn set_duplicating_volume(&mut self, duplicating: IoHandle, output: IoHandle, volume: f32) {
        self.record(HalCall::SetDuplicatingVolume {
            duplicating,
            output,
            volume,
        });
    }

    fn set_zone_volume(&mut self, output: IoHandle, session: SessionId, volume: f32) {
        self.record(HalCall::SetZoneVolume {
            output,
            session,
            volume,
        });
    }

    fn set_stream_output(&mut self, stream: StreamType, output: IoHandle) {
        self.record(HalCall::SetStreamOutput { stream, output });
    }

    fn start_tone(&mut self, tone: ToneType, stream: StreamType) {
        self.record(HalCall::StartTone { tone, stream });
    }

    fn stop_tone(&mut self) {
        self.record(HalCall::StopTone);
    }
}
