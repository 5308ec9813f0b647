//! Diagnostic views of the policy state

use super::effects::EffectDescriptor;
use super::inputs::InputDescriptor;
use super::outputs::OutputKind;
use super::sessions::SessionDescriptor;
use super::volume::StreamDescriptor;
use super::zones::ZoneEntry;
use super::AudioPolicyManager;
use crate::client::AudioPolicyClient;
use mzap_common::{
    AudioFormat, ChannelMask, ForceUse, ForcedConfig, InputDevices, IoHandle, OutputDevices,
    OutputFlags, PhoneState, StreamType,
};
use serde::Serialize;
use std::fmt::Write;

/// Serializable copy of one output's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSnapshot {
    pub id: IoHandle,
    pub kind: OutputKind,
    pub device: OutputDevices,
    pub sampling_rate: u32,
    pub format: AudioFormat,
    pub channel_mask: ChannelMask,
    pub latency_ms: u32,
    pub flags: OutputFlags,
    pub users: u32,
    /// Streams with active tracks and their counts
    pub active_streams: Vec<(StreamType, u32)>,
    pub muted_streams: Vec<(StreamType, u32)>,
}

/// Serializable copy of the whole policy state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySnapshot {
    pub primary_output: IoHandle,
    pub phone_state: PhoneState,
    pub force_use: Vec<(ForceUse, ForcedConfig)>,
    pub attached_output_devices: OutputDevices,
    pub available_output_devices: OutputDevices,
    pub available_input_devices: InputDevices,
    pub a2dp_suspended: bool,
    pub zones: Vec<ZoneEntry>,
    pub sessions: Vec<SessionDescriptor>,
    pub outputs: Vec<OutputSnapshot>,
    pub inputs: Vec<InputDescriptor>,
    pub streams: Vec<(StreamType, StreamDescriptor)>,
    pub effects: Vec<(i32, EffectDescriptor)>,
    pub total_effects_cpu_load: u32,
    pub total_effects_memory: u32,
}

fn counted(table: impl Iterator<Item = (StreamType, u32)>) -> Vec<(StreamType, u32)> {
    table.filter(|(_, count)| *count > 0).collect()
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            primary_output: self.primary_output,
            phone_state: self.phone_state,
            force_use: ForceUse::ALL
                .iter()
                .map(|usage| (*usage, self.force_use[usage.index()]))
                .collect(),
            attached_output_devices: self.attached_output_devices,
            available_output_devices: self.available_output_devices,
            available_input_devices: self.available_input_devices,
            a2dp_suspended: self.a2dp_suspended,
            zones: self.routing.entries().to_vec(),
            sessions: self.sessions.values().cloned().collect(),
            outputs: self
                .outputs
                .values()
                .map(|desc| OutputSnapshot {
                    id: desc.id,
                    kind: desc.kind.clone(),
                    device: self.output_device(desc.id),
                    sampling_rate: desc.sampling_rate,
                    format: desc.format,
                    channel_mask: desc.channel_mask,
                    latency_ms: self.output_latency(desc.id),
                    flags: desc.flags,
                    users: desc.users,
                    active_streams: counted(desc.ref_count.iter().map(|(s, c)| (s, *c))),
                    muted_streams: counted(desc.mute_count.iter().map(|(s, c)| (s, *c))),
                })
                .collect(),
            inputs: self.inputs.values().cloned().collect(),
            streams: self.streams.iter().map(|(s, desc)| (s, *desc)).collect(),
            effects: self.effects.iter().map(|(id, desc)| (*id, desc.clone())).collect(),
            total_effects_cpu_load: self.total_effects_cpu_load,
            total_effects_memory: self.total_effects_memory,
        }
    }

    /// Human-readable report of the policy state
    pub fn dump(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "AudioPolicyManager Dump");
        let _ = writeln!(out, " Primary Output: {}", snapshot.primary_output);
        let _ = writeln!(out, " Phone state: {:?}", snapshot.phone_state);
        for (usage, config) in &snapshot.force_use {
            let _ = writeln!(out, " Force use {:?}: {:?}", usage, config);
        }
        let _ = writeln!(out, " Attached output devices: {:?}", snapshot.attached_output_devices);
        let _ = writeln!(out, " Available output devices: {:?}", snapshot.available_output_devices);
        let _ = writeln!(out, " Available input devices: {:?}", snapshot.available_input_devices);
        let _ = writeln!(out, " A2DP suspended: {}", snapshot.a2dp_suspended);

        let _ = writeln!(out, "\nZones:");
        for zone in &snapshot.zones {
            let _ = writeln!(
                out,
                " {:?}: devices {:?} affinity {:?} volume {:.3}",
                zone.zone, zone.devices, zone.affinity, zone.volume
            );
        }

        let _ = writeln!(out, "\nSessions:");
        for session in &snapshot.sessions {
            let output = session
                .output
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                " {}: zones {:?} devices {:?} output {} users {}",
                session.id, session.zones, session.devices, output, session.users
            );
        }

        let _ = writeln!(out, "\nOutputs:");
        for output in &snapshot.outputs {
            let _ = writeln!(
                out,
                " {}: {:?} device {:?} {} Hz {} {:?} latency {} ms flags {:?} users {}",
                output.id,
                output.kind,
                output.device,
                output.sampling_rate,
                output.format,
                output.channel_mask,
                output.latency_ms,
                output.flags,
                output.users
            );
            for (stream, count) in &output.active_streams {
                let _ = writeln!(out, "   {} active {}", stream.name(), count);
            }
            for (stream, count) in &output.muted_streams {
                let _ = writeln!(out, "   {} muted {}", stream.name(), count);
            }
        }

        let _ = writeln!(out, "\nInputs:");
        for input in &snapshot.inputs {
            let _ = writeln!(
                out,
                " {}: source {:?} device {:?} {} Hz {} {:?} users {}",
                input.id,
                input.source,
                input.device,
                input.sampling_rate,
                input.format,
                input.channel_mask,
                input.users
            );
        }

        let _ = writeln!(out, "\nStreams (index min/max/cur, can be muted):");
        for (stream, desc) in &snapshot.streams {
            let _ = writeln!(
                out,
                " {:<16} {}/{}/{} {}",
                stream.name(),
                desc.index_min,
                desc.index_max,
                desc.index_cur,
                desc.can_be_muted
            );
        }

        let _ = writeln!(
            out,
            "\nEffects (CPU load {}, memory {} KB):",
            snapshot.total_effects_cpu_load, snapshot.total_effects_memory
        );
        for (id, effect) in &snapshot.effects {
            let _ = writeln!(
                out,
                " {}: {} io {} session {} strategy {:?} enabled {}",
                id,
                effect.info.name,
                effect.io,
                effect.session,
                effect.strategy,
                effect.enabled
            );
        }

        out
    }
}
