//! Stream volume
//!
//! **Responsibilities:**
//! - Per-stream UI index range and current index
//! - Index to amplitude through the device-category volume curves
//! - Push stream volumes to plain and duplicating outputs
//! - Reference-counted mute per (output, stream)

use super::{
    AudioPolicyManager, SONIFICATION_HEADSET_VOLUME_FACTOR, SONIFICATION_HEADSET_VOLUME_MIN,
};
use crate::client::AudioPolicyClient;
use mzap_common::{
    DeviceCategory, Error, ForceUse, ForcedConfig, IoHandle, OutputDevices, Result,
    RoutingStrategy, StreamType, VolumeCurve,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Volume index state of one stream type
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreamDescriptor {
    pub index_min: i32,
    pub index_max: i32,
    pub index_cur: i32,
    /// A stream that cannot be muted always plays at `index_max`
    pub can_be_muted: bool,
}

impl Default for StreamDescriptor {
    fn default() -> Self {
        Self {
            index_min: 0,
            index_max: 1,
            index_cur: 0,
            can_be_muted: true,
        }
    }
}

/// Devices whose volume makes sonification uncomfortably loud
const HEADSET_DEVICES: OutputDevices = OutputDevices::BLUETOOTH_A2DP
    .union(OutputDevices::BLUETOOTH_A2DP_HEADPHONES)
    .union(OutputDevices::WIRED_HEADSET)
    .union(OutputDevices::WIRED_HEADPHONE)
    .union(OutputDevices::WIRED_HEADPHONE2);

/// Devices where media is never attenuated in software
const DIGITAL_DEVICES: [OutputDevices; 4] = [
    OutputDevices::AUX_DIGITAL,
    OutputDevices::DGTL_DOCK_HEADSET,
    OutputDevices::USB_ACCESSORY,
    OutputDevices::USB_DEVICE,
];

/// Single device whose volume curve applies to a device set
///
/// The speaker wins over headphones, then A2DP; any other multi-device set
/// falls back to its lowest device.
pub fn device_for_volume(devices: OutputDevices) -> OutputDevices {
    if devices.is_empty() {
        return OutputDevices::SPEAKER;
    }
    if devices.is_single() {
        return devices;
    }
    let preferred = [
        OutputDevices::SPEAKER,
        OutputDevices::WIRED_HEADPHONE,
        OutputDevices::WIRED_HEADPHONE2,
    ];
    if let Some(device) = preferred.into_iter().find(|d| devices.contains(*d)) {
        return device;
    }
    let a2dp = devices & OutputDevices::ALL_A2DP;
    let candidates = if a2dp.is_empty() { devices } else { a2dp };
    let device = candidates.each().next().unwrap_or(OutputDevices::SPEAKER);
    if !a2dp.is_single() {
        warn!(
            "device_for_volume() ambiguous device set {:?}, using {:?}",
            devices, device
        );
    }
    device
}

/// Volume-curve category of a device set
pub fn device_category(devices: OutputDevices) -> DeviceCategory {
    let device = device_for_volume(devices);
    if device == OutputDevices::EARPIECE {
        DeviceCategory::Earpiece
    } else if device.intersects(
        HEADSET_DEVICES
            | OutputDevices::BLUETOOTH_SCO
            | OutputDevices::BLUETOOTH_SCO_HEADSET,
    ) {
        DeviceCategory::Headset
    } else {
        DeviceCategory::Speaker
    }
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    pub fn stream_descriptor(&self, stream: StreamType) -> &StreamDescriptor {
        &self.streams[stream]
    }

    /// Set the UI index range of `stream`
    pub fn init_stream_volume(&mut self, stream: StreamType, index_min: i32, index_max: i32) -> Result<()> {
        if index_min < 0 || index_min >= index_max {
            warn!(
                "init_stream_volume() invalid range {}..{} for stream {}",
                index_min,
                index_max,
                stream.name()
            );
            return Err(Error::BadValue(format!(
                "invalid index range {}..{}",
                index_min, index_max
            )));
        }
        let desc = &mut self.streams[stream];
        desc.index_min = index_min;
        desc.index_max = index_max;
        debug!(
            "Stream {} index range {}..{}",
            stream.name(),
            index_min,
            index_max
        );
        Ok(())
    }

    /// Mark whether `stream` may be muted (and attenuated)
    pub fn set_stream_can_be_muted(&mut self, stream: StreamType, can_be_muted: bool) {
        self.streams[stream].can_be_muted = can_be_muted;
    }

    /// Set the UI index of `stream` and re-apply it on every output
    pub fn set_stream_volume_index(
        &mut self,
        stream: StreamType,
        index: i32,
        device: OutputDevices,
    ) -> Result<()> {
        let desc = self.streams[stream];
        if index < desc.index_min || index > desc.index_max {
            return Err(Error::BadValue(format!(
                "index {} outside {}..{} for stream {}",
                index,
                desc.index_min,
                desc.index_max,
                stream.name()
            )));
        }
        if !device.is_single() {
            return Err(Error::BadValue(format!("{:?} is not an output device", device)));
        }
        let index = if desc.can_be_muted { index } else { desc.index_max };
        info!(
            "set_stream_volume_index() stream {} index {} device {:?}",
            stream.name(),
            index,
            device
        );
        self.streams[stream].index_cur = index;

        let outputs: Vec<IoHandle> = self.outputs.keys().copied().collect();
        let mut result = Ok(());
        for output in outputs {
            if let Err(e) = self.set_volume(stream, output, 0) {
                result = Err(e);
            }
        }
        result
    }

    pub fn stream_volume_index(&self, stream: StreamType, _device: OutputDevices) -> i32 {
        self.streams[stream].index_cur
    }

    /// Amplitude of `index` on `device` for `stream`
    pub fn vol_index_to_ampl(&self, device: OutputDevices, stream: StreamType, index: i32) -> f32 {
        let desc = &self.streams[stream];
        let curve = VolumeCurve::for_stream(stream, device_category(device));
        curve.amplitude(index, desc.index_min, desc.index_max)
    }

    /// Amplitude to apply for `stream` at `index` on `output`
    ///
    /// `device` defaults to the output's current device when empty.
    pub fn compute_volume(
        &self,
        stream: StreamType,
        index: i32,
        output: IoHandle,
        device: OutputDevices,
    ) -> f32 {
        let device = if device.is_empty() {
            self.output_device(output)
        } else {
            device
        };
        let desc = &self.streams[stream];

        if stream == StreamType::Music
            && index != desc.index_min
            && DIGITAL_DEVICES.contains(&device)
        {
            return 1.0;
        }

        let mut volume = self.vol_index_to_ampl(device, stream, index);

        let strategy = stream.strategy();
        let attenuated = strategy.is_sonification()
            || stream == StreamType::System
            || (strategy == RoutingStrategy::EnforcedAudible
                && self.force_use[ForceUse::System.index()] == ForcedConfig::None);
        if attenuated && desc.can_be_muted && device.intersects(HEADSET_DEVICES) && volume > 0.0 {
            volume = (volume * SONIFICATION_HEADSET_VOLUME_FACTOR).max(SONIFICATION_HEADSET_VOLUME_MIN);
        }
        volume
    }

    pub(super) fn set_volume(&mut self, stream: StreamType, output: IoHandle, delay_ms: u32) -> Result<()> {
        self.set_volume_l(stream, output, false, delay_ms)
    }

    fn mute_volume(&mut self, stream: StreamType, output: IoHandle, delay_ms: u32) -> Result<()> {
        self.set_volume_l(stream, output, true, delay_ms)
    }

    fn set_volume_l(&mut self, stream: StreamType, output: IoHandle, mute: bool, delay_ms: u32) -> Result<()> {
        let Some(desc) = self.outputs.get(&output) else {
            return Err(Error::BadValue(format!("unknown output {}", output)));
        };
        if desc.is_duplicated() {
            self.set_duplicating_volume(stream, output, mute, delay_ms)
        } else {
            self.set_stream_volume(stream, output, mute, delay_ms)
        }
    }

    /// Push the volume of `stream` to a hardware output
    ///
    /// Nothing is sent while the stream is muted on the output, or when the
    /// amplitude did not change.
    pub fn set_stream_volume(
        &mut self,
        stream: StreamType,
        output: IoHandle,
        mute: bool,
        delay_ms: u32,
    ) -> Result<()> {
        let Some(desc) = self.outputs.get(&output) else {
            return Err(Error::BadValue(format!("unknown output {}", output)));
        };
        if desc.mute_count[stream] != 0 && !mute {
            debug!(
                "set_stream_volume() stream {} muted on output {}",
                stream.name(),
                output
            );
            return Ok(());
        }
        let current = desc.cur_volume[stream];
        let device = device_for_volume(self.output_device(output));
        let stream_desc = self.streams[stream];
        let index = if mute { 0 } else { stream_desc.index_cur };
        let volume = self.compute_volume(stream, index, output, device);

        if volume != current {
            if let Some(desc) = self.outputs.get_mut(&output) {
                desc.cur_volume[stream] = volume;
                if stream == StreamType::BluetoothSco {
                    desc.cur_volume[StreamType::VoiceCall] = volume;
                }
            }
            debug!(
                "set_stream_volume() stream {} volume {} output {} delay {}",
                stream.name(),
                volume,
                output,
                delay_ms
            );
            self.client.set_stream_volume(stream, volume, output, delay_ms);
            if stream == StreamType::BluetoothSco {
                self.client
                    .set_stream_volume(StreamType::VoiceCall, volume, output, delay_ms);
            }
        }

        if matches!(stream, StreamType::VoiceCall | StreamType::BluetoothSco) && output == self.primary_output {
            let voice = if stream_desc.index_max > 0 {
                index as f32 / stream_desc.index_max as f32
            } else {
                0.0
            };
            if self.last_voice_volume != Some(voice) {
                self.client.set_voice_volume(voice, delay_ms);
                self.last_voice_volume = Some(voice);
            }
        }
        Ok(())
    }

    /// Push the volume of `stream` to a duplicating output
    ///
    /// Each child gets the amplitude for its own device (zero while the
    /// stream is muted there); the duplicating layer itself stays at unity.
    /// Nothing is sent while the stream is muted on the duplicating output.
    pub fn set_duplicating_volume(
        &mut self,
        stream: StreamType,
        output: IoHandle,
        mute: bool,
        delay_ms: u32,
    ) -> Result<()> {
        let Some(desc) = self.outputs.get(&output) else {
            return Err(Error::BadValue(format!("unknown output {}", output)));
        };
        if !desc.is_duplicated() {
            return Err(Error::InvalidOperation(format!(
                "output {} is not a duplicating output",
                output
            )));
        }
        if desc.mute_count[stream] != 0 && !mute {
            debug!(
                "set_duplicating_volume() stream {} muted on output {}",
                stream.name(),
                output
            );
            return Ok(());
        }
        let index = if mute { 0 } else { self.streams[stream].index_cur };
        let children = desc.children().to_vec();

        for child in children {
            let child_muted = self
                .outputs
                .get(&child)
                .is_some_and(|child_desc| child_desc.mute_count[stream] != 0);
            let volume = if child_muted {
                0.0
            } else {
                let device = device_for_volume(self.output_device(child));
                self.compute_volume(stream, index, output, device)
            };
            debug!(
                "set_duplicating_volume() stream {} child {} volume {}",
                stream.name(),
                child,
                volume
            );
            self.client.set_duplicating_volume(output, child, volume);
        }
        for any in StreamType::ALL {
            self.client.set_stream_volume(any, 1.0, output, delay_ms);
        }
        Ok(())
    }

    /// Mute (`on`) or unmute `stream` on `output`
    ///
    /// Mutes nest: only the first mute silences the stream and only the
    /// matching last unmute restores it.
    ///
    /// # Errors
    /// [`Error::InvalidOperation`] when unmuting a stream that is not muted.
    pub fn set_stream_mute(&mut self, stream: StreamType, on: bool, output: IoHandle, delay_ms: u32) -> Result<()> {
        let Some(desc) = self.outputs.get(&output) else {
            return Err(Error::BadValue(format!("unknown output {}", output)));
        };
        let count = desc.mute_count[stream];

        if on {
            let can_be_muted = self.streams[stream].can_be_muted;
            let enforced = stream == StreamType::EnforcedAudible
                && self.force_use[ForceUse::System.index()] != ForcedConfig::None;
            if count == 0 && can_be_muted && !enforced {
                self.mute_volume(stream, output, delay_ms)?;
            }
            if let Some(desc) = self.outputs.get_mut(&output) {
                desc.mute_count[stream] += 1;
            }
        } else {
            if count == 0 {
                warn!(
                    "set_stream_mute() unmuting stream {} not muted on output {}",
                    stream.name(),
                    output
                );
                return Err(Error::InvalidOperation(format!(
                    "stream {} is not muted on output {}",
                    stream.name(),
                    output
                )));
            }
            if let Some(desc) = self.outputs.get_mut(&output) {
                desc.mute_count[stream] -= 1;
            }
            if count == 1 {
                self.set_volume(stream, output, delay_ms)?;
            }
        }
        Ok(())
    }
}
