//! Output port management
//!
//! **Responsibilities:**
//! - Describe hardware and duplicating outputs
//! - Find or open an output for a device set, reusing ports where possible
//! - Open duplicating outputs and tear them down with their children
//! - Route outputs to devices, muting across device-category changes
//!
//! A duplicating output refers to its children by handle; the children
//! stay in the output table and are only closed through it.

use super::volume::device_for_volume;
use super::AudioPolicyManager;
use crate::client::{AudioPolicyClient, OutputConfig};
use mzap_common::parameters::{
    KEY_A2DP_SINK_ADDRESS, KEY_CLOSING, KEY_ROUTING, KEY_SUP_CHANNELS, KEY_SUP_FORMATS,
    KEY_SUP_SAMPLING_RATES,
};
use mzap_common::{
    AudioFormat, AudioParameter, ChannelMask, IoHandle, OutputDevices, OutputFlags,
    OutputProfile, PerStream, StreamType,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Position of a profile in the module table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProfileId {
    pub module: usize,
    pub profile: usize,
}

/// What an output is backed by
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputKind {
    /// A port opened from a profile, routed to `device`
    Hardware {
        profile: ProfileId,
        device: OutputDevices,
    },
    /// A port mirroring its mix onto other outputs
    Duplicating { children: Vec<IoHandle> },
}

/// State of one open output
#[derive(Debug, Clone)]
pub struct OutputDescriptor {
    pub id: IoHandle,
    pub kind: OutputKind,
    pub sampling_rate: u32,
    pub format: AudioFormat,
    pub channel_mask: ChannelMask,
    pub latency_ms: u32,
    pub flags: OutputFlags,
    /// Clients holding the output open
    pub users: u32,
    /// Active tracks per stream
    pub ref_count: PerStream<u32>,
    /// Last volume pushed per stream; negative until the first push
    pub cur_volume: PerStream<f32>,
    pub mute_count: PerStream<u32>,
    pub stop_time: PerStream<Option<Instant>>,
}

impl OutputDescriptor {
    /// Descriptor for a port of `profile`, parameters seeded from its first entries
    fn hardware(id: IoHandle, profile_id: ProfileId, profile: &OutputProfile) -> Self {
        Self {
            id,
            kind: OutputKind::Hardware {
                profile: profile_id,
                device: OutputDevices::empty(),
            },
            sampling_rate: profile.sampling_rates.first().copied().unwrap_or(0),
            format: profile.formats.first().copied().unwrap_or_default(),
            channel_mask: profile.channel_masks.first().copied().unwrap_or_default(),
            latency_ms: 0,
            flags: profile.flags,
            users: 0,
            ref_count: PerStream::default(),
            cur_volume: PerStream::filled(-1.0),
            mute_count: PerStream::default(),
            stop_time: PerStream::filled(None),
        }
    }

    fn duplicating(
        id: IoHandle,
        children: Vec<IoHandle>,
        sampling_rate: u32,
        format: AudioFormat,
        channel_mask: ChannelMask,
    ) -> Self {
        Self {
            id,
            kind: OutputKind::Duplicating { children },
            sampling_rate,
            format,
            channel_mask,
            latency_ms: 0,
            flags: OutputFlags::empty(),
            users: 0,
            ref_count: PerStream::default(),
            cur_volume: PerStream::filled(-1.0),
            mute_count: PerStream::default(),
            stop_time: PerStream::filled(None),
        }
    }

    pub fn is_duplicated(&self) -> bool {
        matches!(self.kind, OutputKind::Duplicating { .. })
    }

    pub fn is_direct(&self) -> bool {
        self.flags.contains(OutputFlags::DIRECT)
    }

    /// Children of a duplicating output; empty otherwise
    pub fn children(&self) -> &[IoHandle] {
        match &self.kind {
            OutputKind::Duplicating { children } => children,
            OutputKind::Hardware { .. } => &[],
        }
    }

    pub fn profile(&self) -> Option<ProfileId> {
        match self.kind {
            OutputKind::Hardware { profile, .. } => Some(profile),
            OutputKind::Duplicating { .. } => None,
        }
    }

    /// Whether `stream` is playing, or stopped less than `in_past_ms` ago
    pub fn is_stream_active(&self, stream: StreamType, in_past_ms: u32, now: Instant) -> bool {
        if self.ref_count[stream] != 0 {
            return true;
        }
        if in_past_ms == 0 {
            return false;
        }
        self.stop_time[stream]
            .map(|stopped| now.duration_since(stopped).as_millis() < u128::from(in_past_ms))
            .unwrap_or(false)
    }
}

/// Whether a request can only be served by a direct output
pub(super) fn needs_direct_output(format: AudioFormat, flags: OutputFlags) -> bool {
    flags.contains(OutputFlags::DIRECT) || (format != AudioFormat::Default && !format.is_linear_pcm())
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    pub fn output_descriptor(&self, output: IoHandle) -> Option<&OutputDescriptor> {
        self.outputs.get(&output)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputDescriptor> {
        self.outputs.values()
    }

    /// Devices an output currently plays to
    ///
    /// A duplicating output plays to the union of its children's devices.
    pub fn output_device(&self, output: IoHandle) -> OutputDevices {
        match self.outputs.get(&output).map(|desc| &desc.kind) {
            Some(OutputKind::Hardware { device, .. }) => *device,
            Some(OutputKind::Duplicating { children }) => children
                .iter()
                .fold(OutputDevices::empty(), |acc, child| acc | self.output_device(*child)),
            None => OutputDevices::empty(),
        }
    }

    /// Devices an output could be routed to
    pub fn supported_devices(&self, output: IoHandle) -> OutputDevices {
        match self.outputs.get(&output).map(|desc| &desc.kind) {
            Some(OutputKind::Hardware { profile, .. }) => self.output_profile(*profile).devices,
            Some(OutputKind::Duplicating { children }) => children
                .iter()
                .fold(OutputDevices::empty(), |acc, child| acc | self.supported_devices(*child)),
            None => OutputDevices::empty(),
        }
    }

    /// Worst-case latency; a duplicating output is as slow as its slowest child
    pub(super) fn output_latency(&self, output: IoHandle) -> u32 {
        match self.outputs.get(&output) {
            Some(desc) if desc.is_duplicated() => desc
                .children()
                .iter()
                .map(|child| self.output_latency(*child))
                .max()
                .unwrap_or(0),
            Some(desc) => desc.latency_ms,
            None => 0,
        }
    }

    /// Adjust the active-track count of `stream`, forwarding to duplicated children
    pub(super) fn change_ref_count(&mut self, output: IoHandle, stream: StreamType, delta: i32) {
        let Some(desc) = self.outputs.get_mut(&output) else {
            return;
        };
        let count = desc.ref_count[stream];
        if delta < 0 && count < delta.unsigned_abs() {
            warn!(
                "change_ref_count() invalid delta {} for stream {} on output {}, count {}",
                delta,
                stream.name(),
                output,
                count
            );
            desc.ref_count[stream] = 0;
        } else {
            desc.ref_count[stream] = count.saturating_add_signed(delta);
        }
        let children = desc.children().to_vec();
        for child in children {
            self.change_ref_count(child, stream, delta);
        }
    }

    /// Outputs whose current device intersects `device`, first match
    pub(super) fn find_output(&self, device: OutputDevices) -> Option<IoHandle> {
        self.outputs
            .values()
            .filter(|desc| !desc.is_duplicated())
            .find(|desc| self.output_device(desc.id).intersects(device))
            .map(|desc| desc.id)
    }

    /// Profiles of loaded modules reaching any of `devices`
    fn profiles_for_devices(&self, devices: OutputDevices) -> Vec<ProfileId> {
        let mut ids = Vec::new();
        for (module, config) in self.modules.iter().enumerate() {
            if self.module_handle(module).is_none() {
                continue;
            }
            for (profile, candidate) in config.outputs.iter().enumerate() {
                if candidate.devices.intersects(devices) {
                    ids.push(ProfileId { module, profile });
                }
            }
        }
        ids
    }

    /// Find a reusable output for `devices` or open a new one
    ///
    /// A mixer output is reused whenever its profile reaches one of the
    /// devices. A direct output is reused only by a request with identical
    /// parameters and at most one user. The chosen output gains a user.
    pub(super) fn open_output(
        &mut self,
        devices: OutputDevices,
        sampling_rate: u32,
        format: AudioFormat,
        channel_mask: ChannelMask,
        flags: OutputFlags,
    ) -> Option<IoHandle> {
        if devices.is_empty() {
            error!("open_output() no devices");
            return None;
        }
        let want_direct = flags.contains(OutputFlags::DIRECT);

        let mut found = None;
        for desc in self.outputs.values() {
            if desc.is_duplicated() || desc.is_direct() != want_direct {
                continue;
            }
            if desc.is_direct() && desc.users > 1 {
                continue;
            }
            if !self.supported_devices(desc.id).intersects(devices) {
                continue;
            }
            if desc.is_direct() {
                if desc.sampling_rate == sampling_rate
                    && desc.format == format
                    && desc.channel_mask == channel_mask
                {
                    found = Some(desc.id);
                    break;
                }
            } else {
                found = Some(desc.id);
            }
        }

        if found.is_none() {
            let candidates = self.profiles_for_devices(devices);
            if candidates.is_empty() {
                error!("open_output() no profile reaches {:?}", devices);
                return None;
            }
            for id in candidates {
                found = self.open_output_l(id, devices, flags, sampling_rate, format, channel_mask);
                if found.is_some() {
                    break;
                }
            }
        }

        let output = found?;
        if let Some(desc) = self.outputs.get_mut(&output) {
            desc.users += 1;
        }
        debug!("open_output() {:?} -> output {}", devices, output);
        Some(output)
    }

    /// Open a port of one profile
    ///
    /// Direct requests override the profile's default parameters and must be
    /// honoured exactly; a direct profile with dynamic parameters is queried
    /// and reopened with the requested values when they turn out supported.
    pub(super) fn open_output_l(
        &mut self,
        profile_id: ProfileId,
        devices: OutputDevices,
        flags: OutputFlags,
        sampling_rate: u32,
        format: AudioFormat,
        channel_mask: ChannelMask,
    ) -> Option<IoHandle> {
        let module = self.module_handle(profile_id.module)?;
        let profile = self.output_profile(profile_id).clone();
        let mut desc = OutputDescriptor::hardware(IoHandle(0), profile_id, &profile);

        if flags.contains(OutputFlags::DIRECT) {
            if sampling_rate != 0 {
                desc.sampling_rate = sampling_rate;
            }
            if format != AudioFormat::Default {
                desc.format = format;
            }
            if !channel_mask.is_empty() {
                desc.channel_mask = channel_mask;
            }
        }
        if desc.sampling_rate == 0 {
            desc.sampling_rate = profile.max_sampling_rate();
        }
        if flags.contains(OutputFlags::DIRECT) != desc.is_direct() {
            debug!("Profile {} does not match direct flag {:?}", profile.name, flags);
            return None;
        }

        let devices = devices & profile.devices;
        if desc.is_direct()
            && !profile.has_dynamic_params()
            && !profile.is_compatible(devices, sampling_rate, format, channel_mask, flags)
        {
            debug!(
                "Profile {} cannot play {} Hz {} {:?}",
                profile.name, sampling_rate, format, channel_mask
            );
            return None;
        }
        let mut config = OutputConfig {
            devices,
            sampling_rate: desc.sampling_rate,
            format: desc.format,
            channel_mask: desc.channel_mask,
            latency_ms: 0,
        };
        let Some(mut output) = self.client.open_output(module, &mut config, desc.flags) else {
            warn!("Cannot open output on profile {} for {:?}", profile.name, devices);
            return None;
        };

        if desc.is_direct() {
            if profile.has_dynamic_params() {
                let dynamic = self.query_output_parameters(output, &profile);
                if dynamic.is_compatible(devices, sampling_rate, format, channel_mask, flags) {
                    self.client.close_output(output);
                    config = OutputConfig {
                        devices,
                        sampling_rate,
                        format,
                        channel_mask,
                        latency_ms: 0,
                    };
                    match self.client.open_output(module, &mut config, desc.flags) {
                        Some(reopened) => output = reopened,
                        None => {
                            error!("Cannot reopen direct output on profile {}", profile.name);
                            return None;
                        }
                    }
                }
            }
            let rate_mismatch = sampling_rate != 0 && sampling_rate != config.sampling_rate;
            let format_mismatch = format != AudioFormat::Default && format != config.format;
            let mask_mismatch = !channel_mask.is_empty() && channel_mask != config.channel_mask;
            if rate_mismatch || format_mismatch || mask_mismatch {
                debug!(
                    "Direct output {} opened with {} Hz {} {:?}, wanted {} Hz {} {:?}",
                    output,
                    config.sampling_rate,
                    config.format,
                    config.channel_mask,
                    sampling_rate,
                    format,
                    channel_mask
                );
                self.client.close_output(output);
                return None;
            }
        }

        desc.id = output;
        desc.kind = OutputKind::Hardware {
            profile: profile_id,
            device: config.devices,
        };
        desc.sampling_rate = config.sampling_rate;
        desc.format = config.format;
        desc.channel_mask = config.channel_mask;
        desc.latency_ms = config.latency_ms;
        self.outputs.insert(output, desc);
        info!(
            "Opened output {} on profile {} for {:?}",
            output, profile.name, config.devices
        );

        self.set_device_address(output, config.devices);
        Some(output)
    }

    /// Fill the empty capability lists of `profile` from the port itself
    fn query_output_parameters(&mut self, output: IoHandle, profile: &OutputProfile) -> OutputProfile {
        let mut dynamic = profile.clone();
        if dynamic.sampling_rates.is_empty() {
            let reply = self.query_parameter(output, KEY_SUP_SAMPLING_RATES);
            dynamic.sampling_rates = reply
                .alternatives(KEY_SUP_SAMPLING_RATES)
                .into_iter()
                .filter_map(|rate| rate.parse().ok())
                .collect();
        }
        if dynamic.formats.is_empty() {
            let reply = self.query_parameter(output, KEY_SUP_FORMATS);
            dynamic.formats = reply
                .alternatives(KEY_SUP_FORMATS)
                .into_iter()
                .filter_map(|format| format.parse().ok())
                .collect();
        }
        if dynamic.channel_masks.is_empty() {
            let reply = self.query_parameter(output, KEY_SUP_CHANNELS);
            dynamic.channel_masks = reply
                .alternatives(KEY_SUP_CHANNELS)
                .into_iter()
                .filter_map(ChannelMask::from_layout_name)
                .collect();
        }
        debug!(
            "Output {} reports {:?} Hz, {:?}, {:?}",
            output, dynamic.sampling_rates, dynamic.formats, dynamic.channel_masks
        );
        dynamic
    }

    fn query_parameter(&mut self, io: IoHandle, key: &str) -> AudioParameter {
        self.client.get_parameters(io, key).parse().unwrap_or_default()
    }

    /// Tell a freshly opened port which remote device it talks to
    fn set_device_address(&mut self, output: IoHandle, devices: OutputDevices) {
        if self.has_a2dp && devices.intersects(OutputDevices::ALL_A2DP) && !self.a2dp_address.is_empty() {
            let param = AudioParameter::new().with(KEY_A2DP_SINK_ADDRESS, &self.a2dp_address);
            self.client.set_parameters(output, &param.to_string(), 0);
        }
        if self.has_usb && devices.intersects(OutputDevices::ALL_USB) {
            let address: AudioParameter = self.usb_address.parse().unwrap_or_default();
            if let (Some(card), Some(device)) = (address.get_int("card"), address.get_int("device")) {
                let param = AudioParameter::new().with("card", card).with("device", device);
                self.client.set_parameters(output, &param.to_string(), 0);
            }
        }
    }

    /// Reduce a multi-output selection before duplicating
    ///
    /// Mixer outputs win over direct ones unless every candidate is direct
    /// or direct output is preferred; at most one direct output survives.
    /// Discarded outputs lose the user `open_output` gave them.
    pub(super) fn refine_outputs(&mut self, outputs: &mut BTreeSet<IoHandle>) {
        let direct: Vec<IoHandle> = outputs
            .iter()
            .copied()
            .filter(|o| self.outputs.get(o).is_some_and(|desc| desc.is_direct()))
            .collect();
        let Some(&first_direct) = direct.first() else {
            return;
        };

        let use_direct = self.use_direct_output || direct.len() == outputs.len();
        let discarded: Vec<IoHandle> = if use_direct {
            let discarded = outputs.iter().copied().filter(|o| *o != first_direct).collect();
            *outputs = BTreeSet::from([first_direct]);
            discarded
        } else {
            for o in &direct {
                outputs.remove(o);
            }
            direct
        };

        if !discarded.is_empty() {
            debug!("refine_outputs() discarding {:?}, keeping {:?}", discarded, outputs);
        }
        for output in discarded {
            self.close_output(output);
        }
    }

    /// Open a duplicating output over `outputs`
    pub(super) fn open_duplicate_output(
        &mut self,
        outputs: &BTreeSet<IoHandle>,
        sampling_rate: u32,
        format: AudioFormat,
        channel_mask: ChannelMask,
    ) -> Option<IoHandle> {
        let children: Vec<IoHandle> = outputs.iter().copied().collect();
        let Some(duplicating) = self.client.open_duplicate_output(&children) else {
            error!("Cannot open duplicating output over {:?}", children);
            return None;
        };
        let mut desc =
            OutputDescriptor::duplicating(duplicating, children, sampling_rate, format, channel_mask);
        desc.users = 1;
        info!(
            "Opened duplicating output {} over {:?}",
            duplicating,
            desc.children()
        );
        self.outputs.insert(duplicating, desc);
        Some(duplicating)
    }

    /// Drop one user of `output`, closing the port with its last user
    ///
    /// Releasing the last user of a duplicating output closes it and then
    /// releases each child once.
    pub(super) fn close_output(&mut self, output: IoHandle) {
        let Some(desc) = self.outputs.get_mut(&output) else {
            error!("close_output() unknown output {}", output);
            return;
        };
        if desc.users == 0 {
            warn!("close_output() output {} has no users", output);
            return;
        }
        desc.users -= 1;
        if desc.users > 0 {
            debug!("Output {} still has {} users", output, desc.users);
            return;
        }

        let children = desc.children().to_vec();
        let param = AudioParameter::new().with(KEY_CLOSING, "true");
        self.client.set_parameters(output, &param.to_string(), 0);
        self.client.close_output(output);
        self.outputs.remove(&output);
        info!("Closed output {}", output);

        for child in children {
            self.close_output(child);
        }
        self.drop_dangling_children(output);
    }

    /// A duplicating output must never outlive one of its children
    fn drop_dangling_children(&mut self, closed: IoHandle) {
        for desc in self.outputs.values_mut() {
            if let OutputKind::Duplicating { children } = &mut desc.kind {
                if children.contains(&closed) {
                    error!(
                        "Duplicating output {} still references closed output {}",
                        desc.id, closed
                    );
                    children.retain(|child| *child != closed);
                }
            }
        }
    }

    /// Route `output` to `device`
    ///
    /// A duplicating output re-applies each child's own device. Devices the
    /// output cannot reach are ignored; re-routing to the current device is
    /// a no-op unless `force` is set. When the volume category changes the
    /// output is muted, re-routed and unmuted after twice `delay_ms`.
    pub fn set_output_device(
        &mut self,
        output: IoHandle,
        device: OutputDevices,
        force: bool,
        delay_ms: u32,
    ) {
        let (profile, previous) = match self.outputs.get(&output).map(|desc| &desc.kind) {
            None => {
                warn!("set_output_device() unknown output {}", output);
                return;
            }
            Some(OutputKind::Duplicating { children }) => {
                let children = children.clone();
                for child in children {
                    let child_device = self.output_device(child);
                    self.set_output_device(child, child_device, force, delay_ms);
                }
                return;
            }
            Some(OutputKind::Hardware { profile, device }) => (*profile, *device),
        };

        let supported = self.output_profile(profile).devices;
        if !device.is_empty() && !device.intersects(supported) {
            debug!(
                "set_output_device() output {} cannot reach {:?}",
                output, device
            );
            return;
        }
        let device = device & supported;
        if (device.is_empty() || device == previous) && !force {
            debug!(
                "set_output_device() output {} already on {:?}",
                output, previous
            );
            return;
        }

        if let Some(desc) = self.outputs.get_mut(&output) {
            desc.kind = OutputKind::Hardware { profile, device };
        }
        if device_for_volume(previous) != device_for_volume(device) {
            self.mute_output(output, true, 0);
            self.mute_output(output, false, delay_ms * 2);
        }

        info!(
            "Routing output {} from {:?} to {:?} (delay {} ms)",
            output, previous, device, delay_ms
        );
        let param = AudioParameter::new().with(KEY_ROUTING, device.bits());
        self.client.set_parameters(output, &param.to_string(), delay_ms);
    }

    /// Mute or unmute every stream on a hardware output
    pub(super) fn mute_output(&mut self, output: IoHandle, mute: bool, delay_ms: u32) {
        let Some(desc) = self.outputs.get(&output) else {
            return;
        };
        if desc.is_duplicated() {
            warn!("mute_output() not applied to duplicating output {}", output);
            return;
        }
        if self.output_device(output).is_empty() {
            return;
        }
        let delay_ms = if mute { 0 } else { delay_ms };
        for stream in StreamType::ALL {
            if let Err(e) = self.set_stream_mute(stream, mute, output, delay_ms) {
                debug!("mute_output() stream {}: {}", stream.name(), e);
            }
        }
    }

    /// Whether `stream` plays on any output, or stopped within `in_past_ms`
    pub fn is_stream_active(&self, stream: StreamType, in_past_ms: u32) -> bool {
        let now = Instant::now();
        self.outputs
            .values()
            .any(|desc| desc.is_stream_active(stream, in_past_ms, now))
    }

    /// Like [`Self::is_stream_active`], restricted to remote-submix outputs
    pub fn is_stream_active_remotely(&self, stream: StreamType, in_past_ms: u32) -> bool {
        let now = Instant::now();
        self.outputs.values().any(|desc| {
            self.output_device(desc.id).intersects(OutputDevices::REMOTE_SUBMIX)
                && desc.is_stream_active(stream, in_past_ms, now)
        })
    }

    /// Whether `output` is the primary output or duplicates onto it
    pub(super) fn reaches_primary(&self, output: IoHandle) -> bool {
        output == self.primary_output
            || self
                .outputs
                .get(&output)
                .is_some_and(|desc| desc.children().contains(&self.primary_output))
    }
}
