//! Capture ports
//!
//! Inputs are not zoned: the capture device follows the source alone.
//! Only one input records at a time, except for remote-submix inputs,
//! which are virtual and never block others.

use super::outputs::ProfileId;
use super::AudioPolicyManager;
use crate::client::{AudioPolicyClient, InputConfig};
use mzap_common::parameters::{KEY_INPUT_SOURCE, KEY_ROUTING};
use mzap_common::{
    AudioFormat, AudioParameter, Error, ForceUse, ForcedConfig, InputChannelMask, InputDevices,
    InputSource, IoHandle, Result, SessionId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Port parameters requested with [`AudioPolicyManager::get_input`]
///
/// Zero and default values accept whatever the port opens with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputRequest {
    pub sampling_rate: u32,
    pub format: AudioFormat,
    pub channel_mask: InputChannelMask,
}

/// State of one open input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDescriptor {
    pub id: IoHandle,
    pub profile: ProfileId,
    pub source: InputSource,
    pub device: InputDevices,
    pub session: SessionId,
    pub sampling_rate: u32,
    pub format: AudioFormat,
    pub channel_mask: InputChannelMask,
    /// 1 while recording
    pub users: u32,
}

fn is_virtual_input_device(device: InputDevices) -> bool {
    device == InputDevices::REMOTE_SUBMIX
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    pub fn input_descriptor(&self, input: IoHandle) -> Option<&InputDescriptor> {
        self.inputs.get(&input)
    }

    /// Capture device for `source` among the connected inputs
    pub fn device_for_input_source(&self, source: InputSource) -> InputDevices {
        let available = self.available_input_devices;
        let first = |candidates: &[InputDevices]| {
            candidates
                .iter()
                .copied()
                .find(|device| available.contains(*device))
                .unwrap_or_default()
        };

        match source {
            InputSource::VoiceUplink if available.contains(InputDevices::VOICE_CALL) => {
                InputDevices::VOICE_CALL
            }
            InputSource::VoiceUplink
            | InputSource::Default
            | InputSource::Mic
            | InputSource::VoiceRecognition
            | InputSource::VoiceCommunication => {
                if self.force_use[ForceUse::Record.index()] == ForcedConfig::BtSco
                    && available.contains(InputDevices::BLUETOOTH_SCO_HEADSET)
                {
                    InputDevices::BLUETOOTH_SCO_HEADSET
                } else {
                    first(&[InputDevices::WIRED_HEADSET, InputDevices::BUILTIN_MIC])
                }
            }
            InputSource::Camcorder => first(&[InputDevices::BACK_MIC, InputDevices::BUILTIN_MIC]),
            InputSource::VoiceDownlink | InputSource::VoiceCall => first(&[InputDevices::VOICE_CALL]),
            InputSource::RemoteSubmix => first(&[InputDevices::REMOTE_SUBMIX]),
            InputSource::AuxiliaryInput => first(&[InputDevices::ANLG_DOCK_HEADSET]),
        }
    }

    /// Input currently recording, ignoring virtual inputs
    pub(super) fn active_input(&self) -> Option<IoHandle> {
        self.inputs
            .values()
            .find(|desc| desc.users > 0 && !is_virtual_input_device(desc.device))
            .map(|desc| desc.id)
    }

    fn input_profile_for(
        &self,
        device: InputDevices,
        request: &InputRequest,
    ) -> Option<ProfileId> {
        self.modules.iter().enumerate().find_map(|(module, config)| {
            config
                .inputs
                .iter()
                .position(|profile| {
                    profile.is_compatible(
                        device,
                        request.sampling_rate,
                        request.format,
                        request.channel_mask,
                    )
                })
                .map(|profile| ProfileId { module, profile })
        })
    }

    /// Open an input for `source`
    ///
    /// Voice sources force their channel layout. The port must open with
    /// exactly the requested parameters.
    pub fn get_input(
        &mut self,
        source: InputSource,
        request: InputRequest,
        session: SessionId,
    ) -> Result<IoHandle> {
        info!(
            "get_input() source {:?} session {} {:?}",
            source, session, request
        );
        let device = self.device_for_input_source(source);
        if device.is_empty() {
            warn!("get_input() no device for source {:?}", source);
            return Err(Error::NoOutput(format!("no input device for source {:?}", source)));
        }

        let mut request = request;
        request.channel_mask = match source {
            InputSource::VoiceUplink => InputChannelMask::VOICE_UPLINK,
            InputSource::VoiceDownlink => InputChannelMask::VOICE_DNLINK,
            InputSource::VoiceCall => InputChannelMask::VOICE_UPLINK | InputChannelMask::VOICE_DNLINK,
            _ => request.channel_mask,
        };

        let Some(profile_id) = self.input_profile_for(device, &request) else {
            error!("get_input() no profile for {:?} {:?}", device, request);
            return Err(Error::NoOutput(format!("no input profile for {:?}", device)));
        };
        let Some(module) = self.module_handle(profile_id.module) else {
            error!(
                "get_input() module {} not loaded",
                self.modules[profile_id.module].name
            );
            return Err(Error::NoOutput(format!(
                "module {} not loaded",
                self.modules[profile_id.module].name
            )));
        };

        let mut config = InputConfig {
            device,
            sampling_rate: request.sampling_rate,
            format: request.format,
            channel_mask: request.channel_mask,
        };
        let Some(input) = self.client.open_input(module, &mut config) else {
            error!("get_input() HAL refused input for {:?}", device);
            return Err(Error::NoOutput(format!("cannot open input for {:?}", device)));
        };

        let rate_mismatch = request.sampling_rate != 0 && request.sampling_rate != config.sampling_rate;
        let format_mismatch = request.format != AudioFormat::Default && request.format != config.format;
        let mask_mismatch = !request.channel_mask.is_empty() && request.channel_mask != config.channel_mask;
        if rate_mismatch || format_mismatch || mask_mismatch {
            debug!(
                "get_input() input {} opened with {} Hz {} {:?}",
                input, config.sampling_rate, config.format, config.channel_mask
            );
            self.client.close_input(input);
            return Err(Error::NoOutput(format!(
                "input for {:?} does not support {:?}",
                device, request
            )));
        }

        let name = &self.input_profile(profile_id).name;
        info!("Opened input {} on profile {} for {:?}", input, name, config.device);
        self.inputs.insert(
            input,
            InputDescriptor {
                id: input,
                profile: profile_id,
                source,
                device: config.device,
                session,
                sampling_rate: config.sampling_rate,
                format: config.format,
                channel_mask: config.channel_mask,
                users: 0,
            },
        );
        Ok(input)
    }

    /// Start recording on `input`
    pub fn start_input(&mut self, input: IoHandle) -> Result<()> {
        let Some(desc) = self.inputs.get(&input) else {
            warn!("start_input() unknown input {}", input);
            return Err(Error::BadValue(format!("unknown input {}", input)));
        };
        let source = desc.source;
        let virtual_input = is_virtual_input_device(desc.device);
        if !virtual_input {
            if let Some(active) = self.active_input() {
                warn!("start_input() input {} refused, {} already active", input, active);
                return Err(Error::InvalidOperation(format!(
                    "input {} already active",
                    active
                )));
            }
        }

        let new_device = self.device_for_input_source(source);
        let Some(desc) = self.inputs.get_mut(&input) else {
            return Err(Error::BadValue(format!("unknown input {}", input)));
        };
        if !new_device.is_empty() {
            desc.device = new_device;
        }
        desc.users = 1;
        let param = AudioParameter::new()
            .with(KEY_ROUTING, desc.device.bits())
            .with(KEY_INPUT_SOURCE, source.code());
        info!("start_input() input {} device {:?}", input, desc.device);
        self.client.set_parameters(input, &param.to_string(), 0);
        Ok(())
    }

    pub fn stop_input(&mut self, input: IoHandle) -> Result<()> {
        let Some(desc) = self.inputs.get_mut(&input) else {
            warn!("stop_input() unknown input {}", input);
            return Err(Error::BadValue(format!("unknown input {}", input)));
        };
        if desc.users == 0 {
            warn!("stop_input() input {} already stopped", input);
            return Err(Error::InvalidOperation(format!("input {} not started", input)));
        }
        desc.users = 0;
        info!("stop_input() input {}", input);
        let param = AudioParameter::new().with(KEY_ROUTING, 0);
        self.client.set_parameters(input, &param.to_string(), 0);
        Ok(())
    }

    pub fn release_input(&mut self, input: IoHandle) -> Result<()> {
        if self.inputs.remove(&input).is_none() {
            warn!("release_input() unknown input {}", input);
            return Err(Error::BadValue(format!("unknown input {}", input)));
        }
        self.client.close_input(input);
        info!("Released input {}", input);
        Ok(())
    }

    /// Whether a started input records from `source`
    pub fn is_source_active(&self, source: InputSource) -> bool {
        self.inputs
            .values()
            .any(|desc| desc.source == source && desc.users > 0)
    }
}
