//! Telephony state, forced usages and A2DP suspension

use super::AudioPolicyManager;
use crate::client::AudioPolicyClient;
use mzap_common::parameters::KEY_CALL_ROUTING;
use mzap_common::{
    AudioParameter, Error, ForceUse, ForcedConfig, IoHandle, OutputDevices, PhoneState, Result,
    StreamType, ToneType, Zones,
};
use tracing::{debug, info, warn};

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    pub fn phone_state(&self) -> PhoneState {
        self.phone_state
    }

    /// Move to a new telephony state
    ///
    /// Sonification playing on the primary output is unmuted when a call
    /// ends and muted (or replaced by a call-waiting tone) when one begins.
    /// The call is always routed to the cabin speaker when the cabin has one.
    pub fn set_phone_state(&mut self, state: PhoneState) {
        if state == self.phone_state {
            warn!("set_phone_state() already in state {:?}", state);
            return;
        }
        info!("set_phone_state() {:?} -> {:?}", self.phone_state, state);

        if self.phone_state.is_in_call() {
            for stream in StreamType::ALL {
                self.handle_incall_sonification(stream, false, true);
            }
        }
        self.phone_state = state;

        let call_device = self.refined_zone_devices(Zones::CABIN, StreamType::VoiceCall);
        let param = AudioParameter::new().with(KEY_CALL_ROUTING, call_device.bits());
        let primary = self.primary_output;
        self.client.set_parameters(primary, &param.to_string(), 0);

        self.check_a2dp_suspend();

        if state.is_in_call() {
            for stream in StreamType::ALL {
                self.handle_incall_sonification(stream, true, true);
            }
        }
    }

    /// Force a routing configuration for one usage
    ///
    /// # Errors
    /// [`Error::BadValue`] if `config` is meaningless for `usage`.
    pub fn set_force_use(&mut self, usage: ForceUse, config: ForcedConfig) -> Result<()> {
        if !usage.accepts(config) {
            warn!("set_force_use() invalid config {:?} for usage {:?}", config, usage);
            return Err(Error::BadValue(format!(
                "{:?} is not a valid config for {:?}",
                config, usage
            )));
        }
        info!("set_force_use() {:?} = {:?}", usage, config);
        self.force_use[usage.index()] = config;

        self.check_a2dp_suspend();

        if usage == ForceUse::System {
            let outputs: Vec<IoHandle> = self.outputs.keys().copied().collect();
            for output in outputs {
                if let Err(e) = self.set_volume(StreamType::EnforcedAudible, output, 0) {
                    debug!("set_force_use() volume on output {}: {}", output, e);
                }
            }
        }
        Ok(())
    }

    pub fn force_use(&self, usage: ForceUse) -> ForcedConfig {
        self.force_use[usage.index()]
    }

    /// Silence or restore sonification on the primary output around a call
    ///
    /// `state_change` applies the change once per active track (phone state
    /// transitions); otherwise once (a track starting or stopping mid-call).
    pub(super) fn handle_incall_sonification(&mut self, stream: StreamType, starting: bool, state_change: bool) {
        if !stream.strategy().is_sonification() {
            return;
        }
        let primary = self.primary_output;
        let Some(desc) = self.outputs.get(&primary) else {
            return;
        };
        let active = desc.ref_count[stream];
        if active == 0 {
            return;
        }
        let repeat = if state_change { active } else { 1 };
        debug!(
            "handle_incall_sonification() stream {} starting {} repeat {}",
            stream.name(),
            starting,
            repeat
        );

        if stream.is_low_visibility() {
            self.repeat_mute(stream, starting, primary, repeat);
            return;
        }

        let call_device = self.refined_zone_devices(Zones::CABIN, StreamType::VoiceCall);
        if self.output_device(primary).intersects(call_device) {
            self.repeat_mute(stream, starting, primary, repeat);
        }
        if starting {
            self.client.start_tone(ToneType::CallWaiting, StreamType::VoiceCall);
        } else {
            self.client.stop_tone();
        }
    }

    fn repeat_mute(&mut self, stream: StreamType, on: bool, output: IoHandle, repeat: u32) {
        for _ in 0..repeat {
            if let Err(e) = self.set_stream_mute(stream, on, output, 0) {
                debug!("handle_incall_sonification() stream {}: {}", stream.name(), e);
                break;
            }
        }
    }

    /// First hardware output currently routed to an A2DP device
    fn a2dp_output(&self) -> Option<IoHandle> {
        self.outputs
            .values()
            .filter(|desc| !desc.is_duplicated())
            .find(|desc| self.output_device(desc.id).intersects(OutputDevices::ALL_A2DP))
            .map(|desc| desc.id)
    }

    pub fn is_a2dp_suspended(&self) -> bool {
        self.a2dp_suspended
    }

    /// Suspend A2DP while SCO is forced or a call rings or is up; restore otherwise
    pub(super) fn check_a2dp_suspend(&mut self) {
        if !self.has_a2dp {
            return;
        }
        let Some(output) = self.a2dp_output() else {
            return;
        };

        let sco_forced = !self.sco_address.is_empty()
            && (self.force_use[ForceUse::Communication.index()] == ForcedConfig::BtSco
                || self.force_use[ForceUse::Record.index()] == ForcedConfig::BtSco);
        let calling = matches!(self.phone_state, PhoneState::InCall | PhoneState::Ringtone);
        let suspend = sco_forced || calling;

        if suspend && !self.a2dp_suspended {
            info!("Suspending A2DP output {}", output);
            self.client.suspend_output(output);
            self.a2dp_suspended = true;
        } else if !suspend && self.a2dp_suspended {
            info!("Restoring A2DP output {}", output);
            self.client.restore_output(output);
            self.a2dp_suspended = false;
        }
    }
}
