//! Zone selection and the output lifecycle
//!
//! **Responsibilities:**
//! - Pick the zones (and devices) a new session plays in
//! - Hand out an output covering those devices, duplicating when needed
//! - Route and set volume when playback starts and stops
//! - Release outputs and sessions
//!
//! Zone selection runs through two rule tiers, strategy then stream, and
//! falls back to the cabin. A tier answers [`ZoneRule::NoRule`] to defer.

use super::outputs::needs_direct_output;
use super::sessions::SessionDescriptor;
use super::AudioPolicyManager;
use crate::client::AudioPolicyClient;
use mzap_common::{
    AudioFormat, ChannelMask, Error, IoHandle, OutputDevices, OutputFlags, Result,
    RoutingStrategy, SessionId, StreamType, Zones,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Port parameters requested with [`AudioPolicyManager::get_output`]
///
/// Zero and default values mean "don't care".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputRequest {
    pub sampling_rate: u32,
    pub format: AudioFormat,
    pub channel_mask: ChannelMask,
    pub flags: OutputFlags,
}

/// Answer of one zone-selection tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneRule {
    NoRule,
    /// Every device of these zones
    Zones(Zones),
    /// Devices of these zones narrowed for the stream
    Refined(Zones),
    /// The speaker alone, in whichever zone owns it
    Speaker,
}

fn strategy_rule(strategy: RoutingStrategy) -> ZoneRule {
    match strategy {
        RoutingStrategy::Media => ZoneRule::NoRule,
        RoutingStrategy::Sonification | RoutingStrategy::SonificationRespectful => {
            ZoneRule::Zones(Zones::CABIN)
        }
        RoutingStrategy::Dtmf => ZoneRule::Refined(Zones::CABIN),
        RoutingStrategy::Phone => ZoneRule::Speaker,
        RoutingStrategy::EnforcedAudible => ZoneRule::Zones(Zones::ALL),
    }
}

fn stream_rule(stream: StreamType) -> ZoneRule {
    match stream {
        StreamType::Music => ZoneRule::NoRule,
        StreamType::EnforcedAudible => ZoneRule::Zones(Zones::ALL),
        StreamType::VoiceCall | StreamType::BluetoothSco => ZoneRule::Refined(Zones::CABIN),
        StreamType::System
        | StreamType::Ring
        | StreamType::Alarm
        | StreamType::Notification
        | StreamType::Dtmf
        | StreamType::Tts => ZoneRule::Zones(Zones::CABIN),
    }
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    fn resolve_rule(&self, rule: ZoneRule, stream: StreamType) -> Option<(Zones, OutputDevices)> {
        match rule {
            ZoneRule::NoRule => None,
            ZoneRule::Zones(zones) => Some((zones, self.routing.devices(zones))),
            ZoneRule::Refined(zones) => Some((zones, self.refined_zone_devices(zones, stream))),
            ZoneRule::Speaker => {
                if !self.attached_output_devices.contains(OutputDevices::SPEAKER) {
                    return None;
                }
                self.routing
                    .find_zone(OutputDevices::SPEAKER)
                    .map(|zone| (zone, OutputDevices::SPEAKER))
            }
        }
    }

    /// Create `session` with the zones its first stream routes to
    ///
    /// An existing session keeps its zones.
    fn select_zones(&mut self, session: SessionId, stream: StreamType) {
        if self.sessions.contains_key(&session) {
            return;
        }
        let (zones, devices) = self
            .resolve_rule(strategy_rule(stream.strategy()), stream)
            .or_else(|| self.resolve_rule(stream_rule(stream), stream))
            .unwrap_or_else(|| (Zones::CABIN, self.routing.devices(Zones::CABIN)));
        debug!(
            "select_zones() session {} stream {} -> {:?} {:?}",
            session,
            stream.name(),
            zones,
            devices
        );
        self.sessions
            .insert(session, SessionDescriptor::new(session, zones, devices));
    }

    /// Drop a session nobody holds an output for
    fn clear_unused_session(&mut self, session: SessionId) {
        if self.sessions.get(&session).is_some_and(|desc| desc.users == 0) {
            self.clear_session(session);
        }
    }

    /// Output for a stream of `session`
    ///
    /// Covers every device of the session's zones: one output per needed
    /// port, merged into a duplicating output when more than one remains.
    ///
    /// # Errors
    /// [`Error::NoOutput`] when no port reaches the session's devices or the
    /// duplicating output cannot be opened.
    pub fn get_output(
        &mut self,
        stream: StreamType,
        request: OutputRequest,
        session: SessionId,
    ) -> Result<IoHandle> {
        info!(
            "get_output() stream {} session {} {:?}",
            stream.name(),
            session,
            request
        );
        self.select_zones(session, stream);

        let mut devices = self.session_devices(session);
        if devices.is_empty() {
            error!("get_output() session {} has no devices", session);
            return Err(Error::NoOutput(format!("session {} has no devices", session)));
        }

        let open_flags = if needs_direct_output(request.format, request.flags) {
            OutputFlags::DIRECT
        } else {
            request.flags
        };
        let OutputRequest {
            sampling_rate,
            format,
            channel_mask,
            ..
        } = request;

        let mut outputs = BTreeSet::new();
        while !devices.is_empty() {
            let Some(output) =
                self.open_output(devices, sampling_rate, format, channel_mask, open_flags)
            else {
                warn!("get_output() nothing opens for {:?}", devices);
                break;
            };
            outputs.insert(output);
            devices.remove(self.supported_devices(output));

            let Some(desc) = self.outputs.get(&output) else {
                continue;
            };
            if !desc.is_direct() && channel_mask.channel_count() > 2 && desc.channel_mask != channel_mask {
                let device = self.output_device(output);
                if let Some(direct) =
                    self.open_output(device, sampling_rate, format, channel_mask, OutputFlags::DIRECT)
                {
                    debug!("get_output() multichannel direct output {} on {:?}", direct, device);
                    outputs.insert(direct);
                }
            }
        }

        if outputs.is_empty() {
            error!("get_output() no output for session {}", session);
            self.clear_unused_session(session);
            return Err(Error::NoOutput(format!(
                "no output for stream {} in session {}",
                stream.name(),
                session
            )));
        }

        if outputs.len() > 1 {
            self.refine_outputs(&mut outputs);
        }
        let output = if outputs.len() > 1 {
            match self.open_duplicate_output(&outputs, sampling_rate, format, channel_mask) {
                Some(duplicating) => duplicating,
                None => {
                    for output in outputs {
                        self.close_output(output);
                    }
                    self.clear_unused_session(session);
                    return Err(Error::NoOutput(format!(
                        "cannot duplicate output for session {}",
                        session
                    )));
                }
            }
        } else {
            outputs
                .first()
                .copied()
                .ok_or_else(|| Error::NoOutput(format!("no output for session {}", session)))?
        };

        if let Some(desc) = self.sessions.get_mut(&session) {
            desc.output = Some(output);
            desc.users += 1;
        }
        self.init_session_volume(session);
        info!("get_output() session {} -> output {}", session, output);
        Ok(output)
    }

    /// A track of `stream` starts playing on `output`
    ///
    /// The first active track of the stream routes the output to the
    /// session's devices and applies the stream volume.
    pub fn start_output(&mut self, output: IoHandle, stream: StreamType, session: SessionId) -> Result<()> {
        if !self.outputs.contains_key(&output) {
            warn!("start_output() unknown output {}", output);
            return Err(Error::BadValue(format!("unknown output {}", output)));
        }
        debug!(
            "start_output() output {} stream {} session {}",
            output,
            stream.name(),
            session
        );

        self.change_ref_count(output, stream, 1);
        if self.phone_state.is_in_call() && self.reaches_primary(output) {
            self.handle_incall_sonification(stream, true, false);
        }

        let active = self
            .outputs
            .get(&output)
            .map(|desc| desc.ref_count[stream])
            .unwrap_or(0);
        if active == 1 {
            let mut devices = self.session_devices(session);
            if devices.is_empty() {
                warn!("start_output() session {} has no devices, using the cabin", session);
                self.set_session_zones(session, Zones::CABIN)?;
                devices = self.session_devices(session);
            }
            self.set_output_device(output, devices, false, 0);
            self.set_volume(stream, output, 0)?;
        }
        Ok(())
    }

    /// A track of `stream` stops on `output`
    pub fn stop_output(&mut self, output: IoHandle, stream: StreamType, session: SessionId) -> Result<()> {
        let Some(desc) = self.outputs.get(&output) else {
            warn!("stop_output() unknown output {}", output);
            return Err(Error::BadValue(format!("unknown output {}", output)));
        };
        if desc.ref_count[stream] == 0 {
            warn!(
                "stop_output() stream {} not active on output {}",
                stream.name(),
                output
            );
            return Err(Error::InvalidOperation(format!(
                "stream {} is not active on output {}",
                stream.name(),
                output
            )));
        }
        debug!(
            "stop_output() output {} stream {} session {}",
            output,
            stream.name(),
            session
        );

        if self.phone_state.is_in_call() && self.reaches_primary(output) {
            self.handle_incall_sonification(stream, false, false);
        }
        self.change_ref_count(output, stream, -1);

        let Some(desc) = self.outputs.get_mut(&output) else {
            return Ok(());
        };
        if desc.ref_count[stream] == 0 {
            desc.stop_time[stream] = Some(Instant::now());
            let devices = self.session_devices(session);
            let latency = self.output_latency(output);
            self.set_output_device(output, devices, false, latency * 2);
        }
        Ok(())
    }

    /// Give back an output obtained from [`Self::get_output`]
    ///
    /// The session is dropped with its last output.
    pub fn release_output(&mut self, output: IoHandle, session: SessionId) -> Result<()> {
        if !self.outputs.contains_key(&output) {
            warn!("release_output() unknown output {}", output);
            return Err(Error::BadValue(format!("unknown output {}", output)));
        }
        debug!("release_output() output {} session {}", output, session);

        match self.sessions.get_mut(&session) {
            Some(desc) => {
                desc.users = desc.users.saturating_sub(1);
                if desc.users == 0 {
                    self.clear_session(session);
                }
            }
            None => warn!("release_output() unknown session {}", session),
        }
        self.close_output(output);
        Ok(())
    }

    /// Devices `stream` routes to in the cabin
    pub fn devices_for_stream(&self, stream: StreamType) -> OutputDevices {
        self.refined_zone_devices(Zones::CABIN, stream)
    }

    pub fn strategy_for_stream(&self, stream: StreamType) -> RoutingStrategy {
        stream.strategy()
    }
}
