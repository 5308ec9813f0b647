//! Session zone assignment and per-session volume
//!
//! A session is created the first time it asks for an output (or is
//! explicitly given zones) and lives until its last output is released.

use super::zones::zone_slot;
use super::AudioPolicyManager;
use crate::client::AudioPolicyClient;
use mzap_common::{Error, IoHandle, OutputDevices, Result, SessionId, StreamType, Zones};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Routing state of one playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDescriptor {
    pub id: SessionId,
    /// Output the session plays on, once one has been handed out
    pub output: Option<IoHandle>,
    pub zones: Zones,
    /// Devices the session's tracks are routed to
    pub devices: OutputDevices,
    /// Outstanding outputs handed to the session
    pub users: u32,
    /// Session gain per zone, in zone table order
    volume: [f32; 3],
}

impl SessionDescriptor {
    pub fn new(id: SessionId, zones: Zones, devices: OutputDevices) -> Self {
        Self {
            id,
            output: None,
            zones,
            devices,
            users: 0,
            volume: [1.0; 3],
        }
    }

    /// Session gain in a single zone
    pub fn volume(&self, zone: Zones) -> Option<f32> {
        zone_slot(zone).map(|slot| self.volume[slot])
    }

    fn set_volume(&mut self, zone: Zones, volume: f32) {
        if let Some(slot) = zone_slot(zone) {
            self.volume[slot] = volume;
        }
    }
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    pub fn session(&self, session: SessionId) -> Option<&SessionDescriptor> {
        self.sessions.get(&session)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionDescriptor> {
        self.sessions.values()
    }

    /// Assign `session` to `zones`, creating it if needed
    ///
    /// An existing session's tracks move to the new device set.
    pub fn set_session_zones(&mut self, session: SessionId, zones: Zones) -> Result<()> {
        if !zones.is_valid() {
            return Err(Error::BadValue(format!("invalid zones {:?}", zones)));
        }
        let devices = self.routing.devices(zones);
        info!(
            "set_session_zones() session {} zones {:?} devices {:?}",
            session, zones, devices
        );

        match self.sessions.get_mut(&session) {
            None => {
                self.sessions
                    .insert(session, SessionDescriptor::new(session, zones, devices));
            }
            Some(desc) => {
                let previous = desc.devices;
                desc.zones = zones;
                desc.devices = devices;
                let output = desc.output;
                self.move_tracks(output, previous, devices);
            }
        }
        Ok(())
    }

    /// Zones of `session`; empty for an unknown session
    pub fn session_zones(&self, session: SessionId) -> Zones {
        self.sessions
            .get(&session)
            .map(|desc| desc.zones)
            .unwrap_or_default()
    }

    pub(super) fn session_devices(&self, session: SessionId) -> OutputDevices {
        self.sessions
            .get(&session)
            .map(|desc| desc.devices)
            .unwrap_or_default()
    }

    pub(super) fn clear_session(&mut self, session: SessionId) {
        if self.sessions.remove(&session).is_some() {
            debug!("Cleared session {}", session);
        }
    }

    /// Set the gain of `session` in each of `zones`
    pub fn set_session_volume(&mut self, session: SessionId, zones: Zones, volume: f32) -> Result<()> {
        if !self.sessions.contains_key(&session) {
            return Err(Error::BadValue(format!("unknown session {}", session)));
        }
        if !zones.is_valid() {
            return Err(Error::BadValue(format!("invalid zones {:?}", zones)));
        }
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::BadValue(format!("session volume {} out of range", volume)));
        }
        info!(
            "set_session_volume() session {} zones {:?} volume {}",
            session, zones, volume
        );

        for zone in zones.each() {
            if let Some(desc) = self.sessions.get_mut(&session) {
                desc.set_volume(zone, volume);
            }
            self.set_session_volume_l(session, zone, volume);
        }
        Ok(())
    }

    /// Stored gain of `session` in one zone
    pub fn session_volume(&self, session: SessionId, zone: Zones) -> Result<f32> {
        let desc = self
            .sessions
            .get(&session)
            .ok_or_else(|| Error::BadValue(format!("unknown session {}", session)))?;
        desc.volume(zone).ok_or(Error::InvalidZoneCount { zones: zone })
    }

    /// Push the effective gain of `session` in `zone` to the HAL
    ///
    /// The pushed value is the session gain scaled by the zone volume. Nothing
    /// happens until the session has an output and plays in `zone`.
    pub(super) fn set_session_volume_l(&mut self, session: SessionId, zone: Zones, volume: f32) {
        let Some(desc) = self.sessions.get(&session) else {
            return;
        };
        let Some(output) = desc.output else {
            return;
        };
        if !desc.zones.intersects(zone) {
            return;
        }
        let zone_volume = self.routing.volume(zone).unwrap_or(1.0);
        let effective = volume * zone_volume;
        for target in self.find_outputs_in_zone(output, zone) {
            debug!(
                "Session {} volume {} on output {} (zone {:?})",
                session, effective, target, zone
            );
            self.client.set_zone_volume(target, session, effective);
        }
    }

    /// Apply the stored per-zone gains once a session has an output
    pub(super) fn init_session_volume(&mut self, session: SessionId) {
        if session == SessionId::QUERY {
            return;
        }
        let Some(desc) = self.sessions.get(&session) else {
            return;
        };
        let gains: Vec<_> = desc
            .zones
            .each()
            .filter_map(|zone| desc.volume(zone).map(|v| (zone, v)))
            .collect();
        for (zone, volume) in gains {
            self.set_session_volume_l(session, zone, volume);
        }
    }

    /// Ports of `output` that reach `zone`
    ///
    /// A duplicating output contributes those children whose device is in
    /// the zone; any other output stands for itself.
    pub(super) fn find_outputs_in_zone(&self, output: IoHandle, zone: Zones) -> Vec<IoHandle> {
        let Some(desc) = self.outputs.get(&output) else {
            return Vec::new();
        };
        if !desc.is_duplicated() {
            return vec![output];
        }
        let devices = self.routing.devices(zone);
        desc.children()
            .iter()
            .copied()
            .filter(|child| self.output_device(*child).intersects(devices))
            .collect()
    }

    /// Re-attach every stream's tracks on `output` after a device change
    pub(super) fn move_tracks(
        &mut self,
        output: Option<IoHandle>,
        previous: OutputDevices,
        devices: OutputDevices,
    ) {
        let Some(output) = output else {
            return;
        };
        if previous == devices {
            return;
        }
        if !self.outputs.contains_key(&output) {
            warn!("move_tracks() unknown output {}", output);
            return;
        }
        debug!(
            "Moving tracks on output {} from {:?} to {:?}",
            output, previous, devices
        );
        for stream in StreamType::ALL {
            self.client.set_stream_output(stream, output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults_to_unity_gain() {
        let desc = SessionDescriptor::new(SessionId(7), Zones::CABIN, OutputDevices::SPEAKER);
        assert_eq!(desc.output, None);
        assert_eq!(desc.users, 0);
        for zone in Zones::SINGLE {
            assert_eq!(desc.volume(zone), Some(1.0));
        }
        assert_eq!(desc.volume(Zones::ALL), None);
    }

    #[test]
    fn test_set_volume_targets_one_zone() {
        let mut desc = SessionDescriptor::new(SessionId(7), Zones::ALL, OutputDevices::SPEAKER);
        desc.set_volume(Zones::BACKSEAT2, 0.25);
        assert_eq!(desc.volume(Zones::BACKSEAT2), Some(0.25));
        assert_eq!(desc.volume(Zones::CABIN), Some(1.0));
    }
}
