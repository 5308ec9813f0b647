//! Zone routing table
//!
//! **Responsibilities:**
//! - Track which output devices each zone owns (a device belongs to at most one zone)
//! - Enforce zone affinity and keep attached devices in their zone
//! - Hold the per-zone volume
//! - Drop a disconnected device from its zone and from the sessions using it

use super::AudioPolicyManager;
use crate::client::AudioPolicyClient;
use mzap_common::{Error, OutputDevices, PolicyConfig, Result, StreamType, Zones};
use serde::Serialize;
use tracing::{debug, info, warn};

/// One row of the zone table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneEntry {
    pub zone: Zones,
    /// Devices currently assigned
    pub devices: OutputDevices,
    /// Devices the zone may ever be assigned
    pub affinity: OutputDevices,
    pub volume: f32,
}

/// Device ownership of every zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingState {
    entries: [ZoneEntry; 3],
}

/// Affinity used when the configuration has no entry for a zone
fn default_affinity(zone: Zones) -> OutputDevices {
    if zone == Zones::BACKSEAT1 {
        OutputDevices::WIRED_HEADPHONE
    } else if zone == Zones::BACKSEAT2 {
        OutputDevices::WIRED_HEADPHONE2
    } else {
        OutputDevices::SPEAKER
    }
}

/// Table slot of a single zone
pub(crate) fn zone_slot(zone: Zones) -> Option<usize> {
    Zones::SINGLE.iter().position(|z| *z == zone)
}

impl RoutingState {
    /// Empty table with affinities taken from `config`
    pub fn new(config: &PolicyConfig) -> Self {
        let entries = Zones::SINGLE.map(|zone| {
            let mut affinity = config.affinity(zone);
            if affinity.is_empty() {
                affinity = default_affinity(zone);
                warn!(
                    "No affinity configured for zone {:?}, using {:?}",
                    zone, affinity
                );
            }
            ZoneEntry {
                zone,
                devices: OutputDevices::empty(),
                affinity,
                volume: 1.0,
            }
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[ZoneEntry] {
        &self.entries
    }

    fn entry(&self, zone: Zones) -> Option<&ZoneEntry> {
        zone_slot(zone).map(|slot| &self.entries[slot])
    }

    fn entry_mut(&mut self, zone: Zones) -> Option<&mut ZoneEntry> {
        zone_slot(zone).map(|slot| &mut self.entries[slot])
    }

    /// Union of the devices assigned to `zones`
    pub fn devices(&self, zones: Zones) -> OutputDevices {
        self.entries
            .iter()
            .filter(|entry| zones.contains(entry.zone))
            .fold(OutputDevices::empty(), |acc, entry| acc | entry.devices)
    }

    pub fn affinity(&self, zone: Zones) -> Option<OutputDevices> {
        self.entry(zone).map(|entry| entry.affinity)
    }

    pub fn volume(&self, zone: Zones) -> Option<f32> {
        self.entry(zone).map(|entry| entry.volume)
    }

    fn set_volume(&mut self, zone: Zones, volume: f32) {
        if let Some(entry) = self.entry_mut(zone) {
            entry.volume = volume;
        }
    }

    /// Zone owning `device`
    ///
    /// Only answers for a single device bit.
    pub fn find_zone(&self, device: OutputDevices) -> Option<Zones> {
        if !device.is_single() {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.devices.intersects(device))
            .map(|entry| entry.zone)
    }

    /// First zone other than `zone` owning part of `devices`
    fn owner_of(&self, devices: OutputDevices, zone: Zones) -> Option<(Zones, OutputDevices)> {
        self.entries
            .iter()
            .filter(|entry| entry.zone != zone)
            .find(|entry| entry.devices.intersects(devices))
            .map(|entry| (entry.zone, entry.devices & devices))
    }

    /// Replace the devices of `zone`
    ///
    /// Enforces single-zone, non-empty and exclusive ownership. Affinity
    /// and attached-device rules are checked by the caller.
    pub fn assign(&mut self, zone: Zones, devices: OutputDevices) -> Result<()> {
        if !zone.is_single() {
            return Err(Error::InvalidZoneCount { zones: zone });
        }
        if devices.is_empty() {
            return Err(Error::NoDevices { zone });
        }
        if let Some((owner, common)) = self.owner_of(devices, zone) {
            return Err(Error::DeviceAlreadyOwned {
                devices: common,
                owner,
            });
        }
        if let Some(entry) = self.entry_mut(zone) {
            entry.devices = devices;
        }
        Ok(())
    }

    /// Drop `device` from `zone`, possibly leaving it empty
    fn remove_device(&mut self, zone: Zones, device: OutputDevices) {
        if let Some(entry) = self.entry_mut(zone) {
            entry.devices.remove(device);
        }
    }
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    /// Initial assignment: the cabin gets the default device, every zone
    /// gets the attached devices it has affinity for
    pub(super) fn seed_zones(&mut self) {
        for zone in Zones::SINGLE {
            let affinity = self.routing.affinity(zone).unwrap_or_default();
            let mut devices = affinity & self.attached_output_devices;
            if zone == Zones::CABIN {
                devices |= self.default_output_device;
            }
            if devices.is_empty() {
                continue;
            }
            if let Err(e) = self.routing.assign(zone, devices) {
                warn!("Cannot seed zone {:?} with {:?}: {}", zone, devices, e);
            }
        }
    }

    /// Reassign the devices of one zone
    ///
    /// Sessions playing in `zone` follow the new device set.
    ///
    /// # Errors
    /// Checked in this order:
    /// - [`Error::InvalidZoneCount`] unless `zone` names exactly one zone
    /// - [`Error::NoDevices`] for an empty device set
    /// - [`Error::DeviceAlreadyOwned`] if another zone holds one of `devices`
    /// - [`Error::DeviceAttached`] if an attached device would leave the zone
    /// - [`Error::DeviceNotSupported`] for devices outside the zone's affinity
    pub fn set_zone_devices(&mut self, zone: Zones, devices: OutputDevices) -> Result<()> {
        info!("set_zone_devices() zone {:?} devices {:?}", zone, devices);

        if !zone.is_single() {
            return Err(Error::InvalidZoneCount { zones: zone });
        }
        if devices.is_empty() {
            return Err(Error::NoDevices { zone });
        }
        if let Some((owner, common)) = self.routing.owner_of(devices, zone) {
            warn!("Devices {:?} already belong to zone {:?}", common, owner);
            return Err(Error::DeviceAlreadyOwned {
                devices: common,
                owner,
            });
        }
        let removed = self.routing.devices(zone) - devices;
        let attached = removed & self.attached_output_devices;
        if !attached.is_empty() {
            warn!("Attached devices {:?} cannot leave zone {:?}", attached, zone);
            return Err(Error::DeviceAttached {
                devices: attached,
                zone,
            });
        }
        let affinity = self.routing.affinity(zone).unwrap_or_default();
        let unsupported = devices - affinity;
        if !unsupported.is_empty() {
            warn!("Zone {:?} does not support {:?}", zone, unsupported);
            return Err(Error::DeviceNotSupported {
                devices: unsupported,
                zone,
            });
        }

        self.routing.assign(zone, devices)?;

        let affected: Vec<_> = self
            .sessions
            .values()
            .filter(|session| session.zones.intersects(zone))
            .map(|session| (session.id, session.zones))
            .collect();
        for (session, zones) in affected {
            self.set_session_zones(session, zones)?;
        }
        Ok(())
    }

    /// Devices assigned to `zones` (union over every selected zone)
    pub fn zone_devices(&self, zones: Zones) -> OutputDevices {
        self.routing.devices(zones)
    }

    /// Devices `zone` may be assigned
    pub fn zone_supported_devices(&self, zone: Zones) -> Result<OutputDevices> {
        self.routing
            .affinity(zone)
            .ok_or(Error::InvalidZoneCount { zones: zone })
    }

    /// Devices of `zones` narrowed for `stream`
    ///
    /// Voice, SCO and DTMF streams collapse onto the speaker when it is
    /// in the set.
    pub fn refined_zone_devices(&self, zones: Zones, stream: StreamType) -> OutputDevices {
        let devices = self.routing.devices(zones);
        let collapses = matches!(
            stream,
            StreamType::VoiceCall | StreamType::BluetoothSco | StreamType::Dtmf
        );
        if collapses && devices.contains(OutputDevices::SPEAKER) {
            OutputDevices::SPEAKER
        } else {
            devices
        }
    }

    /// Zone owning a single device bit
    pub fn find_zone(&self, device: OutputDevices) -> Option<Zones> {
        self.routing.find_zone(device)
    }

    /// Set the volume of one zone and re-apply it to the sessions playing there
    pub fn set_zone_volume(&mut self, zone: Zones, volume: f32) -> Result<()> {
        if !zone.is_single() {
            return Err(Error::InvalidZoneCount { zones: zone });
        }
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::BadValue(format!("zone volume {} out of range", volume)));
        }
        info!("set_zone_volume() zone {:?} volume {}", zone, volume);
        self.routing.set_volume(zone, volume);

        let affected: Vec<_> = self
            .sessions
            .values()
            .filter(|session| session.zones.intersects(zone))
            .filter_map(|session| session.volume(zone).map(|v| (session.id, v)))
            .collect();
        for (session, session_volume) in affected {
            self.set_session_volume_l(session, zone, session_volume);
        }
        Ok(())
    }

    pub fn zone_volume(&self, zone: Zones) -> Result<f32> {
        self.routing
            .volume(zone)
            .ok_or(Error::InvalidZoneCount { zones: zone })
    }

    /// Remove a device that went away from its zone and its sessions
    pub(super) fn disconnect_device(&mut self, device: OutputDevices) -> Result<()> {
        let Some(zone) = self.routing.find_zone(device) else {
            return Err(Error::InvalidOperation(format!(
                "device {:?} is not assigned to any zone",
                device
            )));
        };
        if self.attached_output_devices.intersects(device) {
            return Err(Error::DeviceAttached {
                devices: device,
                zone,
            });
        }
        self.routing.remove_device(zone, device);
        debug!("Removed {:?} from zone {:?}", device, zone);

        let affected: Vec<_> = self
            .sessions
            .values_mut()
            .filter(|session| session.devices.intersects(device))
            .map(|session| {
                let previous = session.devices;
                session.devices.remove(device);
                (session.output, previous, session.devices)
            })
            .collect();
        for (output, previous, devices) in affected {
            self.move_tracks(output, previous, devices);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutingState {
        RoutingState::new(&PolicyConfig::default())
    }

    #[test]
    fn test_assign_rejects_devices_owned_elsewhere() {
        let mut routing = table();
        routing.assign(Zones::CABIN, OutputDevices::SPEAKER).unwrap();

        let err = routing
            .assign(Zones::BACKSEAT1, OutputDevices::SPEAKER | OutputDevices::WIRED_HEADPHONE)
            .unwrap_err();
        match err {
            Error::DeviceAlreadyOwned { devices, owner } => {
                assert_eq!(devices, OutputDevices::SPEAKER);
                assert_eq!(owner, Zones::CABIN);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(routing.devices(Zones::BACKSEAT1).is_empty());
    }

    #[test]
    fn test_assign_validates_zone_and_devices() {
        let mut routing = table();
        assert!(matches!(
            routing.assign(Zones::ALL, OutputDevices::SPEAKER),
            Err(Error::InvalidZoneCount { .. })
        ));
        assert!(matches!(
            routing.assign(Zones::CABIN, OutputDevices::empty()),
            Err(Error::NoDevices { .. })
        ));
    }

    #[test]
    fn test_find_zone_requires_single_device() {
        let mut routing = table();
        routing
            .assign(Zones::BACKSEAT2, OutputDevices::WIRED_HEADPHONE2)
            .unwrap();
        assert_eq!(
            routing.find_zone(OutputDevices::WIRED_HEADPHONE2),
            Some(Zones::BACKSEAT2)
        );
        assert_eq!(
            routing.find_zone(OutputDevices::WIRED_HEADPHONE2 | OutputDevices::SPEAKER),
            None
        );
        assert_eq!(routing.find_zone(OutputDevices::SPEAKER), None);
    }

    #[test]
    fn test_missing_affinity_falls_back() {
        let config = PolicyConfig {
            zone_affinity: Vec::new(),
            ..PolicyConfig::default()
        };
        let routing = RoutingState::new(&config);
        assert_eq!(routing.affinity(Zones::CABIN), Some(OutputDevices::SPEAKER));
        assert_eq!(
            routing.affinity(Zones::BACKSEAT2),
            Some(OutputDevices::WIRED_HEADPHONE2)
        );
        assert_eq!(routing.volume(Zones::BACKSEAT1), Some(1.0));
    }

    #[test]
    fn test_devices_unions_selected_zones() {
        let mut routing = table();
        routing.assign(Zones::CABIN, OutputDevices::SPEAKER).unwrap();
        routing
            .assign(Zones::BACKSEAT1, OutputDevices::WIRED_HEADPHONE)
            .unwrap();
        assert_eq!(
            routing.devices(Zones::CABIN | Zones::BACKSEAT1),
            OutputDevices::SPEAKER | OutputDevices::WIRED_HEADPHONE
        );
        assert_eq!(routing.devices(Zones::BACKSEAT2), OutputDevices::empty());
    }
}
