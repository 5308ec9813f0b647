//! Device and zone bitmasks
//!
//! Output devices, input devices and listening zones are all bitmasks:
//! a single bit names one physical sink/source (or one zone), and a
//! union names a set. Masks serialize as `"SPEAKER | WIRED_HEADPHONE"`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Physical output devices (sinks)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct OutputDevices: u32 {
        const EARPIECE = 0x1;
        const SPEAKER = 0x2;
        const WIRED_HEADSET = 0x4;
        const WIRED_HEADPHONE = 0x8;
        const BLUETOOTH_SCO = 0x10;
        const BLUETOOTH_SCO_HEADSET = 0x20;
        const BLUETOOTH_SCO_CARKIT = 0x40;
        const BLUETOOTH_A2DP = 0x80;
        const BLUETOOTH_A2DP_HEADPHONES = 0x100;
        const BLUETOOTH_A2DP_SPEAKER = 0x200;
        const AUX_DIGITAL = 0x400;
        const ANLG_DOCK_HEADSET = 0x800;
        const DGTL_DOCK_HEADSET = 0x1000;
        const USB_ACCESSORY = 0x2000;
        const USB_DEVICE = 0x4000;
        const REMOTE_SUBMIX = 0x8000;
        /// Second rear-seat headphone jack
        const WIRED_HEADPHONE2 = 0x10000;
    }
}

impl OutputDevices {
    pub const ALL_A2DP: Self = Self::BLUETOOTH_A2DP
        .union(Self::BLUETOOTH_A2DP_HEADPHONES)
        .union(Self::BLUETOOTH_A2DP_SPEAKER);

    pub const ALL_SCO: Self = Self::BLUETOOTH_SCO
        .union(Self::BLUETOOTH_SCO_HEADSET)
        .union(Self::BLUETOOTH_SCO_CARKIT);

    pub const ALL_USB: Self = Self::USB_ACCESSORY.union(Self::USB_DEVICE);

    /// Devices wired to a rear-seat headphone jack
    pub const HEADPHONE_JACKS: Self = Self::WIRED_HEADPHONE.union(Self::WIRED_HEADPHONE2);

    /// True when exactly one device bit is set
    pub fn is_single(self) -> bool {
        self.bits().count_ones() == 1
    }

    /// Iterate over the individual device bits, lowest first
    pub fn each(self) -> impl Iterator<Item = OutputDevices> {
        let bits = self.bits();
        (0..u32::BITS)
            .map(|shift| 1u32 << shift)
            .filter(move |bit| bits & bit != 0)
            .map(OutputDevices::from_bits_retain)
    }
}

bitflags! {
    /// Physical input devices (sources)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct InputDevices: u32 {
        const COMMUNICATION = 0x1;
        const AMBIENT = 0x2;
        const BUILTIN_MIC = 0x4;
        const BLUETOOTH_SCO_HEADSET = 0x8;
        const WIRED_HEADSET = 0x10;
        const AUX_DIGITAL = 0x20;
        const VOICE_CALL = 0x40;
        const BACK_MIC = 0x80;
        const REMOTE_SUBMIX = 0x100;
        const ANLG_DOCK_HEADSET = 0x200;
        const DGTL_DOCK_HEADSET = 0x400;
        const USB_ACCESSORY = 0x800;
        const USB_DEVICE = 0x1000;
    }
}

impl InputDevices {
    pub fn is_single(self) -> bool {
        self.bits().count_ones() == 1
    }
}

bitflags! {
    /// Listening zones
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Zones: u32 {
        const CABIN = 0x1;
        const BACKSEAT1 = 0x2;
        const BACKSEAT2 = 0x4;
    }
}

impl Zones {
    /// Every zone the vehicle has, in table order
    pub const SINGLE: [Zones; 3] = [Zones::CABIN, Zones::BACKSEAT1, Zones::BACKSEAT2];

    pub const ALL: Zones = Zones::CABIN.union(Zones::BACKSEAT1).union(Zones::BACKSEAT2);

    /// True when exactly one known zone is selected
    pub fn is_single(self) -> bool {
        self.bits().count_ones() == 1 && Zones::ALL.contains(self)
    }

    /// True when at least one zone is selected and no unknown bits are set
    pub fn is_valid(self) -> bool {
        !self.is_empty() && Zones::ALL.contains(self)
    }

    /// Iterate over the selected zones
    pub fn each(self) -> impl Iterator<Item = Zones> {
        Zones::SINGLE.into_iter().filter(move |zone| self.contains(*zone))
    }
}

/// A device named in a connection-state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Output(OutputDevices),
    Input(InputDevices),
}

/// Connection state reported for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Unavailable,
    Available,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_yields_single_bits_in_order() {
        let devices = OutputDevices::SPEAKER | OutputDevices::USB_DEVICE | OutputDevices::EARPIECE;
        let bits: Vec<_> = devices.each().collect();
        assert_eq!(
            bits,
            vec![OutputDevices::EARPIECE, OutputDevices::SPEAKER, OutputDevices::USB_DEVICE]
        );
    }

    #[test]
    fn test_zone_cardinality() {
        assert!(Zones::CABIN.is_single());
        assert!(!(Zones::CABIN | Zones::BACKSEAT2).is_single());
        assert!(!Zones::empty().is_single());
        assert!(!Zones::from_bits_retain(0x8).is_single());
        assert!(Zones::ALL.is_valid());
        assert!(!Zones::empty().is_valid());
    }

    #[test]
    fn test_zone_iteration_skips_unselected() {
        let zones: Vec<_> = (Zones::CABIN | Zones::BACKSEAT2).each().collect();
        assert_eq!(zones, vec![Zones::CABIN, Zones::BACKSEAT2]);
    }

    #[test]
    fn test_device_groups() {
        assert!(OutputDevices::ALL_A2DP.contains(OutputDevices::BLUETOOTH_A2DP_SPEAKER));
        assert!(!OutputDevices::ALL_SCO.intersects(OutputDevices::ALL_A2DP));
        assert!(OutputDevices::WIRED_HEADPHONE2.is_single());
    }
}
