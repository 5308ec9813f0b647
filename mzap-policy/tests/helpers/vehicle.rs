//! Vehicle inventory fixture

use mzap_common::{IoHandle, OutputDevices, PolicyConfig, SessionId, StreamType};
use mzap_policy::{AudioPolicyManager, OutputRequest, SimulatedHal};

/// Speaker and both headphone jacks are attached; USB, A2DP and HDMI
/// come and go. The cabin may take anything but the headphone jacks.
pub const VEHICLE_TOML: &str = r#"
attached_output_devices = "SPEAKER | WIRED_HEADPHONE | WIRED_HEADPHONE2"
default_output_device = "SPEAKER"
attached_input_devices = "BUILTIN_MIC | BACK_MIC"

[[modules]]
name = "primary"

[[modules.outputs]]
name = "primary"
devices = "SPEAKER | WIRED_HEADSET"
flags = "PRIMARY"
sampling_rates = [48000]
formats = ["PCM_16_BIT"]
channel_masks = ["FRONT_LEFT | FRONT_RIGHT"]

[[modules.outputs]]
name = "headphone1"
devices = "WIRED_HEADPHONE"
sampling_rates = [48000]
formats = ["PCM_16_BIT"]
channel_masks = ["FRONT_LEFT | FRONT_RIGHT"]

[[modules.outputs]]
name = "headphone2"
devices = "WIRED_HEADPHONE2"
sampling_rates = [48000]
formats = ["PCM_16_BIT"]
channel_masks = ["FRONT_LEFT | FRONT_RIGHT"]

[[modules.outputs]]
name = "multichannel"
devices = "SPEAKER"
flags = "DIRECT"
sampling_rates = [48000]
formats = ["PCM_16_BIT"]
channel_masks = ["FRONT_LEFT | FRONT_RIGHT | FRONT_CENTER | LOW_FREQUENCY | BACK_LEFT | BACK_RIGHT"]

[[modules.outputs]]
name = "hdmi"
devices = "AUX_DIGITAL"
flags = "DIRECT"

[[modules.inputs]]
name = "mic"
devices = "BUILTIN_MIC | BACK_MIC | WIRED_HEADSET"
sampling_rates = [8000, 16000, 48000]
formats = ["PCM_16_BIT"]
channel_masks = ["FRONT", "LEFT | RIGHT"]

[[modules.inputs]]
name = "voice"
devices = "VOICE_CALL"
sampling_rates = [8000]
formats = ["PCM_16_BIT"]
channel_masks = ["VOICE_UPLINK", "VOICE_DNLINK", "VOICE_UPLINK | VOICE_DNLINK"]

[[modules]]
name = "usb"

[[modules.outputs]]
name = "usb_device"
devices = "USB_DEVICE"
sampling_rates = [44100, 48000]
formats = ["PCM_16_BIT"]
channel_masks = ["FRONT_LEFT | FRONT_RIGHT"]

[[modules]]
name = "a2dp"

[[modules.outputs]]
name = "a2dp"
devices = "BLUETOOTH_A2DP | BLUETOOTH_A2DP_HEADPHONES | BLUETOOTH_A2DP_SPEAKER"
sampling_rates = [44100]
formats = ["PCM_16_BIT"]
channel_masks = ["FRONT_LEFT | FRONT_RIGHT"]

[[zone_affinity]]
zone = "CABIN"
devices = "SPEAKER | WIRED_HEADSET | USB_DEVICE | AUX_DIGITAL | BLUETOOTH_A2DP | BLUETOOTH_A2DP_HEADPHONES | BLUETOOTH_A2DP_SPEAKER"

[[zone_affinity]]
zone = "BACKSEAT1"
devices = "WIRED_HEADPHONE"

[[zone_affinity]]
zone = "BACKSEAT2"
devices = "WIRED_HEADPHONE2"
"#;

/// Builds a manager over [`SimulatedHal`] from [`VEHICLE_TOML`]
pub struct VehicleBuilder {
    config: PolicyConfig,
    hal: SimulatedHal,
}

impl VehicleBuilder {
    pub fn new() -> Self {
        Self {
            config: PolicyConfig::from_toml_str(VEHICLE_TOML).expect("vehicle fixture parses"),
            hal: SimulatedHal::new(),
        }
    }

    pub fn use_direct_output(mut self, enabled: bool) -> Self {
        self.config.use_direct_output = enabled;
        self
    }

    pub fn hal(mut self, hal: SimulatedHal) -> Self {
        self.hal = hal;
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn build(self) -> AudioPolicyManager<SimulatedHal> {
        AudioPolicyManager::new(self.hal, self.config).expect("vehicle policy starts")
    }
}

/// Get an output for `stream` in `session` and start one track on it
pub fn playing_output(
    manager: &mut AudioPolicyManager<SimulatedHal>,
    stream: StreamType,
    session: SessionId,
) -> IoHandle {
    let output = manager
        .get_output(stream, OutputRequest::default(), session)
        .expect("output for stream");
    manager
        .start_output(output, stream, session)
        .expect("stream starts");
    output
}

/// Hardware output currently routed to exactly `device`
pub fn output_on(manager: &AudioPolicyManager<SimulatedHal>, device: OutputDevices) -> Option<IoHandle> {
    manager
        .outputs()
        .filter(|desc| !desc.is_duplicated())
        .find(|desc| manager.output_device(desc.id) == device)
        .map(|desc| desc.id)
}
