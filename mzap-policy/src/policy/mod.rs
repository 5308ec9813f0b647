//! Multi-zone audio policy manager
//!
//! [`AudioPolicyManager`] owns the zone routing table, every open output
//! and input port, per-session zone assignments and all stream volume
//! state. Hardware is reached only through an [`AudioPolicyClient`].
//!
//! **Module Structure:**
//! - `zones.rs`: zone/device ownership, zone volumes, device disconnection
//! - `sessions.rs`: session zone assignment and per-session volumes
//! - `outputs.rs`: output descriptors, open/close/duplicate, device routing
//! - `routing.rs`: zone selection and the output lifecycle (get/start/stop/release)
//! - `volume.rs`: stream volume indexes, curves, mute reference counts
//! - `phone.rs`: telephony state, forced usages, A2DP suspension
//! - `connection.rs`: device connection state
//! - `inputs.rs`: capture ports
//! - `effects.rs`: effect registration and budgets
//! - `dump.rs`: text dump and serializable snapshot
//!
//! All entry points take `&mut self`; wrap the manager in
//! [`crate::state::SharedPolicy`] to share it between threads.

mod connection;
mod dump;
mod effects;
mod inputs;
mod outputs;
mod phone;
mod routing;
mod sessions;
mod volume;
mod zones;

pub use dump::{OutputSnapshot, PolicySnapshot};
pub use effects::{EffectDescriptor, EffectInfo};
pub use inputs::{InputDescriptor, InputRequest};
pub use outputs::{OutputDescriptor, OutputKind, ProfileId};
pub use routing::OutputRequest;
pub use sessions::SessionDescriptor;
pub use volume::{device_category, device_for_volume, StreamDescriptor};
pub use zones::{RoutingState, ZoneEntry};

use crate::client::AudioPolicyClient;
use mzap_common::{
    Error, ForceUse, ForcedConfig, HwModuleConfig, InputDevices, InputProfile, IoHandle,
    ModuleHandle, OutputDevices, OutputFlags, OutputProfile, PerStream, PhoneState, PolicyConfig,
    Result, SessionId,
};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Linear attenuation applied to sonification played on headsets
pub const SONIFICATION_HEADSET_VOLUME_FACTOR: f32 = 0.5;
/// Lowest audible amplitude for attenuated sonification
pub const SONIFICATION_HEADSET_VOLUME_MIN: f32 = 0.016;
/// Device addresses must be strictly shorter than this
pub const MAX_DEVICE_ADDRESS_LEN: usize = 20;
/// Total CPU load (MIPS) enabled effects may use
pub const MAX_EFFECTS_CPU_LOAD: u32 = 1000;
/// Total memory (KB) registered effects may use
pub const MAX_EFFECTS_MEMORY: u32 = 512;

/// Multi-zone audio policy engine
pub struct AudioPolicyManager<C: AudioPolicyClient> {
    client: C,
    /// Hardware modules as configured, with their profiles
    modules: Vec<HwModuleConfig>,
    /// Handle per entry of `modules`; `None` when loading failed
    module_handles: Vec<Option<ModuleHandle>>,
    use_direct_output: bool,

    routing: RoutingState,
    sessions: BTreeMap<SessionId, SessionDescriptor>,
    outputs: BTreeMap<IoHandle, OutputDescriptor>,
    inputs: BTreeMap<IoHandle, InputDescriptor>,
    streams: PerStream<StreamDescriptor>,
    effects: BTreeMap<i32, EffectDescriptor>,

    /// Valid once construction succeeds
    primary_output: IoHandle,

    attached_output_devices: OutputDevices,
    default_output_device: OutputDevices,
    available_output_devices: OutputDevices,
    available_input_devices: InputDevices,

    has_a2dp: bool,
    has_usb: bool,
    has_remote_submix: bool,

    phone_state: PhoneState,
    force_use: [ForcedConfig; ForceUse::COUNT],

    a2dp_address: String,
    sco_address: String,
    usb_address: String,
    a2dp_suspended: bool,

    /// Last value pushed through `set_voice_volume`
    last_voice_volume: Option<f32>,

    total_effects_cpu_load: u32,
    total_effects_memory: u32,
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    /// Build the policy from `config`
    ///
    /// Seeds the zone table, loads every hardware module and opens one
    /// output per mixer profile that reaches an attached device.
    ///
    /// # Errors
    /// - [`Error::Config`] if the configuration is inconsistent
    /// - [`Error::NoInit`] if no primary output could be opened
    pub fn new(client: C, config: PolicyConfig) -> Result<Self> {
        config.validate()?;

        let routing = RoutingState::new(&config);
        let has_a2dp = config.supports_output(OutputDevices::ALL_A2DP);
        let has_usb = config.supports_output(OutputDevices::ALL_USB);
        let has_remote_submix = config.supports_output(OutputDevices::REMOTE_SUBMIX);

        let mut manager = Self {
            client,
            modules: config.modules,
            module_handles: Vec::new(),
            use_direct_output: config.use_direct_output,
            routing,
            sessions: BTreeMap::new(),
            outputs: BTreeMap::new(),
            inputs: BTreeMap::new(),
            streams: PerStream::default(),
            effects: BTreeMap::new(),
            primary_output: IoHandle(0),
            attached_output_devices: config.attached_output_devices,
            default_output_device: config.default_output_device,
            available_output_devices: OutputDevices::empty(),
            available_input_devices: config.attached_input_devices,
            has_a2dp,
            has_usb,
            has_remote_submix,
            phone_state: PhoneState::Normal,
            force_use: [ForcedConfig::None; ForceUse::COUNT],
            a2dp_address: String::new(),
            sco_address: String::new(),
            usb_address: String::new(),
            a2dp_suspended: false,
            last_voice_volume: None,
            total_effects_cpu_load: 0,
            total_effects_memory: 0,
        };

        manager.seed_zones();
        let primary = manager.open_attached_outputs();

        let missing = manager.attached_output_devices - manager.available_output_devices;
        if !missing.is_empty() {
            error!("Attached devices {:?} are not reachable from any output", missing);
        }

        match primary {
            Some(primary) => {
                manager.primary_output = primary;
                info!(
                    "Audio policy ready: primary output {}, zones {:?}",
                    primary,
                    manager.routing.entries()
                );
                Ok(manager)
            }
            None => Err(Error::NoInit("failed to open primary output".to_string())),
        }
    }

    /// Load every module and open the mixer outputs serving attached devices
    ///
    /// Returns the first output opened from a PRIMARY profile.
    fn open_attached_outputs(&mut self) -> Option<IoHandle> {
        let mut primary = None;

        for module_index in 0..self.modules.len() {
            let handle = self.client.load_hw_module(&self.modules[module_index].name);
            self.module_handles.push(handle);
            if handle.is_none() {
                warn!("Could not load HW module {}", self.modules[module_index].name);
                continue;
            }

            for profile_index in 0..self.modules[module_index].outputs.len() {
                let profile = &self.modules[module_index].outputs[profile_index];
                let devices = profile.devices & self.attached_output_devices;
                if devices.is_empty() || profile.flags.contains(OutputFlags::DIRECT) {
                    continue;
                }
                let flags = profile.flags;
                let id = ProfileId {
                    module: module_index,
                    profile: profile_index,
                };
                let Some(output) = self.open_output_l(id, devices, flags, 0, Default::default(), Default::default()) else {
                    warn!("Cannot open output for attached devices {:?}", devices);
                    continue;
                };
                if let Some(desc) = self.outputs.get_mut(&output) {
                    desc.users += 1;
                }
                self.available_output_devices |= devices;
                if primary.is_none() && flags.contains(OutputFlags::PRIMARY) {
                    primary = Some(output);
                }
                self.set_output_device(output, devices, true, 0);
            }
        }

        primary
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn primary_output(&self) -> IoHandle {
        self.primary_output
    }

    pub fn available_output_devices(&self) -> OutputDevices {
        self.available_output_devices
    }

    pub fn available_input_devices(&self) -> InputDevices {
        self.available_input_devices
    }

    pub fn attached_output_devices(&self) -> OutputDevices {
        self.attached_output_devices
    }

    pub fn routing_state(&self) -> &RoutingState {
        &self.routing
    }

    fn output_profile(&self, id: ProfileId) -> &OutputProfile {
        &self.modules[id.module].outputs[id.profile]
    }

    fn input_profile(&self, id: ProfileId) -> &InputProfile {
        &self.modules[id.module].inputs[id.profile]
    }

    fn module_handle(&self, module: usize) -> Option<ModuleHandle> {
        self.module_handles.get(module).copied().flatten()
    }
}

impl<C: AudioPolicyClient> Drop for AudioPolicyManager<C> {
    fn drop(&mut self) {
        for output in self.outputs.keys() {
            self.client.close_output(*output);
        }
        for input in self.inputs.keys() {
            self.client.close_input(*input);
        }
        self.outputs.clear();
        self.inputs.clear();
    }
}
