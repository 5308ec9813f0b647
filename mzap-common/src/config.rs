//! Hardware inventory and policy configuration
//!
//! The inventory lists hardware modules with their output/input profiles,
//! the devices permanently attached to the platform, and the devices each
//! zone may ever be assigned. It is read from TOML:
//!
//! ```toml
//! attached_output_devices = "SPEAKER | WIRED_HEADPHONE"
//! default_output_device = "SPEAKER"
//! attached_input_devices = "BUILTIN_MIC"
//!
//! [[modules]]
//! name = "primary"
//!
//! [[modules.outputs]]
//! name = "primary"
//! devices = "SPEAKER | WIRED_HEADPHONE"
//! flags = "PRIMARY"
//! sampling_rates = [44100]
//! formats = ["PCM_16_BIT"]
//! channel_masks = ["FRONT_LEFT | FRONT_RIGHT"]
//!
//! [[zone_affinity]]
//! zone = "CABIN"
//! devices = "SPEAKER"
//! ```
//!
//! An empty `sampling_rates`, `formats` or `channel_masks` list marks that
//! parameter as dynamic: it is queried from the port once opened.

use crate::devices::{InputDevices, OutputDevices, Zones};
use crate::format::{AudioFormat, ChannelMask, InputChannelMask, OutputFlags};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "MZAP_POLICY_CONFIG";

const CONFIG_FILE_NAME: &str = "audio_policy.toml";

/// Complete policy configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Output devices that are always present and can never leave their zone
    pub attached_output_devices: OutputDevices,
    /// Output device the cabin always holds
    pub default_output_device: OutputDevices,
    pub attached_input_devices: InputDevices,
    /// Keep one direct output instead of the mixer outputs when duplicating
    pub use_direct_output: bool,
    pub modules: Vec<HwModuleConfig>,
    pub zone_affinity: Vec<ZoneAffinity>,
}

/// One hardware module and the ports it offers
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HwModuleConfig {
    pub name: String,
    #[serde(default)]
    pub outputs: Vec<OutputProfile>,
    #[serde(default)]
    pub inputs: Vec<InputProfile>,
}

/// Devices a zone may be assigned
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ZoneAffinity {
    pub zone: Zones,
    pub devices: OutputDevices,
}

/// Capabilities of one output port type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputProfile {
    pub name: String,
    pub devices: OutputDevices,
    #[serde(default)]
    pub flags: OutputFlags,
    #[serde(default)]
    pub sampling_rates: Vec<u32>,
    #[serde(default)]
    pub formats: Vec<AudioFormat>,
    #[serde(default)]
    pub channel_masks: Vec<ChannelMask>,
}

/// Capabilities of one input port type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputProfile {
    pub name: String,
    pub devices: InputDevices,
    #[serde(default)]
    pub sampling_rates: Vec<u32>,
    #[serde(default)]
    pub formats: Vec<AudioFormat>,
    #[serde(default)]
    pub channel_masks: Vec<InputChannelMask>,
}

fn rate_supported(rates: &[u32], rate: u32) -> bool {
    rate == 0 || rates.contains(&rate)
}

fn format_supported(formats: &[AudioFormat], format: AudioFormat) -> bool {
    format == AudioFormat::Default || formats.contains(&format)
}

impl OutputProfile {
    /// Whether a port of this profile can serve the request
    ///
    /// Zero/default request values match anything.
    pub fn is_compatible(
        &self,
        devices: OutputDevices,
        sampling_rate: u32,
        format: AudioFormat,
        channel_mask: ChannelMask,
        flags: OutputFlags,
    ) -> bool {
        self.devices.contains(devices)
            && self.flags.contains(flags)
            && rate_supported(&self.sampling_rates, sampling_rate)
            && format_supported(&self.formats, format)
            && (channel_mask.is_empty() || self.channel_masks.contains(&channel_mask))
    }

    pub fn has_dynamic_params(&self) -> bool {
        self.sampling_rates.is_empty() || self.formats.is_empty() || self.channel_masks.is_empty()
    }

    pub fn max_sampling_rate(&self) -> u32 {
        self.sampling_rates.iter().copied().max().unwrap_or(0)
    }
}

impl InputProfile {
    pub fn is_compatible(
        &self,
        device: InputDevices,
        sampling_rate: u32,
        format: AudioFormat,
        channel_mask: InputChannelMask,
    ) -> bool {
        self.devices.contains(device)
            && rate_supported(&self.sampling_rates, sampling_rate)
            && format_supported(&self.formats, format)
            && (channel_mask.is_empty() || self.channel_masks.contains(&channel_mask))
    }
}

impl Default for PolicyConfig {
    /// Built-in inventory: a speaker-only primary output and a mic input
    fn default() -> Self {
        Self {
            attached_output_devices: OutputDevices::SPEAKER,
            default_output_device: OutputDevices::SPEAKER,
            attached_input_devices: InputDevices::BUILTIN_MIC,
            use_direct_output: false,
            modules: vec![HwModuleConfig {
                name: "primary".to_string(),
                outputs: vec![OutputProfile {
                    name: "primary".to_string(),
                    devices: OutputDevices::SPEAKER,
                    flags: OutputFlags::PRIMARY,
                    sampling_rates: vec![44100],
                    formats: vec![AudioFormat::Pcm16Bit],
                    channel_masks: vec![ChannelMask::STEREO],
                }],
                inputs: vec![InputProfile {
                    name: "primary".to_string(),
                    devices: InputDevices::BUILTIN_MIC,
                    sampling_rates: vec![8000],
                    formats: vec![AudioFormat::Pcm16Bit],
                    channel_masks: vec![InputChannelMask::MONO],
                }],
            }],
            zone_affinity: vec![
                ZoneAffinity {
                    zone: Zones::CABIN,
                    devices: OutputDevices::SPEAKER,
                },
                ZoneAffinity {
                    zone: Zones::BACKSEAT1,
                    devices: OutputDevices::WIRED_HEADPHONE,
                },
                ZoneAffinity {
                    zone: Zones::BACKSEAT2,
                    devices: OutputDevices::WIRED_HEADPHONE2,
                },
            ],
        }
    }
}

impl PolicyConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PolicyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded audio policy configuration from {}", path.display());
        Ok(config)
    }

    /// Reject inventories the policy cannot run on
    pub fn validate(&self) -> Result<()> {
        if self.modules.is_empty() {
            return Err(Error::Config("no hardware module declared".to_string()));
        }
        if !self.default_output_device.is_single() {
            return Err(Error::Config(format!(
                "default output device {:?} must be a single device",
                self.default_output_device
            )));
        }
        if !self.attached_output_devices.contains(self.default_output_device) {
            return Err(Error::Config(format!(
                "default output device {:?} is not attached",
                self.default_output_device
            )));
        }
        for module in &self.modules {
            if let Some(profile) = module.outputs.iter().find(|p| p.devices.is_empty()) {
                return Err(Error::Config(format!(
                    "output profile '{}' of module '{}' has no devices",
                    profile.name, module.name
                )));
            }
            if let Some(profile) = module.inputs.iter().find(|p| p.devices.is_empty()) {
                return Err(Error::Config(format!(
                    "input profile '{}' of module '{}' has no devices",
                    profile.name, module.name
                )));
            }
        }
        for (position, affinity) in self.zone_affinity.iter().enumerate() {
            if !affinity.zone.is_single() {
                return Err(Error::Config(format!(
                    "zone affinity entry {:?} must name exactly one zone",
                    affinity.zone
                )));
            }
            if self.zone_affinity[..position]
                .iter()
                .any(|earlier| earlier.zone == affinity.zone)
            {
                return Err(Error::Config(format!(
                    "zone {:?} has more than one affinity entry",
                    affinity.zone
                )));
            }
        }
        Ok(())
    }

    /// Whether any output profile reaches one of `devices`
    pub fn supports_output(&self, devices: OutputDevices) -> bool {
        self.modules
            .iter()
            .flat_map(|module| module.outputs.iter())
            .any(|profile| profile.devices.intersects(devices))
    }

    /// Devices `zone` may be assigned (empty when the zone has no entry)
    pub fn affinity(&self, zone: Zones) -> OutputDevices {
        self.zone_affinity
            .iter()
            .find(|entry| entry.zone == zone)
            .map(|entry| entry.devices)
            .unwrap_or_else(OutputDevices::empty)
    }
}

/// Configuration file resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. User config file (`~/.config/mzap/audio_policy.toml`)
/// 4. System config file (`/etc/mzap/audio_policy.toml`)
///
/// Returns `None` when no file is found; callers fall back to
/// [`PolicyConfig::default`].
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3 and 4: well-known locations
    let user_config = dirs::config_dir().map(|d| d.join("mzap").join(CONFIG_FILE_NAME));
    let system_config = PathBuf::from("/etc/mzap").join(CONFIG_FILE_NAME);
    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|path| path.exists())
}

/// Load the configuration following [`resolve_config_path`] priority,
/// falling back to the compiled default
pub fn load_policy_config(cli_arg: Option<&Path>, env_var_name: &str) -> Result<PolicyConfig> {
    match resolve_config_path(cli_arg, env_var_name) {
        Some(path) => PolicyConfig::load(&path),
        None => {
            debug!("No audio policy configuration file found, using built-in default");
            Ok(PolicyConfig::default())
        }
    }
}
