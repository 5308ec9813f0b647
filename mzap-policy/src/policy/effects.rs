//! Audio effect registration
//!
//! The policy does not run effects; it only keeps their memory and CPU
//! cost within the platform budget and says which output they belong on.

use super::{AudioPolicyManager, MAX_EFFECTS_CPU_LOAD, MAX_EFFECTS_MEMORY};
use crate::client::AudioPolicyClient;
use mzap_common::{
    Error, IoHandle, OutputFlags, Result, RoutingStrategy, SessionId, StreamType, Zones,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Cost figures of an effect implementation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectInfo {
    pub name: String,
    /// 0.1 MIPS units
    pub cpu_load: u32,
    /// KB
    pub memory_usage: u32,
}

/// A registered effect instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectDescriptor {
    pub info: EffectInfo,
    pub io: IoHandle,
    pub strategy: RoutingStrategy,
    pub session: SessionId,
    pub enabled: bool,
}

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    /// Output a global media effect should be attached to
    ///
    /// The last output reaching every cabin media device wins; a deep-buffer
    /// output is taken as soon as it is found. Defaults to the primary output.
    pub fn output_for_effect(&self) -> IoHandle {
        let device = self.refined_zone_devices(Zones::CABIN, StreamType::Music);
        let mut output = self.primary_output;
        for desc in self.outputs.values() {
            if desc.is_duplicated() {
                continue;
            }
            if self.supported_devices(desc.id).contains(device) {
                output = desc.id;
                if desc.flags.contains(OutputFlags::DEEP_BUFFER) {
                    break;
                }
            }
        }
        debug!("output_for_effect() -> {}", output);
        output
    }

    /// Register effect `id` on an open output or input
    ///
    /// # Errors
    /// [`Error::InvalidOperation`] for an unknown I/O handle, a duplicate id or
    /// when the memory budget would be exceeded.
    pub fn register_effect(
        &mut self,
        info: EffectInfo,
        io: IoHandle,
        strategy: RoutingStrategy,
        session: SessionId,
        id: i32,
    ) -> Result<()> {
        if !self.outputs.contains_key(&io) && !self.inputs.contains_key(&io) {
            warn!("register_effect() unknown io {}", io);
            return Err(Error::InvalidOperation(format!("unknown io {}", io)));
        }
        if self.effects.contains_key(&id) {
            warn!("register_effect() effect {} already registered", id);
            return Err(Error::InvalidOperation(format!("effect {} already registered", id)));
        }
        if self.total_effects_memory + info.memory_usage > MAX_EFFECTS_MEMORY {
            warn!(
                "register_effect() memory limit exceeded for {}, memory {} KB",
                info.name, info.memory_usage
            );
            return Err(Error::InvalidOperation(format!(
                "effect {} exceeds the memory budget",
                info.name
            )));
        }
        self.total_effects_memory += info.memory_usage;
        info!(
            "Registered effect {} ({}) on io {}, total memory {} KB",
            id, info.name, io, self.total_effects_memory
        );
        self.effects.insert(
            id,
            EffectDescriptor {
                info,
                io,
                strategy,
                session,
                enabled: false,
            },
        );
        Ok(())
    }

    pub fn unregister_effect(&mut self, id: i32) -> Result<()> {
        let Some(desc) = self.effects.get(&id) else {
            warn!("unregister_effect() unknown effect {}", id);
            return Err(Error::InvalidOperation(format!("unknown effect {}", id)));
        };
        if desc.enabled {
            self.set_effect_enabled(id, false)?;
        }
        let Some(desc) = self.effects.remove(&id) else {
            return Ok(());
        };
        if self.total_effects_memory < desc.info.memory_usage {
            warn!(
                "unregister_effect() memory {} too big for total {}",
                desc.info.memory_usage, self.total_effects_memory
            );
            self.total_effects_memory = 0;
        } else {
            self.total_effects_memory -= desc.info.memory_usage;
        }
        info!(
            "Unregistered effect {} ({}), total memory {} KB",
            id, desc.info.name, self.total_effects_memory
        );
        Ok(())
    }

    /// Enable or disable a registered effect within the CPU budget
    pub fn set_effect_enabled(&mut self, id: i32, enabled: bool) -> Result<()> {
        let Some(desc) = self.effects.get_mut(&id) else {
            warn!("set_effect_enabled() unknown effect {}", id);
            return Err(Error::InvalidOperation(format!("unknown effect {}", id)));
        };
        if desc.enabled == enabled {
            warn!("set_effect_enabled() effect {} already {}", id, if enabled { "enabled" } else { "disabled" });
            return Err(Error::InvalidOperation(format!(
                "effect {} already in requested state",
                id
            )));
        }

        let load = desc.info.cpu_load;
        if enabled {
            if self.total_effects_cpu_load + load > MAX_EFFECTS_CPU_LOAD {
                warn!("set_effect_enabled() CPU load limit exceeded for effect {}", id);
                return Err(Error::InvalidOperation(format!(
                    "effect {} exceeds the CPU budget",
                    id
                )));
            }
            self.total_effects_cpu_load += load;
        } else if self.total_effects_cpu_load < load {
            warn!(
                "set_effect_enabled() CPU load {} too high for total {}",
                load, self.total_effects_cpu_load
            );
            self.total_effects_cpu_load = 0;
        } else {
            self.total_effects_cpu_load -= load;
        }
        desc.enabled = enabled;
        debug!(
            "Effect {} {}, total CPU load {}",
            id,
            if enabled { "enabled" } else { "disabled" },
            self.total_effects_cpu_load
        );
        Ok(())
    }

    pub fn effect(&self, id: i32) -> Option<&EffectDescriptor> {
        self.effects.get(&id)
    }

    pub fn total_effects_cpu_load(&self) -> u32 {
        self.total_effects_cpu_load
    }

    pub fn total_effects_memory(&self) -> u32 {
        self.total_effects_memory
    }
}
