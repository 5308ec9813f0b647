//! Device connection state
//!
//! Connecting a device makes it available; it never re-routes by itself.
//! Headphone jacks only toggle the mute of the output already wired to
//! them, other devices leave their zone when they disconnect.

use super::{AudioPolicyManager, MAX_DEVICE_ADDRESS_LEN};
use crate::client::AudioPolicyClient;
use mzap_common::parameters::{KEY_INPUT_SOURCE, KEY_ROUTING};
use mzap_common::{
    AudioParameter, Device, DeviceState, Error, InputDevices, OutputDevices, Result,
};
use tracing::{debug, error, info, warn};

impl<C: AudioPolicyClient> AudioPolicyManager<C> {
    /// Record a device arriving or leaving
    ///
    /// An SCO output connection is mirrored onto the SCO headset input.
    ///
    /// # Errors
    /// - [`Error::BadValue`] for an address that is too long, a device mask
    ///   naming more than one device, or a device class no module supports
    /// - [`Error::InvalidOperation`] when connecting a connected device or
    ///   disconnecting one that is not connected
    pub fn set_device_connection_state(
        &mut self,
        device: Device,
        state: DeviceState,
        address: &str,
    ) -> Result<()> {
        info!(
            "set_device_connection_state() {:?} {:?} address '{}'",
            device, state, address
        );
        if address.len() >= MAX_DEVICE_ADDRESS_LEN {
            return Err(Error::BadValue(format!("device address '{}' too long", address)));
        }

        match device {
            Device::Output(output_device) => {
                self.set_output_connection_state(output_device, state, address)?;
                if OutputDevices::ALL_SCO.contains(output_device) {
                    self.set_input_connection_state(InputDevices::BLUETOOTH_SCO_HEADSET, state)?;
                }
                Ok(())
            }
            Device::Input(input_device) => self.set_input_connection_state(input_device, state),
        }
    }

    fn set_output_connection_state(
        &mut self,
        device: OutputDevices,
        state: DeviceState,
        address: &str,
    ) -> Result<()> {
        if !device.is_single() {
            return Err(Error::BadValue(format!("{:?} is not a single output device", device)));
        }
        let unsupported = (device.intersects(OutputDevices::ALL_A2DP) && !self.has_a2dp)
            || (device.intersects(OutputDevices::ALL_USB) && !self.has_usb)
            || (device == OutputDevices::REMOTE_SUBMIX && !self.has_remote_submix);
        if unsupported {
            warn!("No module supports output device {:?}", device);
            return Err(Error::BadValue(format!("unsupported output device {:?}", device)));
        }
        let device = if device == OutputDevices::WIRED_HEADSET {
            OutputDevices::WIRED_HEADPHONE
        } else {
            device
        };
        let is_jack = OutputDevices::HEADPHONE_JACKS.contains(device);

        match state {
            DeviceState::Available => {
                if self.available_output_devices.contains(device) {
                    warn!("Output device {:?} already connected", device);
                    return Err(Error::InvalidOperation(format!(
                        "device {:?} already connected",
                        device
                    )));
                }
                self.available_output_devices |= device;
                if device.intersects(OutputDevices::ALL_A2DP) {
                    self.a2dp_address = address.to_string();
                    self.a2dp_suspended = false;
                } else if device.intersects(OutputDevices::ALL_SCO) {
                    self.sco_address = address.to_string();
                } else if device.intersects(OutputDevices::ALL_USB) {
                    self.usb_address = address.to_string();
                }
                if is_jack {
                    if let Some(output) = self.find_output(device) {
                        if self.output_device(output) == device {
                            self.mute_output(output, false, 0);
                        }
                    }
                }
            }
            DeviceState::Unavailable => {
                if !self.available_output_devices.contains(device) {
                    warn!("Output device {:?} not connected", device);
                    return Err(Error::InvalidOperation(format!(
                        "device {:?} not connected",
                        device
                    )));
                }
                self.available_output_devices.remove(device);
                if device.intersects(OutputDevices::ALL_A2DP) {
                    self.a2dp_address.clear();
                    self.a2dp_suspended = false;
                } else if device.intersects(OutputDevices::ALL_SCO) {
                    self.sco_address.clear();
                } else if device.intersects(OutputDevices::ALL_USB) {
                    self.usb_address.clear();
                }
                if is_jack {
                    if let Some(output) = self.find_output(device) {
                        if self.output_device(output) == device {
                            self.mute_output(output, true, 0);
                        }
                    }
                } else if let Err(e) = self.disconnect_device(device) {
                    error!("Cannot disconnect {:?}: {}", device, e);
                }
            }
        }

        self.check_a2dp_suspend();
        Ok(())
    }

    fn set_input_connection_state(&mut self, device: InputDevices, state: DeviceState) -> Result<()> {
        if !device.is_single() {
            return Err(Error::BadValue(format!("{:?} is not a single input device", device)));
        }
        match state {
            DeviceState::Available => {
                if self.available_input_devices.contains(device) {
                    warn!("Input device {:?} already connected", device);
                    return Err(Error::InvalidOperation(format!(
                        "device {:?} already connected",
                        device
                    )));
                }
                self.available_input_devices |= device;
            }
            DeviceState::Unavailable => {
                if !self.available_input_devices.contains(device) {
                    warn!("Input device {:?} not connected", device);
                    return Err(Error::InvalidOperation(format!(
                        "device {:?} not connected",
                        device
                    )));
                }
                self.available_input_devices.remove(device);
            }
        }

        let Some(input) = self.active_input() else {
            return Ok(());
        };
        let Some(desc) = self.inputs.get(&input) else {
            return Ok(());
        };
        let source = desc.source;
        let previous = desc.device;
        let new_device = self.device_for_input_source(source);
        if !new_device.is_empty() && new_device != previous {
            if let Some(desc) = self.inputs.get_mut(&input) {
                desc.device = new_device;
            }
            debug!("Active input {} re-routed to {:?}", input, new_device);
            let param = AudioParameter::new()
                .with(KEY_ROUTING, new_device.bits())
                .with(KEY_INPUT_SOURCE, source.code());
            self.client.set_parameters(input, &param.to_string(), 0);
        }
        Ok(())
    }

    /// Whether a device is connected, checking the address of remote devices
    pub fn device_connection_state(&self, device: Device, address: &str) -> DeviceState {
        let available = match device {
            Device::Output(device) => {
                let device = if device == OutputDevices::WIRED_HEADSET {
                    OutputDevices::WIRED_HEADPHONE
                } else {
                    device
                };
                device.is_single()
                    && self.available_output_devices.contains(device)
                    && self.output_address_matches(device, address)
            }
            Device::Input(device) => {
                device.is_single() && self.available_input_devices.contains(device)
            }
        };
        if available {
            DeviceState::Available
        } else {
            DeviceState::Unavailable
        }
    }

    fn output_address_matches(&self, device: OutputDevices, address: &str) -> bool {
        let matches = |recorded: &str| address.is_empty() || address == recorded;
        if device.intersects(OutputDevices::ALL_A2DP) {
            self.has_a2dp && matches(&self.a2dp_address)
        } else if device.intersects(OutputDevices::ALL_SCO) {
            matches(&self.sco_address)
        } else if device.intersects(OutputDevices::ALL_USB) {
            self.has_usb && matches(&self.usb_address)
        } else if device == OutputDevices::REMOTE_SUBMIX {
            self.has_remote_submix
        } else {
            true
        }
    }
}
