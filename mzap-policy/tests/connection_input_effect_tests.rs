//! Device connection, capture and effect budget tests
//!
//! Covers:
//! - Connection state bookkeeping and argument validation
//! - Headphone jacks muting their output, removable devices leaving zones
//! - Input source to device selection, single active recorder
//! - Effect memory and CPU budgets

mod helpers;

use helpers::{playing_output, VehicleBuilder};
use mzap_common::{
    Device, DeviceState, Error, ForceUse, ForcedConfig, InputDevices, InputSource, IoHandle,
    OutputDevices, RoutingStrategy, SessionId, StreamType, Zones,
};
use mzap_policy::{EffectInfo, HalCall, InputRequest};

fn effect(name: &str, cpu_load: u32, memory_usage: u32) -> EffectInfo {
    EffectInfo {
        name: name.to_string(),
        cpu_load,
        memory_usage,
    }
}

#[test]
fn test_usb_connection_state_tracks_address() {
    let mut manager = VehicleBuilder::new().build();
    let usb = Device::Output(OutputDevices::USB_DEVICE);

    assert_eq!(
        manager.device_connection_state(usb, ""),
        DeviceState::Unavailable
    );
    manager
        .set_device_connection_state(usb, DeviceState::Available, "card=1;device=3")
        .unwrap();
    assert_eq!(manager.device_connection_state(usb, ""), DeviceState::Available);
    assert_eq!(
        manager.device_connection_state(usb, "card=1;device=3"),
        DeviceState::Available
    );
    assert_eq!(
        manager.device_connection_state(usb, "card=2;device=0"),
        DeviceState::Unavailable
    );
    assert!(manager
        .available_output_devices()
        .contains(OutputDevices::USB_DEVICE));

    assert!(matches!(
        manager.set_device_connection_state(usb, DeviceState::Available, "card=1;device=3"),
        Err(Error::InvalidOperation(_))
    ));

    manager
        .set_device_connection_state(usb, DeviceState::Unavailable, "")
        .unwrap();
    assert!(matches!(
        manager.set_device_connection_state(usb, DeviceState::Unavailable, ""),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn test_connection_argument_validation() {
    let mut manager = VehicleBuilder::new().build();

    assert!(matches!(
        manager.set_device_connection_state(
            Device::Output(OutputDevices::BLUETOOTH_A2DP),
            DeviceState::Available,
            "00:11:22:33:44:55:66:77",
        ),
        Err(Error::BadValue(_))
    ));
    // No module declares a remote submix port
    assert!(matches!(
        manager.set_device_connection_state(
            Device::Output(OutputDevices::REMOTE_SUBMIX),
            DeviceState::Available,
            "",
        ),
        Err(Error::BadValue(_))
    ));
    assert!(matches!(
        manager.set_device_connection_state(
            Device::Output(OutputDevices::USB_DEVICE | OutputDevices::AUX_DIGITAL),
            DeviceState::Available,
            "",
        ),
        Err(Error::BadValue(_))
    ));
    assert!(matches!(
        manager.set_device_connection_state(
            Device::Input(InputDevices::BUILTIN_MIC | InputDevices::BACK_MIC),
            DeviceState::Unavailable,
            "",
        ),
        Err(Error::BadValue(_))
    ));
    assert_eq!(
        manager.available_output_devices(),
        manager.attached_output_devices()
    );
}

#[test]
fn test_disconnected_usb_leaves_the_cabin() {
    let mut manager = VehicleBuilder::new().build();
    let usb = Device::Output(OutputDevices::USB_DEVICE);
    manager
        .set_device_connection_state(usb, DeviceState::Available, "card=1;device=3")
        .unwrap();
    manager
        .set_zone_devices(Zones::CABIN, OutputDevices::SPEAKER | OutputDevices::USB_DEVICE)
        .unwrap();

    manager
        .set_device_connection_state(usb, DeviceState::Unavailable, "")
        .unwrap();

    assert_eq!(manager.zone_devices(Zones::CABIN), OutputDevices::SPEAKER);
    assert_eq!(manager.find_zone(OutputDevices::USB_DEVICE), None);
}

#[test]
fn test_headphone_jack_mutes_its_output() {
    let mut manager = VehicleBuilder::new().build();
    let session = SessionId(21);
    manager.set_session_zones(session, Zones::BACKSEAT1).unwrap();
    let output = playing_output(&mut manager, StreamType::Music, session);
    let jack = Device::Output(OutputDevices::WIRED_HEADPHONE);

    manager
        .set_device_connection_state(jack, DeviceState::Unavailable, "")
        .unwrap();
    let desc = manager.output_descriptor(output).unwrap();
    assert_eq!(desc.mute_count[StreamType::Music], 1);
    // The jack stays assigned to its zone
    assert_eq!(
        manager.zone_devices(Zones::BACKSEAT1),
        OutputDevices::WIRED_HEADPHONE
    );
    assert_eq!(manager.client().last_stream_volume(StreamType::Music, output), Some(0.0));

    manager
        .set_device_connection_state(jack, DeviceState::Available, "")
        .unwrap();
    let desc = manager.output_descriptor(output).unwrap();
    assert_eq!(desc.mute_count[StreamType::Music], 0);
}

#[test]
fn test_wired_headset_reported_through_headphone_jack() {
    let manager = VehicleBuilder::new().build();

    assert_eq!(
        manager.device_connection_state(Device::Output(OutputDevices::WIRED_HEADSET), ""),
        DeviceState::Available
    );
    assert_eq!(
        manager.device_connection_state(Device::Input(InputDevices::BACK_MIC), ""),
        DeviceState::Available
    );
}

#[test]
fn test_sco_connection_mirrors_headset_input() {
    let mut manager = VehicleBuilder::new().build();

    manager
        .set_device_connection_state(
            Device::Output(OutputDevices::BLUETOOTH_SCO),
            DeviceState::Available,
            "00:11:22:33:44:66",
        )
        .unwrap();
    assert!(manager
        .available_input_devices()
        .contains(InputDevices::BLUETOOTH_SCO_HEADSET));
    assert_eq!(
        manager.device_for_input_source(InputSource::Mic),
        InputDevices::BUILTIN_MIC
    );

    manager
        .set_force_use(ForceUse::Record, ForcedConfig::BtSco)
        .unwrap();
    assert_eq!(
        manager.device_for_input_source(InputSource::VoiceRecognition),
        InputDevices::BLUETOOTH_SCO_HEADSET
    );

    manager
        .set_device_connection_state(
            Device::Output(OutputDevices::BLUETOOTH_SCO),
            DeviceState::Unavailable,
            "",
        )
        .unwrap();
    assert!(!manager
        .available_input_devices()
        .contains(InputDevices::BLUETOOTH_SCO_HEADSET));
}

#[test]
fn test_mic_input_routed_on_start() {
    let mut manager = VehicleBuilder::new().build();

    let input = manager
        .get_input(InputSource::Mic, InputRequest::default(), SessionId(60))
        .unwrap();
    let desc = manager.input_descriptor(input).unwrap();
    assert_eq!(desc.device, InputDevices::BUILTIN_MIC);
    assert_eq!(desc.users, 0);
    assert!(manager.client().open_inputs().contains(&input));

    manager.start_input(input).unwrap();
    assert!(manager.is_source_active(InputSource::Mic));
    let expected = format!(
        "routing={};input_source={}",
        InputDevices::BUILTIN_MIC.bits(),
        InputSource::Mic.code()
    );
    assert!(manager.client().calls().contains(&HalCall::SetParameters {
        io: input,
        params: expected,
        delay_ms: 0,
    }));

    manager.stop_input(input).unwrap();
    assert!(matches!(
        manager.stop_input(input),
        Err(Error::InvalidOperation(_))
    ));
    assert!(!manager.is_source_active(InputSource::Mic));

    manager.release_input(input).unwrap();
    assert!(!manager.client().open_inputs().contains(&input));
    assert!(matches!(
        manager.release_input(input),
        Err(Error::BadValue(_))
    ));
}

#[test]
fn test_only_one_input_records_at_a_time() {
    let mut manager = VehicleBuilder::new().build();

    let camcorder = manager
        .get_input(InputSource::Camcorder, InputRequest::default(), SessionId(61))
        .unwrap();
    assert_eq!(
        manager.input_descriptor(camcorder).unwrap().device,
        InputDevices::BACK_MIC
    );
    let mic = manager
        .get_input(InputSource::Mic, InputRequest::default(), SessionId(62))
        .unwrap();

    manager.start_input(camcorder).unwrap();
    assert!(matches!(
        manager.start_input(mic),
        Err(Error::InvalidOperation(_))
    ));

    manager.stop_input(camcorder).unwrap();
    manager.start_input(mic).unwrap();
    assert!(matches!(
        manager.start_input(IoHandle(999)),
        Err(Error::BadValue(_))
    ));
}

#[test]
fn test_voice_call_capture_needs_the_call_device() {
    let mut manager = VehicleBuilder::new().build();

    assert!(matches!(
        manager.get_input(InputSource::VoiceCall, InputRequest::default(), SessionId(63)),
        Err(Error::NoOutput(_))
    ));

    manager
        .set_device_connection_state(
            Device::Input(InputDevices::VOICE_CALL),
            DeviceState::Available,
            "",
        )
        .unwrap();
    let input = manager
        .get_input(InputSource::VoiceCall, InputRequest::default(), SessionId(63))
        .unwrap();
    let desc = manager.input_descriptor(input).unwrap();
    assert_eq!(desc.device, InputDevices::VOICE_CALL);
    assert_eq!(
        desc.channel_mask,
        mzap_common::InputChannelMask::VOICE_UPLINK | mzap_common::InputChannelMask::VOICE_DNLINK
    );
}

#[test]
fn test_unsupported_capture_rate_is_refused() {
    let mut manager = VehicleBuilder::new().build();
    let opened = manager.client().open_inputs().len();

    let request = InputRequest {
        sampling_rate: 44100,
        ..InputRequest::default()
    };
    assert!(matches!(
        manager.get_input(InputSource::Mic, request, SessionId(64)),
        Err(Error::NoOutput(_))
    ));
    assert_eq!(manager.client().open_inputs().len(), opened);

    let request = InputRequest {
        sampling_rate: 16000,
        ..InputRequest::default()
    };
    let input = manager
        .get_input(InputSource::Mic, request, SessionId(64))
        .unwrap();
    assert_eq!(manager.input_descriptor(input).unwrap().sampling_rate, 16000);
}

#[test]
fn test_effect_memory_budget() {
    let mut manager = VehicleBuilder::new().build();
    let primary = manager.primary_output();

    manager
        .register_effect(effect("reverb", 100, 300), primary, RoutingStrategy::Media, SessionId(0), 1)
        .unwrap();
    assert!(matches!(
        manager.register_effect(effect("eq", 100, 300), primary, RoutingStrategy::Media, SessionId(0), 2),
        Err(Error::InvalidOperation(_))
    ));
    manager
        .register_effect(effect("eq", 100, 212), primary, RoutingStrategy::Media, SessionId(0), 2)
        .unwrap();
    assert_eq!(manager.total_effects_memory(), 512);

    assert!(matches!(
        manager.register_effect(effect("bass", 0, 0), IoHandle(999), RoutingStrategy::Media, SessionId(0), 3),
        Err(Error::InvalidOperation(_))
    ));
    assert!(matches!(
        manager.register_effect(effect("again", 0, 0), primary, RoutingStrategy::Media, SessionId(0), 1),
        Err(Error::InvalidOperation(_))
    ));

    manager.unregister_effect(1).unwrap();
    assert_eq!(manager.total_effects_memory(), 212);
    assert!(manager.effect(1).is_none());
    assert!(matches!(
        manager.unregister_effect(1),
        Err(Error::InvalidOperation(_))
    ));
}

#[test]
fn test_effect_cpu_budget() {
    let mut manager = VehicleBuilder::new().build();
    let primary = manager.primary_output();
    manager
        .register_effect(effect("virtualizer", 600, 10), primary, RoutingStrategy::Media, SessionId(0), 1)
        .unwrap();
    manager
        .register_effect(effect("loudness", 600, 10), primary, RoutingStrategy::Media, SessionId(0), 2)
        .unwrap();

    manager.set_effect_enabled(1, true).unwrap();
    assert_eq!(manager.total_effects_cpu_load(), 600);
    assert!(matches!(
        manager.set_effect_enabled(2, true),
        Err(Error::InvalidOperation(_))
    ));
    assert!(matches!(
        manager.set_effect_enabled(1, true),
        Err(Error::InvalidOperation(_))
    ));
    assert!(!manager.effect(2).unwrap().enabled);

    // Unregistering an enabled effect frees its CPU share
    manager.unregister_effect(1).unwrap();
    assert_eq!(manager.total_effects_cpu_load(), 0);
    manager.set_effect_enabled(2, true).unwrap();
    assert_eq!(manager.total_effects_cpu_load(), 600);
}

#[test]
fn test_media_effects_attach_to_the_cabin_output() {
    let mut manager = VehicleBuilder::new().build();
    assert_eq!(manager.output_for_effect(), manager.primary_output());

    playing_output(&mut manager, StreamType::Music, SessionId(70));
    assert_eq!(manager.output_for_effect(), manager.primary_output());
}
