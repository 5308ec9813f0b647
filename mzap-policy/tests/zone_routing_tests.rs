//! Zone ownership and session routing tests
//!
//! Covers:
//! - Exclusive device ownership across zones
//! - set_zone_devices validation order and error taxonomy
//! - Sessions following their zones, including multi-zone sessions
//! - Zone and per-session volume

mod helpers;

use helpers::{output_on, playing_output, VehicleBuilder};
use mzap_common::{Error, ErrorKind, OutputDevices, SessionId, StreamType, Zones};
use mzap_policy::HalCall;

fn assert_exclusive(zones: &[mzap_policy::policy::ZoneEntry]) {
    for (i, a) in zones.iter().enumerate() {
        for b in &zones[i + 1..] {
            assert!(
                !a.devices.intersects(b.devices),
                "zones {:?} and {:?} share {:?}",
                a.zone,
                b.zone,
                a.devices & b.devices
            );
        }
    }
}

#[test]
fn test_initial_assignment_follows_attached_devices() {
    let manager = VehicleBuilder::new().build();

    assert_eq!(manager.zone_devices(Zones::CABIN), OutputDevices::SPEAKER);
    assert_eq!(
        manager.zone_devices(Zones::BACKSEAT1),
        OutputDevices::WIRED_HEADPHONE
    );
    assert_eq!(
        manager.zone_devices(Zones::BACKSEAT2),
        OutputDevices::WIRED_HEADPHONE2
    );
    assert_eq!(
        manager.find_zone(OutputDevices::WIRED_HEADPHONE2),
        Some(Zones::BACKSEAT2)
    );
    assert_exclusive(manager.routing_state().entries());
}

#[test]
fn test_zones_stay_exclusive_through_reassignment() {
    let mut manager = VehicleBuilder::new().build();

    manager
        .set_zone_devices(Zones::CABIN, OutputDevices::SPEAKER | OutputDevices::USB_DEVICE)
        .unwrap();
    assert_exclusive(manager.routing_state().entries());

    // Every attempt to take a device from another zone is refused
    for zone in [Zones::BACKSEAT1, Zones::BACKSEAT2] {
        let _ = manager.set_zone_devices(zone, OutputDevices::USB_DEVICE);
        let _ = manager.set_zone_devices(zone, OutputDevices::SPEAKER);
        assert_exclusive(manager.routing_state().entries());
    }
    let _ = manager.set_zone_devices(
        Zones::CABIN,
        OutputDevices::SPEAKER | OutputDevices::WIRED_HEADPHONE,
    );
    assert_exclusive(manager.routing_state().entries());
    assert_eq!(
        manager.zone_devices(Zones::CABIN),
        OutputDevices::SPEAKER | OutputDevices::USB_DEVICE
    );
}

#[test]
fn test_empty_device_set_is_bad_value() {
    let mut manager = VehicleBuilder::new().build();

    for zone in Zones::SINGLE {
        let err = manager
            .set_zone_devices(zone, OutputDevices::empty())
            .unwrap_err();
        assert!(matches!(err, Error::NoDevices { .. }));
        assert_eq!(err.kind(), ErrorKind::BadValue);
    }
}

#[test]
fn test_speaker_owned_by_cabin_cannot_move_to_backseat() {
    let mut manager = VehicleBuilder::new().build();

    let err = manager
        .set_zone_devices(Zones::BACKSEAT1, OutputDevices::SPEAKER)
        .unwrap_err();
    match &err {
        Error::DeviceAlreadyOwned { devices, owner } => {
            assert_eq!(*devices, OutputDevices::SPEAKER);
            assert_eq!(*owner, Zones::CABIN);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(
        manager.zone_devices(Zones::BACKSEAT1),
        OutputDevices::WIRED_HEADPHONE
    );
}

#[test]
fn test_zone_device_validation() {
    let mut manager = VehicleBuilder::new().build();

    let err = manager
        .set_zone_devices(Zones::CABIN | Zones::BACKSEAT1, OutputDevices::SPEAKER)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidZoneCount { .. }));
    assert_eq!(err.kind(), ErrorKind::BadValue);

    // The speaker is attached and must stay in the cabin
    let err = manager
        .set_zone_devices(Zones::CABIN, OutputDevices::WIRED_HEADSET)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DeviceAttached { devices, zone }
            if devices == OutputDevices::SPEAKER && zone == Zones::CABIN
    ));

    let err = manager
        .set_zone_devices(
            Zones::BACKSEAT1,
            OutputDevices::WIRED_HEADPHONE | OutputDevices::USB_DEVICE,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DeviceNotSupported { devices, zone }
            if devices == OutputDevices::USB_DEVICE && zone == Zones::BACKSEAT1
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    assert_eq!(
        manager.zone_supported_devices(Zones::BACKSEAT2).unwrap(),
        OutputDevices::WIRED_HEADPHONE2
    );
    assert!(manager.zone_supported_devices(Zones::ALL).is_err());
}

#[test]
fn test_session_in_backseat_plays_on_its_headphones() {
    let mut manager = VehicleBuilder::new().build();
    let session = SessionId(10);

    manager.set_session_zones(session, Zones::BACKSEAT1).unwrap();
    let output = playing_output(&mut manager, StreamType::Music, session);

    assert_eq!(output_on(&manager, OutputDevices::WIRED_HEADPHONE), Some(output));
    assert_eq!(manager.output_device(output), OutputDevices::WIRED_HEADPHONE);
    assert_eq!(manager.session_zones(session), Zones::BACKSEAT1);
    assert_eq!(
        manager.session(session).map(|desc| desc.output),
        Some(Some(output))
    );
}

#[test]
fn test_sessions_follow_zone_reassignment() {
    let mut manager = VehicleBuilder::new().build();
    let session = SessionId(3);
    let output = playing_output(&mut manager, StreamType::Music, session);
    assert_eq!(output, manager.primary_output());
    manager.client_mut().clear_calls();

    manager
        .set_zone_devices(Zones::CABIN, OutputDevices::SPEAKER | OutputDevices::USB_DEVICE)
        .unwrap();

    let desc = manager.session(session).unwrap();
    assert_eq!(desc.devices, OutputDevices::SPEAKER | OutputDevices::USB_DEVICE);
    assert!(manager.client().calls().contains(&HalCall::SetStreamOutput {
        stream: StreamType::Music,
        output,
    }));
}

#[test]
fn test_session_zone_validation() {
    let mut manager = VehicleBuilder::new().build();

    assert!(matches!(
        manager.set_session_zones(SessionId(1), Zones::empty()),
        Err(Error::BadValue(_))
    ));
    assert_eq!(manager.session_zones(SessionId(1)), Zones::empty());
    assert!(matches!(
        manager.set_session_volume(SessionId(99), Zones::CABIN, 0.5),
        Err(Error::BadValue(_))
    ));
}

#[test]
fn test_zone_volume_round_trip_is_exact() {
    let mut manager = VehicleBuilder::new().build();

    for volume in [0.0_f32, 0.1, 1.0 / 3.0, 0.70710677, 1.0] {
        for zone in Zones::SINGLE {
            manager.set_zone_volume(zone, volume).unwrap();
            assert_eq!(
                manager.zone_volume(zone).unwrap().to_bits(),
                volume.to_bits()
            );
        }
    }

    assert!(matches!(
        manager.set_zone_volume(Zones::CABIN, 1.5),
        Err(Error::BadValue(_))
    ));
    assert!(matches!(
        manager.set_zone_volume(Zones::CABIN, f32::NAN),
        Err(Error::BadValue(_))
    ));
    assert!(matches!(
        manager.set_zone_volume(Zones::ALL, 0.5),
        Err(Error::InvalidZoneCount { .. })
    ));
    assert_eq!(manager.zone_volume(Zones::CABIN).unwrap(), 1.0);
}

#[test]
fn test_session_volume_scaled_by_zone_volume() {
    let mut manager = VehicleBuilder::new().build();
    let session = SessionId(10);
    manager.set_session_zones(session, Zones::BACKSEAT1).unwrap();
    let output = playing_output(&mut manager, StreamType::Music, session);

    manager
        .set_session_volume(session, Zones::BACKSEAT1, 0.5)
        .unwrap();
    assert_eq!(manager.client().last_zone_volume(output, session), Some(0.5));
    assert_eq!(manager.session_volume(session, Zones::BACKSEAT1).unwrap(), 0.5);

    manager.set_zone_volume(Zones::BACKSEAT1, 0.5).unwrap();
    assert_eq!(manager.client().last_zone_volume(output, session), Some(0.25));
}

#[test]
fn test_multi_zone_session_duplicates_across_zones() {
    let mut manager = VehicleBuilder::new().build();
    let session = SessionId(11);
    manager
        .set_session_zones(session, Zones::CABIN | Zones::BACKSEAT2)
        .unwrap();

    let output = playing_output(&mut manager, StreamType::Music, session);
    let desc = manager.output_descriptor(output).unwrap();
    assert!(desc.is_duplicated());
    assert_eq!(
        manager.output_device(output),
        OutputDevices::SPEAKER | OutputDevices::WIRED_HEADPHONE2
    );

    // Per-zone gain lands only on the child serving that zone
    let headphones = output_on(&manager, OutputDevices::WIRED_HEADPHONE2).unwrap();
    let primary = manager.primary_output();
    manager
        .set_session_volume(session, Zones::BACKSEAT2, 0.4)
        .unwrap();
    assert_eq!(manager.client().last_zone_volume(headphones, session), Some(0.4));
    assert_eq!(manager.client().last_zone_volume(primary, session), Some(1.0));
}
