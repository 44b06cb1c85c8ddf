//! CONTEXT: Dual-core IPC end-to-end tests
//! INTENT: Ordered APP delivery, malformed frame tolerance, companion lifecycle
//! DEPS: mcore-shmem, mcore-ipc
//! READINESS: Rig::running() brings both cores up
//! TESTS: [0xAA],[0xBB],[0xCC] scenario; unknown discriminant; ordering property; handshake
// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::thread;
use std::time::Duration;

use ipc_e2e::{record_app_messages, Rig, WAIT};
use mcore_ipc::{
    CompanionState, Envelope, SystemMessage, ENVELOPE_SIZE, MESSAGE_BUFFER_DATA_SIZE,
};
use mcore_shmem::{COMPANION_TX_OFFSET, PRIMARY_TX_OFFSET};
use proptest::prelude::*;

#[test]
fn app_payloads_arrive_in_send_order() {
    let rig = Rig::running(1024);
    let inbox = record_app_messages(&rig.primary);

    for byte in [0xAA, 0xBB, 0xCC] {
        rig.companion.send_message(&Envelope::app(&[byte]).unwrap());
    }

    for byte in [0xAA, 0xBB, 0xCC] {
        let payload = inbox.recv_timeout(WAIT).unwrap();
        assert_eq!(payload[0], byte);
        assert!(payload[1..].iter().all(|&b| b == 0));
    }
    assert!(inbox.recv_timeout(Duration::from_millis(20)).is_err());
}

#[test]
fn both_directions_are_independent() {
    let rig = Rig::running(1024);
    let to_primary = record_app_messages(&rig.primary);
    let to_companion = record_app_messages(&rig.companion);

    let companion = rig.companion.clone();
    let upstream = thread::spawn(move || {
        for i in 0..50u8 {
            companion.send_message(&Envelope::app(&[i]).unwrap());
        }
    });
    for i in 0..50u8 {
        rig.primary.send_message(&Envelope::app(&[i, 1]).unwrap());
    }
    upstream.join().unwrap();

    for i in 0..50u8 {
        assert_eq!(to_primary.recv_timeout(WAIT).unwrap()[0], i);
        let p = to_companion.recv_timeout(WAIT).unwrap();
        assert_eq!((p[0], p[1]), (i, 1));
    }
}

#[test]
fn unknown_discriminant_does_not_stop_receiver() {
    let rig = Rig::running(1024);
    let inbox = record_app_messages(&rig.companion);
    let raw = rig.link.region.channel(PRIMARY_TX_OFFSET).unwrap();

    let mut frame = [0u8; ENVELOPE_SIZE];
    frame[0] = 0x7F;
    assert_eq!(raw.send(&frame), ENVELOPE_SIZE);
    rig.primary.send_message(&Envelope::app(&[0x01]).unwrap());

    assert_eq!(inbox.recv_timeout(WAIT).unwrap()[0], 0x01);
    assert_eq!(rig.companion.dropped_messages(), 1);
}

#[test]
fn companion_lifecycle_reaches_primary() {
    let rig = Rig::running(1024);
    assert_eq!(rig.primary.companion_state(), CompanionState::Offline);

    rig.companion.send_message(&Envelope::System(SystemMessage::CompanionStarted));
    rig.primary.wait_for_companion(WAIT).unwrap();

    rig.companion.send_message(&Envelope::System(SystemMessage::CompanionStopping));
    let deadline = std::time::Instant::now() + WAIT;
    while rig.primary.companion_state() != CompanionState::Stopping {
        assert!(std::time::Instant::now() < deadline, "stop notice not delivered");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn messages_sent_while_peer_suspended_are_delivered_on_resume() {
    let rig = Rig::new(1024);
    rig.primary.init().unwrap();
    rig.companion.init().unwrap();
    rig.companion.resume().unwrap();
    let inbox = record_app_messages(&rig.primary);

    rig.companion.send_message(&Envelope::app(&[0x42]).unwrap());
    assert!(inbox.recv_timeout(Duration::from_millis(20)).is_err());
    assert!(!rig.link.region.channel(COMPANION_TX_OFFSET).unwrap().is_empty());

    rig.primary.resume().unwrap();
    assert_eq!(inbox.recv_timeout(WAIT).unwrap()[0], 0x42);
}

#[test]
fn small_channel_applies_backpressure_without_loss() {
    // Room for exactly one envelope at a time.
    let rig = Rig::running(ENVELOPE_SIZE + 4);
    let inbox = record_app_messages(&rig.primary);
    for i in 0..32u8 {
        rig.companion.send_message(&Envelope::app(&[i; MESSAGE_BUFFER_DATA_SIZE]).unwrap());
    }
    for i in 0..32u8 {
        let payload = inbox.recv_timeout(WAIT).unwrap();
        assert!(payload.iter().all(|&b| b == i));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn arbitrary_payload_sequences_arrive_intact(
        payloads in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..=MESSAGE_BUFFER_DATA_SIZE),
            1..20,
        )
    ) {
        let rig = Rig::running(512);
        let inbox = record_app_messages(&rig.primary);
        for p in &payloads {
            rig.companion.send_message(&Envelope::app(p).unwrap());
        }
        for p in &payloads {
            let got = inbox.recv_timeout(WAIT).unwrap();
            prop_assert_eq!(&got[..p.len()], &p[..]);
            prop_assert!(got[p.len()..].iter().all(|&b| b == 0));
        }
    }
}
