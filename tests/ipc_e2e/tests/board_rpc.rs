//! CONTEXT: Board service end-to-end tests
//! INTENT: RPC methods driving queue tasks and the companion over shared memory
//! DEPS: boardd, mcore-ipc, mcore-task
//! READINESS: Board::bring_up with the simulation backend
//! TESTS: start_m4 handshake, echo through the companion, temperature/wifi methods
// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use boardd::rpc::{codes, methods, MethodTable};
use boardd::sim::{SimCompanion, SimRadio, SimTemperatureSensor};
use boardd::{Board, BoardConfig, Drivers};
use ipc_e2e::{record_app_messages, WAIT};
use mcore_ipc::{CompanionState, Envelope, IpcConfig};
use mcore_shmem::DualCore;
use serde_json::json;

struct Setup {
    _link: DualCore,
    board: Arc<Board>,
    companion: Arc<SimCompanion>,
    methods: MethodTable,
}

fn setup() -> Setup {
    setup_with(SimRadio::new().with_network("lab", Some("pw")))
}

fn setup_with(radio: SimRadio) -> Setup {
    let config = BoardConfig::default();
    let link = config.ipc.link().unwrap();
    let companion = Arc::new(SimCompanion::new(
        IpcConfig::companion(),
        link.companion.clone(),
        link.region.clone(),
        link.primary.clone(),
    ));
    let drivers = Drivers {
        sensor: Box::new(SimTemperatureSensor::new(40.5)),
        radio: Box::new(radio),
        companion: companion.clone(),
    };
    let board = Arc::new(
        Board::bring_up(config, link.primary.clone(), link.region.clone(), drivers).unwrap(),
    );
    let methods = MethodTable::for_board(board.clone());
    Setup { _link: link, board, companion, methods }
}

#[test]
fn start_m4_then_echo_through_companion() {
    let s = setup();
    let inbox = record_app_messages(s.board.ipc());

    let response = s.methods.dispatch(&json!({ "id": 1, "method": methods::START_M4 }));
    assert_eq!(response["result"], json!({}));
    assert_eq!(s.board.ipc().companion_state(), CompanionState::Started);

    for byte in [0xAA, 0xBB, 0xCC] {
        s.board.ipc().send_message(&Envelope::app(&[byte]).unwrap());
    }
    for byte in [0xAA, 0xBB, 0xCC] {
        assert_eq!(inbox.recv_timeout(WAIT).unwrap()[0], byte);
    }

    s.companion.stop();
    let deadline = std::time::Instant::now() + WAIT;
    while s.board.ipc().companion_state() != CompanionState::Stopping {
        assert!(std::time::Instant::now() < deadline);
        thread::yield_now();
    }
}

#[test]
fn temperature_method_uses_task() {
    let s = setup();
    let cpu = s.methods.dispatch(&json!({
        "id": "t", "method": methods::GET_TEMPERATURE, "params": { "sensor": 0 }
    }));
    assert_eq!(cpu["id"], json!("t"));
    assert_eq!(cpu["result"]["temperature"].as_f64(), Some(40.5));
}

#[test]
fn concurrent_rpc_callers_share_tasks() {
    let s = Arc::new(setup());
    s.board.wifi().turn_on().unwrap();
    let callers: Vec<_> = (0..4)
        .map(|_| {
            let s = s.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    let r = s
                        .methods
                        .call(methods::GET_TEMPERATURE, &json!({ "sensor": 0 }))
                        .unwrap();
                    assert_eq!(r["temperature"].as_f64(), Some(40.5));
                    s.methods.call(methods::WIFI_GET_STATUS, &json!({})).unwrap();
                }
            })
        })
        .collect();
    for c in callers {
        c.join().unwrap();
    }
}

#[test]
fn wifi_methods_end_to_end() {
    let s = setup();
    s.board.wifi().turn_on().unwrap();
    let connect = s.methods.dispatch(&json!({
        "id": 2,
        "method": methods::WIFI_CONNECT,
        "params": { "ssid": "lab", "password": "pw" }
    }));
    assert!(connect.get("error").is_none(), "{connect}");

    let ip = s.methods.dispatch(&json!({ "id": 3, "method": methods::WIFI_GET_IP }));
    assert_eq!(ip["result"]["ip"], json!("192.168.0.42"));

    let bad = s.methods.dispatch(&json!({
        "id": 4, "method": methods::WIFI_CONNECT, "params": { "password": "pw" }
    }));
    assert_eq!(bad["error"]["code"], json!(codes::INVALID_PARAMS));
}

#[test]
fn slow_association_is_reported_as_connected() {
    let s = setup_with(
        SimRadio::new()
            .with_network("lab", Some("pw"))
            .failing_first(2)
            .with_attempt_delay(Duration::from_millis(100)),
    );
    s.board.wifi().turn_on().unwrap();
    let connect = s.methods.dispatch(&json!({
        "id": 5,
        "method": methods::WIFI_CONNECT,
        "params": { "ssid": "lab", "password": "pw" }
    }));
    assert_eq!(connect["result"], json!({}), "{connect}");
    assert!(s.board.wifi().is_connected().unwrap());
}

#[test]
fn scan_and_malformed_lines() {
    let s = setup();
    let off = s.methods.dispatch_line(r#"{"id": 6, "method": "wifi_scan"}"#);
    assert_eq!(off["result"]["networks"], json!([]));

    let on = s.methods.dispatch_line(
        r#"{"id": 7, "method": "wifi_set_power", "params": {"enable": true}}"#,
    );
    assert_eq!(on["result"], json!({}));
    let scan = s.methods.dispatch_line(r#"{"id": 8, "method": "wifi_scan"}"#);
    assert_eq!(scan["result"]["networks"], json!([{ "ssid": "lab", "secured": true }]));

    let garbage = s.methods.dispatch_line("not json");
    assert_eq!(garbage["error"]["code"], json!(codes::PARSE_ERROR));
}
