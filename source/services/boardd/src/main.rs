// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Board daemon entrypoint (host simulation)
//! INTENT: bring up both simulated cores, then serve one JSON request per stdin line
//! READINESS: print "boardd: ready"
//!
//! Usage: boardd [config.toml]

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use log::error;

use boardd::rpc::MethodTable;
use boardd::sim::{SimCompanion, SimRadio, SimTemperatureSensor};
use boardd::{Board, BoardConfig, BoardError, Drivers};

fn load_config() -> Result<BoardConfig, BoardError> {
    match std::env::args_os().nth(1) {
        Some(path) => Ok(BoardConfig::load(path)?),
        None => Ok(BoardConfig::default()),
    }
}

fn run() -> Result<(), BoardError> {
    let config = load_config()?;
    let link = config.ipc.link()?;
    let companion_config = config.ipc.mirrored();
    let drivers = Drivers {
        sensor: Box::new(SimTemperatureSensor::new(38.0)),
        radio: Box::new(SimRadio::new().with_network("nexus-lab", Some("nexus-lab"))),
        companion: Arc::new(SimCompanion::new(
            companion_config,
            link.companion.clone(),
            link.region.clone(),
            link.primary.clone(),
        )),
    };
    let board = Arc::new(Board::bring_up(
        config,
        link.primary.clone(),
        link.region.clone(),
        drivers,
    )?);
    let methods = MethodTable::for_board(board);
    println!("boardd: ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                error!("boardd: stdin: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = methods.dispatch_line(&line);
        if writeln!(stdout, "{response}").is_err() {
            break;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("boardd: {err}");
            ExitCode::FAILURE
        }
    }
}
