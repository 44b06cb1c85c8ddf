// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: JSON method table of the board service
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below + tests/ipc_e2e
//!
//! Methods take a JSON object of named parameters and return a JSON result. Request
//! framing (`{"id", "method", "params"}`) is decoded by [`MethodTable::dispatch`]; how
//! requests reach the board is up to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::board::Board;
use crate::tempsense::TempSensor;
use crate::wifi::WifiAntenna;

/// Method names.
pub mod methods {
    /// Read a temperature sensor. Params: `sensor` (integer).
    pub const GET_TEMPERATURE: &str = "get_temperature";
    /// Boot the companion core.
    pub const START_M4: &str = "start_m4";
    /// Associate. Params: `ssid` (string, optional, saved network when absent),
    /// `password` (string, optional), `retry_count` (integer, optional).
    pub const WIFI_CONNECT: &str = "wifi_connect";
    /// Leave the current network.
    pub const WIFI_DISCONNECT: &str = "wifi_disconnect";
    /// Association status.
    pub const WIFI_GET_STATUS: &str = "wifi_get_status";
    /// Current address.
    pub const WIFI_GET_IP: &str = "wifi_get_ip";
    /// Antenna selection. Params: `antenna` (integer, 0 internal, 1 external).
    pub const WIFI_SET_ANTENNA: &str = "wifi_set_antenna";
    /// Visible networks. Params: `max_results` (integer 0..=255, optional).
    pub const WIFI_SCAN: &str = "wifi_scan";
    /// Radio power. Params: `enable` (boolean).
    pub const WIFI_SET_POWER: &str = "wifi_set_power";
}

/// JSON-RPC error codes.
pub mod codes {
    /// The request is not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Request framing is invalid.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Missing or mistyped parameter.
    pub const INVALID_PARAMS: i64 = -32602;
    /// The method ran and failed.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Result type of a method.
pub type Result<T> = core::result::Result<T, RpcError>;

/// Method failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    /// The request text is not JSON.
    #[error("parse error: {0}")]
    Parse(String),
    /// No method with this name.
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// A parameter is missing or has the wrong type.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// The request is not a method call.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    /// The method failed.
    #[error("{0}")]
    Internal(String),
}

impl RpcError {
    /// JSON-RPC error code.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}

impl From<crate::BoardError> for RpcError {
    fn from(err: crate::BoardError) -> Self {
        Self::Internal(err.to_string())
    }
}

fn param<'a>(params: &'a Value, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|v| !v.is_null())
}

/// Reads integer parameter `name`.
pub fn integer_param(params: &Value, name: &str) -> Result<i64> {
    param(params, name)
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::InvalidParams(format!("'{name}' must be an integer")))
}

/// Reads boolean parameter `name`.
pub fn boolean_param(params: &Value, name: &str) -> Result<bool> {
    param(params, name)
        .and_then(Value::as_bool)
        .ok_or_else(|| RpcError::InvalidParams(format!("'{name}' must be a boolean")))
}

/// Reads string parameter `name`.
pub fn string_param<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    param(params, name)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::InvalidParams(format!("'{name}' must be a string")))
}

/// Reads optional parameter `name` with `read`; absent or null yields `None`.
pub fn optional_param<'a, T>(
    params: &'a Value,
    name: &str,
    read: impl FnOnce(&'a Value, &str) -> Result<T>,
) -> Result<Option<T>> {
    match param(params, name) {
        Some(_) => read(params, name).map(Some),
        None => Ok(None),
    }
}

type Method = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

fn response(id: Value, outcome: Result<Value>) -> Value {
    let mut response = Map::new();
    response.insert("jsonrpc".into(), json!("2.0"));
    response.insert("id".into(), id);
    match outcome {
        Ok(result) => {
            response.insert("result".into(), result);
        }
        Err(err) => {
            response
                .insert("error".into(), json!({ "code": err.code(), "message": err.to_string() }));
        }
    }
    Value::Object(response)
}

fn retry_count_param(params: &Value) -> Result<Option<u32>> {
    optional_param(params, "retry_count", integer_param)?
        .map(|n| {
            u32::try_from(n)
                .map_err(|_| RpcError::InvalidParams("'retry_count' out of range".into()))
        })
        .transpose()
}

/// Name to method map.
#[derive(Default)]
pub struct MethodTable {
    methods: BTreeMap<&'static str, Method>,
}

impl MethodTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `method` under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &'static str, method: F)
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name, Box::new(method));
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    /// Invokes `name` with `params`.
    pub fn call(&self, name: &str, params: &Value) -> Result<Value> {
        let method =
            self.methods.get(name).ok_or_else(|| RpcError::MethodNotFound(name.to_owned()))?;
        debug!("rpc: {name}");
        method(params)
    }

    /// Decodes one `{"id", "method", "params"}` request and builds the matching response.
    pub fn dispatch(&self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let outcome = match request.get("method").and_then(Value::as_str) {
            Some(name) => {
                let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
                self.call(name, &params)
            }
            None => Err(RpcError::InvalidRequest("missing method")),
        };
        response(id, outcome)
    }

    /// Parses one request line and dispatches it. Text that is not JSON gets a parse error
    /// response with a null id.
    pub fn dispatch_line(&self, line: &str) -> Value {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.dispatch(&request),
            Err(err) => {
                warn!("rpc: malformed request: {err}");
                response(Value::Null, Err(RpcError::Parse(err.to_string())))
            }
        }
    }

    /// The board's methods.
    pub fn for_board(board: Arc<Board>) -> Self {
        let mut table = Self::new();

        let b = board.clone();
        table.register(methods::GET_TEMPERATURE, move |params| {
            let index = integer_param(params, "sensor")?;
            let sensor = TempSensor::try_from(index)
                .map_err(|i| RpcError::InvalidParams(format!("unknown sensor {i}")))?;
            let celsius = b.tempsense().get_temperature(sensor)?;
            Ok(json!({ "temperature": celsius }))
        });

        let b = board.clone();
        table.register(methods::START_M4, move |_| {
            b.start_m4()?;
            Ok(json!({}))
        });

        let b = board.clone();
        table.register(methods::WIFI_CONNECT, move |params| {
            let retries = retry_count_param(params)?;
            let (connected, ssid) = match optional_param(params, "ssid", string_param)? {
                Some(ssid) => {
                    let password = optional_param(params, "password", string_param)?;
                    (b.wifi().connect(ssid, password, retries)?, ssid.to_owned())
                }
                None => {
                    let ssid = b.wifi().stored_ssid().map(str::to_owned).ok_or_else(|| {
                        RpcError::InvalidParams("'ssid' missing and no network saved".into())
                    })?;
                    (b.wifi().connect_stored(retries)?, ssid)
                }
            };
            if connected {
                Ok(json!({}))
            } else {
                Err(RpcError::Internal(format!("failed to connect to {ssid}")))
            }
        });

        let b = board.clone();
        table.register(methods::WIFI_DISCONNECT, move |_| {
            if b.wifi().disconnect(None)? {
                Ok(json!({}))
            } else {
                Err(RpcError::Internal("failed to disconnect".into()))
            }
        });

        let b = board.clone();
        table.register(methods::WIFI_GET_STATUS, move |_| {
            Ok(json!({ "status": b.wifi().is_connected()? }))
        });

        let b = board.clone();
        table.register(methods::WIFI_GET_IP, move |_| match b.wifi().ip()? {
            Some(ip) => Ok(json!({ "ip": ip.to_string() })),
            None => Err(RpcError::Internal("no ip address".into())),
        });

        let b = board.clone();
        table.register(methods::WIFI_SCAN, move |params| {
            let max_results = optional_param(params, "max_results", integer_param)?
                .map(|n| {
                    u8::try_from(n)
                        .map_err(|_| RpcError::InvalidParams("'max_results' out of range".into()))
                })
                .transpose()?;
            let networks: Vec<Value> = b
                .wifi()
                .scan(max_results)?
                .into_iter()
                .map(|n| json!({ "ssid": n.ssid, "secured": n.secured }))
                .collect();
            Ok(json!({ "networks": networks }))
        });

        let b = board.clone();
        table.register(methods::WIFI_SET_POWER, move |params| {
            let enable = boolean_param(params, "enable")?;
            if b.wifi().set_power(enable)? {
                Ok(json!({}))
            } else {
                Err(RpcError::Internal("failed to set radio power".into()))
            }
        });

        table.register(methods::WIFI_SET_ANTENNA, move |params| {
            let index = integer_param(params, "antenna")?;
            let antenna = WifiAntenna::try_from(index)
                .map_err(|i| RpcError::InvalidParams(format!("unknown antenna {i}")))?;
            if board.wifi().set_antenna(antenna)? {
                Ok(json!({}))
            } else {
                Err(RpcError::Internal("failed to set antenna".into()))
            }
        });

        table
    }
}
