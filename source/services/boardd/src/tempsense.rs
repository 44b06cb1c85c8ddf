// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Temperature sensing task.

use log::debug;

use mcore_task::{QueueTask, Reply, RequestHandler, TaskConfig};

use crate::{BoardError, DriverError, Result};

/// Reading reported for sensors the board cannot measure.
pub const ABSOLUTE_ZERO_C: f32 = -273.15;

/// On-die sensors addressable by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TempSensor {
    /// Application CPU die sensor.
    Cpu,
    /// Accelerator die sensor.
    Tpu,
}

impl TryFrom<i64> for TempSensor {
    type Error = i64;

    fn try_from(index: i64) -> core::result::Result<Self, i64> {
        match index {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Tpu),
            other => Err(other),
        }
    }
}

/// CPU temperature sensor driver.
pub trait TemperatureSensor: Send + 'static {
    /// Configures the sensor for single-shot measurements.
    fn init(&mut self) -> core::result::Result<(), DriverError>;

    /// Restarts a single-shot measurement and returns the reading in degrees Celsius.
    fn measure(&mut self) -> f32;
}

/// Requests served by the temperature task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TempSenseRequest {
    /// Read one sensor.
    GetTemperature(TempSensor),
}

/// Handler owning the sensor driver.
pub struct TempSenseHandler {
    sensor: Box<dyn TemperatureSensor>,
}

impl RequestHandler for TempSenseHandler {
    type Request = TempSenseRequest;
    type Response = f32;

    fn handle(&mut self, request: TempSenseRequest, reply: Reply<f32>) {
        let TempSenseRequest::GetTemperature(sensor) = request;
        let celsius = match sensor {
            TempSensor::Cpu => self.sensor.measure(),
            TempSensor::Tpu => ABSOLUTE_ZERO_C,
        };
        debug!("tempsense: {sensor:?} = {celsius}");
        let _ = reply.send(celsius);
    }
}

/// Queue task fronting the temperature sensor.
pub struct TempSenseTask {
    task: QueueTask<TempSenseHandler>,
}

impl TempSenseTask {
    /// Initializes the driver and binds it to a task. Driver failures are fatal.
    pub fn new(config: TaskConfig, mut sensor: Box<dyn TemperatureSensor>) -> Result<Self> {
        sensor.init().map_err(|source| BoardError::Driver { component: "tempsense", source })?;
        Ok(Self { task: QueueTask::new(config, TempSenseHandler { sensor }) })
    }

    /// Starts the task worker.
    pub fn init(&self) -> Result<()> {
        Ok(self.task.init()?)
    }

    /// Reads `sensor` through the task.
    pub fn get_temperature(&self, sensor: TempSensor) -> Result<f32> {
        Ok(self.task.send_request(TempSenseRequest::GetTemperature(sensor))?)
    }
}
