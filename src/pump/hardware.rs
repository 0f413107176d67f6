//! The motor and converter behind the parameters.

use std::time::Duration;

use tracing::{debug, info};

use crate::catalogue::Catalogue;
use crate::codes::{ControlBit, StatusBit};
use crate::config::{ControlMode, PumpConfig};
use crate::error::{Error, ValueError};
use crate::numeric::Number;
use crate::pump::parameters::ParameterStore;

pub const FREQUENCY: u16 = 3;
pub const VOLTAGE: u16 = 4;
pub const CURRENT: u16 = 5;
pub const TEMPERATURE: u16 = 11;
pub const FREQUENCY_SETPOINT: u16 = 24;

/// Parameters the hardware reads or writes.
const REQUIRED: [u16; 5] = [FREQUENCY, VOLTAGE, CURRENT, TEMPERATURE, FREQUENCY_SETPOINT];

/// Process data sent back with every reply.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareReply {
    pub status: Vec<StatusBit>,
    pub frequency: u16,
    pub temperature: i16,
    pub current: u16,
    pub voltage: u16,
}

/// Pump on/off state and rotor frequency.
#[derive(Debug, Clone)]
pub struct Hardware {
    step: Duration,
    abs_acceleration: f64,
    nominal_temperature: i16,
    nominal_current: u16,
    nominal_voltage: u16,
    control_mode: ControlMode,
    is_on: bool,
    /// Kept fractional so slow ramps still move; P3 holds the integer part.
    frequency: f64,
}

impl Hardware {
    /// A stopped pump. Fails if `catalogue` lacks a parameter the hardware
    /// uses.
    pub fn new(config: &PumpConfig, catalogue: &Catalogue) -> Result<Self, Error> {
        if let Some(&missing) = REQUIRED.iter().find(|&&n| catalogue.parameter(n).is_none()) {
            return Err(Error::UnknownParameter(missing));
        }
        Ok(Self {
            step: config.step(),
            abs_acceleration: config.abs_acceleration,
            nominal_temperature: config.nominal_temperature,
            nominal_current: config.nominal_current,
            nominal_voltage: config.nominal_voltage,
            control_mode: config.control_mode,
            is_on: false,
            frequency: 0.0,
        })
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    fn goal(&self, store: &ParameterStore) -> f64 {
        if self.is_on {
            store.number(FREQUENCY_SETPOINT).map_or(0.0, Number::as_f64)
        } else {
            0.0
        }
    }

    /// Rate of frequency change in Hz/s: positive while speeding up,
    /// negative while slowing down, zero at the goal.
    pub fn acceleration(&self, store: &ParameterStore) -> f64 {
        let goal = self.goal(store);
        if self.frequency < goal {
            self.abs_acceleration
        } else if self.frequency > goal {
            -self.abs_acceleration
        } else {
            0.0
        }
    }

    /// Advance the rotor by one step.
    pub fn tick(&mut self, store: &mut ParameterStore) -> Result<(), Error> {
        let difference = self.goal(store) - self.frequency;
        let mut change = self.step.as_secs_f64() * self.acceleration(store);
        if change.abs() > difference.abs() {
            change = difference;
        }
        self.frequency += change;
        // Never negative, and the goal is at most a 16-bit setpoint.
        store.set(FREQUENCY, self.frequency.max(0.0).trunc() as u16)
    }

    /// React to the control bits of a query and report the state.
    pub fn handle(
        &mut self,
        control: &[ControlBit],
        store: &mut ParameterStore,
    ) -> Result<HardwareReply, Error> {
        let command = control.contains(&ControlBit::Command);
        let on = control.contains(&ControlBit::On);

        if command {
            match (on, self.control_mode) {
                (true, ControlMode::Toggle) if self.is_on => self.turn_off(store)?,
                (true, _) if !self.is_on => self.turn_on(store)?,
                (false, _) if self.is_on => self.turn_off(store)?,
                _ => {}
            }
        }

        let frequency = integer(store, FREQUENCY)?;
        let mut status = vec![StatusBit::ParamChannel];
        if command {
            status.push(StatusBit::ProcessChannel);
        }
        status.push(if self.is_on {
            StatusBit::Operation
        } else {
            StatusBit::Ready
        });
        if frequency != 0 {
            status.push(StatusBit::Turning);
        }
        let acceleration = self.acceleration(store);
        if acceleration > 0.0 {
            status.push(StatusBit::Acceleration);
        } else if acceleration < 0.0 {
            status.push(StatusBit::Deceleration);
        }

        Ok(HardwareReply {
            status,
            frequency: narrow(FREQUENCY, frequency)?,
            temperature: narrow(TEMPERATURE, integer(store, TEMPERATURE)?)?,
            current: narrow(CURRENT, integer(store, CURRENT)?)?,
            voltage: narrow(VOLTAGE, integer(store, VOLTAGE)?)?,
        })
    }

    fn turn_on(&mut self, store: &mut ParameterStore) -> Result<(), Error> {
        self.is_on = true;
        store.set(TEMPERATURE, self.nominal_temperature)?;
        store.set(CURRENT, self.nominal_current)?;
        store.set(VOLTAGE, self.nominal_voltage)?;
        info!(setpoint = self.goal(store), "pump on");
        Ok(())
    }

    fn turn_off(&mut self, store: &mut ParameterStore) -> Result<(), Error> {
        self.is_on = false;
        store.set(TEMPERATURE, 0)?;
        store.set(CURRENT, 0)?;
        store.set(VOLTAGE, 0)?;
        info!(frequency = self.frequency, "pump off");
        Ok(())
    }
}

fn integer(store: &ParameterStore, number: u16) -> Result<i128, Error> {
    match store.number(number) {
        Some(Number::Int(value)) => Ok(value),
        Some(Number::Float(value)) => Err(ValueError::WrongType {
            value: value.to_string(),
            kind: "integer",
        }
        .into()),
        None => Err(Error::UnknownParameter(number)),
    }
}

fn narrow<T: TryFrom<i128>>(number: u16, value: i128) -> Result<T, Error> {
    T::try_from(value).map_err(|_| {
        debug!(number, value, "process value does not fit its field");
        ValueError::OutOfRange {
            kind: "process data",
            value,
            bits: 16,
        }
        .into()
    })
}
