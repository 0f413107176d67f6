//! Talking to a pump from the host side.
//!
//! [`PumpLink`] works over anything that reads and writes bytes: a real
//! serial port from [`open_serial`], or the [`Endpoint`](crate::connection::Endpoint)
//! of a virtual pump.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::catalogue::Catalogue;
use crate::codes::{AccessMode, ControlBit, TelegramKind};
use crate::error::Error;
use crate::frame::{Telegram, TELEGRAM_LENGTH};
use crate::numeric::Number;
use crate::telegram::{TelegramBuilder, TelegramReader};

pub const BAUD_RATE: u32 = 19200;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

const PUMP_ON: [ControlBit; 2] = [ControlBit::Command, ControlBit::On];
const PUMP_OFF: [ControlBit; 1] = [ControlBit::Command];

/// Open `path` with the pump's framing: 8 data bits, even parity, 1 stop
/// bit. Pumps ship set to [`BAUD_RATE`].
pub fn open_serial(
    path: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, Error> {
    let port = serialport::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::Even)
        .stop_bits(StopBits::One)
        .timeout(timeout)
        .open()?;
    info!(path, baud_rate, "serial port opened");
    Ok(port)
}

/// A query and the reply it got.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub query: TelegramReader,
    pub reply: TelegramReader,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.query, self.reply)
    }
}

/// A connection to one pump.
///
/// Every call returns `Ok(None)` when the pump does not answer before the
/// port's read timeout. Nothing is retried.
pub struct PumpLink<T> {
    port: T,
    catalogue: Arc<Catalogue>,
}

impl<T: Read + Write> PumpLink<T> {
    pub fn new(port: T, catalogue: Arc<Catalogue>) -> Self {
        Self { port, catalogue }
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }

    pub fn port_mut(&mut self) -> &mut T {
        &mut self.port
    }

    /// An empty query to start from.
    pub fn query(&self) -> TelegramBuilder {
        TelegramBuilder::query(Arc::clone(&self.catalogue))
    }

    /// Send `query` and wait for the reply.
    pub fn send(&mut self, query: Telegram) -> Result<Option<Exchange>, Error> {
        let bytes = query.to_bytes()?;
        debug!(query = %hex::encode(&bytes), "sending");
        self.port.write_all(&bytes)?;
        self.port.flush()?;

        let Some(reply) = self.read_reply()? else {
            debug!("no reply");
            return Ok(None);
        };
        debug!(reply = %hex::encode(&reply), "received");
        let reply = TelegramReader::from_bytes(&reply, TelegramKind::Reply, Arc::clone(&self.catalogue))?;
        Ok(Some(Exchange {
            query: TelegramReader::new(query, Arc::clone(&self.catalogue)),
            reply,
        }))
    }

    /// Ask for the pump's state. With `pump_on` the query tells the pump to
    /// run, otherwise to stop.
    pub fn status(&mut self, pump_on: bool) -> Result<Option<Exchange>, Error> {
        let flags: &[ControlBit] = if pump_on { &PUMP_ON } else { &PUMP_OFF };
        let query = self.query().flags(flags).build()?;
        self.send(query)
    }

    pub fn turn_on(&mut self) -> Result<Option<Exchange>, Error> {
        self.status(true)
    }

    pub fn turn_off(&mut self) -> Result<Option<Exchange>, Error> {
        self.status(false)
    }

    /// Read `number` at `index` (0 for unindexed parameters).
    ///
    /// No control bits are sent, so the pump keeps running or standing.
    pub fn read_parameter(&mut self, number: u16, index: u16) -> Result<Option<Exchange>, Error> {
        let query = self
            .query()
            .access_mode(AccessMode::Read)
            .parameter_number(number)
            .parameter_index(index)
            .build()?;
        self.send(query)
    }

    /// Write `value` to `number` at `index` (0 for unindexed parameters).
    pub fn write_parameter(
        &mut self,
        number: u16,
        value: impl Into<Number>,
        index: u16,
    ) -> Result<Option<Exchange>, Error> {
        let query = self
            .query()
            .access_mode(AccessMode::Write)
            .parameter_number(number)
            .parameter_index(index)
            .parameter_value(value)
            .build()?;
        self.send(query)
    }

    /// Read until a whole telegram has arrived or the port times out.
    fn read_reply(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut reply = Vec::with_capacity(TELEGRAM_LENGTH);
        let mut buf = [0u8; TELEGRAM_LENGTH];
        while reply.len() < TELEGRAM_LENGTH {
            match self.port.read(&mut buf[..TELEGRAM_LENGTH - reply.len()]) {
                Ok(0) => break,
                Ok(n) => reply.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok((!reply.is_empty()).then_some(reply))
    }
}
