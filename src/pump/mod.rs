//! A simulated pump.
//!
//! [`VirtualPump`] answers query telegrams the way a real pump does. It can
//! be driven directly with [`VirtualPump::process`], or through a
//! [`VirtualConnection`] opened with [`VirtualPump::open_port`].

pub mod hardware;
pub mod parameters;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::catalogue::Catalogue;
use crate::codes::TelegramKind;
use crate::config::PumpConfig;
use crate::connection::{join_within, ConnectionSettings, Endpoint, VirtualConnection};
use crate::error::Error;
use crate::frame::Telegram;
use crate::telegram::{TelegramBuilder, TelegramReader};

pub use hardware::{Hardware, HardwareReply};
pub use parameters::{ParameterReply, ParameterStore, ReplyValue};

/// Everything one telegram may read or change.
#[derive(Debug)]
pub struct PumpState {
    pub parameters: ParameterStore,
    pub hardware: Hardware,
}

#[derive(Debug)]
struct Shared {
    catalogue: Arc<Catalogue>,
    state: Mutex<PumpState>,
    tick_failures: AtomicU64,
}

impl Shared {
    fn process(&self, bytes: &[u8]) -> Vec<u8> {
        debug!(query = %hex::encode(bytes), "received");
        let query = match Telegram::from_bytes(bytes, TelegramKind::Query) {
            Ok(query) => query,
            Err(e) => {
                warn!(bytes = %hex::encode(bytes), "dropping malformed telegram: {}", e);
                return Vec::new();
            }
        };
        match self.handle(query).and_then(|reply| Ok(reply.to_bytes()?)) {
            Ok(reply) => {
                debug!(reply = %hex::encode(&reply), "sent");
                reply
            }
            Err(e) => {
                error!("failed to answer a telegram: {}", e);
                Vec::new()
            }
        }
    }

    fn handle(&self, query: Telegram) -> Result<Telegram, Error> {
        let query = TelegramReader::new(query, Arc::clone(&self.catalogue));
        let mut state = self.state.lock();
        let PumpState {
            parameters,
            hardware,
        } = &mut *state;

        let parameter = parameters.handle(&query);
        let process = hardware.handle(&query.control_bits(), parameters)?;

        let mut builder = TelegramBuilder::reply(Arc::clone(&self.catalogue))
            .response_mode(parameter.mode)
            .parameter_number(parameter.number)
            .parameter_index(parameter.index)
            .flags(&process.status)
            .frequency(process.frequency)
            .temperature(process.temperature)
            .current(process.current)
            .voltage(process.voltage);
        builder = match parameter.value {
            ReplyValue::Value(value) => builder.parameter_value(value.as_number()),
            ReplyValue::Raw(bits) => builder.raw_parameter_value(bits),
            ReplyValue::Error(error) => builder.parameter_value(error.code()),
        };
        let mut reply = builder.build()?;
        reply.address = query.telegram().address;
        Ok(reply)
    }
}

/// A pump with its hardware running on a background thread.
///
/// Dropping the pump stops the thread and closes any open port.
#[derive(Debug)]
pub struct VirtualPump {
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    connection: Option<VirtualConnection>,
    settings: ConnectionSettings,
}

impl VirtualPump {
    /// A pump using the built-in catalogue.
    pub fn new(config: &PumpConfig) -> Result<Self, Error> {
        Self::with_catalogue(config, Catalogue::builtin()?)
    }

    pub fn with_catalogue(config: &PumpConfig, catalogue: Arc<Catalogue>) -> Result<Self, Error> {
        config.validate()?;
        let hardware = Hardware::new(config, &catalogue)?;
        let parameters = ParameterStore::new(Arc::clone(&catalogue))
            .with_cannot_change_reply(config.cannot_change_reply)
            .with_save_duration(config.save_duration());
        let shared = Arc::new(Shared {
            catalogue,
            state: Mutex::new(PumpState {
                parameters,
                hardware,
            }),
            tick_failures: AtomicU64::new(0),
        });

        let stop = Arc::new(AtomicBool::new(false));
        let ticker = thread::Builder::new()
            .name("vpump-hardware".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let stop = Arc::clone(&stop);
                let step = config.step();
                move || tick(&shared, &stop, step)
            })?;
        info!(step_ms = config.step_ms, "virtual pump started");

        Ok(Self {
            shared,
            stop,
            ticker: Some(ticker),
            connection: None,
            settings: ConnectionSettings::from(config),
        })
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.shared.catalogue
    }

    /// Answer the raw bytes of a query.
    ///
    /// Bytes that are not a valid telegram get no answer: the result is
    /// empty, as if the pump had not heard anything.
    pub fn process(&self, bytes: &[u8]) -> Vec<u8> {
        self.shared.process(bytes)
    }

    /// Answer a decoded query.
    pub fn handle(&self, query: Telegram) -> Result<Telegram, Error> {
        self.shared.handle(query)
    }

    /// Run `f` with the pump state locked.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut PumpState) -> T) -> T {
        f(&mut *self.shared.state.lock())
    }

    pub fn is_on(&self) -> bool {
        self.with_state(|state| state.hardware.is_on())
    }

    /// The rotor frequency in Hz, with its fractional part.
    pub fn frequency(&self) -> f64 {
        self.with_state(|state| state.hardware.frequency())
    }

    /// Hardware steps whose measurements could not be stored.
    ///
    /// The rotor keeps turning when a step fails; only the mirrored
    /// parameters go stale.
    pub fn tick_failures(&self) -> u64 {
        self.shared.tick_failures.load(Ordering::Relaxed)
    }

    /// Serve the pump on a virtual serial line and return the host's end.
    ///
    /// A port that is already open is closed first.
    pub fn open_port(&mut self) -> Result<Endpoint, Error> {
        if let Some(mut old) = self.connection.take() {
            old.close()?;
        }
        let shared = Arc::clone(&self.shared);
        let (connection, host) =
            VirtualConnection::open(Box::new(move |bytes: &[u8]| shared.process(bytes)), self.settings)?;
        self.connection = Some(connection);
        Ok(host)
    }

    /// Stop the hardware thread and close the port.
    pub fn close(&mut self) -> Result<(), Error> {
        if let Some(mut connection) = self.connection.take() {
            connection.close()?;
        }
        self.stop.store(true, Ordering::Release);
        if let Some(ticker) = self.ticker.take() {
            join_within(ticker, "hardware thread", self.settings.shutdown_timeout)?;
            info!("virtual pump stopped");
        }
        Ok(())
    }
}

impl Drop for VirtualPump {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("{}", e);
        }
    }
}

fn tick(shared: &Shared, stop: &AtomicBool, step: Duration) {
    while !stop.load(Ordering::Acquire) {
        thread::sleep(step);
        let mut state = shared.state.lock();
        let PumpState {
            parameters,
            hardware,
        } = &mut *state;
        if let Err(e) = hardware.tick(parameters) {
            if shared.tick_failures.fetch_add(1, Ordering::Relaxed) == 0 {
                error!("hardware tick failed: {}", e);
            } else {
                debug!("hardware tick failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{AccessMode, ControlBit, ParameterError, ResponseMode, StatusBit};
    use crate::numeric::{Number, Sint, Uint, Value};

    fn pump() -> VirtualPump {
        VirtualPump::new(&PumpConfig::default()).unwrap()
    }

    fn query(pump: &VirtualPump) -> TelegramBuilder {
        TelegramBuilder::query(Arc::clone(pump.catalogue()))
    }

    fn ask(pump: &VirtualPump, builder: TelegramBuilder) -> TelegramReader {
        let bytes = pump.process(&builder.to_bytes().unwrap());
        TelegramReader::from_bytes(&bytes, TelegramKind::Reply, Arc::clone(pump.catalogue()))
            .unwrap()
    }

    #[test]
    fn answers_parameter_reads() {
        let pump = pump();
        let reply = ask(
            &pump,
            query(&pump).access_mode(AccessMode::Read).parameter_number(18),
        );
        assert_eq!(reply.response_mode(), ResponseMode::Response);
        assert_eq!(reply.parameter_number(), 18);
        assert_eq!(reply.parameter_value().as_number(), Number::Int(1200));
        assert!(reply.status_bits().contains(&StatusBit::ParamChannel));
    }

    #[test]
    fn errors_are_replies() {
        let pump = pump();
        let reply = ask(
            &pump,
            query(&pump).access_mode(AccessMode::Read).parameter_number(9),
        );
        assert_eq!(reply.response_mode(), ResponseMode::Error);
        assert_eq!(reply.error(), Some(ParameterError::WrongNum));
        assert_eq!(reply.error_code(), 0);
    }

    #[test]
    fn garbage_gets_no_answer() {
        let pump = pump();
        assert!(pump.process(&[]).is_empty());
        assert!(pump.process(&[0u8; 24]).is_empty());
        let mut bytes = query(&pump).to_bytes().unwrap();
        bytes[23] ^= 1;
        assert!(pump.process(&bytes).is_empty());
    }

    #[test]
    fn empty_queries_echo_the_value_field() {
        let pump = pump();
        let reply = ask(
            &pump,
            query(&pump)
                .parameter_number(133)
                .raw_parameter_value(Uint::new(0x7FC0_0001, 32).unwrap()),
        );
        assert_eq!(reply.response_mode(), ResponseMode::None);
        assert_eq!(reply.telegram().parameter_value.value(), 0x7FC0_0001);
    }

    #[test]
    fn address_is_echoed() {
        let pump = pump();
        let mut telegram = query(&pump).build().unwrap();
        telegram.address = Uint::new(3, 8).unwrap();
        let reply = pump.handle(telegram).unwrap();
        assert_eq!(reply.kind, TelegramKind::Reply);
        assert_eq!(reply.address.value(), 3);
    }

    #[test]
    fn failed_ticks_do_not_stop_the_rotor() {
        // P3 is too narrow for the setpoint, so storing the frequency fails
        // once the rotor passes 32767 Hz.
        let catalogue = Catalogue::from_tables(
            (
                "p",
                r#"
                3  "Frequency"   0  1300    0      Hz    r    s16  ""
                4  "Voltage"     0  1000    0      0.1V  r    u16  ""
                5  "Current"     0  1000    0      0.1A  r    u16  ""
                11 "Temperature" 0  150     0      °C    r    s16  ""
                24 "Setpoint"    0  100000  40000  Hz    r/w  u32  ""
                "#,
            ),
            ("e", ""),
            ("w", ""),
        )
        .unwrap();
        let config = PumpConfig {
            step_ms: 10,
            abs_acceleration: 1_000_000.0,
            ..PumpConfig::default()
        };
        let pump = VirtualPump::with_catalogue(&config, Arc::new(catalogue)).unwrap();
        ask(
            &pump,
            query(&pump).flags(&[ControlBit::Command, ControlBit::On]),
        );

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while pump.frequency() < 39999.0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(pump.frequency() >= 39999.0);
        assert!(pump.tick_failures() > 0);
    }

    #[test]
    fn control_bits_reach_the_hardware() {
        let pump = pump();
        let reply = ask(
            &pump,
            query(&pump).flags(&[ControlBit::Command, ControlBit::On]),
        );
        assert!(pump.is_on());
        assert!(reply.status_bits().contains(&StatusBit::Operation));
        assert!(reply.status_bits().contains(&StatusBit::ProcessChannel));
        assert_eq!(reply.temperature(), 30);
    }

    #[test]
    fn hardware_measurements_are_parameters() {
        let pump = pump();
        ask(
            &pump,
            query(&pump).flags(&[ControlBit::Command, ControlBit::On]),
        );
        let reply = ask(
            &pump,
            query(&pump).access_mode(AccessMode::Read).parameter_number(4),
        );
        assert_eq!(reply.parameter_value().as_number(), Number::Int(24));
        pump.with_state(|state| {
            assert_eq!(
                state.parameters.value(11),
                Some(&Value::from(Sint::new(30, 16).unwrap()))
            );
        });
    }

    #[test]
    fn close_stops_the_threads() {
        let mut pump = pump();
        let _port = pump.open_port().unwrap();
        pump.close().unwrap();
        assert!(pump.ticker.is_none());
        assert!(pump.connection.is_none());
        pump.close().unwrap();
    }
}
