//! Live parameter values and the rules for reading and writing them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::catalogue::{Catalogue, Limit, Parameter};
use crate::codes::{AccessCode, AccessMode, ParameterCode, ParameterError, ResponseMode};
use crate::config::CannotChangeReply;
use crate::error::Error;
use crate::numeric::{Number, Uint, Value};
use crate::telegram::TelegramReader;

/// Writing this parameter stores the settings in nonvolatile memory.
pub const SAVE_DATA: u16 = 8;

/// What goes into the value field of a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyValue {
    /// A parameter value, encoded after the parameter's type.
    Value(Value),
    /// Bits copied from the query.
    Raw(Uint),
    /// The value field holds the error code.
    Error(ParameterError),
}

/// The parameter half of a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterReply {
    pub mode: ResponseMode,
    pub number: u16,
    pub index: u16,
    pub value: ReplyValue,
}

impl ParameterReply {
    /// The error carried by this reply, if any.
    pub fn error(&self) -> Option<ParameterError> {
        match self.value {
            ReplyValue::Error(error) => Some(error),
            _ => None,
        }
    }
}

enum Refusal {
    Error(ParameterError),
    NoWrite,
}

impl From<ParameterError> for Refusal {
    fn from(error: ParameterError) -> Self {
        Refusal::Error(error)
    }
}

/// The values a pump currently holds for every catalogue parameter.
#[derive(Debug)]
pub struct ParameterStore {
    catalogue: Arc<Catalogue>,
    values: BTreeMap<u16, Vec<Value>>,
    cannot_change_reply: CannotChangeReply,
    save_duration: Duration,
    saving_until: Option<Instant>,
}

impl ParameterStore {
    /// A store holding every parameter's default value.
    pub fn new(catalogue: Arc<Catalogue>) -> Self {
        let values = catalogue
            .parameters()
            .map(|p| (p.number, p.initial_values()))
            .collect();
        Self {
            catalogue,
            values,
            cannot_change_reply: CannotChangeReply::default(),
            save_duration: Duration::ZERO,
            saving_until: None,
        }
    }

    pub fn with_cannot_change_reply(mut self, reply: CannotChangeReply) -> Self {
        self.cannot_change_reply = reply;
        self
    }

    /// Refuse writes for `duration` after the save-data parameter is
    /// written.
    pub fn with_save_duration(mut self, duration: Duration) -> Self {
        self.save_duration = duration;
        self
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }

    /// All live values of parameter `number`.
    pub fn values(&self, number: u16) -> Option<&[Value]> {
        self.values.get(&number).map(Vec::as_slice)
    }

    /// The first live value of parameter `number`.
    pub fn value(&self, number: u16) -> Option<&Value> {
        self.values(number).and_then(|v| v.first())
    }

    pub fn number(&self, number: u16) -> Option<Number> {
        self.value(number).map(Value::as_number)
    }

    /// Overwrite every live value of parameter `number`.
    ///
    /// Limits and writability are not checked; this is how the pump itself
    /// updates its measurements.
    pub fn set(&mut self, number: u16, value: impl Into<Number>) -> Result<(), Error> {
        let parameter = self
            .catalogue
            .parameter(number)
            .ok_or(Error::UnknownParameter(number))?;
        let value = parameter.datatype.value(value.into(), parameter.bits)?;
        if let Some(values) = self.values.get_mut(&number) {
            values.iter_mut().for_each(|v| *v = value.clone());
        }
        Ok(())
    }

    /// Whether a save started by writing P8 is still running.
    pub fn is_saving(&self) -> bool {
        self.saving_until.is_some_and(|until| Instant::now() < until)
    }

    /// Answer the parameter part of `query`.
    ///
    /// Protocol errors become error replies; this never fails.
    pub fn handle(&mut self, query: &TelegramReader) -> ParameterReply {
        let number = query.parameter_number();
        let index = query.parameter_index();
        let reply = |mode, value| ParameterReply {
            mode,
            number,
            index,
            value,
        };

        let code = query.access_code();
        let outcome = match code.mode() {
            AccessMode::None => {
                return reply(
                    ResponseMode::None,
                    ReplyValue::Raw(query.telegram().parameter_value),
                )
            }
            AccessMode::Invalid => Err(Refusal::Error(ParameterError::Other)),
            AccessMode::Read | AccessMode::Write => self.access(code, number, index, query),
        };

        match outcome {
            Ok(value) => reply(ResponseMode::Response, ReplyValue::Value(value)),
            Err(Refusal::Error(error)) => {
                warn!(number, index, code = ?code, %error, "parameter access refused");
                reply(ResponseMode::Error, ReplyValue::Error(error))
            }
            Err(Refusal::NoWrite) => {
                warn!(number, "write to a read-only parameter");
                reply(
                    ResponseMode::NoWrite,
                    ReplyValue::Raw(query.telegram().parameter_value),
                )
            }
        }
    }

    fn access(
        &mut self,
        code: AccessCode,
        number: u16,
        index: u16,
        query: &TelegramReader,
    ) -> Result<Value, Refusal> {
        let catalogue = Arc::clone(&self.catalogue);
        let parameter = catalogue
            .parameter(number)
            .ok_or(ParameterError::WrongNum)?;

        // Only write codes carry a width.
        if code.bits().is_some_and(|bits| bits != parameter.bits) {
            return Err(ParameterError::Access.into());
        }
        if code.indexed() != Some(parameter.is_indexed()) {
            return Err(ParameterError::Access.into());
        }
        let slot = parameter.slot(index).ok_or(ParameterError::Index)?;

        if code.mode() == AccessMode::Write {
            self.write(parameter, slot, query.parameter_value().as_number())?;
        }
        self.values
            .get(&number)
            .and_then(|values| values.get(slot))
            .cloned()
            .ok_or(Refusal::Error(ParameterError::Other))
    }

    fn write(&mut self, parameter: &Parameter, slot: usize, number: Number) -> Result<(), Refusal> {
        if self.is_saving() {
            return Err(ParameterError::Saving.into());
        }
        if !parameter.writable {
            return match self.cannot_change_reply {
                CannotChangeReply::Error => Err(ParameterError::CannotChange.into()),
                CannotChangeReply::NoWrite => Err(Refusal::NoWrite),
            };
        }

        let min = self.resolve(&parameter.min)?;
        let max = self.resolve(&parameter.max)?;
        // NaN compares false both ways and is refused too.
        if !(min <= number && number <= max) {
            return Err(ParameterError::MinMax.into());
        }
        let value = parameter
            .datatype
            .value(number, parameter.bits)
            .map_err(|_| ParameterError::MinMax)?;

        let values = self
            .values
            .get_mut(&parameter.number)
            .and_then(|values| values.get_mut(slot))
            .ok_or(ParameterError::Other)?;
        debug!(number = parameter.number, slot, %value, "parameter written");
        *values = value;

        if parameter.number == SAVE_DATA && !self.save_duration.is_zero() {
            self.saving_until = Some(Instant::now() + self.save_duration);
        }
        Ok(())
    }

    /// A limit as a number; references read the current value of the
    /// referenced parameter.
    fn resolve(&self, limit: &Limit) -> Result<Number, ParameterError> {
        match limit {
            Limit::Value(value) => Ok(value.as_number()),
            Limit::Reference(target) => self.number(*target).ok_or(ParameterError::Other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::TelegramBuilder;

    const TABLE: &str = r#"
        8        "Save data"   0    1     0        ""  r/w  u16    ""
        16       "Threshold"   0    150   120      C   r/w  u16    ""
        18       "Nominal"     0    1300  1200     Hz  r/w  u16    ""
        20       "Minimum"     0    P18   250      Hz  r/w  u16    ""
        24       "Setpoint"    P20  P18   1200     Hz  r/w  u16    ""
        28[1:3]  "Switching"   0    100   [80,50,20] %  r/w u16    ""
        40       "Counter"     0    65535 7        ""  r    u16    ""
        133      "Factor"      0.1  10.0  1.0      ""  r/w  real32 ""
        184      "Hours"       0    2147483647  0  h   r/w  s32    ""
    "#;

    fn catalogue() -> Arc<Catalogue> {
        Arc::new(Catalogue::from_tables(("test", TABLE), ("errors", ""), ("warnings", "")).unwrap())
    }

    fn store() -> ParameterStore {
        ParameterStore::new(catalogue())
    }

    fn read(number: u16, index: u16) -> TelegramReader {
        let telegram = TelegramBuilder::query(catalogue())
            .access_mode(AccessMode::Read)
            .parameter_number(number)
            .parameter_index(index)
            .build()
            .unwrap();
        TelegramReader::new(telegram, catalogue())
    }

    fn write(number: u16, index: u16, value: impl Into<Number>) -> TelegramReader {
        let telegram = TelegramBuilder::query(catalogue())
            .access_mode(AccessMode::Write)
            .parameter_number(number)
            .parameter_index(index)
            .parameter_value(value)
            .build()
            .unwrap();
        TelegramReader::new(telegram, catalogue())
    }

    fn with_code(code: AccessCode, number: u16, index: u16) -> TelegramReader {
        let telegram = TelegramBuilder::query(catalogue())
            .parameter_code(code.to_bin())
            .parameter_number(number)
            .parameter_index(index)
            .build()
            .unwrap();
        TelegramReader::new(telegram, catalogue())
    }

    fn value(reply: &ParameterReply) -> Number {
        match &reply.value {
            ReplyValue::Value(v) => v.as_number(),
            other => panic!("not a value: {:?}", other),
        }
    }

    #[test]
    fn defaults_are_loaded() {
        let store = store();
        assert_eq!(store.number(16), Some(Number::Int(120)));
        assert_eq!(store.values(28).unwrap().len(), 3);
        assert_eq!(store.values(28).unwrap()[2].as_number(), Number::Int(20));
        assert_eq!(store.value(99), None);
    }

    #[test]
    fn write_then_read() {
        let mut store = store();
        let reply = store.handle(&write(16, 0, 123));
        assert_eq!(reply.mode, ResponseMode::Response);
        assert_eq!(reply.number, 16);
        assert_eq!(value(&reply), Number::Int(123));

        let reply = store.handle(&read(16, 0));
        assert_eq!(reply.mode, ResponseMode::Response);
        assert_eq!(value(&reply), Number::Int(123));
    }

    #[test]
    fn out_of_range_writes() {
        let mut store = store();
        let reply = store.handle(&write(16, 0, 151));
        assert_eq!(reply.mode, ResponseMode::Error);
        assert_eq!(reply.error(), Some(ParameterError::MinMax));
        assert_eq!(store.number(16), Some(Number::Int(120)));

        let reply = store.handle(&write(133, 0, 10.5));
        assert_eq!(reply.error(), Some(ParameterError::MinMax));
        let reply = store.handle(&write(133, 0, 2.5));
        assert_eq!(value(&reply), Number::Float(2.5));
    }

    #[test]
    fn references_follow_live_values() {
        let mut store = store();
        assert_eq!(
            store.handle(&write(24, 0, 1000)).mode,
            ResponseMode::Response
        );
        // Lower the nominal frequency below the setpoint just written.
        assert_eq!(store.handle(&write(18, 0, 900)).mode, ResponseMode::Response);
        assert_eq!(
            store.handle(&write(24, 0, 1000)).error(),
            Some(ParameterError::MinMax)
        );
        assert_eq!(
            store.handle(&write(24, 0, 200)).error(),
            Some(ParameterError::MinMax)
        );
        assert_eq!(store.handle(&write(20, 0, 100)).mode, ResponseMode::Response);
        assert_eq!(value(&store.handle(&write(24, 0, 200))), Number::Int(200));
    }

    #[test]
    fn unknown_numbers() {
        let mut store = store();
        assert_eq!(store.handle(&read(99, 0)).error(), Some(ParameterError::WrongNum));
        assert_eq!(
            store.handle(&write(99, 0, 1)).error(),
            Some(ParameterError::WrongNum)
        );
    }

    #[test]
    fn indices() {
        let mut store = store();
        assert_eq!(value(&store.handle(&read(28, 2))), Number::Int(50));
        assert_eq!(store.handle(&read(28, 5)).error(), Some(ParameterError::Index));
        assert_eq!(store.handle(&read(28, 0)).error(), Some(ParameterError::Index));

        assert_eq!(value(&store.handle(&write(28, 3, 25))), Number::Int(25));
        assert_eq!(store.values(28).unwrap()[2].as_number(), Number::Int(25));
        assert_eq!(store.values(28).unwrap()[0].as_number(), Number::Int(80));
    }

    #[test]
    fn unindexed_parameters_ignore_the_index() {
        let mut store = store();
        let reply = store.handle(&read(16, 4));
        assert_eq!(reply.index, 4);
        assert_eq!(value(&reply), Number::Int(120));
    }

    #[test]
    fn code_shape_must_match() {
        let mut store = store();
        // Indexed code on an unindexed parameter and the other way round.
        assert_eq!(
            store.handle(&with_code(AccessCode::RF, 16, 0)).error(),
            Some(ParameterError::Access)
        );
        assert_eq!(
            store.handle(&with_code(AccessCode::R, 28, 1)).error(),
            Some(ParameterError::Access)
        );
        // 32-bit write to a 16-bit parameter.
        assert_eq!(
            store.handle(&with_code(AccessCode::W32, 16, 0)).error(),
            Some(ParameterError::Access)
        );
        // Reads do not check the width.
        assert_eq!(
            store.handle(&with_code(AccessCode::R, 184, 0)).mode,
            ResponseMode::Response
        );
    }

    #[test]
    fn invalid_codes() {
        let mut store = store();
        assert_eq!(
            store.handle(&with_code(AccessCode::Invalid, 16, 0)).error(),
            Some(ParameterError::Other)
        );
    }

    #[test]
    fn no_access_echoes_the_query() {
        let mut store = store();
        let telegram = TelegramBuilder::query(catalogue())
            .parameter_number(16)
            .parameter_index(3)
            .raw_parameter_value(Uint::new(0xDEAD_BEEF, 32).unwrap())
            .build()
            .unwrap();
        let reply = store.handle(&TelegramReader::new(telegram, catalogue()));
        assert_eq!(reply.mode, ResponseMode::None);
        assert_eq!(reply.number, 16);
        assert_eq!(reply.index, 3);
        assert_eq!(
            reply.value,
            ReplyValue::Raw(Uint::new(0xDEAD_BEEF, 32).unwrap())
        );
    }

    #[test]
    fn read_only_parameters() {
        let mut store = store();
        assert_eq!(
            store.handle(&write(40, 0, 1)).error(),
            Some(ParameterError::CannotChange)
        );
        assert_eq!(value(&store.handle(&read(40, 0))), Number::Int(7));

        let mut store = ParameterStore::new(catalogue())
            .with_cannot_change_reply(CannotChangeReply::NoWrite);
        let reply = store.handle(&write(40, 0, 1));
        assert_eq!(reply.mode, ResponseMode::NoWrite);
        assert_eq!(reply.error(), None);
        assert_eq!(store.number(40), Some(Number::Int(7)));
    }

    #[test]
    fn signed_values() {
        let mut store = store();
        assert_eq!(value(&store.handle(&write(184, 0, 5000))), Number::Int(5000));
        assert_eq!(
            store.handle(&write(184, 0, -1)).error(),
            Some(ParameterError::MinMax)
        );
    }

    #[test]
    fn saving_blocks_writes() {
        let mut store = ParameterStore::new(catalogue()).with_save_duration(Duration::from_secs(60));
        assert!(!store.is_saving());
        assert_eq!(store.handle(&write(8, 0, 1)).mode, ResponseMode::Response);
        assert!(store.is_saving());
        assert_eq!(
            store.handle(&write(16, 0, 10)).error(),
            Some(ParameterError::Saving)
        );
        // Reads still work.
        assert_eq!(value(&store.handle(&read(16, 0))), Number::Int(120));
    }

    #[test]
    fn saving_is_off_by_default() {
        let mut store = store();
        store.handle(&write(8, 0, 1));
        assert!(!store.is_saving());
        assert_eq!(store.handle(&write(16, 0, 10)).mode, ResponseMode::Response);
    }

    #[test]
    fn internal_updates_skip_the_checks() {
        let mut store = store();
        store.set(40, 9).unwrap();
        assert_eq!(store.number(40), Some(Number::Int(9)));
        store.set(28, 1).unwrap();
        assert!(store.values(28).unwrap().iter().all(|v| v.as_number() == Number::Int(1)));
        assert!(matches!(store.set(99, 1), Err(Error::UnknownParameter(99))));
        assert!(matches!(store.set(16, 70000), Err(Error::Value(_))));
    }
}
