//! Building and reading telegrams in terms of parameters instead of raw
//! bit fields.
//!
//! The catalogue decides how a parameter value is typed: a query to write
//! `-5` to a signed parameter puts the two's complement bits of `-5` in the
//! value field, and a reply about that parameter reads the field back as a
//! signed number.

use std::fmt;
use std::sync::Arc;

use crate::catalogue::{Catalogue, Parameter};
use crate::codes::{
    flags_to_bin, AccessCode, AccessMode, ControlBit, FlagBit, Family, ParameterCode,
    ParameterError, ResponseCode, ResponseMode, StatusBit, TelegramKind,
};
use crate::error::{CodeError, Error, FrameError};
use crate::frame::{Telegram, INDEX_BITS, NUMBER_BITS, PROCESS_BITS, VALUE_BITS};
use crate::numeric::{Bin, Data, DataType, Number, Sint, Uint, Value};

/// How the 4-bit parameter code is chosen.
#[derive(Debug, Clone, PartialEq)]
enum Code {
    Access(AccessMode),
    Response(ResponseMode),
    /// Used as is, even if it is not a valid code.
    Raw(Bin),
}

/// Type, width and indexing used to encode a parameter's value.
///
/// Numbers missing from the catalogue are treated as unindexed 16-bit
/// unsigned parameters so that they can still be queried.
fn parameter_shape(parameter: Option<&Parameter>) -> (DataType, u32, bool) {
    parameter.map_or((DataType::Uint, 16, false), |p| {
        (p.datatype, p.bits, p.is_indexed())
    })
}

/// Builds a query or a reply.
///
/// ```
/// use turboctl::catalogue::Catalogue;
/// use turboctl::codes::{AccessMode, ControlBit};
/// use turboctl::telegram::TelegramBuilder;
///
/// let catalogue = Catalogue::builtin().unwrap();
/// let bytes = TelegramBuilder::query(catalogue)
///     .access_mode(AccessMode::Write)
///     .parameter_number(16)
///     .parameter_value(123)
///     .flags(&[ControlBit::Command, ControlBit::On])
///     .to_bytes()
///     .unwrap();
/// assert_eq!(bytes.len(), 24);
/// ```
#[derive(Debug, Clone)]
pub struct TelegramBuilder {
    catalogue: Arc<Catalogue>,
    kind: TelegramKind,
    code: Code,
    number: u16,
    index: u16,
    value: Number,
    raw_value: Option<Uint>,
    flags: Bin,
    frequency: u16,
    temperature: i16,
    current: u16,
    voltage: u16,
}

impl TelegramBuilder {
    fn new(catalogue: Arc<Catalogue>, kind: TelegramKind, code: Code) -> Self {
        Self {
            catalogue,
            kind,
            code,
            number: 0,
            index: 0,
            value: Number::Int(0),
            raw_value: None,
            flags: Bin::zeros(16),
            frequency: 0,
            temperature: 0,
            current: 0,
            voltage: 0,
        }
    }

    /// An empty query with parameter mode `none`.
    pub fn query(catalogue: Arc<Catalogue>) -> Self {
        Self::new(catalogue, TelegramKind::Query, Code::Access(AccessMode::None))
    }

    /// An empty reply with parameter mode `none`.
    pub fn reply(catalogue: Arc<Catalogue>) -> Self {
        Self::new(catalogue, TelegramKind::Reply, Code::Response(ResponseMode::None))
    }

    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.code = Code::Access(mode);
        self
    }

    pub fn response_mode(mut self, mode: ResponseMode) -> Self {
        self.code = Code::Response(mode);
        self
    }

    /// Use `code` verbatim instead of deriving it from the mode.
    pub fn parameter_code(mut self, code: Bin) -> Self {
        self.code = Code::Raw(code);
        self
    }

    pub fn parameter_number(mut self, number: u16) -> Self {
        self.number = number;
        self
    }

    pub fn parameter_index(mut self, index: u16) -> Self {
        self.index = index;
        self
    }

    pub fn parameter_value(mut self, value: impl Into<Number>) -> Self {
        self.value = value.into();
        self.raw_value = None;
        self
    }

    /// Put `bits` in the value field as they are.
    pub fn raw_parameter_value(mut self, bits: Uint) -> Self {
        self.raw_value = Some(bits);
        self
    }

    /// Set exactly `flags`; all other flag bits are cleared.
    pub fn flags<F: FlagBit>(mut self, flags: &[F]) -> Self {
        self.flags = flags_to_bin(flags);
        self
    }

    pub fn frequency(mut self, hz: u16) -> Self {
        self.frequency = hz;
        self
    }

    pub fn temperature(mut self, celsius: i16) -> Self {
        self.temperature = celsius;
        self
    }

    pub fn current(mut self, deciamps: u16) -> Self {
        self.current = deciamps;
        self
    }

    pub fn voltage(mut self, decivolts: u16) -> Self {
        self.voltage = decivolts;
        self
    }

    pub fn build(&self) -> Result<Telegram, Error> {
        let (datatype, bits, indexed) = parameter_shape(self.catalogue.parameter(self.number));

        let code = match (&self.code, self.kind) {
            (Code::Access(mode), TelegramKind::Query) => {
                AccessCode::lookup(*mode, indexed, bits)?.to_bin()
            }
            (Code::Response(mode), TelegramKind::Reply) => {
                ResponseCode::lookup(*mode, indexed, bits)?.to_bin()
            }
            (Code::Raw(code), _) => code.clone(),
            (Code::Access(mode), TelegramKind::Reply) => {
                return Err(mismatch(ResponseCode::KIND, mode.name(), indexed, bits))
            }
            (Code::Response(mode), TelegramKind::Query) => {
                return Err(mismatch(AccessCode::KIND, mode.name(), indexed, bits))
            }
        };

        // Error codes are unsigned whatever the parameter's type.
        let value = if let Some(raw) = self.raw_value {
            Value::Uint(raw)
        } else if self.code == Code::Response(ResponseMode::Error) {
            DataType::Uint.value(self.value, VALUE_BITS)?
        } else {
            datatype.value(self.value, VALUE_BITS)?
        };

        let mut telegram = Telegram::new(self.kind);
        telegram.parameter_code = code;
        telegram.parameter_number = Uint::new(u64::from(self.number), NUMBER_BITS)?;
        telegram.parameter_index = Uint::new(u64::from(self.index), INDEX_BITS)?;
        telegram.parameter_value = Uint::from_bin(&value.to_bin())?;
        telegram.flag_bits = self.flags.clone();
        telegram.frequency = Uint::new(u64::from(self.frequency), PROCESS_BITS)?;
        telegram.temperature = Sint::new(i64::from(self.temperature), PROCESS_BITS)?;
        telegram.current = Uint::new(u64::from(self.current), PROCESS_BITS)?;
        telegram.voltage = Uint::new(u64::from(self.voltage), PROCESS_BITS)?;
        Ok(telegram)
    }

    /// [`build`](Self::build) and encode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(self.build()?.to_bytes()?)
    }
}

fn mismatch(kind: &'static str, family: &'static str, indexed: bool, bits: u32) -> Error {
    Error::Code(CodeError::NoMatch {
        kind,
        family,
        indexed,
        bits,
    })
}

/// Typed view of a decoded telegram.
#[derive(Debug, Clone)]
pub struct TelegramReader {
    telegram: Telegram,
    catalogue: Arc<Catalogue>,
}

impl TelegramReader {
    pub fn new(telegram: Telegram, catalogue: Arc<Catalogue>) -> Self {
        Self {
            telegram,
            catalogue,
        }
    }

    /// Decode `bytes` as a telegram of the given kind.
    pub fn from_bytes(
        bytes: &[u8],
        kind: TelegramKind,
        catalogue: Arc<Catalogue>,
    ) -> Result<Self, FrameError> {
        Ok(Self::new(Telegram::from_bytes(bytes, kind)?, catalogue))
    }

    pub fn telegram(&self) -> &Telegram {
        &self.telegram
    }

    pub fn into_telegram(self) -> Telegram {
        self.telegram
    }

    pub fn kind(&self) -> TelegramKind {
        self.telegram.kind
    }

    /// The parameter code read as a query code.
    pub fn access_code(&self) -> AccessCode {
        AccessCode::from_bin(&self.telegram.parameter_code)
    }

    /// The parameter code read as a reply code.
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from_bin(&self.telegram.parameter_code)
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_code().mode()
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.response_code().mode()
    }

    pub fn parameter_number(&self) -> u16 {
        // 11 bits wide.
        self.telegram.parameter_number.value() as u16
    }

    pub fn parameter_index(&self) -> u16 {
        // 8 bits wide.
        self.telegram.parameter_index.value() as u16
    }

    /// Catalogue entry of the addressed parameter, if there is one.
    pub fn parameter(&self) -> Option<&Parameter> {
        self.catalogue.parameter(self.parameter_number())
    }

    /// The value field typed after the addressed parameter.
    ///
    /// The raw bits are returned as a 32-bit [`Uint`] for unknown parameters
    /// and for error replies.
    pub fn parameter_value(&self) -> Value {
        let raw = self.telegram.parameter_value;
        if self.is_error() {
            return Value::Uint(raw);
        }
        let (datatype, _, _) = parameter_shape(self.parameter());
        Value::from_bin(datatype.kind(), &raw.to_bin()).unwrap_or(Value::Uint(raw))
    }

    /// The value field as an unsigned integer, which is where error
    /// replies put their error code.
    pub fn error_code(&self) -> u32 {
        // 32 bits wide.
        self.telegram.parameter_value.value() as u32
    }

    /// The parameter error of an error reply.
    ///
    /// `None` for other telegrams and for error codes this crate does not
    /// know; [`error_code`](Self::error_code) still has the number.
    pub fn error(&self) -> Option<ParameterError> {
        if !self.is_error() {
            return None;
        }
        ParameterError::from_code(u64::from(self.error_code()))
    }

    fn is_error(&self) -> bool {
        self.kind() == TelegramKind::Reply && self.response_mode() == ResponseMode::Error
    }

    pub fn flags<F: FlagBit>(&self) -> Vec<F> {
        self.telegram.flags()
    }

    pub fn control_bits(&self) -> Vec<ControlBit> {
        self.flags()
    }

    pub fn status_bits(&self) -> Vec<StatusBit> {
        self.flags()
    }

    pub fn frequency(&self) -> u16 {
        self.telegram.frequency.value() as u16
    }

    pub fn temperature(&self) -> i16 {
        self.telegram.temperature.value() as i16
    }

    pub fn current(&self) -> u16 {
        self.telegram.current.value() as u16
    }

    pub fn voltage(&self) -> u16 {
        self.telegram.voltage.value() as u16
    }
}

impl fmt::Display for TelegramReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.telegram.parameter_code.value();
        match self.kind() {
            TelegramKind::Query => write!(f, "query {} ({:?})", code, self.access_mode())?,
            TelegramKind::Reply => write!(f, "reply {} ({:?})", code, self.response_mode())?,
        }
        write!(
            f,
            " P{}[{}] = ",
            self.parameter_number(),
            self.parameter_index()
        )?;
        match self.error() {
            Some(error) => write!(f, "{}", error)?,
            None => write!(f, "{}", self.parameter_value())?,
        }
        write!(
            f,
            ", {} Hz, {} °C, {} dA, {} dV, flags ",
            self.frequency(),
            self.temperature(),
            self.current(),
            self.voltage()
        )?;
        let names: Vec<String> = match self.kind() {
            TelegramKind::Query => self.control_bits().iter().map(|b| format!("{:?}", b)).collect(),
            TelegramKind::Reply => self.status_bits().iter().map(|b| format!("{:?}", b)).collect(),
        };
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::checksum;
    use crate::numeric::Float;

    fn catalogue() -> Arc<Catalogue> {
        Catalogue::builtin().unwrap()
    }

    #[test]
    fn write_query_for_a_known_parameter() {
        let telegram = TelegramBuilder::query(catalogue())
            .access_mode(AccessMode::Write)
            .parameter_number(16)
            .parameter_value(123)
            .build()
            .unwrap();
        assert_eq!(telegram.kind, TelegramKind::Query);
        assert_eq!(telegram.parameter_code, AccessCode::W16.to_bin());
        assert_eq!(telegram.parameter_number.value(), 16);
        assert_eq!(telegram.parameter_value.value(), 123);
    }

    #[test]
    fn codes_follow_the_parameter_shape() {
        let code = |number: u16, mode: AccessMode| {
            TelegramBuilder::query(catalogue())
                .access_mode(mode)
                .parameter_number(number)
                .build()
                .unwrap()
                .parameter_code
        };
        assert_eq!(code(171, AccessMode::Read), AccessCode::RF.to_bin());
        assert_eq!(code(176, AccessMode::Write), AccessCode::W32F.to_bin());
        assert_eq!(code(184, AccessMode::Write), AccessCode::W32.to_bin());
        assert_eq!(code(3, AccessMode::Read), AccessCode::R.to_bin());
        // Unknown numbers are treated as unindexed 16-bit parameters.
        assert_eq!(code(9, AccessMode::Write), AccessCode::W16.to_bin());
    }

    #[test]
    fn signed_values_are_sign_extended() {
        let telegram = TelegramBuilder::query(catalogue())
            .access_mode(AccessMode::Write)
            .parameter_number(7)
            .parameter_value(-2)
            .build()
            .unwrap();
        assert_eq!(telegram.parameter_value.value(), 0xFFFF_FFFE);
        let reader = TelegramReader::new(telegram, catalogue());
        assert_eq!(
            reader.parameter_value(),
            Value::Sint(Sint::new(-2, 32).unwrap())
        );
    }

    #[test]
    fn float_values_use_ieee_bits() {
        let telegram = TelegramBuilder::query(catalogue())
            .access_mode(AccessMode::Write)
            .parameter_number(133)
            .parameter_value(1.5)
            .build()
            .unwrap();
        assert_eq!(telegram.parameter_value.value(), u64::from(1.5f32.to_bits()));
        let reader = TelegramReader::new(telegram, catalogue());
        assert_eq!(
            reader.parameter_value(),
            Value::Float(Float::new(1.5).unwrap())
        );
    }

    #[test]
    fn integer_parameters_reject_fractions() {
        let result = TelegramBuilder::query(catalogue())
            .access_mode(AccessMode::Write)
            .parameter_number(16)
            .parameter_value(1.5)
            .build();
        assert!(matches!(result, Err(Error::Value(_))));
    }

    #[test]
    fn out_of_range_fields_are_errors() {
        let too_big = TelegramBuilder::query(catalogue())
            .parameter_number(2048)
            .build();
        assert!(matches!(too_big, Err(Error::Value(_))));
        let bad_index = TelegramBuilder::query(catalogue())
            .parameter_index(256)
            .build();
        assert!(matches!(bad_index, Err(Error::Value(_))));
    }

    #[test]
    fn modes_must_match_the_kind() {
        let result = TelegramBuilder::query(catalogue())
            .response_mode(ResponseMode::Response)
            .build();
        assert!(matches!(result, Err(Error::Code(_))));
    }

    #[test]
    fn raw_values_are_copied_bit_for_bit() {
        let nan_bits = Uint::new(0x7FC0_0001, 32).unwrap();
        let telegram = TelegramBuilder::reply(catalogue())
            .parameter_number(133)
            .raw_parameter_value(nan_bits)
            .build()
            .unwrap();
        assert_eq!(telegram.parameter_value, nan_bits);
        let wide = TelegramBuilder::reply(catalogue())
            .raw_parameter_value(Uint::new(1, 16).unwrap())
            .build()
            .unwrap();
        assert!(wide.to_bytes().is_err());
    }

    #[test]
    fn raw_codes_are_kept() {
        let invalid = Bin::new("1111").unwrap();
        let telegram = TelegramBuilder::query(catalogue())
            .parameter_code(invalid.clone())
            .build()
            .unwrap();
        assert_eq!(telegram.parameter_code, invalid);
        let reader = TelegramReader::new(telegram, catalogue());
        assert_eq!(reader.access_mode(), AccessMode::Invalid);
    }

    #[test]
    fn error_replies() {
        let bytes = TelegramBuilder::reply(catalogue())
            .response_mode(ResponseMode::Error)
            .parameter_number(133)
            .parameter_value(ParameterError::MinMax.code())
            .to_bytes()
            .unwrap();
        let reader =
            TelegramReader::from_bytes(&bytes, TelegramKind::Reply, catalogue()).unwrap();
        assert_eq!(reader.response_mode(), ResponseMode::Error);
        assert_eq!(reader.error_code(), 2);
        assert_eq!(reader.error(), Some(ParameterError::MinMax));
        assert_eq!(reader.parameter_value(), Value::Uint(Uint::new(2, 32).unwrap()));

        let unknown = TelegramBuilder::reply(catalogue())
            .response_mode(ResponseMode::Error)
            .parameter_value(77)
            .build()
            .unwrap();
        let reader = TelegramReader::new(unknown, catalogue());
        assert_eq!(reader.error_code(), 77);
        assert_eq!(reader.error(), None);
    }

    #[test]
    fn response_is_not_an_error() {
        let telegram = TelegramBuilder::reply(catalogue())
            .response_mode(ResponseMode::Response)
            .parameter_number(16)
            .parameter_value(2)
            .build()
            .unwrap();
        let reader = TelegramReader::new(telegram, catalogue());
        assert_eq!(reader.error(), None);
        assert_eq!(reader.response_code(), ResponseCode::S16);
    }

    #[test]
    fn hardware_fields_and_flags() {
        let bytes = TelegramBuilder::reply(catalogue())
            .flags(&[StatusBit::Operation, StatusBit::Turning])
            .frequency(820)
            .temperature(-3)
            .current(10)
            .voltage(24)
            .to_bytes()
            .unwrap();
        assert_eq!(bytes[23], checksum(&bytes[..23]));
        let reader =
            TelegramReader::from_bytes(&bytes, TelegramKind::Reply, catalogue()).unwrap();
        assert_eq!(
            reader.status_bits(),
            vec![StatusBit::Operation, StatusBit::Turning]
        );
        assert_eq!(reader.frequency(), 820);
        assert_eq!(reader.temperature(), -3);
        assert_eq!(reader.current(), 10);
        assert_eq!(reader.voltage(), 24);
        let text = reader.to_string();
        assert!(text.contains("820 Hz"));
        assert!(text.contains("Turning"));
    }
}
