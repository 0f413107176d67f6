//! The 24-byte telegram frame.
//!
//! ```text
//! byte  0      STX = 2
//! byte  1      LGE = 22
//! byte  2      ADR
//! bytes 3-4    PKE: 4-bit code, 1 spare bit, 11-bit parameter number
//! byte  5      reserved
//! byte  6      IND: parameter index
//! bytes 7-10   PWE: parameter value
//! bytes 11-12  PZD1: flag bits, bit 0 last
//! bytes 13-14  PZD2: frequency (Hz)
//! bytes 15-16  PZD3: temperature (°C, signed)
//! bytes 17-18  PZD4: current (0.1 A)
//! bytes 19-20  reserved
//! bytes 21-22  PZD6: voltage (0.1 V)
//! byte  23     checksum, XOR of bytes 0-22
//! ```

use tracing::warn;

use crate::codes::{flags_from_bin, flags_to_bin, FlagBit, TelegramKind, CODE_BITS, FLAG_BITS};
use crate::error::FrameError;
use crate::numeric::{Bin, Data, Sint, Uint};

/// Length of a telegram in bytes.
pub const TELEGRAM_LENGTH: usize = 24;

/// Start of text.
pub const STX: u8 = 2;

/// Number of bytes after LGE.
pub const LGE: u8 = 22;

pub const NUMBER_BITS: u32 = 11;
pub const INDEX_BITS: u32 = 8;
pub const VALUE_BITS: u32 = 32;
pub const PROCESS_BITS: u32 = 16;

/// XOR of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Bits the protocol does not use.
///
/// They are zero in every telegram this crate builds and are kept when
/// decoding, so a decoded frame encodes back to the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reserved {
    /// The bit between the parameter code and the parameter number.
    pub pke: bool,
    /// Byte 5.
    pub byte: u8,
    /// Bytes 19-20.
    pub word: u16,
}

/// One decoded telegram.
///
/// `parameter_code` is read through [`AccessCode`](crate::codes::AccessCode)
/// or [`ResponseCode`](crate::codes::ResponseCode) depending on `kind`.
/// `flag_bits` is in logical order: character `i` is flag `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Telegram {
    pub kind: TelegramKind,
    pub address: Uint,
    pub parameter_code: Bin,
    pub parameter_number: Uint,
    pub parameter_index: Uint,
    pub parameter_value: Uint,
    pub flag_bits: Bin,
    pub frequency: Uint,
    pub temperature: Sint,
    pub current: Uint,
    pub voltage: Uint,
    pub reserved: Reserved,
}

fn check_width<T: Data>(field: &'static str, value: &T, expected: u32) -> Result<Bin, FrameError> {
    if value.bits() != expected {
        return Err(FrameError::FieldWidth {
            field,
            expected,
            actual: value.bits(),
        });
    }
    Ok(value.to_bin())
}

impl Telegram {
    /// A telegram with every field zero.
    pub fn new(kind: TelegramKind) -> Self {
        Self {
            kind,
            address: Uint::zero(8),
            parameter_code: Bin::zeros(CODE_BITS),
            parameter_number: Uint::zero(NUMBER_BITS),
            parameter_index: Uint::zero(INDEX_BITS),
            parameter_value: Uint::zero(VALUE_BITS),
            flag_bits: Bin::zeros(FLAG_BITS as u32),
            frequency: Uint::zero(PROCESS_BITS),
            temperature: Sint::zero(PROCESS_BITS),
            current: Uint::zero(PROCESS_BITS),
            voltage: Uint::zero(PROCESS_BITS),
            reserved: Reserved::default(),
        }
    }

    /// The flags set in `flag_bits`.
    pub fn flags<F: FlagBit>(&self) -> Vec<F> {
        flags_from_bin(&self.flag_bits)
    }

    /// Replace `flag_bits` with exactly `flags`.
    pub fn set_flags<F: FlagBit>(&mut self, flags: &[F]) {
        self.flag_bits = flags_to_bin(flags);
    }

    /// Encode into 24 bytes with a fresh checksum.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let reserved_pke = Bin::from_bools([self.reserved.pke]);
        let fields = [
            Bin::from_unsigned(u64::from(STX), 8),
            Bin::from_unsigned(u64::from(LGE), 8),
            check_width("address", &self.address, 8)?,
            check_width("parameter_code", &self.parameter_code, CODE_BITS)?,
            reserved_pke,
            check_width("parameter_number", &self.parameter_number, NUMBER_BITS)?,
            Bin::from_unsigned(u64::from(self.reserved.byte), 8),
            check_width("parameter_index", &self.parameter_index, INDEX_BITS)?,
            check_width("parameter_value", &self.parameter_value, VALUE_BITS)?,
            check_width("flag_bits", &self.flag_bits, FLAG_BITS as u32)?.reversed(),
            check_width("frequency", &self.frequency, PROCESS_BITS)?,
            check_width("temperature", &self.temperature, PROCESS_BITS)?,
            check_width("current", &self.current, PROCESS_BITS)?,
            Bin::from_unsigned(u64::from(self.reserved.word), 16),
            check_width("voltage", &self.voltage, PROCESS_BITS)?,
        ];
        let body = fields.iter().fold(Bin::default(), |acc, field| acc.concat(field));
        let mut bytes = body.pack();
        bytes.push(checksum(&bytes));
        Ok(bytes)
    }

    /// Decode 24 bytes, validating length, STX, LGE and checksum.
    pub fn from_bytes(bytes: &[u8], kind: TelegramKind) -> Result<Self, FrameError> {
        if bytes.len() != TELEGRAM_LENGTH {
            return Err(FrameError::Length(bytes.len()));
        }
        if bytes[0] != STX {
            return Err(FrameError::Stx(bytes[0]));
        }
        if bytes[1] != LGE {
            return Err(FrameError::Lge(bytes[1]));
        }
        let expected = checksum(&bytes[..TELEGRAM_LENGTH - 1]);
        let actual = bytes[TELEGRAM_LENGTH - 1];
        if expected != actual {
            return Err(FrameError::Checksum { expected, actual });
        }

        let bits = Bin::unpack(&bytes[..TELEGRAM_LENGTH - 1]);
        let field = |start: usize, len: u32| bits.slice(start..start + len as usize);
        let word = |start: usize| -> Result<Uint, FrameError> {
            Ok(Uint::from_bin(&field(start, PROCESS_BITS)?)?)
        };

        Ok(Self {
            kind,
            address: Uint::from_bin(&field(16, 8)?)?,
            parameter_code: field(24, CODE_BITS)?,
            parameter_number: Uint::from_bin(&field(29, NUMBER_BITS)?)?,
            parameter_index: Uint::from_bin(&field(48, INDEX_BITS)?)?,
            parameter_value: Uint::from_bin(&field(56, VALUE_BITS)?)?,
            flag_bits: field(88, PROCESS_BITS)?.reversed(),
            frequency: word(104)?,
            temperature: Sint::from_bin(&field(120, PROCESS_BITS)?)?,
            current: word(136)?,
            voltage: word(168)?,
            reserved: Reserved {
                pke: bits.bit(28).unwrap_or(false),
                byte: bytes[5],
                word: u16::from_be_bytes([bytes[19], bytes[20]]),
            },
        })
    }
}

/// Splits a byte stream into telegrams.
///
/// Bytes before a start byte are skipped. When the 24 bytes from a start
/// byte are not a valid frame, only that start byte is dropped and the
/// search resumes at the next STX.
#[derive(Debug, Default)]
pub struct TelegramStream {
    pending: Vec<u8>,
}

impl TelegramStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `bytes` and return every complete telegram found so far.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut telegrams = Vec::new();
        loop {
            let start = self
                .pending
                .iter()
                .position(|&b| b == STX)
                .unwrap_or(self.pending.len());
            if start > 0 {
                warn!(skipped = %hex::encode(&self.pending[..start]), "skipping bytes before STX");
                self.pending.drain(..start);
            }
            if self.pending.get(1).is_some_and(|&b| b != LGE) {
                self.pending.remove(0);
                continue;
            }
            if self.pending.len() < TELEGRAM_LENGTH {
                break;
            }
            let candidate = &self.pending[..TELEGRAM_LENGTH];
            if checksum(&candidate[..TELEGRAM_LENGTH - 1]) == candidate[TELEGRAM_LENGTH - 1] {
                telegrams.push(self.pending.drain(..TELEGRAM_LENGTH).collect());
            } else {
                warn!(bytes = %hex::encode(candidate), "false start byte");
                self.pending.remove(0);
            }
        }
        telegrams
    }

    /// Bytes of a telegram that has not been completed yet.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drop the incomplete telegram and return its bytes.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}
