//! Error types for the telegram codec, the parameter catalogue and the
//! virtual pump.
//!
//! Protocol-level parameter errors (`WRONG_NUM`, `MINMAX`, ...) are not
//! represented here: they travel inside reply telegrams as data, see
//! [`crate::codes::ParameterError`].

use thiserror::Error;

/// Failures when constructing or converting fixed-width numeric values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Integer does not fit in the requested number of bits.
    #[error("{kind} value {value} does not fit in {bits} bits")]
    OutOfRange {
        kind: &'static str,
        value: i128,
        bits: u32,
    },

    /// The requested width is larger than the kind can hold.
    #[error("{kind} cannot be {bits} bits wide (max {max})")]
    TooWide {
        kind: &'static str,
        bits: u32,
        max: u32,
    },

    /// A float is too large in magnitude for single precision.
    #[error("{0} is too large to be a single-precision float")]
    FloatOverflow(f64),

    /// Floats are always exactly 32 bits.
    #[error("a float must be 32 bits, not {0}")]
    FloatWidth(u32),

    /// A binary string contains something other than '0' and '1'.
    #[error("{0:?} is not a binary string")]
    InvalidBinary(String),

    /// An explicit width disagrees with the length of a binary string.
    #[error("bits ({bits}) != length of {value:?}")]
    BitsMismatch { value: String, bits: u32 },

    /// A byte buffer does not have the length implied by a bit width.
    #[error("{bits} bits need {expected} bytes, got {actual}")]
    ByteLength {
        bits: u32,
        expected: usize,
        actual: usize,
    },

    /// A bit range reaches past the end of the value.
    #[error("bit range {start}..{end} is out of bounds for {bits} bits")]
    SliceOutOfBounds { start: usize, end: usize, bits: u32 },

    /// The value's category does not match the target datatype.
    #[error("cannot represent {value} as {kind}")]
    WrongType { value: String, kind: &'static str },
}

/// Failures when decoding a 24-byte telegram.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("telegram must be 24 bytes, not {0}")]
    Length(usize),

    #[error("STX byte should be 2, not {0}")]
    Stx(u8),

    #[error("LGE byte should be 22, not {0}")]
    Lge(u8),

    #[error("checksum should be {expected}, not {actual}")]
    Checksum { expected: u8, actual: u8 },

    /// A telegram field holds a value of the wrong width.
    #[error("{field} must be {expected} bits, not {actual}")]
    FieldWidth {
        field: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Parameter code table lookups that do not resolve to exactly one code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("no {kind} code matches family {family}, indexed={indexed}, bits={bits}")]
    NoMatch {
        kind: &'static str,
        family: &'static str,
        indexed: bool,
        bits: u32,
    },

    #[error("{count} {kind} codes match family {family}, indexed={indexed}, bits={bits}")]
    Ambiguous {
        kind: &'static str,
        family: &'static str,
        indexed: bool,
        bits: u32,
        count: usize,
    },
}

/// Failures when loading a parameter, error or warning table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogueError {
    #[error("line {line} of {source_name} could not be parsed: {message}")]
    Line {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("{source_name} defines number {number} more than once")]
    Duplicate { source_name: String, number: u16 },

    #[error("parameter {number} refers to missing parameter P{target}")]
    DanglingReference { number: u16, target: u16 },
}

/// Invalid pump configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Code(#[from] CodeError),

    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("parameter {0} is not in the catalogue")]
    UnknownParameter(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("{0} did not stop within {1} ms")]
    ShutdownTimeout(&'static str, u64),
}

pub type Result<T> = std::result::Result<T, Error>;
