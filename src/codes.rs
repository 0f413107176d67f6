//! Parameter access/response codes, parameter error codes and the
//! control/status flag bits.

use std::fmt;

use crate::error::CodeError;
use crate::numeric::Bin;

/// Width of the parameter code field in bits.
pub const CODE_BITS: u32 = 4;

/// Number of control or status flag bits in a telegram.
pub const FLAG_BITS: usize = 16;

/// Direction of a telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelegramKind {
    /// Host to pump.
    Query,
    /// Pump to host.
    Reply,
}

/// A group of codes that share a meaning ("read", "write", ...).
pub trait Family: Copy + PartialEq + fmt::Debug {
    fn name(self) -> &'static str;
}

/// Families of query codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    None,
    Read,
    Write,
    Invalid,
}

impl Family for AccessMode {
    fn name(self) -> &'static str {
        match self {
            AccessMode::None => "none",
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Invalid => "invalid",
        }
    }
}

/// Families of reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseMode {
    None,
    Response,
    Error,
    NoWrite,
    Invalid,
}

impl Family for ResponseMode {
    fn name(self) -> &'static str {
        match self {
            ResponseMode::None => "none",
            ResponseMode::Response => "response",
            ResponseMode::Error => "error",
            ResponseMode::NoWrite => "no write",
            ResponseMode::Invalid => "invalid",
        }
    }
}

/// Shared behaviour of [`AccessCode`] and [`ResponseCode`].
///
/// A code belongs to a family and may be restricted to indexed or
/// unindexed parameters and to 16 or 32 bit values; `None` in
/// [`indexed`](ParameterCode::indexed) or [`bits`](ParameterCode::bits)
/// means the code applies to both.
pub trait ParameterCode: Copy + PartialEq + fmt::Debug + 'static {
    type Mode: Family;

    const KIND: &'static str;

    /// Every code, the invalid one included.
    const ALL: &'static [Self];

    const INVALID: Self;

    /// The 4-bit code as an integer.
    fn code(self) -> u8;

    fn mode(self) -> Self::Mode;

    fn indexed(self) -> Option<bool>;

    fn bits(self) -> Option<u32>;

    fn to_bin(self) -> Bin {
        Bin::from_unsigned(u64::from(self.code()), CODE_BITS)
    }

    /// The code with the given bit pattern, or the invalid code when no code
    /// has that pattern.
    fn from_bin(bin: &Bin) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.to_bin() == *bin)
            .unwrap_or(Self::INVALID)
    }

    /// The single code for the given family, indexing and width.
    ///
    /// Zero or several matches mean the code table is wrong.
    fn lookup(mode: Self::Mode, indexed: bool, bits: u32) -> Result<Self, CodeError> {
        let matches: Vec<Self> = Self::ALL
            .iter()
            .copied()
            .filter(|c| c.mode() == mode)
            .filter(|c| c.indexed().map_or(true, |i| i == indexed))
            .filter(|c| c.bits().map_or(true, |b| b == bits))
            .collect();
        match matches.as_slice() {
            [code] => Ok(*code),
            [] => Err(CodeError::NoMatch {
                kind: Self::KIND,
                family: mode.name(),
                indexed,
                bits,
            }),
            _ => Err(CodeError::Ambiguous {
                kind: Self::KIND,
                family: mode.name(),
                indexed,
                bits,
                count: matches.len(),
            }),
        }
    }
}

/// Codes of query telegrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessCode {
    /// No access.
    None,
    /// Read an unindexed parameter.
    R,
    /// Write a 16-bit unindexed parameter.
    W16,
    /// Write a 32-bit unindexed parameter.
    W32,
    /// Read an indexed parameter.
    RF,
    /// Write a 16-bit indexed parameter.
    W16F,
    /// Write a 32-bit indexed parameter.
    W32F,
    Invalid,
}

impl ParameterCode for AccessCode {
    type Mode = AccessMode;

    const KIND: &'static str = "access";

    const ALL: &'static [Self] = &[
        AccessCode::None,
        AccessCode::R,
        AccessCode::W16,
        AccessCode::W32,
        AccessCode::RF,
        AccessCode::W16F,
        AccessCode::W32F,
        AccessCode::Invalid,
    ];

    const INVALID: Self = AccessCode::Invalid;

    fn code(self) -> u8 {
        match self {
            AccessCode::None => 0b0000,
            AccessCode::R => 0b0001,
            AccessCode::W16 => 0b0010,
            AccessCode::W32 => 0b0011,
            AccessCode::RF => 0b0110,
            AccessCode::W16F => 0b0111,
            AccessCode::W32F => 0b1000,
            AccessCode::Invalid => 0b1111,
        }
    }

    fn mode(self) -> AccessMode {
        match self {
            AccessCode::None => AccessMode::None,
            AccessCode::R | AccessCode::RF => AccessMode::Read,
            AccessCode::W16 | AccessCode::W32 | AccessCode::W16F | AccessCode::W32F => {
                AccessMode::Write
            }
            AccessCode::Invalid => AccessMode::Invalid,
        }
    }

    fn indexed(self) -> Option<bool> {
        match self {
            AccessCode::R | AccessCode::W16 | AccessCode::W32 => Some(false),
            AccessCode::RF | AccessCode::W16F | AccessCode::W32F => Some(true),
            AccessCode::None | AccessCode::Invalid => None,
        }
    }

    fn bits(self) -> Option<u32> {
        match self {
            AccessCode::W16 | AccessCode::W16F => Some(16),
            AccessCode::W32 | AccessCode::W32F => Some(32),
            _ => None,
        }
    }
}

/// Codes of reply telegrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// No response.
    None,
    /// 16-bit value of an unindexed parameter.
    S16,
    /// 32-bit value of an unindexed parameter.
    S32,
    /// 16-bit value of an indexed parameter.
    S16F,
    /// 32-bit value of an indexed parameter.
    S32F,
    /// The value field holds a [`ParameterError`] code.
    Error,
    /// The parameter cannot be written.
    NoWrite,
    Invalid,
}

impl ParameterCode for ResponseCode {
    type Mode = ResponseMode;

    const KIND: &'static str = "response";

    const ALL: &'static [Self] = &[
        ResponseCode::None,
        ResponseCode::S16,
        ResponseCode::S32,
        ResponseCode::S16F,
        ResponseCode::S32F,
        ResponseCode::Error,
        ResponseCode::NoWrite,
        ResponseCode::Invalid,
    ];

    const INVALID: Self = ResponseCode::Invalid;

    fn code(self) -> u8 {
        match self {
            ResponseCode::None => 0b0000,
            ResponseCode::S16 => 0b0001,
            ResponseCode::S32 => 0b0010,
            ResponseCode::S16F => 0b0100,
            ResponseCode::S32F => 0b0101,
            ResponseCode::Error => 0b0111,
            ResponseCode::NoWrite => 0b1000,
            ResponseCode::Invalid => 0b1111,
        }
    }

    fn mode(self) -> ResponseMode {
        match self {
            ResponseCode::None => ResponseMode::None,
            ResponseCode::S16 | ResponseCode::S32 | ResponseCode::S16F | ResponseCode::S32F => {
                ResponseMode::Response
            }
            ResponseCode::Error => ResponseMode::Error,
            ResponseCode::NoWrite => ResponseMode::NoWrite,
            ResponseCode::Invalid => ResponseMode::Invalid,
        }
    }

    fn indexed(self) -> Option<bool> {
        match self {
            ResponseCode::S16 | ResponseCode::S32 => Some(false),
            ResponseCode::S16F | ResponseCode::S32F => Some(true),
            _ => None,
        }
    }

    fn bits(self) -> Option<u32> {
        match self {
            ResponseCode::S16 | ResponseCode::S16F => Some(16),
            ResponseCode::S32 | ResponseCode::S32F => Some(32),
            _ => None,
        }
    }
}

/// Errors a pump reports in place of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterError {
    WrongNum,
    CannotChange,
    MinMax,
    Index,
    Access,
    Other,
    Saving,
}

impl ParameterError {
    pub const ALL: [ParameterError; 7] = [
        ParameterError::WrongNum,
        ParameterError::CannotChange,
        ParameterError::MinMax,
        ParameterError::Index,
        ParameterError::Access,
        ParameterError::Other,
        ParameterError::Saving,
    ];

    /// The number carried in the value field of an error reply.
    pub fn code(self) -> u32 {
        match self {
            ParameterError::WrongNum => 0,
            ParameterError::CannotChange => 1,
            ParameterError::MinMax => 2,
            ParameterError::Index => 3,
            ParameterError::Access => 5,
            ParameterError::Other => 18,
            ParameterError::Saving => 102,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| u64::from(e.code()) == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ParameterError::WrongNum => "WRONG_NUM",
            ParameterError::CannotChange => "CANNOT_CHANGE",
            ParameterError::MinMax => "MINMAX",
            ParameterError::Index => "INDEX",
            ParameterError::Access => "ACCESS",
            ParameterError::Other => "OTHER",
            ParameterError::Saving => "SAVING",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ParameterError::WrongNum => "invalid parameter number",
            ParameterError::CannotChange => "parameter cannot be changed",
            ParameterError::MinMax => "min/max error",
            ParameterError::Index => "index error",
            ParameterError::Access => "access mode doesn't match parameter",
            ParameterError::Other => "other error",
            ParameterError::Saving => "parameter is being saved to nonvolatile memory",
        }
    }
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.description())
    }
}

/// A named bit of the 16-bit flag field.
pub trait FlagBit: Copy + PartialEq + fmt::Debug + 'static {
    /// All bits, in index order.
    const ALL: [Self; FLAG_BITS];

    /// Position of the bit in the logical flag set, 0 to 15.
    fn index(self) -> usize;

    fn description(self) -> &'static str;

    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Control bits sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlBit {
    On,
    Unused1,
    Unused2,
    Unused3,
    Unused4,
    X201,
    Setpoint,
    ResetError,
    Standby,
    Unused9,
    Command,
    X1Error,
    X1Warning,
    X1Normal,
    X202,
    X203,
}

impl FlagBit for ControlBit {
    const ALL: [Self; FLAG_BITS] = [
        ControlBit::On,
        ControlBit::Unused1,
        ControlBit::Unused2,
        ControlBit::Unused3,
        ControlBit::Unused4,
        ControlBit::X201,
        ControlBit::Setpoint,
        ControlBit::ResetError,
        ControlBit::Standby,
        ControlBit::Unused9,
        ControlBit::Command,
        ControlBit::X1Error,
        ControlBit::X1Warning,
        ControlBit::X1Normal,
        ControlBit::X202,
        ControlBit::X203,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn description(self) -> &'static str {
        match self {
            ControlBit::On => "Turn or keep the pump on",
            ControlBit::Unused1 => "Unknown control bit: 1",
            ControlBit::Unused2 => "Unknown control bit: 2",
            ControlBit::Unused3 => "Unknown control bit: 3",
            ControlBit::Unused4 => "Unknown control bit: 4",
            ControlBit::X201 => "Output X201 (air cooling)",
            ControlBit::Setpoint => "Enable frequency setpoint",
            ControlBit::ResetError => "Reset error (all components)",
            ControlBit::Standby => "Enable standby",
            ControlBit::Unused9 => "Unknown control bit: 9",
            ControlBit::Command => "Enable control bits",
            ControlBit::X1Error => "Error operation relay X1",
            ControlBit::X1Warning => "Normal operation relay X1",
            ControlBit::X1Normal => "Warning relay X1",
            ControlBit::X202 => "Output X202 (packing pump)",
            ControlBit::X203 => "Output X203 (venting valve)",
        }
    }
}

/// Status bits reported by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusBit {
    Ready,
    Unused1,
    Operation,
    Error,
    Acceleration,
    Deceleration,
    SwitchOnLock,
    TempWarning,
    Unused8,
    ParamChannel,
    Detained,
    Turning,
    Unused12,
    Overload,
    Warning,
    ProcessChannel,
}

impl FlagBit for StatusBit {
    const ALL: [Self; FLAG_BITS] = [
        StatusBit::Ready,
        StatusBit::Unused1,
        StatusBit::Operation,
        StatusBit::Error,
        StatusBit::Acceleration,
        StatusBit::Deceleration,
        StatusBit::SwitchOnLock,
        StatusBit::TempWarning,
        StatusBit::Unused8,
        StatusBit::ParamChannel,
        StatusBit::Detained,
        StatusBit::Turning,
        StatusBit::Unused12,
        StatusBit::Overload,
        StatusBit::Warning,
        StatusBit::ProcessChannel,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn description(self) -> &'static str {
        match self {
            StatusBit::Ready => "Ready for operation",
            StatusBit::Unused1 => "Unknown status bit: 1",
            StatusBit::Operation => "Operation enabled",
            StatusBit::Error => "Error condition (all components)",
            StatusBit::Acceleration => "Accelerating",
            StatusBit::Deceleration => "Decelerating",
            StatusBit::SwitchOnLock => "Switch-on lock",
            StatusBit::TempWarning => "Temperature warning",
            StatusBit::Unused8 => "Unknown status bit: 8",
            StatusBit::ParamChannel => "Parameter channel enabled",
            StatusBit::Detained => "Normal operation detained",
            StatusBit::Turning => "Pump is turning",
            StatusBit::Unused12 => "Unknown status bit: 12",
            StatusBit::Overload => "Overload warning",
            StatusBit::Warning => "Collective warning",
            StatusBit::ProcessChannel => "Process channel enabled",
        }
    }
}

/// The logical 16-bit string of a flag set: character `i` is flag `i`.
pub fn flags_to_bin<F: FlagBit>(flags: &[F]) -> Bin {
    Bin::from_bools(F::ALL.iter().map(|bit| flags.contains(bit)))
}

/// The flags set in a logical 16-bit string, in index order.
pub fn flags_from_bin<F: FlagBit>(bin: &Bin) -> Vec<F> {
    F::ALL
        .iter()
        .copied()
        .filter(|bit| bin.bit(bit.index()).unwrap_or(false))
        .collect()
}
