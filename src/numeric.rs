//! Fixed-width numeric types used to pack and unpack telegram fields.
//!
//! Every type carries an explicit bit width. Converting between types
//! keeps the *bits* and reinterprets them, it does not convert the numeric
//! value: the byte `0xFF` read as an 8-bit [`Uint`] is 255, read as an
//! 8-bit [`Sint`] it is -1.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use crate::error::ValueError;

/// The number of bits in a byte.
pub const BYTESIZE: u32 = 8;

/// Integer kinds are backed by 64-bit storage.
const MAX_INT_BITS: u32 = 64;

/// Largest unsigned integer that fits in `bits` bits (0 for 0 bits).
pub fn maxuint(bits: u32) -> u128 {
    if bits == 0 {
        0
    } else {
        (1u128 << bits) - 1
    }
}

/// Largest signed integer that fits in `bits` bits (0 for 0 bits).
pub fn maxsint(bits: u32) -> i128 {
    if bits == 0 {
        0
    } else {
        (1i128 << (bits - 1)) - 1
    }
}

/// Smallest signed integer that fits in `bits` bits (0 for 0 bits).
pub fn minsint(bits: u32) -> i128 {
    if bits == 0 {
        0
    } else {
        -(1i128 << (bits - 1))
    }
}

fn bytes_for(bits: u32) -> usize {
    bits.div_ceil(BYTESIZE) as usize
}

fn check_int_width(kind: &'static str, bits: u32) -> Result<(), ValueError> {
    if bits > MAX_INT_BITS {
        return Err(ValueError::TooWide {
            kind,
            bits,
            max: MAX_INT_BITS,
        });
    }
    Ok(())
}

/// Reinterpret a two's complement `bits`-bit signed integer as unsigned.
pub fn signed_to_unsigned(value: i64, bits: u32) -> Result<u64, ValueError> {
    check_int_width("Sint", bits)?;
    let wide = i128::from(value);
    if wide < minsint(bits) || wide > maxsint(bits) {
        return Err(ValueError::OutOfRange {
            kind: "Sint",
            value: wide,
            bits,
        });
    }
    let unsigned = if wide < 0 { wide + (1i128 << bits) } else { wide };
    // In range by the check above.
    Ok(unsigned as u64)
}

/// Reinterpret a `bits`-bit unsigned integer as two's complement signed.
pub fn unsigned_to_signed(value: u64, bits: u32) -> Result<i64, ValueError> {
    check_int_width("Uint", bits)?;
    let wide = i128::from(value);
    if wide as u128 > maxuint(bits) {
        return Err(ValueError::OutOfRange {
            kind: "Uint",
            value: wide,
            bits,
        });
    }
    let signed = if wide > maxsint(bits) {
        wide - (1i128 << bits)
    } else {
        wide
    };
    Ok(signed as i64)
}

/// IEEE-754 single-precision bit pattern of `value`.
pub fn float_to_bits(value: f64) -> Result<u32, ValueError> {
    Ok(Float::new(value)?.value().to_bits())
}

/// Inverse of [`float_to_bits`].
pub fn bits_to_float(bits: u32) -> f32 {
    f32::from_bits(bits)
}

/// Behaviour shared by all fixed-width types.
///
/// Implementors only provide the conversion to and from [`Bin`]; byte
/// serialization, slicing, concatenation and cross-type conversion are all
/// expressed through the bit pattern.
pub trait Data: Sized {
    /// Name of the kind, used in error messages.
    const KIND: &'static str;

    fn bits(&self) -> u32;

    /// Bytes needed to store the value: `bits / 8`, rounded up.
    fn n_bytes(&self) -> usize {
        bytes_for(self.bits())
    }

    fn to_bin(&self) -> Bin;

    fn from_bin(bin: &Bin) -> Result<Self, ValueError>;

    /// Big-endian bytes, zero-padded on the left to a whole byte.
    fn to_bytes(&self) -> Vec<u8> {
        self.to_bin().pack()
    }

    /// Read a value of exactly `bits` bits from `ceil(bits / 8)` bytes.
    ///
    /// The padding bits must be zero.
    fn from_bytes(bytes: &[u8], bits: u32) -> Result<Self, ValueError> {
        Self::from_bin(&Bin::unpack_bits(bytes, bits)?)
    }

    /// Reinterpret the same bits as another kind.
    fn convert<T: Data>(&self) -> Result<T, ValueError> {
        T::from_bin(&self.to_bin())
    }

    /// The bits in `range` (most significant bit is index 0) as the same kind.
    fn slice(&self, range: Range<usize>) -> Result<Self, ValueError> {
        Self::from_bin(&self.to_bin().slice(range)?)
    }

    /// Append the bits of `other` and keep the kind of `self`.
    fn concat<T: Data>(&self, other: &T) -> Result<Self, ValueError> {
        Self::from_bin(&self.to_bin().concat(&other.to_bin()))
    }
}

/// Unsigned integer of up to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uint {
    value: u64,
    bits: u32,
}

impl Uint {
    pub fn new(value: u64, bits: u32) -> Result<Self, ValueError> {
        check_int_width(Self::KIND, bits)?;
        if u128::from(value) > maxuint(bits) {
            return Err(ValueError::OutOfRange {
                kind: Self::KIND,
                value: i128::from(value),
                bits,
            });
        }
        Ok(Self { value, bits })
    }

    /// Zero of `bits` bits. Widths above 64 are clamped to 64.
    pub fn zero(bits: u32) -> Self {
        Self {
            value: 0,
            bits: bits.min(MAX_INT_BITS),
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

impl Data for Uint {
    const KIND: &'static str = "Uint";

    fn bits(&self) -> u32 {
        self.bits
    }

    fn to_bin(&self) -> Bin {
        Bin::from_unsigned(self.value, self.bits)
    }

    fn from_bin(bin: &Bin) -> Result<Self, ValueError> {
        check_int_width(Self::KIND, bin.bits())?;
        Self::new(bin.to_unsigned(), bin.bits())
    }
}

impl fmt::Display for Uint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Two's complement signed integer of up to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sint {
    value: i64,
    bits: u32,
}

impl Sint {
    pub fn new(value: i64, bits: u32) -> Result<Self, ValueError> {
        check_int_width(Self::KIND, bits)?;
        let wide = i128::from(value);
        if wide < minsint(bits) || wide > maxsint(bits) {
            return Err(ValueError::OutOfRange {
                kind: Self::KIND,
                value: wide,
                bits,
            });
        }
        Ok(Self { value, bits })
    }

    /// Zero of `bits` bits. Widths above 64 are clamped to 64.
    pub fn zero(bits: u32) -> Self {
        Self {
            value: 0,
            bits: bits.min(MAX_INT_BITS),
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

impl Data for Sint {
    const KIND: &'static str = "Sint";

    fn bits(&self) -> u32 {
        self.bits
    }

    fn to_bin(&self) -> Bin {
        // Always in range, so the conversion cannot fail.
        let unsigned = signed_to_unsigned(self.value, self.bits).unwrap_or_default();
        Bin::from_unsigned(unsigned, self.bits)
    }

    fn from_bin(bin: &Bin) -> Result<Self, ValueError> {
        check_int_width(Self::KIND, bin.bits())?;
        let value = unsigned_to_signed(bin.to_unsigned(), bin.bits())?;
        Self::new(value, bin.bits())
    }
}

impl fmt::Display for Sint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// IEEE-754 binary32 value. Always 32 bits.
#[derive(Debug, Clone, Copy)]
pub struct Float {
    value: f32,
}

impl Float {
    pub const BITS: u32 = 32;

    /// Round `value` to single precision.
    ///
    /// Values too small to represent become a signed zero; finite values too
    /// large to represent are an error. Infinities and NaN pass through.
    pub fn new(value: f64) -> Result<Self, ValueError> {
        let single = value as f32;
        if single.is_infinite() && !value.is_infinite() {
            return Err(ValueError::FloatOverflow(value));
        }
        Ok(Self { value: single })
    }

    /// Like [`Float::new`], but with the width spelled out; it must be 32.
    pub fn with_bits(value: f64, bits: u32) -> Result<Self, ValueError> {
        if bits != Self::BITS {
            return Err(ValueError::FloatWidth(bits));
        }
        Self::new(value)
    }

    pub fn from_f32(value: f32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

impl PartialEq for Float {
    /// Equal values, or both NaN.
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value || (self.value.is_nan() && other.value.is_nan())
    }
}

impl Data for Float {
    const KIND: &'static str = "Float";

    fn bits(&self) -> u32 {
        Self::BITS
    }

    fn to_bin(&self) -> Bin {
        Bin::from_unsigned(u64::from(self.value.to_bits()), Self::BITS)
    }

    fn from_bin(bin: &Bin) -> Result<Self, ValueError> {
        if bin.bits() != Self::BITS {
            return Err(ValueError::FloatWidth(bin.bits()));
        }
        // 32 bits, checked above.
        Ok(Self::from_f32(f32::from_bits(bin.to_unsigned() as u32)))
    }
}

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A bit string, most significant bit first. Any length, including zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bin {
    value: String,
}

impl Bin {
    /// Parse a string of '0' and '1' characters; the width is its length.
    pub fn new(value: &str) -> Result<Self, ValueError> {
        if !value.chars().all(|c| c == '0' || c == '1') {
            return Err(ValueError::InvalidBinary(value.to_string()));
        }
        Ok(Self {
            value: value.to_string(),
        })
    }

    /// Like [`Bin::new`], but `bits` must equal the string length.
    pub fn with_bits(value: &str, bits: u32) -> Result<Self, ValueError> {
        let bin = Self::new(value)?;
        if bin.value.len() != bits as usize {
            return Err(ValueError::BitsMismatch {
                value: value.to_string(),
                bits,
            });
        }
        Ok(bin)
    }

    /// `bits` zeros.
    pub fn zeros(bits: u32) -> Self {
        Self {
            value: "0".repeat(bits as usize),
        }
    }

    /// Binary representation of `value`, padded with zeros to `bits` bits.
    ///
    /// `value` must fit in `bits` bits; higher bits are dropped otherwise.
    pub fn from_unsigned(value: u64, bits: u32) -> Self {
        if bits == 0 {
            return Self::default();
        }
        let width = bits as usize;
        let digits = format!("{:0width$b}", value, width = width);
        let start = digits.len().saturating_sub(width);
        Self {
            value: digits.get(start..).unwrap_or_default().to_string(),
        }
    }

    /// Build from individual bits, most significant first.
    pub fn from_bools<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        Self {
            value: bits.into_iter().map(|b| if b { '1' } else { '0' }).collect(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Bit at `index`, counting from the most significant bit.
    pub fn bit(&self, index: usize) -> Option<bool> {
        self.value.as_bytes().get(index).map(|&c| c == b'1')
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.value.bytes().map(|c| c == b'1')
    }

    /// The bits in `range`.
    pub fn slice(&self, range: Range<usize>) -> Result<Self, ValueError> {
        match self.value.get(range.clone()) {
            Some(part) if range.start <= range.end => Ok(Self {
                value: part.to_string(),
            }),
            _ => Err(ValueError::SliceOutOfBounds {
                start: range.start,
                end: range.end,
                bits: self.bits(),
            }),
        }
    }

    /// `self` followed by `other`.
    pub fn concat(&self, other: &Bin) -> Self {
        let mut value = String::with_capacity(self.value.len() + other.value.len());
        value.push_str(&self.value);
        value.push_str(&other.value);
        Self { value }
    }

    /// The same bits in reverse order.
    pub fn reversed(&self) -> Self {
        Self {
            value: self.value.chars().rev().collect(),
        }
    }

    /// Big-endian bytes, zero-padded on the left to a whole byte.
    pub fn pack(&self) -> Vec<u8> {
        let n_bytes = bytes_for(self.bits());
        let pad = n_bytes * BYTESIZE as usize - self.value.len();
        let padded: Vec<bool> = std::iter::repeat(false)
            .take(pad)
            .chain(self.iter())
            .collect();
        padded
            .chunks(BYTESIZE as usize)
            .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit)))
            .collect()
    }

    /// All the bits of `bytes`.
    pub fn unpack(bytes: &[u8]) -> Self {
        Self {
            value: bytes.iter().map(|b| format!("{:08b}", b)).collect(),
        }
    }

    /// The low `bits` bits of `bytes`, which must be `ceil(bits / 8)` long
    /// with zero padding.
    pub fn unpack_bits(bytes: &[u8], bits: u32) -> Result<Self, ValueError> {
        let expected = bytes_for(bits);
        if bytes.len() != expected {
            return Err(ValueError::ByteLength {
                bits,
                expected,
                actual: bytes.len(),
            });
        }
        let all = Self::unpack(bytes);
        let pad = all.value.len() - bits as usize;
        let (padding, rest) = all.value.split_at(pad);
        if padding.contains('1') {
            return Err(ValueError::OutOfRange {
                kind: Self::KIND,
                value: i128::from(all.to_unsigned()),
                bits,
            });
        }
        Ok(Self {
            value: rest.to_string(),
        })
    }

    /// The bits read as an unsigned integer. Only the low 64 bits count.
    fn to_unsigned(&self) -> u64 {
        self.iter()
            .fold(0u64, |acc, bit| (acc << 1) | u64::from(bit))
    }
}

impl Data for Bin {
    const KIND: &'static str = "Bin";

    fn bits(&self) -> u32 {
        self.value.len() as u32
    }

    fn to_bin(&self) -> Bin {
        self.clone()
    }

    fn from_bin(bin: &Bin) -> Result<Self, ValueError> {
        Ok(bin.clone())
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// The four numeric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Uint,
    Sint,
    Float,
    Bin,
}

/// A value of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uint(Uint),
    Sint(Sint),
    Float(Float),
    Bin(Bin),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Uint(_) => Kind::Uint,
            Value::Sint(_) => Kind::Sint,
            Value::Float(_) => Kind::Float,
            Value::Bin(_) => Kind::Bin,
        }
    }

    pub fn bits(&self) -> u32 {
        match self {
            Value::Uint(v) => v.bits(),
            Value::Sint(v) => v.bits(),
            Value::Float(v) => v.bits(),
            Value::Bin(v) => v.bits(),
        }
    }

    pub fn n_bytes(&self) -> usize {
        bytes_for(self.bits())
    }

    pub fn to_bin(&self) -> Bin {
        match self {
            Value::Uint(v) => v.to_bin(),
            Value::Sint(v) => v.to_bin(),
            Value::Float(v) => v.to_bin(),
            Value::Bin(v) => v.clone(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bin().pack()
    }

    /// Read `bin` as a value of `kind`.
    pub fn from_bin(kind: Kind, bin: &Bin) -> Result<Self, ValueError> {
        Ok(match kind {
            Kind::Uint => Value::Uint(Uint::from_bin(bin)?),
            Kind::Sint => Value::Sint(Sint::from_bin(bin)?),
            Kind::Float => Value::Float(Float::from_bin(bin)?),
            Kind::Bin => Value::Bin(bin.clone()),
        })
    }

    /// The same bits as another kind.
    pub fn reinterpret(&self, kind: Kind) -> Result<Self, ValueError> {
        Self::from_bin(kind, &self.to_bin())
    }

    /// The bits in `range`. Integers keep their kind, a float becomes a
    /// [`Bin`] unless the whole value is taken.
    pub fn slice(&self, range: Range<usize>) -> Result<Self, ValueError> {
        let part = self.to_bin().slice(range)?;
        match self.kind() {
            Kind::Float if part.bits() == Float::BITS => Self::from_bin(Kind::Float, &part),
            Kind::Float | Kind::Bin => Ok(Value::Bin(part)),
            kind => Self::from_bin(kind, &part),
        }
    }

    /// Append the bits of `other`. The result keeps the kind of `self` when
    /// it can hold the combined width and is a [`Bin`] otherwise.
    pub fn concat(&self, other: &Value) -> Self {
        let joined = self.to_bin().concat(&other.to_bin());
        match self.kind() {
            Kind::Uint | Kind::Sint if joined.bits() <= MAX_INT_BITS => {
                Self::from_bin(self.kind(), &joined).unwrap_or(Value::Bin(joined))
            }
            _ => Value::Bin(joined),
        }
    }

    /// The numeric value. A bit string is read as an unsigned integer.
    pub fn as_number(&self) -> Number {
        match self {
            Value::Uint(v) => Number::Int(i128::from(v.value())),
            Value::Sint(v) => Number::Int(i128::from(v.value())),
            Value::Float(v) => Number::Float(f64::from(v.value())),
            Value::Bin(v) => Number::Int(i128::from(v.to_unsigned())),
        }
    }
}

impl From<Uint> for Value {
    fn from(v: Uint) -> Self {
        Value::Uint(v)
    }
}

impl From<Sint> for Value {
    fn from(v: Sint) -> Self {
        Value::Sint(v)
    }
}

impl From<Float> for Value {
    fn from(v: Float) -> Self {
        Value::Float(v)
    }
}

impl From<Bin> for Value {
    fn from(v: Bin) -> Self {
        Value::Bin(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => v.fmt(f),
            Value::Sint(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Bin(v) => v.fmt(f),
        }
    }
}

/// A plain number as written by a user or in a parameter table.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(x) => x,
        }
    }

    /// Parse an integer literal, falling back to a float literal.
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(i) = text.parse::<i128>() {
            return Some(Number::Int(i));
        }
        text.parse::<f64>().ok().map(Number::Float)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

macro_rules! number_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Number {
            fn from(v: $t) -> Self {
                Number::Int(i128::from(v))
            }
        })*
    };
}

number_from_int!(u8, u16, u32, u64, i8, i16, i32, i64);

impl From<f32> for Number {
    fn from(v: f32) -> Self {
        Number::Float(f64::from(v))
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// The numeric types a parameter can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Uint,
    Sint,
    Float,
}

impl DataType {
    pub fn kind(self) -> Kind {
        match self {
            DataType::Uint => Kind::Uint,
            DataType::Sint => Kind::Sint,
            DataType::Float => Kind::Float,
        }
    }

    /// Build a `bits`-bit value of this type from a plain number.
    ///
    /// Integer types reject float numbers, even integral ones.
    pub fn value(self, number: Number, bits: u32) -> Result<Value, ValueError> {
        match (self, number) {
            (DataType::Float, n) => Ok(Value::Float(Float::with_bits(n.as_f64(), bits)?)),
            (DataType::Uint, Number::Int(i)) => {
                let value = u64::try_from(i).map_err(|_| ValueError::OutOfRange {
                    kind: Uint::KIND,
                    value: i,
                    bits,
                })?;
                Ok(Value::Uint(Uint::new(value, bits)?))
            }
            (DataType::Sint, Number::Int(i)) => {
                let value = i64::try_from(i).map_err(|_| ValueError::OutOfRange {
                    kind: Sint::KIND,
                    value: i,
                    bits,
                })?;
                Ok(Value::Sint(Sint::new(value, bits)?))
            }
            (kind, Number::Float(x)) => Err(ValueError::WrongType {
                value: x.to_string(),
                kind: kind.name(),
            }),
        }
    }

    /// A zero of this type.
    pub fn zero(self, bits: u32) -> Result<Value, ValueError> {
        self.value(Number::Int(0), bits)
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Uint => Uint::KIND,
            DataType::Sint => Sint::KIND,
            DataType::Float => Float::KIND,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_of_widths() {
        assert_eq!(maxuint(0), 0);
        assert_eq!(maxuint(8), 255);
        assert_eq!(maxuint(64), u128::from(u64::MAX));
        assert_eq!(maxsint(8), 127);
        assert_eq!(minsint(8), -128);
        assert_eq!(maxsint(0), 0);
        assert_eq!(minsint(0), 0);
    }

    #[test]
    fn same_byte_as_uint_and_sint() {
        assert_eq!(Uint::from_bytes(&[0xFF], 8).unwrap().value(), 255);
        assert_eq!(Sint::from_bytes(&[0xFF], 8).unwrap().value(), -1);
    }

    #[test]
    fn uint_range_is_checked() {
        assert!(Uint::new(255, 8).is_ok());
        assert!(matches!(
            Uint::new(256, 8),
            Err(ValueError::OutOfRange { bits: 8, .. })
        ));
        assert!(Uint::new(0, 0).is_ok());
        assert!(Uint::new(1, 0).is_err());
        assert!(Uint::new(u64::MAX, 64).is_ok());
        assert!(matches!(Uint::new(0, 65), Err(ValueError::TooWide { .. })));
    }

    #[test]
    fn sint_range_is_checked() {
        assert!(Sint::new(-128, 8).is_ok());
        assert!(Sint::new(127, 8).is_ok());
        assert!(Sint::new(128, 8).is_err());
        assert!(Sint::new(-129, 8).is_err());
        assert!(Sint::new(0, 0).is_ok());
        assert!(Sint::new(-1, 0).is_err());
        assert!(Sint::new(i64::MIN, 64).is_ok());
    }

    #[test]
    fn sint_bytes_are_twos_complement() {
        assert_eq!(Sint::new(-2, 16).unwrap().to_bytes(), vec![0xFF, 0xFE]);
        assert_eq!(Sint::new(1, 16).unwrap().to_bytes(), vec![0x00, 0x01]);
        // Widths that are not whole bytes are zero-padded.
        assert_eq!(Sint::new(-1, 12).unwrap().to_bytes(), vec![0x0F, 0xFF]);
    }

    #[test]
    fn odd_widths_survive_bytes() {
        let x = Sint::new(-3, 12).unwrap();
        assert_eq!(Sint::from_bytes(&x.to_bytes(), 12).unwrap(), x);
        let y = Uint::new(5, 11).unwrap();
        assert_eq!(Uint::from_bytes(&y.to_bytes(), 11).unwrap(), y);
        assert!(Uint::from_bytes(&[0xFF, 0xFF], 11).is_err());
        assert!(Uint::from_bytes(&[0xFF], 11).is_err());
    }

    #[test]
    fn float_rounding_and_overflow() {
        assert_eq!(Float::new(1.5).unwrap().value(), 1.5);
        assert!(Float::new(f64::INFINITY).unwrap().value().is_infinite());
        assert!(Float::new(f64::NAN).unwrap().value().is_nan());
        assert!(matches!(Float::new(1e300), Err(ValueError::FloatOverflow(_))));
        let tiny = Float::new(-1e-300).unwrap().value();
        assert_eq!(tiny, 0.0);
        assert!(tiny.is_sign_negative());
        assert!(matches!(Float::with_bits(1.0, 16), Err(ValueError::FloatWidth(16))));
    }

    #[test]
    fn nan_equals_nan() {
        let a = Float::new(f64::NAN).unwrap();
        assert_eq!(a, a);
        assert_ne!(a, Float::new(0.0).unwrap());
    }

    #[test]
    fn float_bytes() {
        assert_eq!(Float::new(1.0).unwrap().to_bytes(), vec![0x3F, 0x80, 0, 0]);
        assert_eq!(Float::from_bytes(&[0x3F, 0x80, 0, 0], 32).unwrap().value(), 1.0);
        assert!(Float::from_bytes(&[0x3F, 0x80], 32).is_err());
        assert!(Float::from_bytes(&[0x3F, 0x80], 16).is_err());
    }

    #[test]
    fn bin_validation() {
        assert_eq!(Bin::new("0101").unwrap().bits(), 4);
        assert_eq!(Bin::new("").unwrap().bits(), 0);
        assert!(matches!(Bin::new("012"), Err(ValueError::InvalidBinary(_))));
        assert!(matches!(
            Bin::with_bits("01", 3),
            Err(ValueError::BitsMismatch { bits: 3, .. })
        ));
        assert!(Bin::with_bits("010", 3).is_ok());
    }

    #[test]
    fn bin_bytes_are_right_aligned() {
        assert_eq!(Bin::new("1").unwrap().pack(), vec![0x01]);
        assert_eq!(Bin::new("100000001").unwrap().pack(), vec![0x01, 0x01]);
        assert!(Bin::new("").unwrap().pack().is_empty());
        assert_eq!(Bin::unpack(&[0xA5]).value(), "10100101");
    }

    #[test]
    fn conversions_keep_bits() {
        let u = Uint::new(0b1111_1110, 8).unwrap();
        let s: Sint = u.convert().unwrap();
        assert_eq!(s.value(), -2);
        assert_eq!(s.bits(), 8);
        let back: Uint = s.convert().unwrap();
        assert_eq!(back, u);

        let f = Float::new(-2.5).unwrap();
        let raw: Uint = f.convert().unwrap();
        assert_eq!(raw.value(), u64::from((-2.5f32).to_bits()));
        assert!(raw.convert::<Float>().unwrap() == f);
    }

    #[test]
    fn slicing_and_concatenation() {
        let bin = Bin::new("010001").unwrap();
        assert_eq!(bin.slice(0..3).unwrap().value(), "010");
        assert!(bin.slice(4..8).is_err());

        let u = Uint::new(0b1010, 4).unwrap();
        assert_eq!(u.slice(0..2).unwrap(), Uint::new(0b10, 2).unwrap());
        let joined = u.concat(&Bin::new("11").unwrap()).unwrap();
        assert_eq!(joined, Uint::new(0b101011, 6).unwrap());
    }

    #[test]
    fn value_slice_and_concat_fall_back_to_bin() {
        let f = Value::Float(Float::new(1.0).unwrap());
        assert_eq!(f.slice(0..4).unwrap().kind(), Kind::Bin);
        assert_eq!(f.slice(0..32).unwrap(), f);
        let two = f.concat(&f);
        assert_eq!(two.kind(), Kind::Bin);
        assert_eq!(two.bits(), 64);

        let u = Value::Uint(Uint::new(1, 8).unwrap());
        assert_eq!(u.concat(&u), Value::Uint(Uint::new(0x0101, 16).unwrap()));
        let wide = Value::Uint(Uint::new(1, 60).unwrap());
        assert_eq!(wide.concat(&u).kind(), Kind::Bin);
    }

    #[test]
    fn equality_needs_same_kind_and_width() {
        assert_ne!(
            Value::Uint(Uint::new(1, 8).unwrap()),
            Value::Uint(Uint::new(1, 16).unwrap())
        );
        assert_ne!(
            Value::Uint(Uint::new(1, 8).unwrap()),
            Value::Sint(Sint::new(1, 8).unwrap())
        );
    }

    #[test]
    fn signed_unsigned_helpers() {
        assert_eq!(signed_to_unsigned(-1, 8).unwrap(), 255);
        assert_eq!(unsigned_to_signed(255, 8).unwrap(), -1);
        assert_eq!(unsigned_to_signed(127, 8).unwrap(), 127);
        assert!(signed_to_unsigned(128, 8).is_err());
        assert!(unsigned_to_signed(256, 8).is_err());
        assert_eq!(signed_to_unsigned(i64::MIN, 64).unwrap(), 1u64 << 63);
    }

    #[test]
    fn float_bit_helpers() {
        assert_eq!(float_to_bits(1.0).unwrap(), 0x3F80_0000);
        assert_eq!(bits_to_float(0x3F80_0000), 1.0);
        assert!(float_to_bits(1e40).is_err());
    }

    #[test]
    fn datatype_values() {
        assert_eq!(
            DataType::Uint.value(Number::Int(5), 16).unwrap(),
            Value::Uint(Uint::new(5, 16).unwrap())
        );
        assert!(DataType::Uint.value(Number::Int(-5), 16).is_err());
        assert!(DataType::Sint.value(Number::Float(1.0), 16).is_err());
        assert_eq!(
            DataType::Float.value(Number::Int(2), 32).unwrap(),
            Value::Float(Float::new(2.0).unwrap())
        );
        assert!(DataType::Float.value(Number::Int(2), 16).is_err());
    }

    #[test]
    fn numbers_compare_across_kinds() {
        assert!(Number::Int(2) < Number::Float(2.5));
        assert!(Number::Float(-0.5) < Number::Int(0));
        assert_eq!(Number::Int(3), Number::Float(3.0));
        assert!(matches!(Number::parse("-10"), Some(Number::Int(-10))));
        assert!(matches!(Number::parse("1.2e3"), Some(Number::Float(_))));
        assert!(Number::parse("P18").is_none());
    }
}
