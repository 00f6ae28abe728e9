use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The type tag of a [Value]. Stable across persistence, part of the
/// [ValueId](crate::value_id::ValueId).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum ValueType {
    Bool = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Decimal = 4,
    String = 5,
    List = 6,
    Button = 7,
    Schedule = 8,
    Raw = 9,
    BitSet = 10,
}

/// A fixed-point decimal as it appears on the wire: an integer mantissa
/// scaled by a decimal precision. The precision is preserved exactly so a
/// report of "4.20" round-trips as "4.20", not "4.2".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decimal {
    /// Number of decimal digits the mantissa is shifted by
    pub precision: u8,
    /// Number of bytes the mantissa occupies on the wire (1, 2 or 4)
    pub size: u8,
    pub mantissa: i32,
}

impl Decimal {
    pub fn new(precision: u8, size: u8, mantissa: i32) -> Self {
        Self {
            precision,
            size,
            mantissa,
        }
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.precision == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let divisor = 10i64.pow(self.precision as u32);
        let mantissa = self.mantissa as i64;
        let sign = if mantissa < 0 { "-" } else { "" };
        let abs = mantissa.abs();
        write!(
            f,
            "{}{}.{:0>width$}",
            sign,
            abs / divisor,
            abs % divisor,
            width = self.precision as usize
        )
    }
}

/// A list value: the currently selected item index plus the item labels
/// declared at creation time.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSelection {
    pub selected: i32,
}

/// A set of bits behind a mask; bits outside the mask are undefined.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSet {
    pub mask: u32,
    pub bits: u32,
}

/// A typed value cell. The variants mirror the value types devices report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Decimal(Decimal),
    String(String),
    List(ListSelection),
    Button(bool),
    Schedule(Vec<u8>),
    Raw(Vec<u8>),
    BitSet(BitSet),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Byte(_) => ValueType::Byte,
            Value::Short(_) => ValueType::Short,
            Value::Int(_) => ValueType::Int,
            Value::Decimal(_) => ValueType::Decimal,
            Value::String(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::Button(_) => ValueType::Button,
            Value::Schedule(_) => ValueType::Schedule,
            Value::Raw(_) => ValueType::Raw,
            Value::BitSet(_) => ValueType::BitSet,
        }
    }

    /// The numeric magnitude of the value, where one exists. Used for
    /// range checks against declared min/max.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) | Value::Button(b) => Some(*b as i64),
            Value::Byte(b) => Some(*b as i64),
            Value::Short(s) => Some(*s as i64),
            Value::Int(i) => Some(*i as i64),
            Value::List(l) => Some(l.selected as i64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(1, 2, 42).to_string(), "4.2");
        assert_eq!(Decimal::new(2, 2, 420).to_string(), "4.20");
        assert_eq!(Decimal::new(0, 1, 42).to_string(), "42");
        assert_eq!(Decimal::new(1, 2, -42).to_string(), "-4.2");
        assert_eq!(Decimal::new(2, 2, 5).to_string(), "0.05");
    }

    #[test]
    fn test_decimal_precision_is_significant() {
        // "4.2" and "4.20" are the same number but different reports
        assert_ne!(Decimal::new(1, 2, 42), Decimal::new(2, 2, 420));
    }
}
