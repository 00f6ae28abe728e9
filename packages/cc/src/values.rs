//! Shared wire codecs for the typed values several classes report:
//! the precision/scale/size byte followed by a big-endian mantissa.

use crate::commandclass::CcError;
use zw_core::values::Decimal;

/// A decimal as extracted from the wire, together with the scale bits the
/// owning class maps onto units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireDecimal {
    pub decimal: Decimal,
    pub scale: u8,
}

/// Decodes the (precision, scale, size) byte and the following mantissa.
/// Returns the value and the number of bytes consumed.
pub fn extract_decimal(payload: &[u8]) -> Result<(WireDecimal, usize), CcError> {
    let Some(&dimensions) = payload.first() else {
        return Err(CcError::Malformed("missing value dimensions".into()));
    };
    let precision = (dimensions >> 5) & 0x07;
    let scale = (dimensions >> 3) & 0x03;
    let size = (dimensions & 0x07) as usize;

    if !matches!(size, 1 | 2 | 4) {
        return Err(CcError::Malformed(format!("invalid value size {}", size)));
    }
    if payload.len() < 1 + size {
        return Err(CcError::Malformed(format!(
            "value truncated: need {} bytes, have {}",
            size,
            payload.len() - 1
        )));
    }

    // Sign-extend the big-endian mantissa
    let mut mantissa: i32 = if payload[1] & 0x80 != 0 { -1 } else { 0 };
    for &byte in &payload[1..1 + size] {
        mantissa = (mantissa << 8) | byte as i32;
    }

    Ok((
        WireDecimal {
            decimal: Decimal::new(precision, size as u8, mantissa),
            scale,
        },
        1 + size,
    ))
}

/// Encodes a decimal back into its wire form, preserving precision and
/// size exactly
pub fn encode_decimal(value: &WireDecimal) -> Vec<u8> {
    let decimal = &value.decimal;
    let dimensions =
        ((decimal.precision & 0x07) << 5) | ((value.scale & 0x03) << 3) | (decimal.size & 0x07);

    let mut out = vec![dimensions];
    let bytes = decimal.mantissa.to_be_bytes();
    out.extend_from_slice(&bytes[4 - decimal.size as usize..]);
    out
}

/// Reads an unsigned integer of 1, 2 or 4 bytes, as used by Configuration
/// parameters
pub fn extract_int(payload: &[u8], size: usize) -> Result<i64, CcError> {
    if payload.len() < size {
        return Err(CcError::Malformed("integer value truncated".into()));
    }
    let mut value: i64 = 0;
    for &byte in &payload[..size] {
        value = (value << 8) | byte as i64;
    }
    Ok(value)
}

pub fn encode_int(value: i64, size: usize) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    bytes[8 - size..].to_vec()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_extract_temperature() {
        // precision 1, scale 0 (Celsius), size 2, mantissa 42 -> 4.2
        let payload = hex::decode("22002a").unwrap();
        let (value, consumed) = extract_decimal(&payload).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(value.scale, 0);
        assert_eq!(value.decimal, Decimal::new(1, 2, 42));
        assert_eq!(value.decimal.to_string(), "4.2");
    }

    #[test]
    fn test_extract_negative() {
        // precision 1, scale 0, size 2, mantissa -55 -> -5.5
        let payload = [0x22, 0xff, 0xc9];
        let (value, _) = extract_decimal(&payload).unwrap();
        assert_eq!(value.decimal.mantissa, -55);
        assert_eq!(value.decimal.to_string(), "-5.5");
    }

    #[test]
    fn test_decimal_roundtrip_preserves_precision() {
        // "4.20": precision 2, scale 0, size 2, mantissa 420
        let payload = hex::decode("4201a4").unwrap();
        let (value, _) = extract_decimal(&payload).unwrap();
        assert_eq!(value.decimal, Decimal::new(2, 2, 420));
        assert_eq!(value.decimal.to_string(), "4.20");
        assert_eq!(encode_decimal(&value), payload);
    }

    #[test]
    fn test_truncated_rejected() {
        let payload = [0x24, 0x01];
        assert!(extract_decimal(&payload).is_err());
    }

    #[test]
    fn test_int_roundtrip() {
        assert_eq!(extract_int(&[0x01, 0x02], 2).unwrap(), 0x0102);
        assert_eq!(encode_int(0x0102, 2), vec![0x01, 0x02]);
        assert_eq!(encode_int(0x7f, 1), vec![0x7f]);
    }
}
