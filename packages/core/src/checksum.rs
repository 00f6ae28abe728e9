/// Computes the XOR checksum used by Serial API frames: the XOR of all
/// bytes in the given slice, XORed with `0xff`.
pub fn xor_sum(data: &[u8]) -> u8 {
    data.iter().fold(0xff, |acc, x| acc ^ x)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_xor_sum() {
        // 0x03 ^ 0x00 ^ 0x02 = 0x01, inverted = 0xfe
        let data = hex::decode("030002").unwrap();
        assert_eq!(xor_sum(&data), 0xfe);
    }

    #[test]
    fn test_xor_sum_empty() {
        assert_eq!(xor_sum(&[]), 0xff);
    }
}
