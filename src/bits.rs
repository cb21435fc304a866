/// Return whether bit number `bit` is set in `x`.
pub fn test_bit(bit: u64, x: u64) -> bool {
    (x >> bit) & 1 == 1
}

/// Return `x` with bit number `bit` set to `v`.
pub fn bit(bit: u64, x: u64, v: bool) -> u64 {
    if v {
        x | (1 << bit)
    } else {
        x & !(1 << bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_test_bit() {
        let x = bit(4, bit(1, 0, true), true);
        assert_eq!(x, 0x12);
        assert!(test_bit(1, x));
        assert!(test_bit(4, x));
        assert!(!test_bit(0, x));
        assert_eq!(bit(1, x, false), 0x10);
    }
}
