//! Compact difficulty encoding used by the stratum `job` message
//!
//! The packed form keeps a signed 8-bit order in the high byte and a 24-bit
//! mantissa, with an implicit leading bit, in the low three bytes. A packed
//! value `p` stands for `(2^24 + (p & 0xffffff)) * 2^(order - 24)`, so any
//! positive value with at most 25 significant bits and a binary exponent in
//! `-128..=127` survives a round trip.

const MANTISSA_BITS: i32 = 24;
const MANTISSA_MASK: u32 = (1 << MANTISSA_BITS) - 1;
const IMPLICIT_BIT: u32 = 1 << MANTISSA_BITS;

const MIN_ORDER: i32 = i8::MIN as i32;
const MAX_ORDER: i32 = i8::MAX as i32;

/// Smallest encodable difficulty, `2^-128`
const PACKED_MIN: u32 = 0x8000_0000;
/// Largest encodable difficulty, just under `2^128`
const PACKED_MAX: u32 = 0x7fff_ffff;

/// Binary exponent of a positive normal float, `floor(log2(value))`
fn exponent(value: f64) -> i32 {
    ((value.to_bits() >> 52) & 0x7ff) as i32 - 1023
}

/// Encode a difficulty into its packed 32-bit form.
///
/// The order is the bit length of the value less 25, offset by 24, which
/// is its binary exponent. Mantissa bits below the 24 kept ones are
/// truncated. Values outside the encodable range saturate; zero, negative
/// and NaN inputs encode as the smallest difficulty.
pub fn pack(value: f64) -> u32 {
    if value.is_nan() || value < f64::MIN_POSITIVE {
        return PACKED_MIN;
    }
    if value.is_infinite() {
        return PACKED_MAX;
    }

    let order = exponent(value);
    if order < MIN_ORDER {
        return PACKED_MIN;
    }
    if order > MAX_ORDER {
        return PACKED_MAX;
    }

    // In [2^24, 2^25); truncation drops the bits the mantissa cannot hold.
    let scaled = (value * 2f64.powi(MANTISSA_BITS - order)) as u32;
    (((order as u32) & 0xff) << MANTISSA_BITS) | (scaled & MANTISSA_MASK)
}

/// Decode a packed difficulty. The order byte is signed.
pub fn unpack(packed: u32) -> f64 {
    let order = (packed as i32) >> MANTISSA_BITS;
    let mantissa = (IMPLICIT_BIT | (packed & MANTISSA_MASK)) as f64;

    mantissa * 2f64.powi(order - MANTISSA_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_values() {
        assert_eq!(pack(2.0), 16777216);
        assert_eq!(unpack(16777216), 2.0);

        assert_eq!(pack(100.5), 110231552);
        assert_eq!(unpack(110231552), 100.5);

        assert_eq!(pack(1.0), 0);
        assert_eq!(unpack(0), 1.0);
    }

    #[test]
    fn test_large_difficulty() {
        let packed = pack(3_000_000_000.0);
        assert_eq!(unpack(packed), 3_000_000_000.0);
        assert_eq!(packed >> 24, 31);

        let packed = pack(2f64.powi(40));
        assert_eq!(packed, 40 << 24);
        assert_eq!(unpack(packed), 2f64.powi(40));
    }

    #[test]
    fn test_fractional_difficulty() {
        assert_eq!(pack(0.75), 0xff80_0000);
        assert_eq!(unpack(0xff80_0000), 0.75);
        assert_eq!(pack(0.5), 0xff00_0000);
        assert_eq!(unpack(0xff00_0000), 0.5);
    }

    #[test]
    fn test_out_of_range_saturates() {
        assert_eq!(pack(0.0), PACKED_MIN);
        assert_eq!(pack(-3.0), PACKED_MIN);
        assert_eq!(pack(f64::NAN), PACKED_MIN);
        assert_eq!(pack(2f64.powi(-200)), PACKED_MIN);
        assert_eq!(pack(f64::INFINITY), PACKED_MAX);
        assert_eq!(pack(2f64.powi(200)), PACKED_MAX);
        assert_eq!(unpack(PACKED_MIN), 2f64.powi(-128));
        assert!(unpack(PACKED_MAX) < 2f64.powi(128));
    }

    proptest! {
        #[test]
        fn prop_integer_round_trip(value in 1u32..(1 << 24)) {
            prop_assert_eq!(unpack(pack(value as f64)), value as f64);
        }

        #[test]
        fn prop_wide_integer_round_trip(mantissa in 0u64..(1 << 24), order in 32i32..=127) {
            let value = (IMPLICIT_BIT as u64 | mantissa) as f64 * 2f64.powi(order - MANTISSA_BITS);
            prop_assert!(value >= 4_294_967_296.0);
            prop_assert_eq!(unpack(pack(value)), value);
        }

        #[test]
        fn prop_sub_unit_round_trip(mantissa in 0u32..(1 << 24)) {
            let value = (IMPLICIT_BIT | mantissa) as f64 / 2f64.powi(MANTISSA_BITS + 1);
            prop_assert!((0.5..1.0).contains(&value));
            prop_assert_eq!(unpack(pack(value)), value);
        }

        #[test]
        fn prop_packed_round_trip(packed in any::<u32>()) {
            prop_assert_eq!(pack(unpack(packed)), packed);
        }

        #[test]
        fn prop_truncation_never_rounds_up(value in 1e-30f64..1e30) {
            let decoded = unpack(pack(value));
            prop_assert!(decoded <= value);
            prop_assert!(decoded > value * (1.0 - 2f64.powi(-23)));
        }
    }
}
