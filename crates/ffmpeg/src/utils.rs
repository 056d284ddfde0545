use defects_core::timebase::Rational;

use crate::ffi::*;

/// Checks if a value is AV_NOPTS_VALUE and returns None if it is.
pub const fn check_i64(val: i64) -> Option<i64> {
    if val == AV_NOPTS_VALUE {
        None
    } else {
        Some(val)
    }
}

/// Returns the value if it is Some, otherwise returns AV_NOPTS_VALUE.
pub const fn or_nopts(val: Option<i64>) -> i64 {
    if let Some(val) = val {
        val
    } else {
        AV_NOPTS_VALUE
    }
}

/// Converts an ffmpeg rational. A zero denominator becomes [`Rational::ZERO`].
pub const fn rational(value: AVRational) -> Rational {
    match Rational::try_new(value.num, value.den) {
        Some(rational) => rational,
        None => Rational::ZERO,
    }
}

/// Converts a rational into the ffmpeg representation.
pub const fn av_rational(value: Rational) -> AVRational {
    AVRational {
        num: value.numerator,
        den: value.denominator.get(),
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use defects_core::timebase::Rational;

    use super::{av_rational, check_i64, or_nopts, rational};
    use crate::ffi::{AVRational, AV_NOPTS_VALUE};

    #[test]
    fn test_nopts_helpers() {
        assert_eq!(check_i64(AV_NOPTS_VALUE), None);
        assert_eq!(check_i64(1001), Some(1001));
        assert_eq!(or_nopts(None), AV_NOPTS_VALUE);
        assert_eq!(or_nopts(Some(-5)), -5);
    }

    #[test]
    fn test_rational_conversion() {
        let ntsc = rational(AVRational { num: 30000, den: 1001 });
        assert_eq!(ntsc, Rational::static_new::<30000, 1001>());

        let back = av_rational(ntsc);
        assert_eq!((back.num, back.den), (30000, 1001));

        assert_eq!(rational(AVRational { num: 0, den: 0 }), Rational::ZERO);
    }
}
