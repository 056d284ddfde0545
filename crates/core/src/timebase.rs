use std::num::NonZero;

/// A rational number, used for time bases and frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    /// Numerator.
    pub numerator: i32,
    /// Denominator.
    pub denominator: NonZero<i32>,
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Rational {
    /// The zero rational number.
    pub const ZERO: Rational = Rational::static_new::<0, 1>();

    /// Create a new rational number.
    pub const fn new(numerator: i32, denominator: NonZero<i32>) -> Self {
        Self { numerator, denominator }
    }

    /// Create a rational number from raw parts, `None` if the denominator is 0.
    pub const fn try_new(numerator: i32, denominator: i32) -> Option<Self> {
        match NonZero::new(denominator) {
            Some(denominator) => Some(Self::new(numerator, denominator)),
            None => None,
        }
    }

    /// Construct a new rational number at compile time.
    ///
    /// # Panics
    ///
    /// This will panic if the denominator is 0.
    pub const fn static_new<const N: i32, const D: i32>() -> Self {
        const {
            assert!(D != 0, "denominator is 0");
        }

        Self::new(N, NonZero::new(D).expect("denominator is 0"))
    }

    /// Returns true if the numerator is 0.
    pub const fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// Get the rational number as a floating point number.
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator.get() as f64
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Converts `value` from the `from` time base to the `to` time base.
///
/// Rounds to the nearest integer, halfway cases away from zero. Returns `None`
/// if `to` is zero or the result does not fit in an `i64`.
pub fn rescale(value: i64, from: Rational, to: Rational) -> Option<i64> {
    let mut num = i128::from(value) * i128::from(from.numerator) * i128::from(to.denominator.get());
    let mut den = i128::from(from.denominator.get()) * i128::from(to.numerator);

    if den == 0 {
        return None;
    }

    if den < 0 {
        num = -num;
        den = -den;
    }

    let rounded = if num >= 0 {
        (2 * num + den) / (2 * den)
    } else {
        -((-2 * num + den) / (2 * den))
    };

    i64::try_from(rounded).ok()
}

/// The duration of one frame in `time_base` units for a stream running at `frame_rate`.
///
/// Uses plain integer division in the order `den / num / rate_num * rate_den`,
/// which is exact for the `1 / rate_num` encoder time base the pipeline uses.
pub fn frame_duration(time_base: Rational, frame_rate: Rational) -> Option<i64> {
    if time_base.is_zero() || frame_rate.is_zero() {
        return None;
    }

    let duration = i64::from(time_base.denominator.get()) / i64::from(time_base.numerator)
        / i64::from(frame_rate.numerator)
        * i64::from(frame_rate.denominator.get());

    Some(duration)
}

/// The rewritten timestamp for a frame whose rule already fired `delta` times in the current cycle.
pub const fn corrupt_pts(pts: i64, delta: u32, duration: i64) -> i64 {
    let delta = delta as i64;
    pts - delta * duration + delta
}
