use std::fmt;

use serde::{Deserialize, Serialize};

/// Signed rational used for gains and loudness values.
///
/// On the wire these are Q7.8 fixed point: a big endian 16 bit two's
/// complement value over 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator.
    pub num: i32,
    /// Denominator.
    pub den: i32,
}

impl Rational {
    /// Zero, in Q8 form.
    pub const ZERO: Rational = Rational::from_q8(0);

    /// Creates a new rational.
    pub const fn new(num: i32, den: i32) -> Self {
        Rational { num, den }
    }

    /// From a raw Q7.8 value.
    pub const fn from_q8(v: i16) -> Self {
        Rational {
            num: v as i32,
            den: 256,
        }
    }

    /// To a raw Q7.8 value, rounding to nearest and saturating.
    pub fn to_q8(&self) -> i16 {
        if self.den == 0 {
            return 0;
        }
        let (num, den) = if self.den < 0 {
            (-(self.num as i64) * 256, -(self.den as i64))
        } else {
            (self.num as i64 * 256, self.den as i64)
        };
        // Round half away from zero.
        let v = if num >= 0 {
            (num + den / 2) / den
        } else {
            (num - den / 2) / den
        };
        v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
    }

    /// As a float. A zero denominator gives 0.
    pub fn to_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::ZERO
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
