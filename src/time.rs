/*
 * Simulated Time
 *
 * Exact rational time for the simulator. All timeouts, run durations and
 * per-core clocks use this type; comparisons are exact and subtracting an
 * elapsed amount from a timeout never drifts. "No timeout" is represented
 * as Option<Time>::None, which is distinct from Time::ZERO.
 */

use core::cmp::Ordering;
use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Deserializer, Serialize};

/// Exact non-negative rational time.
///
/// Invariant: `den > 0` and `gcd(num, den) == 1` (zero is stored as `0/1`).
/// Every constructor normalises, so derived equality and hashing are
/// structural and the serialised form is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Time {
    num: u64,
    den: u64,
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Time {
    pub const ZERO: Time = Time { num: 0, den: 1 };

    /// Construct `num/den`.
    ///
    /// # Panics
    /// Panics if `den` is zero.
    pub fn new(num: u64, den: u64) -> Time {
        assert!(den != 0, "time denominator must be non-zero");
        Time::reduce(num as u128, den as u128).expect("time fits u64 after reduction")
    }

    /// Construct a whole number of time units.
    pub fn from_units(units: u64) -> Time {
        Time { num: units, den: 1 }
    }

    /// Reduce `num/den` to lowest terms, rejecting values that no longer
    /// fit in `u64`.
    fn reduce(num: u128, den: u128) -> Option<Time> {
        debug_assert!(den != 0);
        let g = gcd(num, den);
        let (num, den) = if g == 0 { (0, 1) } else { (num / g, den / g) };
        if num > u64::MAX as u128 || den > u64::MAX as u128 {
            return None;
        }
        Some(Time {
            num: num as u64,
            den: den as u64,
        })
    }

    pub fn numer(&self) -> u64 {
        self.num
    }

    pub fn denom(&self) -> u64 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn checked_add(self, rhs: Time) -> Option<Time> {
        let lhs = (self.num as u128).checked_mul(rhs.den as u128)?;
        let rhs_scaled = (rhs.num as u128).checked_mul(self.den as u128)?;
        let num = lhs.checked_add(rhs_scaled)?;
        let den = (self.den as u128) * (rhs.den as u128);
        Time::reduce(num, den)
    }

    /// Subtraction, or `None` when the result would be negative.
    pub fn checked_sub(self, rhs: Time) -> Option<Time> {
        let lhs = (self.num as u128) * (rhs.den as u128);
        let rhs_scaled = (rhs.num as u128) * (self.den as u128);
        let num = lhs.checked_sub(rhs_scaled)?;
        let den = (self.den as u128) * (rhs.den as u128);
        Time::reduce(num, den)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, rhs: Time) -> Time {
        self.checked_sub(rhs).unwrap_or(Time::ZERO)
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Time) -> Ordering {
        let lhs = (self.num as u128) * (other.den as u128);
        let rhs = (other.num as u128) * (self.den as u128);
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Time) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        self.checked_add(rhs).expect("time addition overflow")
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        *self = *self + rhs;
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        self.checked_sub(rhs).expect("time subtraction below zero")
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Time) {
        *self = *self - rhs;
    }
}

impl Sum for Time {
    fn sum<I: Iterator<Item = Time>>(iter: I) -> Time {
        iter.fold(Time::ZERO, |acc, t| acc + t)
    }
}

impl Default for Time {
    fn default() -> Time {
        Time::ZERO
    }
}

impl From<u64> for Time {
    fn from(units: u64) -> Time {
        Time::from_units(units)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Wire form of `Time`; decoding normalises so replayed values compare
/// structurally with freshly computed ones.
#[derive(Deserialize)]
struct TimeRepr {
    num: u64,
    den: u64,
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        let raw = TimeRepr::deserialize(deserializer)?;
        if raw.den == 0 {
            return Err(serde::de::Error::custom("time denominator is zero"));
        }
        Time::reduce(raw.num as u128, raw.den as u128)
            .ok_or_else(|| serde::de::Error::custom("time does not fit u64"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constructors_normalise() {
        assert_eq!(Time::new(2, 4), Time::new(1, 2));
        assert_eq!(Time::new(0, 7), Time::ZERO);
        assert_eq!(Time::new(6, 3), Time::from_units(2));
        assert_eq!(Time::new(10, 5).denom(), 1);
    }

    #[test]
    fn ordering_is_exact() {
        assert!(Time::new(1, 3) < Time::new(1, 2));
        assert!(Time::new(2, 6) == Time::new(1, 3));
        assert!(Time::from_units(3) > Time::new(5, 2));
        assert_eq!(
            Time::new(1, 3).min(Time::new(1, 4)),
            Time::new(1, 4)
        );
    }

    #[test]
    fn arithmetic() {
        assert_eq!(Time::new(1, 2) + Time::new(1, 3), Time::new(5, 6));
        assert_eq!(Time::new(5, 6) - Time::new(1, 3), Time::new(1, 2));
        assert_eq!(Time::new(1, 3).checked_sub(Time::new(1, 2)), None);
        assert_eq!(
            Time::new(1, 3).saturating_sub(Time::new(1, 2)),
            Time::ZERO
        );
        let total: Time = [Time::from_units(1), Time::new(1, 2)].into_iter().sum();
        assert_eq!(total, Time::new(3, 2));
    }

    #[test]
    fn display() {
        assert_eq!(Time::from_units(10).to_string(), "10");
        assert_eq!(Time::new(3, 2).to_string(), "3/2");
        assert_eq!(Time::ZERO.to_string(), "0");
    }

    #[test]
    #[should_panic]
    fn zero_denominator_rejected() {
        let _ = Time::new(1, 0);
    }

    proptest! {
        #[test]
        fn addition_commutes(a in 0u64..10_000, b in 1u64..100, c in 0u64..10_000, d in 1u64..100) {
            let x = Time::new(a, b);
            let y = Time::new(c, d);
            prop_assert_eq!(x + y, y + x);
        }

        #[test]
        fn add_then_sub_round_trips(a in 0u64..10_000, b in 1u64..100, c in 0u64..10_000, d in 1u64..100) {
            let x = Time::new(a, b);
            let y = Time::new(c, d);
            prop_assert_eq!((x + y) - y, x);
        }

        #[test]
        fn normalised_invariant(a in 0u64..100_000, b in 1u64..1_000) {
            let t = Time::new(a, b);
            prop_assert_eq!(super::gcd(t.numer() as u128, t.denom() as u128), 1);
        }
    }
}
