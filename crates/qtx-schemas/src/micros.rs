//! Fixed-point money type.
//!
//! All money amounts in this system use a 1e-6 (micros) fixed-point
//! representation stored as `i64`. Using raw `i64` for money allows
//! accidental arithmetic with unrelated integers (share counts, ids)
//! without any compile-time signal; `Micros` wraps the raw `i64` so the
//! type system prevents that mixing.
//!
//! 1 USD = 1_000_000 Micros. Share counts, ids, and day counters remain
//! plain `i64`/`u32` and are never implicitly convertible.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A fixed-point monetary amount at 1e-6 scale (micros).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);
    pub const MAX: Micros = Micros(i64::MAX);
    pub const MIN: Micros = Micros(i64::MIN);

    /// Construct a `Micros` from a raw `i64` already at 1e-6 scale.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Construct from a floating-point dollar amount. Used only at
    /// boundaries where an upstream source (config, a Python-era test
    /// fixture) hands back an `f64`; internal arithmetic stays integral.
    #[inline]
    pub fn from_f64(dollars: f64) -> Self {
        Micros((dollars * 1_000_000.0).round() as i64)
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn checked_sub(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_sub(rhs.0).map(Micros)
    }

    #[inline]
    pub fn abs(self) -> Micros {
        Micros(self.0.saturating_abs())
    }

    #[inline]
    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    #[inline]
    pub fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiply a per-unit price by an integer share quantity.
    /// `None` on overflow; callers must handle it explicitly.
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Micros> {
        self.0.checked_mul(qty).map(Micros)
    }

    /// Scale by a floating-point factor (slippage bps, fractions, …).
    /// Precision loss is acceptable here; this is never used for the
    /// ledger's own cash arithmetic, only for deriving estimates.
    #[inline]
    pub fn scale(self, factor: f64) -> Micros {
        Micros((self.0 as f64 * factor).round() as i64)
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 / 1_000_000;
        let frac = (self.0 % 1_000_000).abs();
        if self.0 < 0 && dollars == 0 {
            write!(f, "-{dollars}.{frac:06}")
        } else {
            write!(f, "{dollars}.{frac:06}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_additive_identity() {
        let a = Micros::new(42_000_000);
        assert_eq!(a + Micros::ZERO, a);
    }

    #[test]
    fn add_and_sub_roundtrip() {
        let a = Micros::new(100_000_000);
        let b = Micros::new(25_000_000);
        assert_eq!((a + b) - b, a);
    }

    #[test]
    fn saturating_add_clamps_at_max() {
        assert_eq!(Micros::MAX.saturating_add(Micros::new(1)), Micros::MAX);
    }

    #[test]
    fn checked_mul_qty_overflow_is_none() {
        assert_eq!(Micros::MAX.checked_mul_qty(2), None);
    }

    #[test]
    fn from_f64_roundtrips_to_f64() {
        let m = Micros::from_f64(150.25);
        assert_eq!(m.raw(), 150_250_000);
        assert!((m.to_f64() - 150.25).abs() < 1e-9);
    }

    #[test]
    fn display_negative_sub_dollar() {
        let m = Micros::new(-250_000);
        assert_eq!(format!("{m}"), "-0.250000");
    }

    #[test]
    fn scale_applies_factor() {
        let m = Micros::new(100_000_000);
        assert_eq!(m.scale(1.05).raw(), 105_000_000);
    }
}
