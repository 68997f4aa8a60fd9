use std::fmt::Display;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A quantity of produce in whole base units (e.g. kilograms).
///
/// Quantities are integral so that repeated fills and refunds never drift.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(pub i64);

/// A monetary amount in minor currency units (e.g. paise).
///
/// Signed: ledger debits are negative and credits positive. Instances are
/// interpreted in the currency of the marketplace; no conversion exists.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub i64);

impl Quantity {
    /// The zero quantity
    pub const ZERO: Self = Self(0);

    /// Whether this quantity is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl Amount {
    /// The zero amount
    pub const ZERO: Self = Self(0);

    /// Whether this amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The gross value of `quantity` units at `self` per unit, or None on overflow
    pub fn checked_total(self, quantity: Quantity) -> Option<Amount> {
        self.0.checked_mul(quantity.0).map(Amount)
    }

    /// Checked addition
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }
}

macro_rules! arithmetic {
    ($struct:ident) => {
        impl Add for $struct {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $struct {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $struct {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl SubAssign for $struct {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Neg for $struct {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl Sum for $struct {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

arithmetic!(Quantity);
arithmetic!(Amount);
