//! Fixed-point token arithmetic.
//!
//! Balances, reservations and ledger deltas are all expressed in tokens with
//! 4 fractional digits, stored as a signed integer count of ten-thousandths.
//! Storage-level guards (CHECK constraints, conditional updates) keep user
//! balances non-negative; the type itself is signed so it can also carry
//! ledger deltas.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Number of fixed-point units per whole token.
pub const TOKEN_SCALE: i64 = 10_000;

/// A token quantity with 4 fractional digits of precision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct Tokens(i64);

impl Tokens {
    pub const ZERO: Tokens = Tokens(0);
    pub const ONE: Tokens = Tokens(TOKEN_SCALE);

    /// Construct from a whole number of tokens.
    pub fn from_whole(tokens: i64) -> Self {
        Tokens(tokens * TOKEN_SCALE)
    }

    /// Construct from raw fixed-point units (ten-thousandths of a token).
    pub fn from_units(units: i64) -> Self {
        Tokens(units)
    }

    /// Raw fixed-point units.
    pub fn units(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Convert from a decimal token amount, truncating below 4 fractional
    /// digits. Returns `None` when the value does not fit.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        (value * Decimal::from(TOKEN_SCALE)).trunc().to_i64().map(Tokens)
    }

    /// Decimal token amount with scale 4.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 4)
    }
}

impl Add for Tokens {
    type Output = Tokens;

    fn add(self, rhs: Tokens) -> Tokens {
        Tokens(self.0 + rhs.0)
    }
}

impl Sub for Tokens {
    type Output = Tokens;

    fn sub(self, rhs: Tokens) -> Tokens {
        Tokens(self.0 - rhs.0)
    }
}

impl Neg for Tokens {
    type Output = Tokens;

    fn neg(self) -> Tokens {
        Tokens(-self.0)
    }
}

impl fmt::Display for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal().normalize())
    }
}
