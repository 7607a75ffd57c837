use std::fmt;

use thiserror::Error;

/// Number of atoms in one coin.
pub const ATOMS_PER_COIN: i64 = 100_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmountError {
    #[error("amount {0} is not a finite number")]
    NotFinite(f64),

    #[error("amount {0} is out of range")]
    OutOfRange(f64),
}

/// A coin value stored as a whole number of atoms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_atoms(atoms: i64) -> Self {
        Self(atoms)
    }

    /// Converts a coin value to atoms, rounding half away from zero.
    pub fn from_coin(coin: f64) -> Result<Self, AmountError> {
        if !coin.is_finite() {
            return Err(AmountError::NotFinite(coin));
        }

        let atoms = (coin * ATOMS_PER_COIN as f64).round();
        if atoms > i64::MAX as f64 || atoms < i64::MIN as f64 {
            return Err(AmountError::OutOfRange(coin));
        }

        Ok(Self(atoms as i64))
    }

    pub const fn atoms(self) -> i64 {
        self.0
    }

    pub fn to_coin(self) -> f64 {
        self.0 as f64 / ATOMS_PER_COIN as f64
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8} DCR", self.to_coin())
    }
}
