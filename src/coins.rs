//! Coin amounts and the fixed-point decimal used for shares and commission

use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "amount_str")]
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Coin {
            denom: denom.into(),
            amount,
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        validate_denom(&self.denom)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Serde adapter writing integer amounts as decimal strings, so amounts past
/// `u64::MAX` survive JSON.
pub mod amount_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Denoms are 3..=128 characters, start with a letter, and otherwise use
/// letters, digits and `/:._-`.
pub fn validate_denom(denom: &str) -> Result<(), HarnessError> {
    let valid_len = (3..=128).contains(&denom.len());
    let mut chars = denom.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));
    if valid_len && starts_with_letter && rest_ok {
        Ok(())
    } else {
        Err(HarnessError::Validation(format!("invalid denom: {}", denom)))
    }
}

/// A normalized coin set: sorted by denom, one entry per denom, no zero amounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a normalized set, merging duplicate denoms and dropping zeros.
    pub fn from_coins(coins: impl IntoIterator<Item = Coin>) -> Result<Self, HarnessError> {
        let mut merged: BTreeMap<String, u128> = BTreeMap::new();
        for coin in coins {
            coin.validate()?;
            let entry = merged.entry(coin.denom).or_insert(0);
            *entry = entry.checked_add(coin.amount).ok_or_else(|| {
                HarnessError::Validation("coin amount overflow".to_string())
            })?;
        }
        Ok(Self::from_map(merged))
    }

    pub fn single(denom: impl Into<String>, amount: u128) -> Result<Self, HarnessError> {
        Self::from_coins([Coin::new(denom, amount)])
    }

    fn from_map(map: BTreeMap<String, u128>) -> Self {
        Coins(
            map.into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    fn to_map(&self) -> BTreeMap<String, u128> {
        self.0
            .iter()
            .map(|c| (c.denom.clone(), c.amount))
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Coin> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0
            .iter()
            .find(|c| c.denom == denom)
            .map_or(0, |c| c.amount)
    }

    /// Checks normalization of a set that may have been deserialized as-is.
    pub fn validate(&self) -> Result<(), HarnessError> {
        for coin in &self.0 {
            coin.validate()?;
            if coin.amount == 0 {
                return Err(HarnessError::Validation(format!(
                    "coin {} has zero amount",
                    coin.denom
                )));
            }
        }
        if self.0.windows(2).any(|w| w[0].denom >= w[1].denom) {
            return Err(HarnessError::Validation(
                "coins must be sorted by denom without duplicates".to_string(),
            ));
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins, HarnessError> {
        let mut sum = self.to_map();
        for coin in &other.0 {
            let entry = sum.entry(coin.denom.clone()).or_insert(0);
            *entry = entry.checked_add(coin.amount).ok_or_else(|| {
                HarnessError::Validation(format!("overflow adding {}", coin))
            })?;
        }
        Ok(Self::from_map(sum))
    }

    /// Subtracts `other`, failing if any denom would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut diff = self.to_map();
        for coin in &other.0 {
            let entry = diff.entry(coin.denom.clone()).or_insert(0);
            *entry = entry.checked_sub(coin.amount)?;
        }
        Some(Self::from_map(diff))
    }

    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.iter().all(|c| self.amount_of(&c.denom) >= c.amount)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl<'a> IntoIterator for &'a Coins {
    type Item = &'a Coin;
    type IntoIter = std::slice::Iter<'a, Coin>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Number of fractional digits carried by [`Dec`].
pub const DEC_PRECISION: u32 = 18;
const DEC_ONE: u128 = 10u128.pow(DEC_PRECISION);

/// Non-negative fixed-point decimal with 18 fractional digits, serialized as a
/// decimal string (`"1.000000000000000000"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dec(u128);

impl Dec {
    pub const fn zero() -> Self {
        Dec(0)
    }

    pub const fn one() -> Self {
        Dec(DEC_ONE)
    }

    pub fn from_int(value: u128) -> Option<Self> {
        value.checked_mul(DEC_ONE).map(Dec)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / DEC_ONE,
            self.0 % DEC_ONE,
            width = DEC_PRECISION as usize
        )
    }
}

impl std::str::FromStr for Dec {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HarnessError::Validation(format!("invalid decimal: {}", s));
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() || frac_part.len() > DEC_PRECISION as usize {
            return Err(invalid());
        }
        let int: u128 = int_part.parse().map_err(|_| invalid())?;
        let frac: u128 = if frac_part.is_empty() {
            0
        } else {
            let digits: u128 = frac_part.parse().map_err(|_| invalid())?;
            digits * 10u128.pow(DEC_PRECISION - frac_part.len() as u32)
        };
        int.checked_mul(DEC_ONE)
            .and_then(|v| v.checked_add(frac))
            .map(Dec)
            .ok_or_else(invalid)
    }
}

impl Serialize for Dec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
