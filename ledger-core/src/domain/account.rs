//! Account domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// System-assigned account identifier, drawn from an ascending store sequence
pub type AccountId = i64;

/// Maximum fractional digits an amount may carry.
/// Matches the scale of the persisted balance column (DECIMAL(38, 8)).
pub const MAX_AMOUNT_SCALE: u32 = 8;

/// An account holding a single-currency balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: String,
    /// ISO-style currency code, normalized to uppercase
    pub currency: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account with a zero balance
    pub fn new(id: AccountId, owner_id: impl Into<String>, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id: owner_id.into(),
            currency: Self::normalize_currency(currency),
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Validate the fields supplied by a caller when opening an account
    pub fn validate_new(owner_id: &str, currency: &str) -> Result<()> {
        if owner_id.trim().is_empty() {
            return Err(Error::validation("owner id cannot be empty"));
        }
        let currency = currency.trim();
        if currency.is_empty() {
            return Err(Error::validation("currency cannot be empty"));
        }
        if !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::validation(format!(
                "currency must be alphabetic, got '{}'",
                currency
            )));
        }
        Ok(())
    }

    /// Balance after crediting `amount`
    pub fn credited(&self, amount: Decimal) -> Result<Decimal> {
        self.balance
            .checked_add(amount)
            .ok_or_else(|| Error::invalid_amount(format!("{} would overflow the balance", amount)))
    }

    /// Balance after debiting `amount`; never negative
    pub fn debited(&self, amount: Decimal) -> Result<Decimal> {
        if self.balance < amount {
            return Err(Error::InsufficientFunds {
                account_id: self.id,
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(self.balance - amount)
    }
}

/// Check that an amount can be applied to a balance.
///
/// Amounts must be strictly positive and representable at the stored scale.
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::invalid_amount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(Error::invalid_amount(format!(
            "amount {} has more than {} decimal places",
            amount, MAX_AMOUNT_SCALE
        )));
    }
    Ok(())
}
