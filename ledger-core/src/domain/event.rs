//! Ledger audit events

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountId;

/// A state transition recorded after a successful commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: LedgerEventKind,
}

/// Event payload, tagged by `event` in its JSON form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEventKind {
    AccountCreated {
        account_id: AccountId,
        owner_id: String,
        currency: String,
    },
    Deposit {
        account_id: AccountId,
        amount: Decimal,
        new_balance: Decimal,
    },
    Withdrawal {
        account_id: AccountId,
        amount: Decimal,
        new_balance: Decimal,
    },
    Transfer {
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
        from_balance: Decimal,
        to_balance: Decimal,
    },
}

impl LedgerEvent {
    pub fn new(kind: LedgerEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn account_created(account_id: AccountId, owner_id: &str, currency: &str) -> Self {
        Self::new(LedgerEventKind::AccountCreated {
            account_id,
            owner_id: owner_id.to_string(),
            currency: currency.to_string(),
        })
    }

    pub fn deposit(account_id: AccountId, amount: Decimal, new_balance: Decimal) -> Self {
        Self::new(LedgerEventKind::Deposit { account_id, amount, new_balance })
    }

    pub fn withdrawal(account_id: AccountId, amount: Decimal, new_balance: Decimal) -> Self {
        Self::new(LedgerEventKind::Withdrawal { account_id, amount, new_balance })
    }

    pub fn transfer(
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
        from_balance: Decimal,
        to_balance: Decimal,
    ) -> Self {
        Self::new(LedgerEventKind::Transfer {
            from_account_id,
            to_account_id,
            amount,
            from_balance,
            to_balance,
        })
    }

    /// Event type name as stored in the log
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            LedgerEventKind::AccountCreated { .. } => "account_created",
            LedgerEventKind::Deposit { .. } => "deposit",
            LedgerEventKind::Withdrawal { .. } => "withdrawal",
            LedgerEventKind::Transfer { .. } => "transfer",
        }
    }

    /// Primary account the event is about
    pub fn account_id(&self) -> AccountId {
        match self.kind {
            LedgerEventKind::AccountCreated { account_id, .. }
            | LedgerEventKind::Deposit { account_id, .. }
            | LedgerEventKind::Withdrawal { account_id, .. } => account_id,
            LedgerEventKind::Transfer { from_account_id, .. } => from_account_id,
        }
    }

    /// Second account involved, for transfers
    pub fn counterparty_id(&self) -> Option<AccountId> {
        match self.kind {
            LedgerEventKind::Transfer { to_account_id, .. } => Some(to_account_id),
            _ => None,
        }
    }

    /// Amount moved, if any
    pub fn amount(&self) -> Option<Decimal> {
        match self.kind {
            LedgerEventKind::AccountCreated { .. } => None,
            LedgerEventKind::Deposit { amount, .. }
            | LedgerEventKind::Withdrawal { amount, .. }
            | LedgerEventKind::Transfer { amount, .. } => Some(amount),
        }
    }

    pub fn involves(&self, id: AccountId) -> bool {
        self.account_id() == id || self.counterparty_id() == Some(id)
    }
}
