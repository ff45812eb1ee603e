//! Status service - readiness and ledger totals

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::ports::{AccountStore, EventLog};

/// Status service for health and summary output
pub struct StatusService {
    store: Arc<dyn AccountStore>,
    events: Arc<dyn EventLog>,
}

impl StatusService {
    pub fn new(store: Arc<dyn AccountStore>, events: Arc<dyn EventLog>) -> Self {
        Self { store, events }
    }

    /// Get overall status summary
    ///
    /// An unreachable store is reported as `ready: false` rather than an
    /// error. An unreachable audit log leaves `total_events` empty. A
    /// per-currency total that does not fit a decimal is a `Validation` error.
    pub fn status(&self) -> Result<StatusSummary> {
        if let Err(e) = self.store.ping() {
            return Ok(StatusSummary {
                ready: false,
                store: self.store.name().to_string(),
                store_error: Some(e.to_string()),
                total_accounts: 0,
                totals: Vec::new(),
                total_events: None,
            });
        }

        let accounts = self.store.list()?;
        let mut by_currency: BTreeMap<String, (usize, Decimal)> = BTreeMap::new();
        for account in &accounts {
            let entry = by_currency
                .entry(account.currency.clone())
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 = entry.1.checked_add(account.balance).ok_or_else(|| {
                Error::validation(format!("total {} balance overflows", account.currency))
            })?;
        }

        Ok(StatusSummary {
            ready: true,
            store: self.store.name().to_string(),
            store_error: None,
            total_accounts: accounts.len(),
            totals: by_currency
                .into_iter()
                .map(|(currency, (accounts, balance))| CurrencyTotal {
                    currency,
                    accounts,
                    balance,
                })
                .collect(),
            total_events: self.events.count().ok(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub ready: bool,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    pub total_accounts: usize,
    pub totals: Vec<CurrencyTotal>,
    pub total_events: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CurrencyTotal {
    pub currency: String,
    pub accounts: usize,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryEventLog, MemoryStore};
    use crate::ports::UnitOfWork;
    use std::time::Duration;

    fn set_balance(store: &MemoryStore, id: i64, balance: Decimal) {
        let mut uow: Box<dyn UnitOfWork + '_> = store.begin().unwrap();
        uow.lock_and_read(id).unwrap();
        uow.write(id, balance).unwrap();
        uow.commit().unwrap();
    }

    #[test]
    fn test_totals_grouped_by_currency() {
        let store = Arc::new(MemoryStore::new(Duration::from_millis(50)));
        let a = store.create("a", "USD").unwrap();
        let b = store.create("b", "USD").unwrap();
        let c = store.create("c", "EUR").unwrap();
        set_balance(&store, a.id, Decimal::new(10, 0));
        set_balance(&store, b.id, Decimal::new(5, 0));
        set_balance(&store, c.id, Decimal::new(1, 0));

        let service = StatusService::new(store, Arc::new(MemoryEventLog::new()));
        let status = service.status().unwrap();

        assert!(status.ready);
        assert_eq!(status.total_accounts, 3);
        assert_eq!(status.total_events, Some(0));
        assert_eq!(status.totals[0].currency, "EUR");
        assert_eq!(status.totals[1].currency, "USD");
        assert_eq!(status.totals[1].accounts, 2);
        assert_eq!(status.totals[1].balance, Decimal::new(15, 0));
    }

    #[test]
    fn test_overflowing_total_is_an_error() {
        let store = Arc::new(MemoryStore::new(Duration::from_millis(50)));
        let a = store.create("a", "USD").unwrap();
        let b = store.create("b", "USD").unwrap();
        set_balance(&store, a.id, Decimal::MAX);
        set_balance(&store, b.id, Decimal::ONE);

        let service = StatusService::new(store, Arc::new(MemoryEventLog::new()));
        assert!(matches!(service.status(), Err(Error::Validation(_))));
    }
}
