//! In-memory incentive ledger.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::interfaces::{
    Breakdown, LedgerEntry, LedgerStore, NewLedgerEntry, Result, UserId, VentureId,
};

#[derive(Default)]
pub struct MockLedgerStore {
    entries: RwLock<Vec<LedgerEntry>>,
    next_id: AtomicI64,
}

impl MockLedgerStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Snapshot of every stored entry.
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl LedgerStore for MockLedgerStore {
    async fn find_entry(
        &self,
        user_id: UserId,
        venture_id: VentureId,
        day: NaiveDate,
    ) -> Result<Option<LedgerEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.user_id == user_id && e.venture_id == venture_id && e.day == day)
            .cloned())
    }

    async fn insert_entry(&self, entry: NewLedgerEntry) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.write().await.push(LedgerEntry {
            id,
            user_id: entry.user_id,
            venture_id: entry.venture_id,
            day: entry.day,
            amount: entry.amount,
            currency: entry.currency,
            breakdown: entry.breakdown,
        });
        Ok(id)
    }

    async fn update_entry(&self, id: i64, amount: f64, breakdown: &Breakdown) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.amount = amount;
            entry.breakdown = breakdown.clone();
        }
        Ok(())
    }

    async fn delete_day(&self, venture_id: VentureId, day: NaiveDate) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !(e.venture_id == venture_id && e.day == day));
        Ok((before - entries.len()) as u64)
    }

    async fn replace_day(
        &self,
        venture_id: VentureId,
        day: NaiveDate,
        new_entries: Vec<NewLedgerEntry>,
    ) -> Result<(u64, u64)> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !(e.venture_id == venture_id && e.day == day));
        let deleted = (before - entries.len()) as u64;

        let inserted = new_entries.len() as u64;
        for entry in new_entries {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            entries.push(LedgerEntry {
                id,
                user_id: entry.user_id,
                venture_id: entry.venture_id,
                day: entry.day,
                amount: entry.amount,
                currency: entry.currency,
                breakdown: entry.breakdown,
            });
        }
        Ok((deleted, inserted))
    }

    async fn entries_for_day(
        &self,
        venture_id: VentureId,
        day: NaiveDate,
    ) -> Result<Vec<LedgerEntry>> {
        let mut result: Vec<LedgerEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.venture_id == venture_id && e.day == day)
            .cloned()
            .collect();
        result.sort_by_key(|e| e.user_id);
        Ok(result)
    }
}
