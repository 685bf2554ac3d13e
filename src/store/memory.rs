use super::{
    ConfigRow, ReagentPatch, ReagentRow, RemoteStore, TransactionRow, map_rows,
};
use crate::error::StoreError;
use crate::model::{ConfigEntry, Reagent, Transaction};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Tables {
    config: BTreeMap<String, ConfigRow>,
    reagents: Vec<ReagentRow>,
    transactions: Vec<TransactionRow>,
}

/// In-process stand-in for the hosted store
///
/// Rows are kept in their wire shape so reads go through the same mapping
/// layer as the HTTP client. Reads and writes can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a raw reagent row, bypassing validation
    pub fn seed_reagent_row(&self, row: ReagentRow) {
        self.lock().reagents.push(row);
    }

    pub fn seed_config(&self, key: &str, value: &str) {
        self.lock().config.insert(
            key.to_string(),
            ConfigRow {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    pub fn reagent_rows(&self) -> Vec<ReagentRow> {
        self.lock().reagents.clone()
    }

    pub fn transaction_rows(&self) -> Vec<TransactionRow> {
        self.lock().transactions.clone()
    }

    pub fn config_value(&self, key: &str) -> Option<String> {
        self.lock().config.get(key).map(|r| r.value.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // a panicking test must not poison every later call
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select_config(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        self.check_read()?;
        Ok(self
            .lock()
            .config
            .values()
            .cloned()
            .map(ConfigEntry::from)
            .collect())
    }

    async fn upsert_config(&self, entry: &ConfigEntry) -> Result<(), StoreError> {
        self.check_write()?;
        self.lock()
            .config
            .insert(entry.key.clone(), ConfigRow::from(entry));
        Ok(())
    }

    async fn select_reagents(&self) -> Result<Vec<Reagent>, StoreError> {
        self.check_read()?;
        let rows = self.lock().reagents.clone();
        Ok(map_rows(rows))
    }

    async fn upsert_reagent(&self, reagent: &Reagent) -> Result<(), StoreError> {
        self.check_write()?;
        let row = ReagentRow::from(reagent);
        let mut tables = self.lock();
        match tables.reagents.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => tables.reagents.push(row),
        }
        Ok(())
    }

    async fn update_reagent(&self, id: &str, patch: &ReagentPatch) -> Result<(), StoreError> {
        self.check_write()?;
        let mut tables = self.lock();
        if let Some(row) = tables.reagents.iter_mut().find(|r| r.id == id) {
            patch.apply_to(row);
        }
        Ok(())
    }

    async fn select_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        self.check_read()?;
        let rows = self.lock().transactions.clone();
        let mut list: Vec<Transaction> = map_rows(rows);
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        list.truncate(limit);
        Ok(list)
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.check_write()?;
        let mut tables = self.lock();
        if !tables.reagents.iter().any(|r| r.id == transaction.reagent_id) {
            return Err(StoreError::Status {
                status: 409,
                body: format!("reagent_id {} violates foreign key", transaction.reagent_id),
            });
        }
        if tables.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(StoreError::Status {
                status: 409,
                body: format!("duplicate transaction id {}", transaction.id),
            });
        }
        tables.transactions.push(TransactionRow::from(transaction));
        Ok(())
    }
}
