//! Remote relational store
//!
//! The hosted database exposes three tables (`config`, `reagents`,
//! `transactions`). Rows cross the boundary as the typed DTOs below and are
//! mapped to domain types explicitly, so a malformed row surfaces as a
//! [`StoreError::Mapping`] instead of leaking loosely-typed values inward.

pub mod memory;
#[cfg(feature = "web")]
pub mod postgrest;

pub use memory::MemoryStore;
#[cfg(feature = "web")]
pub use postgrest::PostgrestStore;

use crate::error::StoreError;
use crate::model::{ConfigEntry, Reagent, Transaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_TABLE: &str = "config";
pub const REAGENTS_TABLE: &str = "reagents";
pub const TRANSACTIONS_TABLE: &str = "transactions";

/// Row-level access to the hosted store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select_config(&self) -> Result<Vec<ConfigEntry>, StoreError>;

    async fn upsert_config(&self, entry: &ConfigEntry) -> Result<(), StoreError>;

    async fn select_reagents(&self) -> Result<Vec<Reagent>, StoreError>;

    async fn upsert_reagent(&self, reagent: &Reagent) -> Result<(), StoreError>;

    /// Patch selected columns of one reagent row
    async fn update_reagent(&self, id: &str, patch: &ReagentPatch) -> Result<(), StoreError>;

    /// Newest transactions first, at most `limit` rows
    async fn select_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError>;

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError>;
}

/// Partial update of a reagent row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReagentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ordered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReagentPatch {
    pub fn apply_to(&self, row: &mut ReagentRow) {
        if let Some(v) = self.min_stock {
            row.min_stock = v;
        }
        if let Some(v) = self.is_ordered {
            row.is_ordered = Some(v);
        }
        if let Some(v) = self.is_deleted {
            row.is_deleted = Some(v);
        }
        if let Some(v) = self.last_updated {
            row.last_updated = v.to_rfc3339();
        }
    }
}

/// NUMERIC columns arrive as JSON numbers or as numeric strings
fn numeric<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(v) => Ok(v),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("not a number: '{}'", s))),
    }
}

fn parse_timestamp(table: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Mapping {
            table,
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn mapping(table: &'static str, reason: String) -> StoreError {
    StoreError::Mapping { table, reason }
}

/// `config` table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRow {
    pub key: String,
    pub value: String,
}

impl From<ConfigRow> for ConfigEntry {
    fn from(row: ConfigRow) -> Self {
        ConfigEntry {
            key: row.key,
            value: row.value,
        }
    }
}

impl From<&ConfigEntry> for ConfigRow {
    fn from(entry: &ConfigEntry) -> Self {
        ConfigRow {
            key: entry.key.clone(),
            value: entry.value.clone(),
        }
    }
}

/// `reagents` table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReagentRow {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub presentation: String,
    #[serde(deserialize_with = "numeric")]
    pub current_stock: f64,
    #[serde(deserialize_with = "numeric")]
    pub min_stock: f64,
    pub department: String,
    pub base_unit: String,
    pub container_type: String,
    #[serde(deserialize_with = "numeric")]
    pub quantity_per_container: f64,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub is_ordered: Option<bool>,
    pub last_updated: String,
    #[serde(default)]
    pub is_deleted: Option<bool>,
}

impl TryFrom<ReagentRow> for Reagent {
    type Error = StoreError;

    fn try_from(row: ReagentRow) -> Result<Self, Self::Error> {
        let presentation = row
            .presentation
            .parse()
            .map_err(|e| mapping(REAGENTS_TABLE, e))?;
        let department = row
            .department
            .parse()
            .map_err(|e| mapping(REAGENTS_TABLE, e))?;
        if row.current_stock < 0.0 {
            return Err(mapping(
                REAGENTS_TABLE,
                format!("negative stock {} for {}", row.current_stock, row.id),
            ));
        }
        let last_updated = parse_timestamp(REAGENTS_TABLE, &row.last_updated)?;

        Ok(Reagent {
            id: row.id,
            name: row.name,
            brand: row.brand,
            presentation,
            current_stock: row.current_stock,
            min_stock: row.min_stock,
            department,
            base_unit: row.base_unit,
            container_type: row.container_type,
            quantity_per_container: row.quantity_per_container,
            expiry_date: row
                .expiry_date
                .unwrap_or_else(|| crate::model::NOT_AVAILABLE.to_string()),
            is_ordered: row.is_ordered.unwrap_or(false),
            is_deleted: row.is_deleted.unwrap_or(false),
            last_updated,
        })
    }
}

impl From<&Reagent> for ReagentRow {
    fn from(r: &Reagent) -> Self {
        ReagentRow {
            id: r.id.clone(),
            name: r.name.clone(),
            brand: r.brand.clone(),
            presentation: r.presentation.as_str().to_string(),
            current_stock: r.current_stock,
            min_stock: r.min_stock,
            department: r.department.as_str().to_string(),
            base_unit: r.base_unit.clone(),
            container_type: r.container_type.clone(),
            quantity_per_container: r.quantity_per_container,
            expiry_date: Some(r.expiry_date.clone()),
            is_ordered: Some(r.is_ordered),
            last_updated: r.last_updated.to_rfc3339(),
            is_deleted: Some(r.is_deleted),
        }
    }
}

/// `transactions` table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub id: String,
    pub reagent_id: String,
    pub reagent_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "numeric")]
    pub quantity: f64,
    #[serde(deserialize_with = "numeric")]
    pub display_quantity: f64,
    pub display_unit: String,
    pub analyst: String,
    pub timestamp: String,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse()
            .map_err(|e| mapping(TRANSACTIONS_TABLE, e))?;
        let timestamp = parse_timestamp(TRANSACTIONS_TABLE, &row.timestamp)?;
        Ok(Transaction {
            id: row.id,
            reagent_id: row.reagent_id,
            reagent_name: row.reagent_name,
            kind,
            quantity: row.quantity,
            display_quantity: row.display_quantity,
            display_unit: row.display_unit,
            analyst: row.analyst,
            timestamp,
        })
    }
}

impl From<&Transaction> for TransactionRow {
    fn from(t: &Transaction) -> Self {
        TransactionRow {
            id: t.id.clone(),
            reagent_id: t.reagent_id.clone(),
            reagent_name: t.reagent_name.clone(),
            kind: t.kind.as_str().to_string(),
            quantity: t.quantity,
            display_quantity: t.display_quantity,
            display_unit: t.display_unit.clone(),
            analyst: t.analyst.clone(),
            timestamp: t.timestamp.to_rfc3339(),
        }
    }
}

/// Deserialize raw JSON rows, dropping (and logging) the ones that do not fit `T`
pub fn decode_rows<T: DeserializeOwned>(table: &'static str, rows: Vec<serde_json::Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("skipping remote row: {}", mapping(table, e.to_string()));
                None
            }
        })
        .collect()
}

/// Map rows, dropping (and logging) the ones that fail validation
pub fn map_rows<R, T>(rows: Vec<R>) -> Vec<T>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("skipping remote row: {}", e);
                None
            }
        })
        .collect()
}
