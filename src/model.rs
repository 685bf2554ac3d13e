use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stock at or below this value counts as an empty brand row.
pub const EMPTY_STOCK_EPSILON: f64 = 0.01;

/// Expiry/date placeholder used when a reagent has no expiry date.
pub const NOT_AVAILABLE: &str = "N/A";

/// Physical presentation of a reagent
///
/// The presentation decides which base units are offered when a new
/// reagent is registered and which container type is used by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presentation {
    #[serde(rename = "Líquido")]
    Liquid,
    #[serde(rename = "Sólido")]
    Solid,
    #[serde(rename = "Paquete")]
    Package,
}

impl Presentation {
    /// Base units suggested for this presentation, default first.
    pub fn base_units(&self) -> &'static [&'static str] {
        match self {
            Presentation::Liquid => &["mL", "L", "uL"],
            Presentation::Solid => &["g", "kg", "mg"],
            Presentation::Package => &["unidades", "Rx"],
        }
    }

    pub fn default_base_unit(&self) -> &'static str {
        self.base_units()[0]
    }

    /// Container type forced or suggested for this presentation
    pub fn default_container_type(&self) -> &'static str {
        match self {
            Presentation::Package => "Paquete",
            _ => "Frascos",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Presentation::Liquid => "Líquido",
            Presentation::Solid => "Sólido",
            Presentation::Package => "Paquete",
        }
    }

    /// Lenient parse used for label-analysis output; unknown values fall back to liquid.
    pub fn from_label(value: &str) -> Self {
        value.parse().unwrap_or(Presentation::Liquid)
    }
}

impl FromStr for Presentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Líquido" | "Liquido" => Ok(Presentation::Liquid),
            "Sólido" | "Solido" => Ok(Presentation::Solid),
            "Paquete" => Ok(Presentation::Package),
            other => Err(format!("unknown presentation '{}'", other)),
        }
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Laboratory department owning a reagent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Department {
    #[default]
    #[serde(rename = "Fisicoquímico")]
    Physicochemical,
    #[serde(rename = "Microbiología")]
    Microbiology,
    #[serde(rename = "Molecular")]
    Molecular,
}

impl Department {
    pub const ALL: [Department; 3] = [
        Department::Physicochemical,
        Department::Microbiology,
        Department::Molecular,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Physicochemical => "Fisicoquímico",
            Department::Microbiology => "Microbiología",
            Department::Molecular => "Molecular",
        }
    }
}

impl FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Fisicoquímico" | "Fisicoquimico" => Ok(Department::Physicochemical),
            "Microbiología" | "Microbiologia" => Ok(Department::Microbiology),
            "Molecular" => Ok(Department::Molecular),
            other => Err(format!("unknown department '{}'", other)),
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "ANALISTA")]
    Analyst,
    #[serde(rename = "GERENTE")]
    Manager,
}

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::In => "IN",
            TransactionType::Out => "OUT",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(TransactionType::In),
            "OUT" => Ok(TransactionType::Out),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reagent brand row as tracked in the inventory
///
/// All stock arithmetic happens in `base_unit`. Rows are never removed;
/// emptied rows are soft-deleted so historical transactions keep resolving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reagent {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub presentation: Presentation,
    /// Total stock in `base_unit`, never negative
    pub current_stock: f64,
    /// Threshold in `base_unit`
    pub min_stock: f64,
    pub department: Department,
    pub base_unit: String,
    pub container_type: String,
    pub quantity_per_container: f64,
    /// ISO date or `"N/A"`
    pub expiry_date: String,
    pub is_ordered: bool,
    pub is_deleted: bool,
    pub last_updated: DateTime<Utc>,
}

impl Reagent {
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    pub fn is_empty(&self) -> bool {
        self.current_stock <= EMPTY_STOCK_EPSILON
    }

    /// Stock expressed in containers, as shown next to the withdrawal form.
    pub fn containers_in_stock(&self) -> f64 {
        if self.quantity_per_container > 0.0 {
            self.current_stock / self.quantity_per_container
        } else {
            0.0
        }
    }

    /// Whether withdrawing `amount` would leave the row at or below its minimum.
    pub fn is_critical_after(&self, amount: f64) -> bool {
        self.current_stock - amount <= self.min_stock
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub reagent_id: String,
    pub reagent_name: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Quantity in the reagent's base unit
    pub quantity: f64,
    /// Quantity as the analyst entered it
    pub display_quantity: f64,
    pub display_unit: String,
    pub analyst: String,
    pub timestamp: DateTime<Utc>,
}

/// A named analyst and the department whose reagents they handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystUser {
    pub name: String,
    pub department: Department,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    #[serde(rename = "SENT")]
    Sent,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "PENDING")]
    Pending,
}

/// Local record of one low-stock email attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub id: String,
    pub reagent_name: String,
    pub timestamp: DateTime<Utc>,
    pub target_email: String,
    /// Human-readable stock at the time of the alert, e.g. `"400 mL"`
    pub stock_level: String,
    pub status: NotificationStatus,
}

/// Generic key/value row of the shared configuration table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

/// Well-known configuration keys
pub mod config_keys {
    pub const MANAGER_EMAIL: &str = "manager_email";
    pub const MANAGER_PASSWORD: &str = "manager_password";
    pub const ANALYSTS: &str = "analysts";
}

/// Result of reading a reagent label image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAnalysis {
    pub name: String,
    pub brand: String,
    pub presentation: Presentation,
}

impl LabelAnalysis {
    pub fn suggested_base_unit(&self) -> &'static str {
        self.presentation.default_base_unit()
    }
}

/// Generate a short random identifier
///
/// Identifiers are 9 lowercase base-36 characters, the same shape the
/// browser client produced, so rows written by either side look alike.
pub fn generate_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..9)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Format a quantity without a trailing `.0` for whole numbers
pub fn format_quantity(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        let s = format!("{:.2}", rounded);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
