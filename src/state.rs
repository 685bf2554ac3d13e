//! Application state store
//!
//! All mutations of the in-memory inventory go through the update functions
//! on [`InventoryState`]. They are synchronous and pure with respect to the
//! outside world: remote replication, audit mirroring and alert emails are
//! driven by the service in [`crate::recorder`] from the values returned here.

use crate::error::TransactionError;
use crate::model::{
    AnalystUser, Department, EMPTY_STOCK_EPSILON, NOT_AVAILABLE, NotificationLog,
    NotificationStatus, Presentation, Reagent, Transaction, TransactionType, generate_id,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptor used only when an intake creates a new reagent row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReagentDraft {
    pub id: Option<String>,
    pub name: String,
    pub brand: String,
    pub presentation: Option<Presentation>,
    pub department: Option<Department>,
    pub base_unit: Option<String>,
    pub container_type: Option<String>,
    pub quantity_per_container: Option<f64>,
    pub expiry_date: Option<String>,
    pub min_stock: Option<f64>,
}

/// A requested stock movement
///
/// `quantity` is always expressed in the reagent's base unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    pub reagent_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: f64,
    pub display_quantity: f64,
    pub display_unit: String,
    pub analyst: String,
}

impl MovementRequest {
    /// Intake of `containers` units of the container described by `draft`
    pub fn intake(draft: &ReagentDraft, containers: f64, analyst: &str) -> Self {
        let per_container = draft.quantity_per_container.unwrap_or(1.0);
        MovementRequest {
            reagent_id: draft.id.clone(),
            kind: TransactionType::In,
            quantity: containers * per_container,
            display_quantity: containers,
            display_unit: container_type(draft),
            analyst: analyst.to_string(),
        }
    }
}

/// How a withdrawal was entered on the form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Withdrawal {
    /// Whole containers
    Container(f64),
    /// Quantity in the base unit
    Quantity(f64),
}

impl Withdrawal {
    /// Resolve against the reagent it is taken from
    pub fn to_request(self, reagent: &Reagent, analyst: &str) -> MovementRequest {
        let (quantity, display_quantity, display_unit) = match self {
            Withdrawal::Container(n) => (
                n * reagent.quantity_per_container,
                n,
                reagent.container_type.clone(),
            ),
            Withdrawal::Quantity(q) => (q, q, reagent.base_unit.clone()),
        };
        MovementRequest {
            reagent_id: Some(reagent.id.clone()),
            kind: TransactionType::Out,
            quantity,
            display_quantity,
            display_unit,
            analyst: analyst.to_string(),
        }
    }
}

/// Container of a new reagent; packages are always counted as `Paquete`
fn container_type(draft: &ReagentDraft) -> String {
    match (draft.presentation, &draft.container_type) {
        (Some(Presentation::Package), _) => Presentation::Package.default_container_type().to_string(),
        (_, Some(c)) if !c.trim().is_empty() => c.trim().to_string(),
        (Some(p), _) => p.default_container_type().to_string(),
        (None, _) => "Frasco".to_string(),
    }
}

fn base_unit(draft: &ReagentDraft) -> String {
    match (&draft.base_unit, draft.presentation) {
        (Some(u), _) if !u.trim().is_empty() => u.trim().to_string(),
        (_, Some(p)) => p.default_base_unit().to_string(),
        (_, None) => "ud".to_string(),
    }
}

/// Outcome of a movement applied to the state
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMovement {
    /// Reagent row after the movement
    pub reagent: Reagent,
    pub transaction: Transaction,
    pub previous_stock: f64,
    /// True when this movement created the reagent row
    pub created: bool,
    /// Set when an OUT movement crossed the minimum downward
    pub crossed_minimum: bool,
}

/// Edge-triggered low-stock check
///
/// Fires only when the movement takes a row from above its minimum to at
/// or below it, and no replacement order is pending.
pub fn crosses_minimum(previous: f64, current: f64, min_stock: f64, is_ordered: bool) -> bool {
    previous > min_stock && current <= min_stock && !is_ordered
}

/// Serializable snapshot of the whole state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub reagents: Vec<Reagent>,
    pub transactions: Vec<Transaction>,
    pub analysts: Vec<AnalystUser>,
    pub manager_email: String,
    pub manager_password: Option<String>,
}

/// In-memory inventory store
#[derive(Debug, Clone, Default)]
pub struct InventoryState {
    pub reagents: Vec<Reagent>,
    /// Newest first
    pub transactions: Vec<Transaction>,
    /// Newest first, never persisted
    pub notifications: Vec<NotificationLog>,
    pub analysts: Vec<AnalystUser>,
    pub manager_email: String,
    /// Argon2 hash (or legacy plaintext) of the manager password
    pub manager_password: Option<String>,
}

impl InventoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reagent(&self, id: &str) -> Option<&Reagent> {
        self.reagents.iter().find(|r| r.id == id)
    }

    pub fn active_reagents(&self) -> Vec<Reagent> {
        self.reagents.iter().filter(|r| r.is_active()).cloned().collect()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.reagents.iter().position(|r| r.id == id)
    }

    /// Check a movement against the current state without applying it
    pub fn validate(&self, draft: &ReagentDraft, req: &MovementRequest) -> Result<(), TransactionError> {
        if !req.quantity.is_finite() || req.quantity <= 0.0 {
            return Err(TransactionError::InvalidQuantity(req.quantity));
        }
        if req.analyst.trim().is_empty() {
            return Err(TransactionError::MissingAnalyst);
        }

        match req.kind {
            TransactionType::In => {
                let existing = req.reagent_id.as_deref().and_then(|id| self.position(id));
                if existing.is_none() {
                    if draft.name.trim().is_empty() || draft.brand.trim().is_empty() {
                        return Err(TransactionError::InvalidDraft(
                            "name and brand are required".to_string(),
                        ));
                    }
                    if let Some(min) = draft.min_stock {
                        if !min.is_finite() || min < 0.0 {
                            return Err(TransactionError::InvalidDraft(format!(
                                "minimum stock must be >= 0, got {}",
                                min
                            )));
                        }
                    }
                    if let Some(q) = draft.quantity_per_container {
                        if !q.is_finite() || q <= 0.0 {
                            return Err(TransactionError::InvalidDraft(format!(
                                "quantity per container must be > 0, got {}",
                                q
                            )));
                        }
                    }
                }
                Ok(())
            }
            TransactionType::Out => {
                let id = req
                    .reagent_id
                    .as_deref()
                    .ok_or_else(|| TransactionError::ReagentNotFound(String::new()))?;
                let reagent = self
                    .reagent(id)
                    .filter(|r| r.is_active())
                    .ok_or_else(|| TransactionError::ReagentNotFound(id.to_string()))?;
                if req.quantity > reagent.current_stock {
                    return Err(TransactionError::InsufficientStock {
                        requested: req.quantity,
                        available: reagent.current_stock,
                    });
                }
                Ok(())
            }
        }
    }

    /// Apply a stock movement and append its ledger entry
    ///
    /// Validation happens first; on error nothing is modified.
    pub fn apply_movement(
        &mut self,
        draft: &ReagentDraft,
        req: &MovementRequest,
        now: DateTime<Utc>,
    ) -> Result<AppliedMovement, TransactionError> {
        self.validate(draft, req)?;

        let existing = req.reagent_id.as_deref().and_then(|id| self.position(id));
        let (reagent, previous_stock, created, crossed_minimum) = match (req.kind, existing) {
            (TransactionType::In, Some(idx)) => {
                let r = &mut self.reagents[idx];
                let previous = r.current_stock;
                r.current_stock += req.quantity;
                r.is_ordered = false;
                r.is_deleted = false;
                r.last_updated = now;
                (r.clone(), previous, false, false)
            }
            (TransactionType::In, None) => {
                let r = new_reagent(draft, req, now);
                self.reagents.push(r.clone());
                (r, 0.0, true, false)
            }
            (TransactionType::Out, Some(idx)) => {
                let r = &mut self.reagents[idx];
                let previous = r.current_stock;
                r.current_stock = (previous - req.quantity).max(0.0);
                r.last_updated = now;
                let crossed = crosses_minimum(previous, r.current_stock, r.min_stock, r.is_ordered);
                (r.clone(), previous, false, crossed)
            }
            (TransactionType::Out, None) => {
                // validate() rejects this; keep the state untouched regardless
                let id = req.reagent_id.clone().unwrap_or_default();
                return Err(TransactionError::ReagentNotFound(id));
            }
        };

        let transaction = Transaction {
            id: generate_id(),
            reagent_id: reagent.id.clone(),
            reagent_name: reagent.name.clone(),
            kind: req.kind,
            quantity: req.quantity,
            display_quantity: req.display_quantity,
            display_unit: req.display_unit.clone(),
            analyst: req.analyst.trim().to_string(),
            timestamp: now,
        };
        self.transactions.insert(0, transaction.clone());

        Ok(AppliedMovement {
            reagent,
            transaction,
            previous_stock,
            created,
            crossed_minimum,
        })
    }

    pub fn mark_as_ordered(&mut self, id: &str, now: DateTime<Utc>) -> Option<Reagent> {
        let r = self.reagents.iter_mut().find(|r| r.id == id)?;
        r.is_ordered = true;
        r.last_updated = now;
        Some(r.clone())
    }

    pub fn update_min_stock(&mut self, id: &str, min_stock: f64, now: DateTime<Utc>) -> Option<Reagent> {
        let r = self.reagents.iter_mut().find(|r| r.id == id)?;
        r.min_stock = min_stock;
        r.last_updated = now;
        Some(r.clone())
    }

    /// Soft-delete an emptied row; returns `None` if missing or not empty
    pub fn soft_delete(&mut self, id: &str, now: DateTime<Utc>) -> Option<Reagent> {
        let r = self
            .reagents
            .iter_mut()
            .find(|r| r.id == id && r.current_stock <= EMPTY_STOCK_EPSILON)?;
        r.is_deleted = true;
        r.last_updated = now;
        Some(r.clone())
    }

    pub fn push_notification(&mut self, entry: NotificationLog) {
        self.notifications.insert(0, entry);
    }

    pub fn set_notification_status(&mut self, id: &str, status: NotificationStatus) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.status = status;
                true
            }
            None => false,
        }
    }

    /// Add an analyst; empty or duplicate names are ignored
    pub fn add_analyst(&mut self, analyst: AnalystUser) -> bool {
        let name = analyst.name.trim();
        if name.is_empty() || self.analysts.iter().any(|a| a.name == name) {
            return false;
        }
        self.analysts.push(AnalystUser {
            name: name.to_string(),
            department: analyst.department,
        });
        true
    }

    pub fn remove_analyst(&mut self, name: &str) -> bool {
        let before = self.analysts.len();
        self.analysts.retain(|a| a.name != name);
        self.analysts.len() != before
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            reagents: self.reagents.clone(),
            transactions: self.transactions.clone(),
            analysts: self.analysts.clone(),
            manager_email: self.manager_email.clone(),
            manager_password: self.manager_password.clone(),
        }
    }

    /// Replace persisted data; the notification log is session-local and kept
    pub fn replace_snapshot(&mut self, snapshot: Snapshot) {
        self.reagents = snapshot.reagents;
        self.transactions = snapshot.transactions;
        self.analysts = snapshot.analysts;
        self.manager_email = snapshot.manager_email;
        self.manager_password = snapshot.manager_password;
    }
}

fn new_reagent(draft: &ReagentDraft, req: &MovementRequest, now: DateTime<Utc>) -> Reagent {
    let presentation = draft.presentation.unwrap_or(Presentation::Liquid);
    Reagent {
        id: req
            .reagent_id
            .clone()
            .or_else(|| draft.id.clone())
            .unwrap_or_else(generate_id),
        name: draft.name.trim().to_string(),
        brand: draft.brand.trim().to_string(),
        presentation,
        current_stock: req.quantity,
        min_stock: draft.min_stock.unwrap_or(0.0),
        department: draft.department.unwrap_or_default(),
        base_unit: base_unit(draft),
        container_type: container_type(draft),
        quantity_per_container: draft.quantity_per_container.unwrap_or(1.0),
        expiry_date: draft
            .expiry_date
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        is_ordered: false,
        is_deleted: false,
        last_updated: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_is_edge_triggered() {
        assert!(crosses_minimum(600.0, 400.0, 500.0, false));
        assert!(crosses_minimum(600.0, 500.0, 500.0, false));
        assert!(!crosses_minimum(450.0, 400.0, 500.0, false));
        assert!(!crosses_minimum(600.0, 400.0, 500.0, true));
        assert!(!crosses_minimum(600.0, 550.0, 500.0, false));
    }

    #[test]
    fn intake_multiplies_containers() {
        let draft = ReagentDraft {
            name: "Acetona".into(),
            brand: "MarcaX".into(),
            container_type: Some("Frascos".into()),
            quantity_per_container: Some(500.0),
            ..Default::default()
        };
        let req = MovementRequest::intake(&draft, 10.0, "Ana");
        assert_eq!(req.quantity, 5000.0);
        assert_eq!(req.display_quantity, 10.0);
        assert_eq!(req.display_unit, "Frascos");
    }

    #[test]
    fn package_defaults_follow_the_presentation() {
        let draft = ReagentDraft {
            name: "Puntas".into(),
            brand: "Axygen".into(),
            presentation: Some(Presentation::Package),
            quantity_per_container: Some(96.0),
            ..Default::default()
        };
        let mut state = InventoryState::new();
        let req = MovementRequest::intake(&draft, 2.0, "Ana");
        let applied = state.apply_movement(&draft, &req, Utc::now()).unwrap();

        assert_eq!(applied.reagent.container_type, "Paquete");
        assert_eq!(applied.reagent.base_unit, "unidades");
        assert_eq!(applied.transaction.display_unit, applied.reagent.container_type);

        let boxed = ReagentDraft {
            container_type: Some("Cajas".into()),
            ..draft
        };
        assert_eq!(MovementRequest::intake(&boxed, 1.0, "Ana").display_unit, "Paquete");
    }

    #[test]
    fn duplicate_analysts_are_ignored() {
        let mut state = InventoryState::new();
        let ana = AnalystUser {
            name: "Ana".into(),
            department: Department::Molecular,
        };
        assert!(state.add_analyst(ana.clone()));
        assert!(!state.add_analyst(ana));
        assert!(!state.add_analyst(AnalystUser {
            name: "  ".into(),
            department: Department::Molecular,
        }));
        assert!(state.remove_analyst("Ana"));
        assert!(state.analysts.is_empty());
    }
}
