//! ReagentFlow service
//!
//! [`ReagentFlow`] owns the in-memory [`InventoryState`] and the external
//! collaborators. Every operation mutates the local state first (under a
//! short synchronous lock) and only then talks to the remote store, the audit
//! sink and the mailer, so local results never wait on the network.
//!
//! Replication rules:
//! - no remote store configured: remote writes are skipped silently
//! - remote write failure: logged, local state kept, no retry
//! - audit events: handed to the sink, never awaited
//! - configuration writes: the only remote failures returned to the caller

use crate::audit::{AuditEvent, AuditSink, NullSink};
use crate::auth;
use crate::error::{AuthError, FlowError, StoreError, TransactionError};
use crate::inventory::{self, InventoryFilter, InventoryGroup};
use crate::labels::{DisabledAnalyzer, LabelAnalyzer};
use crate::mailer::{AlertMailer, DisabledMailer, LowStockAlert};
use crate::model::{
    AnalystUser, ConfigEntry, Department, LabelAnalysis, NotificationLog, NotificationStatus,
    Reagent, Transaction, config_keys, generate_id,
};
use crate::state::{
    AppliedMovement, InventoryState, MovementRequest, ReagentDraft, Snapshot, Withdrawal,
};
use crate::store::{ReagentPatch, RemoteStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

#[cfg(feature = "web")]
use crate::config::{AppConfig, ConnectionSettings};

/// Outcome of the primary-store writes for one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Replication {
    /// No remote store configured
    Skipped,
    Synced,
    Failed(String),
}

/// Result of a recorded stock movement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction: Transaction,
    pub reagent: Reagent,
    pub replication: Replication,
    /// Notification entry when the movement crossed the minimum
    pub alert: Option<NotificationLog>,
}

/// Counts reported after a resync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullSummary {
    pub reagents: usize,
    pub transactions: usize,
    pub analysts: usize,
}

/// Label analysis plus the inventory rows it points at
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelScan {
    pub analysis: LabelAnalysis,
    pub suggested_base_unit: String,
    /// Row with the same name and brand, used by the entry form
    pub exact_match: Option<Reagent>,
    /// Row whose name overlaps the label, used by the withdrawal form
    pub name_match: Option<Reagent>,
}

/// Analyst entry as stored in the `analysts` config value
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAnalyst {
    /// Older clients stored plain names
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        department: Option<String>,
    },
}

/// Parse the `analysts` config value; anything but a JSON array yields an empty list
pub fn parse_analysts(value: &str) -> Vec<AnalystUser> {
    let entries: Vec<StoredAnalyst> = match serde_json::from_str(value) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("ignoring unparsable analysts value: {}", e);
            return Vec::new();
        }
    };
    let mut analysts: Vec<AnalystUser> = Vec::new();
    for entry in entries {
        let (name, department) = match entry {
            StoredAnalyst::Name(name) => (name, Department::default()),
            StoredAnalyst::Full { name, department } => (
                name,
                department
                    .and_then(|d| d.parse().ok())
                    .unwrap_or_default(),
            ),
        };
        let name = name.trim().to_string();
        if !name.is_empty() && !analysts.iter().any(|a| a.name == name) {
            analysts.push(AnalystUser { name, department });
        }
    }
    analysts
}

/// The inventory service
pub struct ReagentFlow {
    state: RwLock<InventoryState>,
    store: RwLock<Option<Arc<dyn RemoteStore>>>,
    audit: RwLock<Arc<dyn AuditSink>>,
    mailer: Arc<dyn AlertMailer>,
    labels: Arc<dyn LabelAnalyzer>,
    snapshot_delay: Duration,
    history_limit: usize,
}

impl Default for ReagentFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl ReagentFlow {
    /// Offline service: no remote store, no audit sink, no email, no label analysis
    pub fn new() -> Self {
        ReagentFlow {
            state: RwLock::new(InventoryState::new()),
            store: RwLock::new(None),
            audit: RwLock::new(Arc::new(NullSink)),
            mailer: Arc::new(DisabledMailer),
            labels: Arc::new(DisabledAnalyzer),
            snapshot_delay: Duration::from_millis(crate::config::DEFAULT_SNAPSHOT_DELAY_MS),
            history_limit: crate::config::DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_state(self, state: InventoryState) -> Self {
        *write_lock(&self.state) = state;
        self
    }

    pub fn with_store(self, store: Arc<dyn RemoteStore>) -> Self {
        *write_lock(&self.store) = Some(store);
        self
    }

    pub fn with_audit(self, audit: Arc<dyn AuditSink>) -> Self {
        *write_lock(&self.audit) = audit;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn AlertMailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_labels(mut self, labels: Arc<dyn LabelAnalyzer>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = delay;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Build every collaborator from the resolved configuration
    #[cfg(feature = "web")]
    pub fn from_config(config: &AppConfig) -> Result<Self, FlowError> {
        let mut flow = ReagentFlow::new()
            .with_mailer(crate::mailer::from_settings(&config.email)?)
            .with_snapshot_delay(config.snapshot_delay)
            .with_history_limit(config.history_limit);
        if let Some(key) = config.label_api_key.as_deref() {
            flow = flow.with_labels(Arc::new(crate::labels::GeminiAnalyzer::new(
                key,
                &config.label_model,
            )));
        }
        flow.set_connection(&config.connection);
        Ok(flow)
    }

    /// Swap the remote store and audit sink for new endpoints
    #[cfg(feature = "web")]
    pub fn set_connection(&self, settings: &ConnectionSettings) {
        let store: Option<Arc<dyn RemoteStore>> = if settings.has_remote_store() {
            Some(Arc::new(crate::store::PostgrestStore::new(
                settings.supabase_url.trim(),
                settings.supabase_key.trim(),
            )))
        } else {
            None
        };
        let audit: Arc<dyn AuditSink> = if settings.has_webhook() {
            Arc::new(crate::audit::WebhookSink::new(settings.webhook_url.trim()))
        } else {
            Arc::new(NullSink)
        };
        log::info!(
            "remote store {}, audit webhook {}",
            if store.is_some() { "configured" } else { "not configured" },
            if settings.has_webhook() { "configured" } else { "not configured" },
        );
        *write_lock(&self.store) = store;
        *write_lock(&self.audit) = audit;
    }

    pub fn replace_store(&self, store: Option<Arc<dyn RemoteStore>>) {
        *write_lock(&self.store) = store;
    }

    pub fn is_connected(&self) -> bool {
        read_lock(&self.store).is_some()
    }

    fn store(&self) -> Option<Arc<dyn RemoteStore>> {
        read_lock(&self.store).clone()
    }

    fn audit(&self) -> Arc<dyn AuditSink> {
        read_lock(&self.audit).clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, InventoryState> {
        read_lock(&self.state)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InventoryState> {
        write_lock(&self.state)
    }

    // ---- read side ----

    pub fn reagents(&self) -> Vec<Reagent> {
        self.read().reagents.clone()
    }

    pub fn reagent(&self, id: &str) -> Option<Reagent> {
        self.read().reagent(id).cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.read().transactions.clone()
    }

    pub fn notifications(&self) -> Vec<NotificationLog> {
        self.read().notifications.clone()
    }

    pub fn analysts(&self) -> Vec<AnalystUser> {
        self.read().analysts.clone()
    }

    /// Department of a registered analyst
    pub fn analyst_department(&self, name: &str) -> Option<Department> {
        let name = name.trim();
        self.read()
            .analysts
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.department)
    }

    pub fn manager_email(&self) -> String {
        self.read().manager_email.clone()
    }

    pub fn has_manager_password(&self) -> bool {
        self.read()
            .manager_password
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read().snapshot()
    }

    /// Grouped inventory, filtered by name/brand and department
    pub fn inventory(&self, filter: &InventoryFilter) -> Vec<InventoryGroup> {
        inventory::inventory_view(&self.read().reagents, filter)
    }

    /// Low-stock groups without a pending order
    pub fn alerts(&self) -> Vec<InventoryGroup> {
        inventory::low_stock_alerts(&self.read().reagents)
    }

    /// Active reagents for the withdrawal form, most used first
    pub fn reagents_for_department(&self, department: Option<Department>) -> Vec<Reagent> {
        let state = self.read();
        inventory::reagents_for_department(&state.reagents, &state.transactions, department)
            .into_iter()
            .cloned()
            .collect()
    }

    // ---- transactions ----

    /// Record a stock movement
    ///
    /// The local state is updated before any remote call. The reagent row is
    /// upserted and the ledger row inserted on the remote store (failures are
    /// reported in the receipt, never rolled back), the audit sink receives
    /// the ledger entry followed by a delayed snapshot, and an OUT movement
    /// that crosses the minimum dispatches one alert.
    pub async fn handle_transaction(
        &self,
        draft: &ReagentDraft,
        request: &MovementRequest,
    ) -> Result<TransactionReceipt, FlowError> {
        let now = Utc::now();
        let (applied, reagents, manager_email) = {
            let mut state = self.write();
            let applied = state.apply_movement(draft, request, now)?;
            (applied, state.reagents.clone(), state.manager_email.clone())
        };
        log::info!(
            "{} {} {} of {} by {}",
            applied.transaction.kind,
            applied.transaction.quantity,
            applied.reagent.base_unit,
            applied.reagent.name,
            applied.transaction.analyst
        );

        let replication = self.replicate(&applied).await;

        let audit = self.audit();
        audit.publish(AuditEvent::LogTransaction {
            transaction: applied.transaction.clone(),
        });
        audit.publish_after(
            AuditEvent::SyncInventorySnapshot { reagents },
            self.snapshot_delay,
        );

        let alert = if applied.crossed_minimum {
            Some(self.dispatch_alert(&applied.reagent, &manager_email, now).await)
        } else {
            None
        };

        Ok(TransactionReceipt {
            transaction: applied.transaction,
            reagent: applied.reagent,
            replication,
            alert,
        })
    }

    /// Intake of whole containers, as entered on the entry form
    ///
    /// For an existing reagent the stored container size is used and the
    /// draft is ignored; otherwise the draft describes the new row, landing
    /// in the analyst's department when it names none.
    pub async fn record_intake(
        &self,
        reagent_id: Option<&str>,
        draft: ReagentDraft,
        containers: f64,
        analyst: &str,
    ) -> Result<TransactionReceipt, FlowError> {
        let existing = reagent_id.and_then(|id| self.reagent(id));
        let draft = match existing {
            Some(r) => ReagentDraft {
                id: Some(r.id),
                name: r.name,
                brand: r.brand,
                presentation: Some(r.presentation),
                department: Some(r.department),
                base_unit: Some(r.base_unit),
                container_type: Some(r.container_type),
                quantity_per_container: Some(r.quantity_per_container),
                expiry_date: Some(r.expiry_date),
                min_stock: Some(r.min_stock),
            },
            None => ReagentDraft {
                id: reagent_id.map(str::to_string).or(draft.id),
                department: draft.department.or_else(|| self.analyst_department(analyst)),
                ..draft
            },
        };
        let request = MovementRequest::intake(&draft, containers, analyst);
        self.handle_transaction(&draft, &request).await
    }

    /// Withdrawal by containers or by base-unit quantity
    pub async fn record_withdrawal(
        &self,
        reagent_id: &str,
        withdrawal: Withdrawal,
        analyst: &str,
    ) -> Result<TransactionReceipt, FlowError> {
        let reagent = self
            .reagent(reagent_id)
            .filter(Reagent::is_active)
            .ok_or_else(|| TransactionError::ReagentNotFound(reagent_id.to_string()))?;
        let request = withdrawal.to_request(&reagent, analyst);
        self.handle_transaction(&ReagentDraft::default(), &request).await
    }

    async fn replicate(&self, applied: &AppliedMovement) -> Replication {
        let Some(store) = self.store() else {
            return Replication::Skipped;
        };
        let result = async {
            store.upsert_reagent(&applied.reagent).await?;
            store.insert_transaction(&applied.transaction).await
        }
        .await;
        match result {
            Ok(()) => Replication::Synced,
            Err(e) => {
                log::error!(
                    "remote write failed for transaction {}: {}",
                    applied.transaction.id,
                    e
                );
                Replication::Failed(e.to_string())
            }
        }
    }

    /// Send one low-stock email and record its outcome
    async fn dispatch_alert(
        &self,
        reagent: &Reagent,
        manager_email: &str,
        now: DateTime<Utc>,
    ) -> NotificationLog {
        let to_email = manager_email.trim();
        let alert = LowStockAlert::for_reagent(reagent, to_email, now);
        let mut entry = NotificationLog {
            id: generate_id(),
            reagent_name: reagent.name.clone(),
            timestamp: now,
            target_email: to_email.to_string(),
            stock_level: alert.stock_level(),
            status: NotificationStatus::Pending,
        };

        if to_email.is_empty() {
            log::warn!("low stock on {} but no manager email is configured", reagent.name);
            entry.status = NotificationStatus::Failed;
            self.write().push_notification(entry.clone());
            return entry;
        }

        self.write().push_notification(entry.clone());
        entry.status = match self.mailer.send_low_stock(&alert).await {
            Ok(()) => {
                log::info!("low stock alert for {} sent to {}", reagent.name, to_email);
                NotificationStatus::Sent
            }
            Err(e) => {
                log::error!("low stock alert for {} failed: {}", reagent.name, e);
                NotificationStatus::Failed
            }
        };
        self.write().set_notification_status(&entry.id, entry.status);
        entry
    }

    // ---- manager operations on reagents ----

    pub async fn mark_as_ordered(&self, id: &str) -> Result<Reagent, FlowError> {
        let now = Utc::now();
        let reagent = self
            .write()
            .mark_as_ordered(id, now)
            .ok_or_else(|| TransactionError::ReagentNotFound(id.to_string()))?;
        self.patch_remote(
            id,
            ReagentPatch {
                is_ordered: Some(true),
                last_updated: Some(now),
                ..Default::default()
            },
        )
        .await;
        Ok(reagent)
    }

    pub async fn update_min_stock(&self, id: &str, min_stock: f64) -> Result<Reagent, FlowError> {
        if !min_stock.is_finite() || min_stock < 0.0 {
            return Err(FlowError::InvalidInput(format!(
                "minimum stock must be a number >= 0, got {}",
                min_stock
            )));
        }
        let now = Utc::now();
        let reagent = self
            .write()
            .update_min_stock(id, min_stock, now)
            .ok_or_else(|| TransactionError::ReagentNotFound(id.to_string()))?;
        self.patch_remote(
            id,
            ReagentPatch {
                min_stock: Some(min_stock),
                last_updated: Some(now),
                ..Default::default()
            },
        )
        .await;
        Ok(reagent)
    }

    /// Soft-delete an emptied brand row once the manager has confirmed
    pub async fn delete_reagent(&self, id: &str, confirmed: bool) -> Result<Reagent, FlowError> {
        if !confirmed {
            return Err(FlowError::InvalidInput(
                "deletion must be confirmed".to_string(),
            ));
        }
        let now = Utc::now();
        let reagent = {
            let mut state = self.write();
            match state.reagent(id) {
                None => return Err(TransactionError::ReagentNotFound(id.to_string()).into()),
                Some(r) if !r.is_empty() => {
                    return Err(FlowError::InvalidInput(format!(
                        "{} still has {} {} in stock",
                        r.name, r.current_stock, r.base_unit
                    )));
                }
                Some(_) => {}
            }
            state
                .soft_delete(id, now)
                .ok_or_else(|| TransactionError::ReagentNotFound(id.to_string()))?
        };
        log::info!("reagent {} ({}) soft-deleted", reagent.name, reagent.brand);
        self.patch_remote(
            id,
            ReagentPatch {
                is_deleted: Some(true),
                last_updated: Some(now),
                ..Default::default()
            },
        )
        .await;
        self.audit().publish(AuditEvent::SyncInventorySnapshot {
            reagents: self.reagents(),
        });
        Ok(reagent)
    }

    async fn patch_remote(&self, id: &str, patch: ReagentPatch) {
        if let Some(store) = self.store() {
            if let Err(e) = store.update_reagent(id, &patch).await {
                log::error!("remote update of reagent {} failed: {}", id, e);
            }
        }
    }

    // ---- settings and personnel ----

    /// Check the manager password; the first password ever entered becomes it
    ///
    /// Returns `true` when this call set the initial password.
    pub async fn authenticate_manager(&self, password: &str) -> Result<bool, FlowError> {
        let stored = self.read().manager_password.clone().filter(|p| !p.is_empty());
        match stored {
            Some(stored) => {
                if auth::verify_password(password, &stored) {
                    Ok(false)
                } else {
                    Err(AuthError::WrongPassword.into())
                }
            }
            None => {
                let hash = auth::hash_password(password)?;
                self.write().manager_password = Some(hash.clone());
                log::info!("initial manager password set");
                if let Err(e) = self.save_config(config_keys::MANAGER_PASSWORD, &hash).await {
                    log::error!("initial manager password kept locally only: {}", e);
                }
                Ok(true)
            }
        }
    }

    /// Change the manager password and/or alert email
    pub async fn update_manager_settings(
        &self,
        password: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), FlowError> {
        let hash = match password.filter(|p| !p.is_empty()) {
            Some(p) => Some(auth::hash_password(p)?),
            None => None,
        };
        let email = email.map(str::trim);
        if let Some(e) = email {
            if !e.is_empty() && !auth::is_valid_email(e) {
                return Err(FlowError::InvalidInput(format!("invalid email '{}'", e)));
            }
        }

        {
            let mut state = self.write();
            if let Some(h) = &hash {
                state.manager_password = Some(h.clone());
            }
            if let Some(e) = email {
                state.manager_email = e.to_string();
            }
        }

        if let Some(h) = &hash {
            self.save_config(config_keys::MANAGER_PASSWORD, h).await?;
        }
        if let Some(e) = email {
            self.save_config(config_keys::MANAGER_EMAIL, e).await?;
        }
        self.publish_config();
        Ok(())
    }

    /// Add an analyst; returns `false` for empty or duplicate names
    pub async fn add_analyst(&self, analyst: AnalystUser) -> Result<bool, FlowError> {
        let analysts = {
            let mut state = self.write();
            if !state.add_analyst(analyst) {
                return Ok(false);
            }
            state.analysts.clone()
        };
        self.save_analysts(&analysts).await?;
        Ok(true)
    }

    pub async fn remove_analyst(&self, name: &str) -> Result<bool, FlowError> {
        let analysts = {
            let mut state = self.write();
            if !state.remove_analyst(name) {
                return Ok(false);
            }
            state.analysts.clone()
        };
        self.save_analysts(&analysts).await?;
        Ok(true)
    }

    async fn save_analysts(&self, analysts: &[AnalystUser]) -> Result<(), FlowError> {
        let value = serde_json::to_string(analysts)
            .map_err(|e| FlowError::InvalidInput(e.to_string()))?;
        self.save_config(config_keys::ANALYSTS, &value).await?;
        self.publish_config();
        Ok(())
    }

    async fn save_config(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let Some(store) = self.store() else {
            return Ok(());
        };
        let entry = ConfigEntry {
            key: key.to_string(),
            value: value.to_string(),
        };
        store.upsert_config(&entry).await.map_err(|e| {
            log::error!("error saving config key {}: {}", key, e);
            e
        })
    }

    fn publish_config(&self) {
        let (analysts, manager_email) = {
            let state = self.read();
            (state.analysts.clone(), state.manager_email.clone())
        };
        self.audit().publish(AuditEvent::SaveConfig {
            analysts,
            manager_email,
        });
    }

    // ---- synchronization ----

    /// Replace local data with the remote config, reagents and latest transactions
    ///
    /// Returns `None` when no remote store is configured. On error the local
    /// state is left untouched.
    pub async fn pull(&self) -> Result<Option<PullSummary>, FlowError> {
        let Some(store) = self.store() else {
            return Ok(None);
        };
        let fetched = async {
            let config = store.select_config().await?;
            let reagents = store.select_reagents().await?;
            let transactions = store.select_transactions(self.history_limit).await?;
            Ok::<_, StoreError>((config, reagents, transactions))
        }
        .await;
        let (config, reagents, transactions) = match fetched {
            Ok(v) => v,
            Err(e) => {
                log::error!("resync failed: {}", e);
                return Err(e.into());
            }
        };

        let mut state = self.write();
        for entry in config {
            match entry.key.as_str() {
                config_keys::MANAGER_EMAIL => state.manager_email = entry.value,
                config_keys::MANAGER_PASSWORD => state.manager_password = Some(entry.value),
                config_keys::ANALYSTS => state.analysts = parse_analysts(&entry.value),
                other => log::debug!("ignoring config key {}", other),
            }
        }
        state.reagents = reagents;
        state.transactions = transactions;

        let summary = PullSummary {
            reagents: state.reagents.len(),
            transactions: state.transactions.len(),
            analysts: state.analysts.len(),
        };
        log::info!(
            "resync complete: {} reagents, {} transactions, {} analysts",
            summary.reagents,
            summary.transactions,
            summary.analysts
        );
        Ok(Some(summary))
    }

    /// Push the whole local inventory to the remote store and the audit sink
    pub async fn push_all(&self) -> Replication {
        let reagents = self.reagents();
        self.audit().publish(AuditEvent::SyncAll {
            reagents: reagents.clone(),
            transaction: None,
        });
        let Some(store) = self.store() else {
            return Replication::Skipped;
        };
        for reagent in &reagents {
            if let Err(e) = store.upsert_reagent(reagent).await {
                log::error!("full push stopped at reagent {}: {}", reagent.id, e);
                return Replication::Failed(e.to_string());
            }
        }
        Replication::Synced
    }

    /// Replace local data with a restored backup; the notification log is kept
    pub fn restore(&self, snapshot: Snapshot) {
        self.write().replace_snapshot(snapshot);
    }

    // ---- label scanning ----

    pub async fn analyze_label(&self, image_base64: &str) -> Result<LabelScan, FlowError> {
        let analysis = self.labels.analyze(image_base64).await.map_err(|e| {
            log::error!("label analysis failed: {}", e);
            FlowError::from(e)
        })?;
        let state = self.read();
        Ok(LabelScan {
            suggested_base_unit: analysis.suggested_base_unit().to_string(),
            exact_match: inventory::find_exact_label_match(&state.reagents, &analysis).cloned(),
            name_match: inventory::find_label_match(&state.reagents, &analysis.name).cloned(),
            analysis,
        })
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysts_accept_legacy_names() {
        let analysts = parse_analysts(r#"["Ana", {"name":"Luis","department":"Molecular"}, "Ana"]"#);
        assert_eq!(analysts.len(), 2);
        assert_eq!(analysts[0].department, Department::Physicochemical);
        assert_eq!(analysts[1].department, Department::Molecular);
    }

    #[test]
    fn unparsable_analysts_yield_empty_list() {
        assert!(parse_analysts("not json").is_empty());
        assert!(parse_analysts(r#"{"name":"Ana"}"#).is_empty());
    }

    #[test]
    fn replication_serializes_with_status() {
        let value = serde_json::to_value(Replication::Failed("down".into())).unwrap();
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["reason"], "down");
    }
}
