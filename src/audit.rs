//! Secondary audit mirror
//!
//! A spreadsheet-backed webhook receives copies of inventory snapshots,
//! ledger entries and configuration changes. Delivery is best-effort by
//! contract: [`AuditSink::publish`] returns nothing, never blocks the caller
//! and is never retried. Ordering relative to the primary store is not
//! guaranteed and lost events are accepted.

use crate::model::{AnalystUser, Reagent, Transaction};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Event accepted by the audit webhook, tagged by `action`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// Full inventory plus the movement that triggered it
    SyncAll {
        reagents: Vec<Reagent>,
        transaction: Option<Transaction>,
    },
    /// Append one row to the audit ledger sheet
    LogTransaction { transaction: Transaction },
    /// Rewrite the current-state sheet
    SyncInventorySnapshot { reagents: Vec<Reagent> },
    /// Back up analysts and manager email
    SaveConfig {
        analysts: Vec<AnalystUser>,
        #[serde(rename = "managerEmail")]
        manager_email: String,
    },
}

impl AuditEvent {
    pub fn action(&self) -> &'static str {
        match self {
            AuditEvent::SyncAll { .. } => "SYNC_ALL",
            AuditEvent::LogTransaction { .. } => "LOG_TRANSACTION",
            AuditEvent::SyncInventorySnapshot { .. } => "SYNC_INVENTORY_SNAPSHOT",
            AuditEvent::SaveConfig { .. } => "SAVE_CONFIG",
        }
    }
}

/// Fire-and-forget destination for audit events
pub trait AuditSink: Send + Sync {
    /// Hand off an event; delivery failures are logged, never returned
    fn publish(&self, event: AuditEvent);

    /// Hand off an event to be sent once `delay` has elapsed
    fn publish_after(&self, event: AuditEvent, delay: Duration);
}

/// Sink used when no webhook is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn publish(&self, event: AuditEvent) {
        log::debug!("audit sink not configured, dropping {}", event.action());
    }

    fn publish_after(&self, event: AuditEvent, _delay: Duration) {
        self.publish(event);
    }
}

/// Keeps every published event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(AuditEvent, Option<Duration>)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published events with the delay requested for each
    pub fn events(&self) -> Vec<(AuditEvent, Option<Duration>)> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.events().iter().map(|(e, _)| e.action()).collect()
    }

    fn record(&self, event: AuditEvent, delay: Option<Duration>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event, delay));
        }
    }
}

impl AuditSink for RecordingSink {
    fn publish(&self, event: AuditEvent) {
        self.record(event, None);
    }

    fn publish_after(&self, event: AuditEvent, delay: Duration) {
        self.record(event, Some(delay));
    }
}

#[cfg(feature = "web")]
pub use webhook::WebhookSink;

#[cfg(feature = "web")]
mod webhook {
    use super::{AuditEvent, AuditSink};
    use reqwest::Client;
    use std::time::Duration;

    /// POSTs events as JSON to the spreadsheet script endpoint
    #[derive(Debug, Clone)]
    pub struct WebhookSink {
        client: Client,
        url: String,
    }

    impl WebhookSink {
        pub fn new(url: &str) -> Self {
            WebhookSink {
                client: Client::new(),
                url: url.to_string(),
            }
        }

        pub fn url(&self) -> &str {
            &self.url
        }

        fn spawn(&self, event: AuditEvent, delay: Option<Duration>) {
            let handle = match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle,
                Err(_) => {
                    log::warn!("no async runtime, dropping audit event {}", event.action());
                    return;
                }
            };
            let client = self.client.clone();
            let url = self.url.clone();
            handle.spawn(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let action = event.action();
                // the endpoint answers opaquely; only transport errors are observable
                match client.post(&url).json(&event).send().await {
                    Ok(_) => log::debug!("audit event {} delivered", action),
                    Err(e) => log::warn!("audit webhook error for {}: {}", action, e),
                }
            });
        }
    }

    impl AuditSink for WebhookSink {
        fn publish(&self, event: AuditEvent) {
            self.spawn(event, None);
        }

        fn publish_after(&self, event: AuditEvent, delay: Duration) {
            self.spawn(event, Some(delay));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_carry_action_discriminator() {
        let event = AuditEvent::SaveConfig {
            analysts: vec![],
            manager_email: "jefe@lab.com".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"action": "SAVE_CONFIG", "analysts": [], "managerEmail": "jefe@lab.com"})
        );

        let snapshot = AuditEvent::SyncInventorySnapshot { reagents: vec![] };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["action"], "SYNC_INVENTORY_SNAPSHOT");
    }

    #[test]
    fn recording_sink_keeps_delays() {
        let sink = RecordingSink::new();
        sink.publish(AuditEvent::SyncInventorySnapshot { reagents: vec![] });
        sink.publish_after(
            AuditEvent::SyncInventorySnapshot { reagents: vec![] },
            Duration::from_millis(1500),
        );
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].1, Some(Duration::from_millis(1500)));
    }
}
