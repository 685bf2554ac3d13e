use async_trait::async_trait;
use chrono::Utc;
use reagentflow::audit::RecordingSink;
use reagentflow::error::{AuthError, FlowError, LabelError};
use reagentflow::labels::LabelAnalyzer;
use reagentflow::model::config_keys;
use reagentflow::recorder::{ReagentFlow, Replication};
use reagentflow::state::{ReagentDraft, Snapshot};
use reagentflow::store::{MemoryStore, ReagentRow};
use reagentflow::{AnalystUser, Department, LabelAnalysis, Presentation, Reagent};
use std::sync::Arc;

fn reagent(id: &str, name: &str, brand: &str, stock: f64) -> Reagent {
    Reagent {
        id: id.to_string(),
        name: name.to_string(),
        brand: brand.to_string(),
        presentation: Presentation::Solid,
        current_stock: stock,
        min_stock: 100.0,
        department: Department::Molecular,
        base_unit: "g".to_string(),
        container_type: "Frascos".to_string(),
        quantity_per_container: 250.0,
        expiry_date: "2027-01-31".to_string(),
        is_ordered: false,
        is_deleted: false,
        last_updated: Utc::now(),
    }
}

fn connected() -> (ReagentFlow, Arc<MemoryStore>, Arc<RecordingSink>) {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::new());
    let flow = ReagentFlow::new()
        .with_store(store.clone())
        .with_audit(sink.clone());
    (flow, store, sink)
}

#[tokio::test]
async fn pull_replaces_local_state() {
    let (flow, store, _) = connected();
    store.seed_reagent_row(ReagentRow::from(&reagent("r1", "Agarosa", "Bio", 500.0)));
    let mut broken = ReagentRow::from(&reagent("r2", "Tris", "Bio", 1.0));
    broken.current_stock = -5.0;
    store.seed_reagent_row(broken);
    store.seed_config(config_keys::MANAGER_EMAIL, "jefe@lab.cl");
    store.seed_config(
        config_keys::ANALYSTS,
        r#"["Ana", {"name": "Luis", "department": "Molecular"}]"#,
    );

    flow.record_intake(
        None,
        ReagentDraft {
            name: "Local".to_string(),
            brand: "Only".to_string(),
            ..Default::default()
        },
        1.0,
        "Ana",
    )
    .await
    .unwrap();

    let summary = flow.pull().await.unwrap().unwrap();
    // the local intake was replicated before the pull
    assert_eq!(summary.reagents, 2);
    assert_eq!(summary.analysts, 2);
    assert_eq!(flow.manager_email(), "jefe@lab.cl");
    assert!(flow.reagent("r1").is_some());
    assert!(flow.reagent("r2").is_none());
    assert_eq!(flow.transactions().len(), 1);
}

#[tokio::test]
async fn failed_pull_keeps_state() {
    let (flow, store, _) = connected();
    flow.record_intake(
        None,
        ReagentDraft {
            name: "Etanol".to_string(),
            brand: "Merck".to_string(),
            ..Default::default()
        },
        2.0,
        "Ana",
    )
    .await
    .unwrap();
    let before = flow.snapshot();

    store.set_fail_reads(true);
    assert!(matches!(flow.pull().await, Err(FlowError::Store(_))));
    assert_eq!(flow.snapshot(), before);
}

#[tokio::test]
async fn pull_without_store_is_a_no_op() {
    let flow = ReagentFlow::new();
    assert!(flow.pull().await.unwrap().is_none());
    assert!(!flow.is_connected());
}

#[tokio::test]
async fn analysts_are_persisted_as_json() {
    let (flow, store, sink) = connected();
    let ana = AnalystUser {
        name: "Ana".to_string(),
        department: Department::Microbiology,
    };
    assert!(flow.add_analyst(ana.clone()).await.unwrap());
    assert!(!flow.add_analyst(ana).await.unwrap());

    let stored = store.config_value(config_keys::ANALYSTS).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(value[0]["name"], "Ana");
    assert_eq!(value[0]["department"], "Microbiología");
    assert_eq!(sink.actions(), vec!["SAVE_CONFIG"]);

    assert!(flow.remove_analyst("Ana").await.unwrap());
    assert!(!flow.remove_analyst("Ana").await.unwrap());
    assert_eq!(store.config_value(config_keys::ANALYSTS).unwrap(), "[]");
}

#[tokio::test]
async fn config_write_failure_is_reported() {
    let (flow, store, _) = connected();
    store.set_fail_writes(true);
    let err = flow
        .update_manager_settings(None, Some("jefe@lab.cl"))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Store(_)));
}

#[tokio::test]
async fn invalid_manager_email_is_rejected() {
    let (flow, _, _) = connected();
    assert!(matches!(
        flow.update_manager_settings(None, Some("not-an-email")).await,
        Err(FlowError::InvalidInput(_))
    ));
    assert_eq!(flow.manager_email(), "");
}

#[tokio::test]
async fn first_manager_password_is_stored_hashed() {
    let (flow, store, _) = connected();
    assert!(!flow.has_manager_password());

    assert!(flow.authenticate_manager("clave1").await.unwrap());
    assert!(flow.has_manager_password());
    let stored = store.config_value(config_keys::MANAGER_PASSWORD).unwrap();
    assert!(stored.starts_with("$argon2"));

    assert!(!flow.authenticate_manager("clave1").await.unwrap());
    assert!(matches!(
        flow.authenticate_manager("otra").await,
        Err(FlowError::Auth(AuthError::WrongPassword))
    ));
}

#[tokio::test]
async fn legacy_plaintext_password_still_works() {
    let (flow, store, _) = connected();
    store.seed_config(config_keys::MANAGER_PASSWORD, "admin");
    flow.pull().await.unwrap();

    assert!(!flow.authenticate_manager("admin").await.unwrap());
    assert!(flow.authenticate_manager("admin2").await.is_err());
}

#[tokio::test]
async fn push_all_upserts_every_reagent() {
    let (flow, store, sink) = connected();
    flow.restore(Snapshot {
        reagents: vec![
            reagent("a", "Agarosa", "Bio", 10.0),
            reagent("b", "Tris", "Bio", 20.0),
        ],
        ..Default::default()
    });

    assert_eq!(flow.push_all().await, Replication::Synced);
    assert_eq!(store.reagent_rows().len(), 2);
    assert_eq!(sink.actions(), vec!["SYNC_ALL"]);

    store.set_fail_writes(true);
    assert!(matches!(flow.push_all().await, Replication::Failed(_)));
}

struct FixedAnalyzer(LabelAnalysis);

#[async_trait]
impl LabelAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _image_base64: &str) -> Result<LabelAnalysis, LabelError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn label_scan_points_at_inventory_rows() {
    let flow = ReagentFlow::new().with_labels(Arc::new(FixedAnalyzer(LabelAnalysis {
        name: "agarosa".to_string(),
        brand: "BIO".to_string(),
        presentation: Presentation::Solid,
    })));
    flow.restore(Snapshot {
        reagents: vec![reagent("a", "Agarosa", "Bio", 10.0)],
        ..Default::default()
    });

    let scan = flow.analyze_label("data:image/png;base64,AAAA").await.unwrap();
    assert_eq!(scan.suggested_base_unit, "g");
    assert_eq!(scan.exact_match.unwrap().id, "a");
    assert_eq!(scan.name_match.unwrap().id, "a");
}

#[tokio::test]
async fn label_scan_without_analyzer_fails() {
    let flow = ReagentFlow::new();
    assert!(matches!(
        flow.analyze_label("AAAA").await,
        Err(FlowError::Label(LabelError::NotConfigured))
    ));
}
