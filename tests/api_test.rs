#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use reagentflow::app::{self, AppState};
use reagentflow::recorder::ReagentFlow;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app(dir: &std::path::Path) -> Router {
    let flow = Arc::new(ReagentFlow::new());
    app::router(Arc::new(AppState::new(flow, dir.to_path_buf())))
}

fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` part of the session cookie set by a login response
fn session_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login sets a cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn login_analyst(app: &Router) -> String {
    login_analyst_as(app, "Ana").await
}

async fn login_analyst_as(app: &Router, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/login/analyst",
            None,
            Some(json!({"name": name})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

async fn login_manager(app: &Router) -> (String, Value) {
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/login/manager",
            None,
            Some(json!({"password": "clave1"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    (cookie, json_body(response).await)
}

#[tokio::test]
async fn views_require_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let response = app
        .clone()
        .oneshot(request("GET", "/api/inventory", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["status"], "error");

    let cookie = login_analyst(&app).await;
    let response = app
        .oneshot(request("GET", "/api/inventory", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn analysts_cannot_reach_manager_routes() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());
    let cookie = login_analyst(&app).await;

    for (method, uri) in [
        ("GET", "/api/alerts"),
        ("GET", "/api/settings"),
        ("GET", "/api/export/inventory.csv"),
        ("POST", "/api/push"),
    ] {
        let response = app
            .clone()
            .oneshot(request(method, uri, Some(&cookie), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{} {}", method, uri);
    }

    // the analyst roster is readable by analysts but only managers may edit it
    let response = app
        .clone()
        .oneshot(request("GET", "/api/analysts", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .oneshot(request(
            "POST",
            "/api/analysts",
            Some(&cookie),
            Some(json!({"name": "Luis", "department": "Molecular"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn first_manager_login_sets_password() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (cookie, body) = login_manager(&app).await;
    assert_eq!(body["role"], "GERENTE");
    assert_eq!(body["firstLogin"], true);

    let (_, body) = login_manager(&app).await;
    assert_eq!(body["firstLogin"], false);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/login/manager",
            None,
            Some(json!({"password": "wrong"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(request("GET", "/api/alerts", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn intake_and_withdrawal_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());
    let cookie = login_analyst(&app).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/intake",
            Some(&cookie),
            Some(json!({
                "draft": {
                    "name": "Acetona",
                    "brand": "MarcaX",
                    "presentation": "Líquido",
                    "baseUnit": "mL",
                    "containerType": "Frascos",
                    "quantityPerContainer": 500,
                    "minStock": 500
                },
                "containers": 10,
                "analyst": "Ana"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt = json_body(response).await;
    assert_eq!(receipt["reagent"]["currentStock"], 5000.0);
    assert_eq!(receipt["replication"]["status"], "SKIPPED");
    let id = receipt["reagent"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/withdrawal",
            Some(&cookie),
            Some(json!({
                "reagentId": id,
                "withdrawal": {"mode": "QUANTITY", "value": 6000},
                "analyst": "Ana"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/withdrawal",
            Some(&cookie),
            Some(json!({
                "reagentId": id,
                "withdrawal": {"mode": "CONTAINER", "value": 2},
                "analyst": "Ana"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["reagent"]["currentStock"], 4000.0);

    let response = app
        .oneshot(request("GET", "/api/history", Some(&cookie), None))
        .await
        .unwrap();
    let history = json_body(response).await;
    assert_eq!(history.as_array().unwrap().len(), 2);
    assert_eq!(history[0]["type"], "OUT");
}

#[tokio::test]
async fn reagent_list_follows_the_analyst_department() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());
    let (manager, _) = login_manager(&app).await;
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/analysts",
            Some(&manager),
            Some(json!({"name": "Luis", "department": "Molecular"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let luis = login_analyst_as(&app, "Luis").await;
    let ana = login_analyst(&app).await;
    for (cookie, analyst, name) in [(&luis, "Luis", "Agarosa"), (&ana, "Ana", "Acetona")] {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/intake",
                Some(cookie),
                Some(json!({
                    "draft": {"name": name, "brand": "Bio", "presentation": "Sólido"},
                    "containers": 1,
                    "analyst": analyst
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(request("GET", "/api/reagents", Some(&luis), None))
        .await
        .unwrap();
    let list = json_body(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "Agarosa");
    assert_eq!(list[0]["department"], "Molecular");

    let response = app
        .clone()
        .oneshot(request("GET", "/api/reagents?department=Molecular", Some(&ana), None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

    let response = app
        .oneshot(request("GET", "/api/reagents", Some(&ana), None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn manager_downloads_reports_and_backups() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());
    let (cookie, _) = login_manager(&app).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/api/export/inventory.csv", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );

    let response = app
        .clone()
        .oneshot(request("GET", "/api/backup", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let backup = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let restore = Request::builder()
        .method("POST")
        .uri("/api/backup")
        .header(header::COOKIE, &cookie)
        .body(Body::from(backup))
        .unwrap();
    let response = app.clone().oneshot(restore).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["reagents"], 0);

    let garbage = Request::builder()
        .method("POST")
        .uri("/api/backup")
        .header(header::COOKIE, &cookie)
        .body(Body::from("not a backup"))
        .unwrap();
    let response = app.oneshot(garbage).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connection_settings_are_saved_without_exposing_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());
    let (cookie, _) = login_manager(&app).await;

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            "/api/connection",
            Some(&cookie),
            Some(json!({"supabaseUrl": "ftp://nope", "supabaseKey": "k"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            "/api/connection",
            Some(&cookie),
            Some(json!({"webhookUrl": "https://hooks.example.com/audit"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["connected"], false);

    let response = app
        .oneshot(request("GET", "/api/connection", Some(&cookie), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["webhookUrl"], "https://hooks.example.com/audit");
    assert_eq!(body["hasSupabaseKey"], false);
    assert!(dir.path().join("connection.json").exists());
}

#[tokio::test]
async fn logout_ends_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());
    let cookie = login_analyst(&app).await;

    let response = app
        .clone()
        .oneshot(request("POST", "/api/logout", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(request("GET", "/api/history", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
