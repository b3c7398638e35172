use autopilot_activator::adapters::{PortfolioApiClient, TargetServiceClient};
use autopilot_activator::config::{AdvisorConfig, ApiConfig, TargetServiceConfig};
use autopilot_activator::domain::{build_target, Allocation, ModelReference, Session};
use autopilot_activator::error::ActivatorError;
use autopilot_activator::remote::{PortfolioClient, TargetSubmitter};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const API_KEY: &str = "api-key";
const TOKEN: &str = "sess-1";

type Writes = Arc<Mutex<Vec<(String, Value)>>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").map(|v| v.as_bytes()) == Some(API_KEY.as_bytes())
        && headers.get("rsesh").map(|v| v.as_bytes()) == Some(TOKEN.as_bytes())
}

async fn login(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if body["email"] == "advisor@example.com" && body["password"] == "hunter2" && body["app_id"] == 1
    {
        Ok(Json(json!({ "token": TOKEN })))
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn get_client(Path(id): Path<String>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    match id.as_str() {
        "missing" => Err(StatusCode::NOT_FOUND),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(Json(json!({ "id": id })))
        }
        _ => Ok(Json(json!({ "id": id, "portfolios": [{ "id": 9 }] }))),
    }
}

async fn get_portfolio(Path(id): Path<i64>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    match id {
        9 => Ok(Json(json!({
            "id": 9,
            "type": "CLIENT",
            "rsk_user_id": 300,
            "nickname": "Household",
            "accounts": [{ "id": 42, "portfolio_id": 9, "is_autopilot_enabled": 0, "custodian": "SCHW" }]
        }))),
        70 => Ok(Json(json!({
            "id": 70,
            "type": "MODEL",
            "model_version": { "id": 3 },
            "accounts": []
        }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn put_portfolio(
    State(writes): State<Writes>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    writes
        .lock()
        .unwrap()
        .push((format!("PUT /v1/portfolios/{id}"), body.clone()));
    Ok(Json(body))
}

async fn create_portfolio(
    State(writes): State<Writes>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    writes
        .lock()
        .unwrap()
        .push(("POST /v1/portfolios/".to_string(), body));
    Ok(Json(json!({ "id": 70 })))
}

async fn sync_client(Path(id): Path<String>, headers: HeaderMap) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    if id == "broken" {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    }
}

async fn import_client(headers: HeaderMap, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if body.get("bad").is_some() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(json!({ "id": 501, "imported": body })))
}

async fn post_target(headers: HeaderMap, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if headers.get("authorization").map(|v| v.as_bytes()) != Some(API_KEY.as_bytes()) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if body["account_id"] == 13 {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({ "id": 1 })))
}

async fn spawn_server() -> (String, Writes) {
    let writes: Writes = Arc::default();
    let app = Router::new()
        .route("/v1/auth/login", post(login))
        .route("/clients", post(import_client))
        .route("/clients/:id", get(get_client))
        .route("/v1/portfolios/", post(create_portfolio))
        .route("/v1/portfolios/:id", get(get_portfolio).put(put_portfolio))
        .route("/integration/sync_client_generic/:id", get(sync_client))
        .route("/v1/targets", post(post_target))
        .with_state(writes.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), writes)
}

fn api_client(base_url: &str, password: &str) -> PortfolioApiClient {
    let api = ApiConfig {
        base_url: format!("{base_url}/"),
        authorization: API_KEY.to_string(),
        session_header: "rsesh".to_string(),
        request_timeout_ms: 300,
        user_agent: "test".to_string(),
    };
    let advisor = AdvisorConfig {
        email: "advisor@example.com".to_string(),
        password: password.to_string(),
        app_id: 1,
    };
    PortfolioApiClient::new(&api, advisor).unwrap()
}

#[tokio::test]
async fn login_returns_session_or_auth_error() {
    let (base, _) = spawn_server().await;

    let session = assert_ok!(api_client(&base, "hunter2").login().await);
    assert_eq!(session.token(), TOKEN);

    let err = assert_err!(api_client(&base, "wrong").login().await);
    assert!(matches!(err, ActivatorError::Auth(_)), "got {err:?}");
}

#[tokio::test]
async fn reads_and_writes_back_full_portfolio() {
    let (base, writes) = spawn_server().await;
    let client = api_client(&base, "hunter2");
    let session = Session::new(TOKEN);

    let detail = assert_ok!(client.get_client("c1", &session).await);
    assert_eq!(detail.primary_portfolio_id(), Some(9));

    let mut portfolio = assert_ok!(client.get_portfolio(9, &session).await);
    portfolio.primary_account_mut().unwrap().enable_autopilot();
    assert_ok!(client.update_portfolio(&portfolio, &session).await);

    let writes = writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let (route, body) = &writes[0];
    assert_eq!(route, "PUT /v1/portfolios/9");
    assert_eq!(body["nickname"], "Household");
    assert_eq!(body["accounts"][0]["custodian"], "SCHW");
    assert_eq!(body["accounts"][0]["is_autopilot_enabled"], 1);
}

#[tokio::test]
async fn non_success_status_maps_to_remote_error() {
    let (base, _) = spawn_server().await;
    let client = api_client(&base, "hunter2");
    let session = Session::new(TOKEN);

    let err = assert_err!(client.get_client("missing", &session).await);
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("client missing"));

    let err = assert_err!(client.get_portfolio(1, &Session::new("stale")).await);
    assert_eq!(err.status(), Some(401));

    let err = assert_err!(client.sync_client("broken", &session).await);
    assert_eq!(err.status(), Some(502));
    assert_ok!(client.sync_client("c1", &session).await);
}

#[tokio::test]
async fn client_ids_stay_inside_their_path_segment() {
    let (base, _) = spawn_server().await;
    let client = api_client(&base, "hunter2");
    let session = Session::new(TOKEN);

    let detail = assert_ok!(client.get_client("missing?x=1", &session).await);
    assert_eq!(detail.id.as_deref(), Some("missing?x=1"));

    let detail = assert_ok!(client.get_client("12/../13", &session).await);
    assert_eq!(detail.id.as_deref(), Some("12/../13"));

    let detail = assert_ok!(client.get_client("a#frag", &session).await);
    assert_eq!(detail.id.as_deref(), Some("a#frag"));

    let err = assert_err!(client.sync_client("..", &session).await);
    assert!(matches!(err, ActivatorError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn hung_call_times_out() {
    let (base, _) = spawn_server().await;
    let client = api_client(&base, "hunter2");

    let err = assert_err!(client.get_client("slow", &Session::new(TOKEN)).await);
    assert!(matches!(err, ActivatorError::Remote { status: None, .. }), "got {err:?}");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn create_model_posts_refetches_and_attaches_allocations() {
    let (base, writes) = spawn_server().await;
    let client = api_client(&base, "hunter2");

    let allocations = vec![Allocation {
        sec_id: Some(11),
        percent: Some(1.0),
        ..Default::default()
    }];
    let model = assert_ok!(client.create_model(allocations, &Session::new(TOKEN)).await);

    assert_eq!(
        ModelReference::from_model(&model).unwrap(),
        ModelReference::new(70, 3)
    );
    assert_eq!(model.accounts[0].allocations[0].sec_id, Some(11));

    let writes = writes.lock().unwrap();
    assert_eq!(writes[0].0, "POST /v1/portfolios/");
    assert_eq!(writes[0].1["type"], "MODEL");
    assert_eq!(writes[0].1["status"], "active");
    assert_eq!(writes[1].0, "PUT /v1/portfolios/70");
}

#[tokio::test]
async fn import_reports_upstream_status() {
    let (base, _) = spawn_server().await;
    let client = api_client(&base, "hunter2");
    let session = Session::new(TOKEN);

    let imported = assert_ok!(client.import_client(&json!({ "id": 1 }), &session).await);
    assert_eq!(imported["id"], 501);

    let err = assert_err!(client.import_client(&json!({ "id": 2, "bad": true }), &session).await);
    assert_eq!(err.status(), Some(422));
}

#[tokio::test]
async fn target_service_accepts_and_rejects() {
    let (base, _) = spawn_server().await;
    let config = TargetServiceConfig {
        base_url: base,
        user_agent: "test".to_string(),
    };
    let service = TargetServiceClient::new(&config, API_KEY, Duration::from_secs(2)).unwrap();
    let model = ModelReference::new(7, 3);

    let account = autopilot_activator::domain::Account {
        id: Some(42),
        portfolio_id: Some(9),
        ..Default::default()
    };
    let receipt = assert_ok!(
        service
            .post_target(&build_target(&account, None, None, &model).unwrap())
            .await
    );
    assert_eq!(receipt.id, Some(json!(1)));

    let rejected = autopilot_activator::domain::Account {
        id: Some(13),
        portfolio_id: Some(9),
        ..Default::default()
    };
    let err = assert_err!(
        service
            .post_target(&build_target(&rejected, None, None, &model).unwrap())
            .await
    );
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("target 9:13"));
}
