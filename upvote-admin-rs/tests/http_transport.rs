use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use upvote_admin::client::UpvoteClient;
use upvote_admin::config::AppConfig;
use upvote_admin::error::ApiError;
use upvote_admin::models::ClientMode;
use upvote_admin::pages::host_page::HostPage;
use upvote_admin::resources::HttpTransport;
use upvote_admin::routes::Route;
use upvote_admin::shell::{ErrorNotifier, Navigator, PageTitle, Prompt, PromptRequest, Shell};

const TOKEN: &str = "xsrf-123";

#[derive(Default)]
struct Backend {
    updates: Mutex<Vec<(HashMap<String, String>, Value)>>,
    fail_updates: Mutex<bool>,
    transitive: Mutex<Vec<(String, String)>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-xsrf-token").and_then(|v| v.to_str().ok()) == Some(TOKEN)
        && headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|c| c.contains("session=abc"))
}

async fn get_host(Path(id): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, "missing xsrf").into_response();
    }
    let body = json!({
        "id": id,
        "hostname": "mac-01",
        "class_": ["Host", "SantaHost"],
        "clientMode": "MONITOR",
        "clientModeLock": false
    });
    format!(")]}}',\n{body}").into_response()
}

async fn update_host(
    State(backend): State<Arc<Backend>>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    backend.updates.lock().unwrap().push((query, body.clone()));
    if *backend.fail_updates.lock().unwrap() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "datastore unavailable").into_response();
    }
    Json(body).into_response()
}

async fn set_transitive(
    State(backend): State<Arc<Backend>>,
    Path((id, value)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, "missing xsrf").into_response();
    }
    backend.transitive.lock().unwrap().push((id, value));
    Json(Value::Null).into_response()
}

async fn get_user() -> Json<Value> {
    Json(json!({ "id": "admin@example.com", "permissions": ["EDIT_HOSTS"] }))
}

async fn get_setting(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "santaDirectoryWhitelistRegex" => Json(json!("^/opt/")).into_response(),
        _ => Json(Value::Null).into_response(),
    }
}

async fn query_events(Query(query): Query<HashMap<String, String>>) -> Response {
    let detail = format!(
        "hostId={} withContext={}",
        query.get("hostId").map(String::as_str).unwrap_or(""),
        query.get("withContext").map(String::as_str).unwrap_or("")
    );
    (StatusCode::INTERNAL_SERVER_ERROR, detail).into_response()
}

async fn spawn_backend() -> (AppConfig, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/web/hosts/{id}", get(get_host).post(update_host))
        .route(
            "/api/web/hosts/{id}/transitive/{value}",
            put(set_transitive),
        )
        .route("/api/web/users", get(get_user))
        .route("/api/web/settings/{name}", get(get_setting))
        .route("/api/web/events/query", get(query_events))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = AppConfig {
        api_base_url: format!("http://{addr}"),
        session_cookie: "session=abc".to_string(),
        xsrf_token: TOKEN.to_string(),
        ..AppConfig::default()
    };
    (config, backend)
}

fn client_for(config: &AppConfig) -> Arc<UpvoteClient> {
    let transport = HttpTransport::from_config(config).unwrap();
    Arc::new(UpvoteClient::new(Arc::new(transport), &config.web_prefix))
}

#[tokio::test]
async fn host_round_trip_sends_credentials_and_update_fields() {
    let (config, backend) = spawn_backend().await;
    let client = client_for(&config);

    let mut host = client.get_host("H-1").await.unwrap();
    assert!(host.is_santa_host());
    assert_eq!(host.client_mode, Some(ClientMode::Monitor));

    host.client_mode_lock = true;
    client.update_host(&host).await.unwrap();

    let updates = backend.updates.lock().unwrap();
    let (query, body) = &updates[0];
    assert_eq!(query.get("clientModeLock").map(String::as_str), Some("true"));
    assert_eq!(query.get("clientMode").map(String::as_str), Some("MONITOR"));
    assert_eq!(query.get("shouldUploadLogs").map(String::as_str), Some("false"));
    assert_eq!(body["hostname"], json!("mac-01"));
    assert_eq!(body["class_"], json!(["Host", "SantaHost"]));
}

#[tokio::test]
async fn transitive_flag_is_put_on_its_own_route() {
    let (config, backend) = spawn_backend().await;
    let client = client_for(&config);

    client.set_host_transitive("H-1", true).await.unwrap();

    assert_eq!(
        *backend.transitive.lock().unwrap(),
        vec![("H-1".to_string(), "true".to_string())]
    );
    assert!(backend.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_xsrf_token_surfaces_the_status() {
    let (mut config, _) = spawn_backend().await;
    config.xsrf_token.clear();
    let client = client_for(&config);

    let err = client.get_host("H-1").await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    match err {
        ApiError::Status { path, body, .. } => {
            assert_eq!(path, "/api/web/hosts/H-1");
            assert_eq!(body, "missing xsrf");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn settings_and_event_query_parameters() {
    let (config, _) = spawn_backend().await;
    let client = client_for(&config);

    assert_eq!(
        client.get_setting("santaDirectoryWhitelistRegex").await.unwrap(),
        "^/opt/"
    );
    assert_eq!(
        client.get_setting("santaDirectoryBlacklistRegex").await.unwrap(),
        ""
    );

    let mut filter = upvote_admin::resources::Params::new();
    filter.insert("hostId".to_string(), "H-1".to_string());
    let err = client.query_events(&filter).await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Status {
            status: 500,
            path: "/api/web/events/query".to_string(),
            body: "hostId=H-1 withContext=true".to_string(),
        }
    );
}

#[derive(Default)]
struct Recorder {
    errors: Mutex<Vec<ApiError>>,
}

impl Navigator for Recorder {
    fn navigate(&self, _route: &Route) {}
    fn open_in_new_window(&self, _route: &Route) {}
}

impl ErrorNotifier for Recorder {
    fn notify(&self, error: &ApiError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

impl PageTitle for Recorder {
    fn set_title(&self, _title: &str) {}
}

#[async_trait(?Send)]
impl Prompt for Recorder {
    async fn prompt(&self, _request: PromptRequest) -> Option<String> {
        None
    }
}

#[tokio::test]
async fn host_page_rolls_back_when_the_backend_rejects_an_update() {
    let (config, backend) = spawn_backend().await;
    let recorder = Rc::new(Recorder::default());
    let shell = Shell {
        navigator: recorder.clone(),
        notifier: recorder.clone(),
        title: recorder.clone(),
        prompt: recorder.clone(),
    };
    let page = HostPage::new(client_for(&config), shell, Some("H-1".to_string()), None);
    page.init().await;
    let host = page.host("H-1").unwrap();
    assert!(page.can_enable_lockdown_mode(&host));

    assert!(page.enable_lockdown_mode("H-1").await);
    assert_eq!(page.host("H-1").unwrap().client_mode, Some(ClientMode::Lockdown));

    *backend.fail_updates.lock().unwrap() = true;
    assert!(!page.toggle_client_mode_lock("H-1").await);
    assert!(!page.host("H-1").unwrap().client_mode_lock);

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].status(), Some(500));
    assert_eq!(backend.updates.lock().unwrap().len(), 2);
}
