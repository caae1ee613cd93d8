//! Drives the W3C client and built-in resolvers against an in-process fake grid.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use drover_protocol::{Browser, Device, DeviceKind, DeviceType, DriverProperties, DriverScope};
use drover_runtime::{DriverManager, DriverPool, DriversStore, Error, NativeDriver, RemoteSession, default_resolvers};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

#[derive(Default)]
struct GridState {
	sessions: AtomicUsize,
	deleted: Mutex<Vec<String>>,
	last_capabilities: Mutex<Option<Value>>,
	gateway_down: AtomicBool,
}

struct FakeGrid {
	url: String,
	state: Arc<GridState>,
	handle: JoinHandle<()>,
}

impl FakeGrid {
	async fn start() -> Self {
		let state = Arc::new(GridState::default());
		let app = Router::new()
			.route("/wd/hub/session", post(new_session))
			.route("/wd/hub/session/{id}", delete(delete_session))
			.route("/wd/hub/session/{id}/screenshot", get(screenshot))
			.route("/wd/hub/session/{id}/source", get(source))
			.with_state(state.clone());

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let handle = tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});

		Self {
			url: format!("http://{addr}/wd/hub"),
			state,
			handle,
		}
	}

	fn shutdown(self) {
		self.handle.abort();
	}
}

async fn new_session(State(state): State<Arc<GridState>>, Json(body): Json<Value>) -> impl IntoResponse {
	let caps = body["capabilities"]["alwaysMatch"].clone();
	if caps["browserName"] == "safari" {
		return (
			StatusCode::INTERNAL_SERVER_ERROR,
			Json(json!({ "value": { "error": "session not created", "message": "no safari nodes" } })),
		);
	}
	*state.last_capabilities.lock() = Some(caps.clone());
	let n = state.sessions.fetch_add(1, Ordering::SeqCst);
	(
		StatusCode::OK,
		Json(json!({ "value": { "sessionId": format!("sess-{n}"), "capabilities": caps } })),
	)
}

async fn delete_session(State(state): State<Arc<GridState>>, Path(id): Path<String>) -> Json<Value> {
	state.deleted.lock().push(id);
	Json(json!({ "value": null }))
}

async fn screenshot(Path(_id): Path<String>) -> Json<Value> {
	// "PNG" base64-encoded
	Json(json!({ "value": "UE5H" }))
}

async fn source(State(state): State<Arc<GridState>>, Path(id): Path<String>) -> axum::response::Response {
	if state.gateway_down.load(Ordering::SeqCst) {
		return (StatusCode::BAD_GATEWAY, "upstream node unreachable").into_response();
	}
	Json(json!({ "value": format!("<html><body>{id}</body></html>") })).into_response()
}

#[tokio::test]
async fn session_round_trip_against_grid() {
	let grid = FakeGrid::start().await;
	let client = reqwest::Client::new();
	let caps = Device::web("main", Browser::Chrome).capabilities();

	let session = RemoteSession::start(&client, &grid.url, caps, drover_runtime::LogEndpoint::Selenium)
		.await
		.unwrap();
	assert_eq!(session.session_id(), "sess-0");
	assert_eq!(session.capabilities()["browserName"], "chrome");
	assert_eq!(session.screenshot().await.unwrap(), b"PNG");
	assert!(session.page_source().await.unwrap().contains("sess-0"));

	session.quit().await.unwrap();
	assert_eq!(grid.state.deleted.lock().as_slice(), ["sess-0".to_string()]);
	grid.shutdown();
}

#[tokio::test]
async fn grid_errors_surface_as_webdriver_errors() {
	let grid = FakeGrid::start().await;
	let client = reqwest::Client::new();
	let caps = Device::web("mac", Browser::Safari).capabilities();

	let err = RemoteSession::start(&client, &grid.url, caps, drover_runtime::LogEndpoint::Selenium)
		.await
		.unwrap_err();
	match err {
		Error::WebDriver { error, message } => {
			assert_eq!(error, "session not created");
			assert_eq!(message, "no safari nodes");
		}
		other => panic!("unexpected error {other:?}"),
	}
	grid.shutdown();
}

#[tokio::test]
async fn non_json_error_pages_keep_the_status() {
	let grid = FakeGrid::start().await;
	let client = reqwest::Client::new();
	let caps = Device::web("main", Browser::Chrome).capabilities();
	let session = RemoteSession::start(&client, &grid.url, caps, drover_runtime::LogEndpoint::Selenium)
		.await
		.unwrap();

	grid.state.gateway_down.store(true, Ordering::SeqCst);
	match session.page_source().await.unwrap_err() {
		Error::WebDriver { error, message } => {
			assert_eq!(error, "unknown error");
			assert!(message.starts_with("502 Bad Gateway"), "{message}");
			assert!(message.contains("upstream node unreachable"));
		}
		other => panic!("unexpected error {other:?}"),
	}
	grid.shutdown();
}

#[tokio::test]
async fn pool_starts_headless_driver_through_grid_and_quits_on_clear() {
	let grid = FakeGrid::start().await;
	let properties = DriverProperties::default()
		.with_grid_url(grid.url.clone())
		.with_scope(DriverScope::Suite);
	let manager = DriverManager::new(properties.clone()).with_resolvers(default_resolvers(reqwest::Client::new(), &properties));
	let pool = DriverPool::new(manager, Arc::new(DriversStore::new()));

	let device = Device::new(
		"ci",
		DeviceKind::Web {
			browser: Browser::Chrome,
			headless: true,
		},
	);
	let holder = pool.driver(&device).await.unwrap();
	assert_eq!(holder.scope(), DriverScope::Suite);
	assert_eq!(holder.device_type(), Some(DeviceType::Web));
	assert!(holder.native_as::<RemoteSession>().is_some());

	let sent = grid.state.last_capabilities.lock().clone().unwrap();
	assert_eq!(sent["goog:chromeOptions"]["args"], json!(["--headless=new"]));

	assert_eq!(pool.store().clear_all_scope(DriverScope::Suite).await, 1);
	assert_eq!(grid.state.deleted.lock().len(), 1);
	grid.shutdown();
}
