//! Canned HTTP endpoints for unit tests: a JSON-RPC node and an ENS indexer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

/// Maps `(method, params)` to a result. `None` leaves the call hanging.
type Responder = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

async fn serve(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

async fn rpc_handler(State(respond): State<Responder>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let result = match respond(&method, &request["params"]) {
        Some(result) => result,
        None => std::future::pending::<Value>().await,
    };
    Json(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
}

/// Start a JSON-RPC node answering through `respond`
pub(crate) async fn spawn_rpc_node<F>(respond: F) -> Url
where
    F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
{
    let respond: Responder = Arc::new(respond);
    serve(Router::new().route("/", post(rpc_handler)).with_state(respond)).await
}

async fn indexer_handler(
    State(records): State<Arc<HashMap<String, Value>>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    records
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Start an indexer serving `GET /{name}` from `records`, 404 for anything else
pub(crate) async fn spawn_indexer(records: HashMap<String, Value>) -> Url {
    let app = Router::new()
        .route("/{name}", get(indexer_handler))
        .with_state(Arc::new(records));
    serve(app).await
}
