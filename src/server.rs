//! Axum-based mock API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check with the number of loaded schemas. |
//! | `GET`/`POST` | `/api/schemas` | List schemas / create one. |
//! | `POST` | `/api/schemas/reload` | Re-read the schemas directory. |
//! | `GET`/`PUT`/`DELETE` | `/api/schemas/{name}` | Read, replace or delete one schema. |
//! | `ANY`  | anything else | Mock route if a schema matches, otherwise a static file. |

use axum::{
    Json, Router,
    body::{Bytes, to_bytes},
    extract::{Path, Query, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::llm::OllamaClient;
use crate::schema::EndpointSchema;
use crate::store::{SchemaStore, StoredSchema, derive_name};
use crate::synthesizer::ResponseSynthesizer;

/// Largest request body accepted by mock routes
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared state injected into every handler via the [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<SchemaStore>>,
    synthesizer: Arc<ResponseSynthesizer>,
    static_dir: PathBuf,
}

impl AppState {
    pub fn new(
        store: SchemaStore,
        synthesizer: ResponseSynthesizer,
        static_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            synthesizer: Arc::new(synthesizer),
            static_dir: static_dir.into(),
        }
    }

    pub fn store(&self) -> &Arc<RwLock<SchemaStore>> {
        &self.store
    }
}

/// Build the axum [`Router`] for the given state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/schemas", get(list_schemas).post(create_schema))
        .route("/api/schemas/reload", post(reload_schemas))
        .route(
            "/api/schemas/{name}",
            get(get_schema).put(put_schema).delete(delete_schema),
        )
        .fallback(mock_or_static)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Load schemas, bind `server.host:server.port` and serve until Ctrl-C
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let client = OllamaClient::new(&config.llm)?;
    let synthesizer = ResponseSynthesizer::new(Arc::new(client));
    let store = SchemaStore::load(&config.server.schemas_dir);

    info!(
        schemas = store.len(),
        dir = %config.server.schemas_dir.display(),
        "Loaded endpoint schemas"
    );
    for stored in store.list() {
        info!(
            "  {} {} ({})",
            stored.schema.method.to_uppercase(),
            stored.schema.endpoint,
            stored.name
        );
    }

    let app = build_router(AppState::new(
        store,
        synthesizer,
        &config.server.static_dir,
    ));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        llm = %config.llm.host,
        model = %config.llm.model,
        "schema-mock listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("schema-mock stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// `GET /health` - liveness check.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let schemas = state.store.read().await.len();
    Json(json!({ "status": "ok", "service": "schema-mock", "schemas": schemas }))
}

async fn list_schemas(State(state): State<AppState>) -> Json<Vec<StoredSchema>> {
    Json(state.store.read().await.list())
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    name: Option<String>,
}

async fn create_schema(
    State(state): State<AppState>,
    Query(params): Query<CreateParams>,
    Json(schema): Json<EndpointSchema>,
) -> ServerResult<(StatusCode, Json<StoredSchema>)> {
    let name = params.name.unwrap_or_else(|| derive_name(&schema));
    let stored = state.store.write().await.save(&name, schema)?;
    info!(name = %stored.name, "Schema created");
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn reload_schemas(State(state): State<AppState>) -> Json<Value> {
    let count = state.store.write().await.reload();
    info!(schemas = count, "Schemas reloaded");
    Json(json!({ "schemas": count }))
}

async fn get_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Json<StoredSchema>> {
    state
        .store
        .read()
        .await
        .get(&name)
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("schema '{name}'")))
}

async fn put_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(schema): Json<EndpointSchema>,
) -> ServerResult<Json<StoredSchema>> {
    let stored = state.store.write().await.save(&name, schema)?;
    info!(name = %stored.name, "Schema saved");
    Ok(Json(stored))
}

async fn delete_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<StatusCode> {
    state.store.write().await.remove(&name)?;
    info!(name = %name, "Schema deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Answer from a matching schema, else hand the request to the static files
async fn mock_or_static(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let resolved = state.store.read().await.resolve(&method, &path);
    let Some(route) = resolved else {
        debug!(%method, %path, "No schema matched, serving static content");
        return serve_static(&state, request).await;
    };

    let query = Query::<BTreeMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return ServerError::InvalidRequest(format!("unreadable body: {e}")).into_response();
        }
    };

    let input = build_input(&route.params, &query, &body);
    info!(%method, %path, schema = %route.stored.name, "Generating mock response");
    let value = state.synthesizer.generate(&route.stored.schema, &input).await;
    Json(value).into_response()
}

/// Static files for `GET`/`HEAD`; every other unmatched request is a 404
async fn serve_static(state: &AppState, request: Request) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return ServerError::NotFound(format!(
            "no route for {} {}",
            request.method(),
            request.uri().path()
        ))
        .into_response();
    }

    match ServeDir::new(&state.static_dir).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Input handed to the synthesizer for a mock request
///
/// Path parameters, then query parameters, then the fields of a JSON object
/// body are merged into one object. Any other JSON body is used as-is; a
/// body that is not JSON lands under `"body"` as text.
pub fn build_input(
    params: &BTreeMap<String, String>,
    query: &BTreeMap<String, String>,
    body: &Bytes,
) -> Value {
    let mut input = Map::new();
    for (key, value) in params.iter().chain(query) {
        input.insert(key.clone(), Value::String(value.clone()));
    }

    if !body.iter().all(u8::is_ascii_whitespace) {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => input.extend(fields),
            Ok(Value::Null) => {}
            Ok(other) => return other,
            Err(_) => {
                input.insert(
                    "body".to_string(),
                    Value::String(String::from_utf8_lossy(body).into_owned()),
                );
            }
        }
    }

    Value::Object(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_build_input_merges_sources() {
        let input = build_input(
            &map(&[("id", "7")]),
            &map(&[("verbose", "true")]),
            &Bytes::from_static(br#"{"name": "Ada", "id": 8}"#),
        );
        assert_eq!(input, json!({ "id": 8, "verbose": "true", "name": "Ada" }));
    }

    #[test]
    fn test_build_input_passes_arrays_through() {
        let input = build_input(&map(&[("id", "7")]), &BTreeMap::new(), &Bytes::from_static(b"[1, 2]"));
        assert_eq!(input, json!([1, 2]));
    }

    #[test]
    fn test_build_input_plain_text_body() {
        let input = build_input(&BTreeMap::new(), &BTreeMap::new(), &Bytes::from_static(b"hello"));
        assert_eq!(input, json!({ "body": "hello" }));
    }

    #[test]
    fn test_build_input_empty_body() {
        let input = build_input(&map(&[("id", "1")]), &BTreeMap::new(), &Bytes::from_static(b"  \n"));
        assert_eq!(input, json!({ "id": "1" }));
    }
}
