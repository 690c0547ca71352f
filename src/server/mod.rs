use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{debug, info};

use crate::config::Config;
use crate::data::store::Store;

pub mod api;
pub mod routes;

/// Shared by every request: the live store and the resolved configuration.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }
}

/// Every path goes through [`routes::route_request`]; axum only does transport.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<AppState>, method: Method, uri: Uri, body: String) -> Response {
    let target = uri
        .path_and_query()
        .map(|target| target.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let method = method.as_str().to_string();
    debug!(%method, %target, "request");

    let response = tokio::task::spawn_blocking(move || routes::route_request(&state, &method, &target, &body))
        .await
        .unwrap_or_else(|err| routes::error_response(500, "Internal Server Error", &err.to_string()));

    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, response.content_type)], Body::from(response.body)).into_response()
}

pub fn run_server(state: AppState) -> std::io::Result<()> {
    let bind_addr = state.config.bind_addr.clone();
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!(addr = %bind_addr, "forgewright server listening");
        axum::serve(listener, router(state)).await
    })
}
