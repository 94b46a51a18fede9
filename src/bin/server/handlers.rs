//! HTTP Handlers for the tsdataset Server
//!
//! Dataset queries are CPU bound and read the store synchronously, so they run
//! on the blocking pool rather than on the async workers.

use super::types::*;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, warn};
use tsdataset::config::ApplicationConfig;
use tsdataset::query::{DatasetEngine, DatasetQuery, QueryError, QueryErrorKind};
use tsdataset::storage::InMemoryStreamAccessor;
use tsdataset::types::Datapoint;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state
pub struct AppState {
    /// Stream store queried by the dataset engine
    pub store: Arc<InMemoryStreamAccessor>,
    /// Dataset engine configured from `[query]`
    pub engine: DatasetEngine,
    /// Effective configuration
    pub config: ApplicationConfig,
}

impl AppState {
    /// Build state from configuration and a loaded store
    pub fn new(config: ApplicationConfig, store: Arc<InMemoryStreamAccessor>) -> Self {
        Self {
            engine: DatasetEngine::new(config.query),
            store,
            config,
        }
    }

    /// Run a dataset query to completion
    pub fn execute(&self, query: &DatasetQuery) -> Result<Vec<Datapoint>, QueryError> {
        self.engine.collect(query, self.store.as_ref())
    }
}

// =============================================================================
// Health & Metrics Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        streams: state.store.stream_paths().len(),
    })
}

/// Prometheus metrics endpoint
pub async fn metrics() -> Response {
    match tsdataset::metrics::gather_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to gather metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(e))).into_response()
        }
    }
}

// =============================================================================
// Stream Catalog Handler
// =============================================================================

/// List known stream paths with their datapoint counts
pub async fn list_streams(State(state): State<Arc<AppState>>) -> Json<StreamsResponse> {
    let streams = state
        .store
        .stream_paths()
        .into_iter()
        .map(|path| StreamInfo {
            datapoints: state.store.stream_len(&path).unwrap_or(0),
            path,
        })
        .collect();
    Json(StreamsResponse { streams })
}

// =============================================================================
// Dataset Query Handler
// =============================================================================

/// HTTP status for a query error kind
pub fn status_for(kind: QueryErrorKind) -> StatusCode {
    match kind {
        QueryErrorKind::StreamNotFound => StatusCode::NOT_FOUND,
        QueryErrorKind::ResourceLimit => StatusCode::PAYLOAD_TOO_LARGE,
        QueryErrorKind::Storage | QueryErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        QueryErrorKind::EmptyDataset
        | QueryErrorKind::ReservedFieldName
        | QueryErrorKind::NoTimeline
        | QueryErrorKind::UnknownInterpolator
        | QueryErrorKind::EvaluationError
        | QueryErrorKind::EmptyCandidateSequence => StatusCode::BAD_REQUEST,
    }
}

/// Map a query error to a response
pub fn query_error_response(e: &QueryError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status_for(e.kind),
        Json(ErrorResponse::with_kind(e.kind.as_str(), e.message.clone())),
    )
}

/// Build a dataset from a `DatasetQuery` body
pub async fn query_dataset(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DatasetQuery>, JsonRejection>,
) -> Response {
    let query = match payload {
        Ok(Json(query)) => query,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed dataset query");
            return (
                rejection.status(),
                Json(ErrorResponse::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    debug!(
        stream = %query.primary.stream,
        elements = query.dataset.len(),
        "Executing dataset query"
    );

    let task_state = Arc::clone(&state);
    match tokio::task::spawn_blocking(move || task_state.execute(&query)).await {
        Ok(Ok(rows)) => (StatusCode::OK, Json(rows)).into_response(),
        Ok(Err(e)) => {
            if e.is_validation() {
                debug!(kind = %e.kind, error = %e.message, "Dataset query rejected");
            } else {
                warn!(kind = %e.kind, error = %e.message, "Dataset query failed");
            }
            query_error_response(&e).into_response()
        }
        Err(e) => {
            error!(error = %e, "Dataset query task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("query task failed")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tsdataset::query::{DatasetQueryElement, StreamQuery};

    fn state() -> AppState {
        let store = InMemoryStreamAccessor::new();
        store
            .insert("a/b/c", vec![Datapoint::new(1.0, json!(1))])
            .unwrap();
        AppState::new(ApplicationConfig::default(), Arc::new(store))
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(QueryErrorKind::StreamNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(QueryErrorKind::EmptyDataset), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(QueryErrorKind::EvaluationError), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(QueryErrorKind::ResourceLimit), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_for(QueryErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_execute_and_error_mapping() {
        let state = state();
        let ok = DatasetQuery::event(StreamQuery::new("a/b/c"))
            .with_element("y", DatasetQueryElement::single(StreamQuery::new("a/b/c"), "closest"));
        let rows = state.execute(&ok).unwrap();
        assert_eq!(rows, vec![Datapoint::new(1.0, json!({"x": 1, "y": 1}))]);

        let missing = DatasetQuery::event(StreamQuery::new("nope"))
            .with_element("y", DatasetQueryElement::single(StreamQuery::new("a/b/c"), "closest"));
        let err = state.execute(&missing).unwrap_err();
        let (status, body) = query_error_response(&err);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.0.kind, Some("StreamNotFound"));
    }
}
