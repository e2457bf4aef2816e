use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use std::sync::Arc;
use std::time::Instant;

use crate::decision::Prediction;
use crate::error::ApiError;
use crate::preprocessing::image::decode;
use crate::server::types::{AppState, UPLOAD_FIELD};

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `POST /predict`: one image in the `file` multipart field, answered with
/// `{"prediction": "Tumor"|"Normal", "probability": <float>}`.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let start = Instant::now();
    let result = run_prediction(&state, multipart).await;

    match &result {
        Ok(prediction) => {
            counter!("predictions_total", "label" => prediction.label.as_str()).increment(1);
            tracing::info!(
                label = %prediction.label,
                probability = prediction.probability,
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "prediction served"
            );
        }
        Err(e) => {
            counter!("prediction_errors_total", "kind" => e.kind()).increment(1);
            if e.status().is_server_error() {
                tracing::error!(error = %e, "prediction failed");
            } else {
                tracing::warn!(error = %e, "prediction rejected");
            }
        }
    }

    result.map(Json)
}

async fn run_prediction(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Prediction, ApiError> {
    // Checked before the body is touched so an unloaded model never decodes.
    let pool = state.predictor.as_ref().ok_or(ApiError::ModelUnavailable)?;

    let contents = read_upload(multipart?).await?;
    // Decompression can be far larger than the upload; keep it off the runtime thread.
    let image = tokio::task::spawn_blocking(move || decode(&contents)).await??;

    Ok(pool.predict(image).await?)
}

/// Returns the bytes of the first `file` field; other fields are skipped.
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(ApiError::MissingFile)
}
