use crate::worker::InferencePool;
use metrics_exporter_prometheus::PrometheusHandle;

/// Shared Application State
///
/// `predictor` is `None` when the model failed to load at startup; every
/// prediction request is then answered with 503.
pub struct AppState {
    pub predictor: Option<InferencePool>,
    pub metrics: Option<PrometheusHandle>,
}

/// Name of the multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";
