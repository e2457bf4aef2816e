use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ndarray::ShapeError;
use serde_json::json;
use thiserror::Error;

/// Failure to turn uploaded bytes into pixels.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Empty upload")]
    Empty,

    #[error("Invalid image upload: {0}")]
    Format(#[from] image::ImageError),

    #[error("Invalid image upload: image has no pixels ({width}x{height})")]
    NoPixels { width: u32, height: u32 },
}

/// Anything that goes wrong between a decoded image and a probability.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model not found at path: {0}")]
    ModelNotFound(String),

    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Input must be 4D (batch,H,W,C); got shape {0:?}")]
    InputRank(Vec<usize>),

    #[error("Unexpected output shape {got:?} for {layout} layout")]
    OutputShape { layout: &'static str, got: Vec<usize> },

    #[error("Model declares unsupported output width {0}")]
    UnsupportedOutputWidth(i64),

    #[error("Probability out of range: {0}")]
    ProbabilityRange(f32),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Shape error: {0}")]
    ShapeError(#[from] ShapeError),

    #[error("Inference session lock poisoned")]
    SessionPoisoned,

    #[error("Inference worker unavailable")]
    WorkerGone,

    #[error("Inference worker panicked: {0}")]
    WorkerPanicked(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("PRED_THRESHOLD must be a number, got {0:?}")]
    ThresholdSyntax(String),

    #[error("Threshold must be within [0, 1], got {0}")]
    ThresholdRange(f64),

    #[error("Worker pool size must be at least 1")]
    EmptyPool,
}

/// Errors surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model not loaded")]
    ModelUnavailable,

    #[error("No file uploaded")]
    MissingFile,

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Invalid multipart request: {0}")]
    MultipartRejected(#[from] axum::extract::multipart::MultipartRejection),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Decode task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),

    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::MissingFile
            | ApiError::Multipart(_)
            | ApiError::MultipartRejected(_)
            | ApiError::Decode(_) => StatusCode::BAD_REQUEST,
            ApiError::Blocking(_) | ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::ModelUnavailable => "model_unavailable",
            ApiError::MissingFile
            | ApiError::Multipart(_)
            | ApiError::MultipartRejected(_)
            | ApiError::Decode(_) => "upload",
            ApiError::Blocking(_) => "internal",
            ApiError::Inference(_) => "inference",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "detail": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_error() {
        let error = InferenceError::ModelNotFound("test_path".to_string());
        assert_eq!(error.to_string(), "Model not found at path: test_path");
    }

    #[test]
    fn test_output_shape_error() {
        let error = InferenceError::OutputShape {
            layout: "softmax2",
            got: vec![1, 3],
        };
        assert_eq!(
            error.to_string(),
            "Unexpected output shape [1, 3] for softmax2 layout"
        );
    }

    #[test]
    fn test_shape_error_conversion() {
        let shape_error = ShapeError::from_kind(ndarray::ErrorKind::OutOfBounds);
        match InferenceError::from(shape_error) {
            InferenceError::ShapeError(_) => {}
            other => panic!("Expected ShapeError, got {other:?}"),
        }
    }

    #[test]
    fn test_ort_error_conversion() {
        let ort_error = ort::Error::new("test error");
        match InferenceError::from(ort_error) {
            InferenceError::OrtError(_) => {}
            other => panic!("Expected OrtError, got {other:?}"),
        }
    }

    #[test]
    fn test_image_error_conversion() {
        let image_error =
            image::ImageError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        let api_error = ApiError::from(DecodeError::from(image_error));
        assert_eq!(api_error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::ModelUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(DecodeError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(InferenceError::WorkerGone).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_empty_image_is_a_bad_request() {
        let error = ApiError::from(DecodeError::NoPixels {
            width: 0,
            height: 5,
        });
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.to_string(),
            "Invalid image upload: image has no pixels (0x5)"
        );
    }

    #[test]
    fn test_decode_message_is_passed_through() {
        assert_eq!(ApiError::from(DecodeError::Empty).to_string(), "Empty upload");
    }

    #[test]
    fn test_into_response_model_unavailable() {
        let response = ApiError::ModelUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_into_response_inference_failure() {
        let error = ApiError::from(InferenceError::InputRank(vec![224, 224]));
        let response = error.into_response();
        assert!(response.status().is_server_error());
    }
}
