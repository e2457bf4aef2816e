use crate::config::AppConfig;
use crate::error::InferenceError;
use crate::model::load_model;
use crate::pipeline::Classifier;
use crate::server::{create_router, AppState};
use crate::telemetry;
use crate::worker::InferencePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

/// Loads the model once and resolves everything the pipeline needs from its
/// declared metadata.
pub fn load_classifier(config: &AppConfig) -> anyhow::Result<Classifier> {
    let threshold = config.threshold()?;
    let model = load_model(
        &config.model.path,
        config.workers.size,
        config.model.intra_threads,
    )?;
    let classifier = Classifier::from_model(Arc::new(model), config.model.output_layout, threshold)?;
    Ok(classifier)
}

/// Builds the inference pool, or `None` when the model cannot be loaded.
/// The service keeps running in that case and answers predictions with 503.
pub fn build_predictor(config: &AppConfig) -> Option<InferencePool> {
    tracing::info!("Loading model from {}", config.model.path.display());
    match load_classifier(config) {
        Ok(classifier) => {
            let (input_size, layout) = (classifier.input_size(), classifier.layout());
            let threshold = classifier.threshold().value();
            let pool = InferencePool::new(classifier, config.workers.size);
            tracing::info!(
                input_size = %input_size,
                layout = %layout,
                threshold,
                workers = pool.size(),
                "Model ready"
            );
            Some(pool)
        }
        Err(e) => {
            match e.downcast_ref::<InferenceError>() {
                Some(InferenceError::ModelNotFound(path)) => {
                    tracing::error!("Model file not found: {}", path)
                }
                _ => tracing::error!("Error loading model at startup: {:#}", e),
            }
            None
        }
    }
}

pub async fn start_app(config: AppConfig) -> anyhow::Result<()> {
    let metrics = match telemetry::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Metrics recorder not installed: {}", e);
            None
        }
    };

    let state = AppState {
        predictor: build_predictor(&config),
        metrics,
    };
    let app = create_router(state, config.server.max_upload_bytes);

    let addr = config.server.address();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_leaves_service_unavailable() {
        let mut config = AppConfig::default();
        config.model.path = "definitely/missing/model.onnx".into();
        assert!(build_predictor(&config).is_none());
    }

    #[test]
    fn test_load_classifier_reports_missing_file() {
        let mut config = AppConfig::default();
        config.model.path = "definitely/missing/model.onnx".into();
        let err = load_classifier(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<InferenceError>(),
            Some(InferenceError::ModelNotFound(_))
        ));
    }
}
