use mri_classifier::{app, config::AppConfig, telemetry};

// A single-threaded runtime accepts requests; inference runs on the worker pool.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    telemetry::init_tracing(&config.logging);

    app::start_app(config).await
}
