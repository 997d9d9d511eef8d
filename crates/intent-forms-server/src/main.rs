mod routes;

use anyhow::{Context, Result};
use intent_forms::FormsConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("FORMS_CONFIG").unwrap_or_else(|_| "forms.toml".to_string());
    let config = FormsConfig::load(&config_path)?;

    info!(
        config = %config_path,
        max_file_size = config.limits.max_file_size,
        max_body_size = config.limits.max_body_size,
        max_files = ?config.limits.max_files,
        "loaded form configuration"
    );

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let app = routes::app(config);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
