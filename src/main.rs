// Main entry point - Wires configuration, the API adapter and one convergence pass
mod application;
mod domain;
mod error;
mod infrastructure;

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::application::converge_service::ConvergeService;
use crate::infrastructure::circonus_api::CirconusApi;
use crate::infrastructure::config::{load_circonus_config, load_resources_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let circonus_config = load_circonus_config().context("Failed to load API settings")?;
    let plan = load_resources_config()
        .context("Failed to load worksheet declarations")?
        .into_plan()?;
    tracing::info!(
        worksheets = plan.worksheets().len(),
        graphs = plan.graphs().len(),
        enabled = circonus_config.enabled,
        "Loaded declarations"
    );

    // Create the API adapter (infrastructure layer)
    let api = Arc::new(CirconusApi::new(
        circonus_config.api.base_url.clone(),
        circonus_config.api.token.clone(),
        circonus_config.api.app_name.clone(),
        circonus_config.api.timeout(),
    )?);

    // Run one pass (application layer)
    let service = ConvergeService::new(api, circonus_config.enabled);
    let report = service.converge(&plan).await?;

    if report.is_converged() {
        tracing::info!("Worksheets already converged");
    }
    for upload in &report.uploads {
        tracing::info!(
            worksheet = %upload.worksheet,
            id = %upload.id,
            mode = ?upload.mode,
            "Uploaded worksheet"
        );
    }

    Ok(())
}
