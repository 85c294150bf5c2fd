use super::App;
use acrflow_registry::RegistryClient;
use colored::Colorize;

pub async fn handle(app: &App, build_id: &str) -> anyhow::Result<()> {
    tracing::info!("Cancelling build {} on {}", build_id, app.registry);
    app.client
        .cancel_build(&app.registry, build_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("{} Cancel requested for build {}", "✓".green(), build_id.cyan());
    Ok(())
}
