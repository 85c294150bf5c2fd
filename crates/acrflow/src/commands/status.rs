use super::App;
use acrflow_registry::{BuildStatus, RegistryClient};
use colored::Colorize;
use std::process::ExitCode;

pub async fn handle(app: &App, build_id: &str) -> anyhow::Result<ExitCode> {
    let status = app
        .client
        .build_status(&app.registry, build_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let label = match &status {
        BuildStatus::Succeeded => status.to_string().green(),
        BuildStatus::Failed | BuildStatus::Error | BuildStatus::Timeout => status.to_string().red(),
        BuildStatus::Canceled => status.to_string().yellow(),
        _ => status.to_string().blue(),
    };
    println!("{} {}", build_id.cyan(), label);

    // 失敗で終わったビルドは非ゼロで返す
    if status.is_terminal() && !status.is_success() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
