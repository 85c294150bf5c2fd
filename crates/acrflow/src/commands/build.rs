use super::{App, IgnoreArgs, Interrupt, logs, pack};
use crate::progress::Spinner;
use acrflow_config::ConfigError;
use acrflow_log::TerminalState;
use acrflow_registry::{BuildRequest, Platform, RegistryClient, RegistryRef};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct BuildOptions {
    pub context: PathBuf,
    pub images: Vec<String>,
    pub dockerfile: Option<String>,
    pub platform: Option<String>,
    pub build_args: Vec<(String, String)>,
    pub push: bool,
    pub no_cache: bool,
    pub stream_logs: bool,
    pub ignore: IgnoreArgs,
}

pub async fn handle(app: &App, options: BuildOptions) -> anyhow::Result<ExitCode> {
    // ビルド投入前から Ctrl-C を捕まえる。投入後の割り込みでもキャンセルを送れるように
    let interrupt = Interrupt::install();
    let abort = interrupt.token().clone();

    eprintln!(
        "{} {}",
        "🔨 Building on".blue(),
        app.registry.to_string().cyan()
    );
    eprintln!("  → Context: {}", options.context.display().to_string().cyan());

    // 一時ファイルはアップロード後に自動削除される
    let staging = tempfile::Builder::new()
        .prefix("acrflow-context-")
        .suffix(".tar.gz")
        .tempfile()?;
    let sealed = pack::pack_context(&app.settings, &options.context, staging.path(), &options.ignore)?;
    eprintln!("  → Packed {} files", sealed.files().len());
    if abort.is_cancelled() {
        return Ok(interrupted_before_queue());
    }

    let spinner = Spinner::new("Uploading build context...");
    let uploaded = tokio::select! {
        biased;
        _ = abort.cancelled() => None,
        result = app.client.upload_source(&app.registry, sealed.path()) => Some(result),
    };
    let source_location = match uploaded {
        None => {
            spinner.finish_and_clear();
            return Ok(interrupted_before_queue());
        }
        Some(Ok(location)) => {
            spinner.finish_and_clear();
            location
        }
        Some(Err(e)) => {
            spinner.finish_error(&e.to_string());
            return Err(anyhow::anyhow!(e.user_message()));
        }
    };
    drop(staging);

    let request = build_request(app, &options, source_location)?;
    // 投入中の割り込みでは待つ。ビルド id が無いとキャンセルできない
    let spinner = Spinner::new("Queueing build...");
    let build_id = match app.client.start_build(&app.registry, &request).await {
        Ok(id) => {
            spinner.finish(&format!("Build {} queued", id));
            id
        }
        Err(e) => {
            spinner.finish_error(&e.to_string());
            return Err(anyhow::anyhow!(e.user_message()));
        }
    };

    if options.stream_logs {
        let state = logs::stream_logs(app, &build_id, abort).await;
        return Ok(logs::exit_code(state));
    }

    if cancel_if_interrupted(app.client.as_ref(), &app.registry, &build_id, &abort).await {
        logs::report(&build_id, TerminalState::Cancelled);
        return Ok(logs::exit_code(TerminalState::Cancelled));
    }
    // --no-logs では build id だけを stdout に出す
    println!("{}", build_id);
    Ok(ExitCode::SUCCESS)
}

fn interrupted_before_queue() -> ExitCode {
    eprintln!("{} Interrupted before the build was queued", "⚠".yellow());
    logs::exit_code(TerminalState::Cancelled)
}

/// Cancel a queued build when an interrupt has already arrived.
///
/// Waits for the request, since the process is about to exit.
async fn cancel_if_interrupted(
    registry: &dyn RegistryClient,
    target: &RegistryRef,
    build_id: &str,
    abort: &CancellationToken,
) -> bool {
    if !abort.is_cancelled() {
        return false;
    }
    eprintln!("Cancelling build {}", build_id);
    if let Err(e) = registry.cancel_build(target, build_id).await {
        tracing::warn!("Failed to cancel build {}: {}", build_id, e);
    }
    true
}

/// Merge flags over settings into the request sent to the registry.
fn build_request(
    app: &App,
    options: &BuildOptions,
    source_location: String,
) -> anyhow::Result<BuildRequest> {
    let images = if options.images.is_empty() {
        app.settings.images.clone()
    } else {
        options.images.clone()
    };

    let mut request = BuildRequest::new(source_location)
        .push(options.push && !images.is_empty())
        .no_cache(options.no_cache);

    for image in images {
        request = request.image(image);
    }
    if let Some(dockerfile) = options.dockerfile.as_ref().or(app.settings.dockerfile.as_ref()) {
        request = request.dockerfile(dockerfile.as_str());
    }
    if let Some(platform) = options.platform.as_ref().or(app.settings.platform.as_ref()) {
        let parsed = Platform::parse(platform).ok_or_else(|| ConfigError::Invalid {
            name: "platform",
            reason: format!("expected os/arch[/variant], got '{}'", platform),
        })?;
        request = request.platform(parsed);
    }
    for (name, value) in &options.build_args {
        request = request.build_arg(name.as_str(), value.as_str());
    }
    Ok(request)
}
