use super::{App, Interrupt};
use acrflow_log::{
    BlobLogSource, BuildLogOrchestrator, BuildSession, ConsoleSink, LogSource, TerminalState,
};
use acrflow_registry::{RegistryClient, RegistryRef};
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 終了時にキャンセル要求の送信を待つ最大時間
const CANCEL_GRACE: Duration = Duration::from_secs(5);

pub async fn handle(app: &App, build_id: &str) -> anyhow::Result<ExitCode> {
    let interrupt = Interrupt::install();
    let state = stream_logs(app, build_id, interrupt.token().clone()).await;
    Ok(exit_code(state))
}

/// Stream a build's log to stdout until it ends or `abort` fires.
pub async fn stream_logs(app: &App, build_id: &str, abort: CancellationToken) -> TerminalState {
    let registry: Arc<dyn RegistryClient> = app.client.clone();
    let state = follow(
        registry,
        Arc::new(BlobLogSource::new()),
        app.registry.clone(),
        build_id,
        abort,
        app.settings.poll_interval(),
    )
    .await;
    report(build_id, state);
    state
}

/// Mirror the log, then give a pending cancel request time to leave.
pub async fn follow(
    registry: Arc<dyn RegistryClient>,
    source: Arc<dyn LogSource>,
    target: RegistryRef,
    build_id: &str,
    abort: CancellationToken,
    poll_interval: Duration,
) -> TerminalState {
    let session = BuildSession::with_token(target, build_id, abort);
    let orchestrator =
        BuildLogOrchestrator::new(registry, source).with_poll_interval(poll_interval);

    let state = orchestrator.run(&session, &mut ConsoleSink).await;
    orchestrator.drain(CANCEL_GRACE).await;
    state
}

/// 結果表示は stderr へ。stdout はビルドログだけを運ぶ
pub fn report(build_id: &str, state: TerminalState) {
    eprintln!();
    match state {
        TerminalState::Succeeded => eprintln!("{} Build {} succeeded", "✓".green(), build_id.cyan()),
        TerminalState::Failed => eprintln!("{} Build {} failed", "✗".red(), build_id.cyan()),
        TerminalState::Cancelled => {
            eprintln!("{} Build {} cancelled", "⚠".yellow(), build_id.cyan())
        }
    }
}

pub fn exit_code(state: TerminalState) -> ExitCode {
    match state {
        TerminalState::Succeeded => ExitCode::SUCCESS,
        TerminalState::Failed => ExitCode::FAILURE,
        TerminalState::Cancelled => ExitCode::from(130),
    }
}
