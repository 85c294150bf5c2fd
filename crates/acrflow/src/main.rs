mod commands;
mod progress;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "acrflow")]
#[command(about = "Build container images on a cloud registry and stream the build log", long_about = None)]
struct Cli {
    /// Registry name
    #[arg(long, global = true, env = "ACRFLOW_REGISTRY")]
    registry: Option<String>,
    /// Resource group of the registry
    #[arg(long, global = true, env = "ACRFLOW_RESOURCE_GROUP")]
    resource_group: Option<String>,
    /// Subscription id
    #[arg(long, global = true, env = "ACRFLOW_SUBSCRIPTION_ID")]
    subscription: Option<String>,
    /// Bearer token for the management API
    #[arg(long, global = true, env = "ACRFLOW_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a build context into a tar.gz archive
    Pack {
        /// Context directory
        #[arg(default_value = ".")]
        context: PathBuf,
        /// Output archive
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        ignore: commands::IgnoreArgs,
    },
    /// Upload the context, start a build and stream its log
    Build {
        /// Context directory
        #[arg(default_value = ".")]
        context: PathBuf,
        /// Image name (repeatable)
        #[arg(short = 't', long = "image")]
        images: Vec<String>,
        /// Dockerfile path relative to the context
        #[arg(short = 'f', long)]
        file: Option<String>,
        /// Target platform, os/arch[/variant]
        #[arg(long)]
        platform: Option<String>,
        /// Build argument KEY=VALUE (repeatable)
        #[arg(long = "build-arg", value_parser = commands::parse_key_val)]
        build_args: Vec<(String, String)>,
        /// Do not push the built images
        #[arg(long)]
        no_push: bool,
        /// Build without layer cache
        #[arg(long)]
        no_cache: bool,
        /// Return after queueing without streaming the log
        #[arg(long)]
        no_logs: bool,
        #[command(flatten)]
        ignore: commands::IgnoreArgs,
    },
    /// Stream the log of a build
    Logs {
        /// Build id
        build_id: String,
    },
    /// Show the status of a build
    Status {
        /// Build id
        build_id: String,
    },
    /// Cancel a running build
    Cancel {
        /// Build id
        build_id: String,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout はビルドログ専用、診断ログは stderr へ
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = acrflow_config::Settings::load()?;
    let connect = |settings| {
        commands::App::new(
            settings,
            cli.registry.clone(),
            cli.resource_group.clone(),
            cli.subscription.clone(),
            cli.token.clone(),
        )
    };

    match cli.command {
        Commands::Pack {
            context,
            output,
            ignore,
        } => {
            commands::pack::handle(&settings, &context, &output, &ignore)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Build {
            context,
            images,
            file,
            platform,
            build_args,
            no_push,
            no_cache,
            no_logs,
            ignore,
        } => {
            let app = connect(settings)?;
            let options = commands::build::BuildOptions {
                context,
                images,
                dockerfile: file,
                platform,
                build_args,
                push: !no_push,
                no_cache,
                stream_logs: !no_logs,
                ignore,
            };
            commands::build::handle(&app, options).await
        }
        Commands::Logs { build_id } => commands::logs::handle(&connect(settings)?, &build_id).await,
        Commands::Status { build_id } => {
            commands::status::handle(&connect(settings)?, &build_id).await
        }
        Commands::Cancel { build_id } => {
            commands::cancel::handle(&connect(settings)?, &build_id).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            println!("acrflow {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}
