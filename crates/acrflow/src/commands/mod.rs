pub mod build;
pub mod cancel;
pub mod logs;
pub mod pack;
pub mod status;

use acrflow_config::Settings;
use acrflow_context::{IgnoreRules, read_patterns};
use acrflow_registry::{ArmRegistryClient, RegistryRef};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ignore options shared by `pack` and `build`
#[derive(Args, Debug, Clone, Default)]
pub struct IgnoreArgs {
    /// Ignore file, defaults to <context>/.dockerignore when present
    #[arg(long = "ignore-file")]
    pub ignore_file: Option<PathBuf>,
    /// Extra ignore pattern (repeatable, evaluated last)
    #[arg(long = "ignore")]
    pub patterns: Vec<String>,
}

/// Registry-facing state resolved from settings and global flags.
pub struct App {
    pub settings: Settings,
    pub registry: RegistryRef,
    pub client: Arc<ArmRegistryClient>,
}

impl App {
    pub fn new(
        mut settings: Settings,
        registry: Option<String>,
        resource_group: Option<String>,
        subscription: Option<String>,
        token: Option<String>,
    ) -> anyhow::Result<Self> {
        // フラグは設定ファイルより優先
        if registry.is_some() {
            settings.registry = registry;
        }
        if resource_group.is_some() {
            settings.resource_group = resource_group;
        }
        if subscription.is_some() {
            settings.subscription_id = subscription;
        }

        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("Missing access token. Pass --token or set ACRFLOW_ACCESS_TOKEN")
            })?;

        let registry = RegistryRef::new(
            settings.require_resource_group()?,
            settings.require_registry()?,
        );
        let mut client = ArmRegistryClient::new(settings.require_subscription()?, token);
        if let Some(url) = &settings.management_url {
            client = client.with_base_url(url.as_str());
        }

        tracing::debug!("Using registry {}", registry);
        Ok(Self {
            settings,
            registry,
            client: Arc::new(client),
        })
    }
}

/// Ctrl-C listener that flips a cancellation token instead of killing the process.
///
/// The listener stops when the guard is dropped.
pub struct Interrupt {
    token: CancellationToken,
    listener: JoinHandle<()>,
}

impl Interrupt {
    pub fn install() -> Self {
        let token = CancellationToken::new();
        let listener = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::debug!("Interrupt received");
                    token.cancel();
                }
            })
        };
        Self { token, listener }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Build the ignore rule list for a context directory.
///
/// Order: ignore file, then `ignore` from settings, then `--ignore` flags.
pub fn load_ignore_rules(
    settings: &Settings,
    context: &Path,
    args: &IgnoreArgs,
) -> acrflow_context::Result<IgnoreRules> {
    let ignore_file = args
        .ignore_file
        .clone()
        .or_else(|| settings.ignore_file.as_ref().map(|p| context.join(p)))
        .or_else(|| {
            let default = context.join(".dockerignore");
            default.is_file().then_some(default)
        });

    let mut patterns = match &ignore_file {
        Some(path) => {
            tracing::debug!("Reading ignore file {}", path.display());
            read_patterns(path)?
        }
        None => Vec::new(),
    };
    patterns.extend(settings.ignore.iter().cloned());
    patterns.extend(args.patterns.iter().cloned());

    IgnoreRules::parse(patterns)
}

/// `KEY=VALUE` parser for `--build-arg`
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
