//! Build request and status types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a registry inside a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    pub resource_group: String,
    pub registry_name: String,
}

impl RegistryRef {
    pub fn new(resource_group: impl Into<String>, registry_name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            registry_name: registry_name.into(),
        }
    }
}

impl fmt::Display for RegistryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.registry_name)
    }
}

/// Target platform of a remote build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            os: "Linux".to_string(),
            architecture: "amd64".to_string(),
            variant: None,
        }
    }
}

impl Platform {
    /// Parse `os/arch[/variant]`, e.g. `linux/arm64/v8`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split('/');
        let os = parts.next().filter(|s| !s.is_empty())?;
        let architecture = parts.next().filter(|s| !s.is_empty())?;
        let variant = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return None;
        }

        let os = match os.to_ascii_lowercase().as_str() {
            "linux" => "Linux".to_string(),
            "windows" => "Windows".to_string(),
            other => other.to_string(),
        };
        Some(Self {
            os,
            architecture: architecture.to_string(),
            variant,
        })
    }
}

/// A docker build to be queued on the registry.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub image_names: Vec<String>,
    /// Source location returned by the context upload.
    pub source_location: String,
    pub dockerfile: String,
    pub platform: Platform,
    pub push: bool,
    pub no_cache: bool,
    pub build_args: Vec<(String, String)>,
    pub timeout_secs: u32,
}

impl BuildRequest {
    pub fn new(source_location: impl Into<String>) -> Self {
        Self {
            image_names: Vec::new(),
            source_location: source_location.into(),
            dockerfile: "Dockerfile".to_string(),
            platform: Platform::default(),
            push: true,
            no_cache: false,
            build_args: Vec::new(),
            timeout_secs: 3600,
        }
    }

    pub fn image(mut self, name: impl Into<String>) -> Self {
        self.image_names.push(name.into());
        self
    }

    pub fn dockerfile(mut self, path: impl Into<String>) -> Self {
        self.dockerfile = path.into();
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn build_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.push((name.into(), value.into()));
        self
    }

    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }
}

/// Remote run status as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Queued,
    Started,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Error,
    Timeout,
    Unknown(String),
}

impl BuildStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "Queued" => Self::Queued,
            "Started" => Self::Started,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Canceled" => Self::Canceled,
            "Error" => Self::Error,
            "Timeout" => Self::Timeout,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether the run will not change state anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::Error | Self::Timeout
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "Queued",
            Self::Started => "Started",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
            Self::Error => "Error",
            Self::Timeout => "Timeout",
            Self::Unknown(s) => s,
        };
        f.write_str(s)
    }
}
