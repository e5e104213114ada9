//! Configuration for the coordinator.
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files containing API keys
//! - Warns about API keys stored in config files

use nimbus_alerts::AlertsConfig;
use nimbus_fusion::FusionConfig;
use nimbus_llm::LlmConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Main coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub router: RouterConfig,

    /// Confidence constants and source reliability weights
    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    /// Language model; absent means keyword routing and template narratives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
}

/// Which classifier the hub uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterKind {
    #[default]
    Keyword,
    /// Model-backed, falling back to keywords on any failure
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub kind: RouterKind,

    /// Extra place names added to the built-in gazetteer
    pub known_locations: Vec<String>,

    /// Budget for one model classification call
    pub model_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            kind: RouterKind::Keyword,
            known_locations: Vec::new(),
            model_timeout_ms: 5000,
        }
    }
}

impl RouterConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Budget for all agents on one request
    pub request_timeout_ms: u64,

    /// Whether the travel planner is provisioned
    pub travel_enabled: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            travel_enabled: true,
        }
    }
}

impl HubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Per-source fetch budget
    pub fetch_timeout_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5000,
        }
    }
}

impl SourcesConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl CoordinatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix systems, this validates that:
    /// - The file is a regular file (not a symlink)
    /// - The file is not world-writable
    /// - The file is not world-readable if it contains an API key
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;

        if config.llm.as_ref().is_some_and(|l| l.api_key.is_some()) {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use the OPENAI_API_KEY environment variable instead.",
                path.display()
            );
        }

        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.fusion.validate()?;
        if self.hub.request_timeout_ms == 0 {
            anyhow::bail!("hub.request_timeout_ms must be positive");
        }
        if self.sources.fetch_timeout_ms == 0 {
            anyhow::bail!("sources.fetch_timeout_ms must be positive");
        }
        if self.router.kind == RouterKind::Model && self.llm.is_none() {
            warn!("router.kind = \"model\" without an [llm] section; keyword routing will be used");
        }
        Ok(())
    }
}

/// Validate config file permissions on Unix systems.
///
/// Requirements:
/// - File must be a regular file (not symlink, directory, etc.)
/// - File must not be world-writable (mode & 0o002 == 0)
/// - If file contains API key patterns, must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path).unwrap_or_default();
    let has_api_key = content.contains("api_key")
        && (content.contains("sk-") || content.contains("key ="));

    if has_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = CoordinatorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.router.kind, RouterKind::Keyword);
        assert_eq!(config.alerts.default_temperature_high, 85.0);
        assert!(config.hub.travel_enabled);
        assert!(config.llm.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config = CoordinatorConfig::from_toml(
            r#"
[router]
kind = "model"
known_locations = ["Reykjavik"]

[fusion]
max_reasonable_spread = 12.0

[fusion.source_reliability]
nws = 0.95

[hub]
travel_enabled = false

[llm]
provider = "ollama"
model = "llama3.2"
"#,
        )
        .unwrap();

        assert_eq!(config.router.kind, RouterKind::Model);
        assert_eq!(config.router.known_locations, vec!["Reykjavik".to_string()]);
        assert_eq!(config.fusion.max_reasonable_spread, 12.0);
        assert!(!config.hub.travel_enabled);
        assert_eq!(config.hub.request_timeout_ms, 15_000);
        assert_eq!(config.llm.unwrap().model, "llama3.2");
    }

    #[test]
    fn test_invalid_fusion_constants_rejected() {
        let err = CoordinatorConfig::from_toml("[fusion]\nmin_confidence = 0.0\n");
        assert!(err.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_world_readable_key_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"\napi_key = \"sk-test\"").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(CoordinatorConfig::from_file(file.path()).is_err());

        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        let config = CoordinatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.llm.unwrap().provider, "openai");
    }
}
