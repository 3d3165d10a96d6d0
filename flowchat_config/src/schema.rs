use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flowchat_conversation::{NoiseRules, NoiseTable, SessionOptions};
use flowchat_core::FlowError;
use tracing::debug;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "FLOWCHAT_CONFIG";

const CONFIG_HINT: &str = "Edit the config file (run `flowchat init` to create one).";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub stream: NoiseRules,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "WorkflowConfig::default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Seconds without a chunk before a turn fails; `0` or `null` disables.
    #[serde(default = "WorkflowConfig::default_idle_timeout")]
    pub stream_idle_timeout_secs: Option<u64>,
    #[serde(default = "WorkflowConfig::default_connect_retries")]
    pub connect_retries: usize,
}

impl WorkflowConfig {
    fn default_base_url() -> String {
        "https://api.dify.ai/v1".to_string()
    }

    #[allow(clippy::unnecessary_wraps)]
    const fn default_idle_timeout() -> Option<u64> {
        Some(120)
    }

    const fn default_connect_retries() -> usize {
        2
    }

    /// Idle window between chunks, if enabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.stream_idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Folder that receives uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub make_public: bool,
    #[serde(default = "StorageConfig::default_upload_url")]
    pub upload_url: String,
    #[serde(default = "StorageConfig::default_api_url")]
    pub api_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            folder_id: None,
            make_public: false,
            upload_url: Self::default_upload_url(),
            api_url: Self::default_api_url(),
        }
    }
}

impl StorageConfig {
    fn default_upload_url() -> String {
        "https://www.googleapis.com/upload/drive/v3".to_string()
    }

    fn default_api_url() -> String {
        "https://www.googleapis.com/drive/v3".to_string()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_is_rag")]
    pub is_rag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Assistant message shown when a chat starts.
    #[serde(default = "SessionConfig::default_greeting")]
    pub greeting: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            is_rag: Self::default_is_rag(),
            system_prompt: None,
            greeting: Self::default_greeting(),
        }
    }
}

impl SessionConfig {
    const fn default_is_rag() -> bool {
        true
    }

    #[allow(clippy::unnecessary_wraps)]
    fn default_greeting() -> Option<String> {
        Some("こんにちは！ご質問はありますか？".to_string())
    }
}

/// `~/flowchat/config.json`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
        .join("flowchat")
        .join("config.json"))
}

/// Empty values and the template's `your-...` placeholders count as unset.
fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with("your-")
}

impl Config {
    /// Locate the config file: explicit path, then `FLOWCHAT_CONFIG`, then
    /// the default location.
    pub fn resolve_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
        Self::resolve_path_with(explicit, std::env::var(CONFIG_ENV).ok())
    }

    fn resolve_path_with(explicit: Option<&Path>, env: Option<String>) -> anyhow::Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        match env.filter(|v| !v.trim().is_empty()) {
            Some(path) => Ok(PathBuf::from(path)),
            None => default_config_path(),
        }
    }

    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = Self::resolve_path(explicit)?;

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'flowchat init' to create config.",
                config_path.display()
            );
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config = Self::from_json(&content).map_err(|e| {
            anyhow::anyhow!("Invalid config file {}: {e}", config_path.display())
        })?;
        debug!("Loaded config from {}", config_path.display());

        Ok(config)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Base URL and API key of the workflow backend.
    pub fn workflow_credentials(&self) -> Result<(&str, &str), FlowError> {
        let workflow = &self.workflow;
        if workflow.base_url.trim().is_empty() {
            return Err(FlowError::configuration_missing("workflow.base_url", CONFIG_HINT));
        }
        if is_unset(&workflow.api_key) {
            return Err(FlowError::configuration_missing("workflow.api_key", CONFIG_HINT));
        }
        Ok((workflow.base_url.trim(), workflow.api_key.trim()))
    }

    /// Access token of the blob store. Only needed for uploads.
    pub fn storage_token(&self) -> Result<&str, FlowError> {
        match self.storage.access_token.as_deref() {
            Some(token) if !is_unset(token) => Ok(token.trim()),
            _ => Err(FlowError::configuration_missing(
                "storage.access_token",
                "Uploads need an OAuth access token with the drive.file scope. Add it to the config file.",
            )),
        }
    }

    /// Upload folder, with empty values treated as absent.
    #[must_use]
    pub fn folder_id(&self) -> Option<String> {
        self.storage
            .folder_id
            .as_deref()
            .filter(|id| !is_unset(id))
            .map(str::to_string)
    }

    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            is_rag: self.session.is_rag,
            system_prompt: self
                .session
                .system_prompt
                .clone()
                .filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn noise_table(&self) -> anyhow::Result<NoiseTable> {
        NoiseTable::from_rules(&self.stream)
            .map_err(|e| anyhow::anyhow!("Invalid pattern in the `stream` config section: {e}"))
    }

    pub fn ensure_config_dir(config_path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Write the template config file. Returns where it was written.
    pub fn create_config(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
        let config_path = Self::resolve_path(explicit)?;

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        Self::ensure_config_dir(&config_path)?;
        std::fs::write(&config_path, Self::template()?)?;
        Ok(config_path)
    }

    /// Template with placeholders for every credential and the default
    /// stream rules spelled out.
    pub fn template() -> anyhow::Result<String> {
        let template = Self {
            workflow: WorkflowConfig {
                base_url: WorkflowConfig::default_base_url(),
                api_key: "your-workflow-api-key-here".to_string(),
                user_id: None,
                stream_idle_timeout_secs: WorkflowConfig::default_idle_timeout(),
                connect_retries: WorkflowConfig::default_connect_retries(),
            },
            storage: StorageConfig {
                access_token: Some("your-drive-access-token-here".to_string()),
                folder_id: Some("your-drive-folder-id-here".to_string()),
                ..StorageConfig::default()
            },
            session: SessionConfig::default(),
            stream: NoiseRules::default(),
        };
        Ok(serde_json::to_string_pretty(&template)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowchat_core::ErrorKind;

    const MINIMAL: &str = r#"{"workflow": {"api_key": "app-123"}}"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_json(MINIMAL).unwrap();

        assert_eq!(
            config.workflow_credentials().unwrap(),
            ("https://api.dify.ai/v1", "app-123")
        );
        assert_eq!(config.workflow.idle_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.workflow.connect_retries, 2);
        assert!(config.session.is_rag);
        assert!(config.session.greeting.is_some());
        assert!(!config.storage.make_public);
        assert_eq!(config.stream, NoiseRules::default());
        assert_eq!(config.session_options(), SessionOptions::default());
    }

    #[test]
    fn test_full_config_round_trips_into_components() {
        let config = Config::from_json(
            r#"{
                "workflow": {"base_url": "http://localhost/v1", "api_key": "k", "user_id": "u1",
                             "stream_idle_timeout_secs": 0, "connect_retries": 5},
                "storage": {"access_token": "ya29.token", "folder_id": "f-1", "make_public": true},
                "session": {"is_rag": false, "system_prompt": "Be terse.", "greeting": null},
                "stream": {"noise_patterns": ["^keep-alive$"]}
            }"#,
        )
        .unwrap();

        assert_eq!(config.workflow.idle_timeout(), None);
        assert_eq!(config.storage_token().unwrap(), "ya29.token");
        assert_eq!(config.folder_id().as_deref(), Some("f-1"));
        assert!(config.storage.make_public);
        assert_eq!(config.session.greeting, None);
        assert_eq!(
            config.session_options(),
            SessionOptions {
                is_rag: false,
                system_prompt: Some("Be terse.".to_string()),
            }
        );
        assert_eq!(config.stream.noise_patterns, vec!["^keep-alive$"]);
        assert_eq!(config.stream.control_events, NoiseRules::default().control_events);
        assert_eq!(config.stream.error_events, vec!["error"]);
        assert!(config.noise_table().is_ok());
    }

    #[test]
    fn test_missing_credentials_name_the_key() {
        let config = Config::from_json(r#"{"workflow": {"api_key": "your-workflow-api-key-here"}}"#)
            .unwrap();

        let err = config.workflow_credentials().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
        assert!(err.to_string().contains("workflow.api_key"));

        let err = config.storage_token().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
        assert!(err.user_message().contains("storage.access_token"));
        assert_eq!(config.folder_id(), None);
    }

    #[test]
    fn test_template_parses_but_needs_credentials() {
        let config = Config::from_json(&Config::template().unwrap()).unwrap();

        assert!(config.workflow_credentials().is_err());
        assert!(config.storage_token().is_err());
        assert_eq!(config.folder_id(), None);
        assert!(config.noise_table().is_ok());
    }

    #[test]
    fn test_invalid_stream_pattern_is_reported() {
        let config = Config::from_json(
            r#"{"workflow": {"api_key": "k"}, "stream": {"trailing_artifacts": ["("]}}"#,
        )
        .unwrap();
        let err = config.noise_table().unwrap_err();
        assert!(err.to_string().contains("stream"));
    }

    #[test]
    fn test_path_resolution_order() {
        let explicit = Path::new("/tmp/explicit.json");
        assert_eq!(
            Config::resolve_path_with(Some(explicit), Some("/tmp/env.json".to_string())).unwrap(),
            explicit
        );
        assert_eq!(
            Config::resolve_path_with(None, Some("/tmp/env.json".to_string())).unwrap(),
            PathBuf::from("/tmp/env.json")
        );
        if let Ok(default) = default_config_path() {
            assert_eq!(
                Config::resolve_path_with(None, Some("  ".to_string())).unwrap(),
                default
            );
        }
    }

    #[test]
    fn test_create_then_load() {
        let dir = std::env::temp_dir().join(format!("flowchat-config-{}", uuid::Uuid::now_v7()));
        let path = dir.join("config.json");

        assert!(Config::load(Some(&path)).is_err());
        assert_eq!(Config::create_config(Some(&path)).unwrap(), path);
        assert!(Config::create_config(Some(&path)).is_err());
        let config = Config::load(Some(&path)).unwrap();
        assert!(config.workflow_credentials().is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
