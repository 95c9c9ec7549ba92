use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Status of config file loading
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    Error(String),
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2222,
        }
    }
}

/// Which generator every session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fill the built-in methodology template.
    #[default]
    Local,
    /// Ask the Anthropic API to analyze the task and compose the prompt.
    Remote,
}

impl Strategy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Strategy::Local),
            "remote" => Some(Strategy::Remote),
            _ => None,
        }
    }
}

/// Generation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub strategy: Strategy,
}

/// Anthropic API configuration, used by the remote strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 2048,
        }
    }
}

/// Where saved prompts are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub directory: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Expand `~` to home directory in a path string
    pub fn expand_tilde(path: &str) -> PathBuf {
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    /// Address the listener binds, as `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the expanded export directory
    pub fn export_dir(&self) -> PathBuf {
        Self::expand_tilde(&self.export.directory)
    }

    /// Reject combinations the server cannot start with.
    pub fn validate(&self) -> Result<(), String> {
        if self.generation.strategy == Strategy::Remote && self.anthropic.api_key.trim().is_empty()
        {
            return Err(
                "the remote strategy needs an API key (anthropic.api_key or ANTHROPIC_API_KEY)"
                    .to_string(),
            );
        }
        if self.anthropic.max_tokens == 0 {
            return Err("anthropic.max_tokens must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub status: ConfigLoadStatus,
}

/// Get the platform-appropriate config directory
fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "promptforge", "promptforge")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the full path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load configuration from file, environment, and defaults.
///
/// `explicit` replaces the platform config path when given.
pub fn load_config(explicit: Option<&Path>) -> LoadedConfig {
    let config_path = match explicit.map(Path::to_path_buf).or_else(get_config_path) {
        Some(path) => path,
        None => {
            warn!("config_dir_unavailable");
            return LoadedConfig {
                config: apply_env_overrides(Config::default()),
                config_path: PathBuf::from("config.toml"),
                status: ConfigLoadStatus::Error("Could not determine config directory".to_string()),
            };
        }
    };

    debug!(path = ?config_path, "config_path");

    let (config, status) = load_or_create_config(&config_path);
    let config = apply_env_overrides(config);

    LoadedConfig {
        config,
        config_path,
        status,
    }
}

/// Load config from file, or create default if not exists
fn load_or_create_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    match fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                info!(path = ?config_path, "config_loaded");
                (config, ConfigLoadStatus::Loaded)
            }
            Err(e) => {
                warn!(path = ?config_path, error = %e, "config_parse_failed");
                (
                    Config::default(),
                    ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
                )
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_default_config(config_path),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(path = ?config_path, "config_read_permission_denied");
            (
                Config::default(),
                ConfigLoadStatus::Error("Permission denied reading config".to_string()),
            )
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_read_failed");
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Read error: {}", e)),
            )
        }
    }
}

/// Create the default config file
fn create_default_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let config = Config::default();

    if let Some(parent) = config_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(path = ?parent, error = %e, "config_dir_create_failed");
        return (
            config,
            ConfigLoadStatus::Error(format!("Could not create config directory: {}", e)),
        );
    }

    let toml_content = match toml::to_string_pretty(&config) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "config_serialize_failed");
            return (
                config,
                ConfigLoadStatus::Error(format!("Serialization error: {}", e)),
            );
        }
    };

    match fs::write(config_path, &toml_content) {
        Ok(()) => {
            info!(path = ?config_path, "config_created");
            (config, ConfigLoadStatus::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(path = ?config_path, "config_write_permission_denied");
            (
                config,
                ConfigLoadStatus::Error("Permission denied creating config".to_string()),
            )
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_write_failed");
            (
                config,
                ConfigLoadStatus::Error(format!("Write error: {}", e)),
            )
        }
    }
}

/// Apply environment variable overrides to config
fn apply_env_overrides(config: Config) -> Config {
    apply_env_overrides_from(config, |key| env::var(key).ok())
}

fn apply_env_overrides_from(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Config {
    if let Some(port) = lookup("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => {
                debug!("Overriding server.port from PORT");
                config.server.port = port;
            }
            Err(e) => warn!(value = %port, error = %e, "invalid_port_override"),
        }
    }

    if let Some(host) = lookup("PROMPTFORGE_HOST") {
        debug!("Overriding server.host from PROMPTFORGE_HOST");
        config.server.host = host;
    }

    if let Some(strategy) = lookup("PROMPTFORGE_STRATEGY") {
        match Strategy::parse(&strategy) {
            Some(strategy) => {
                debug!("Overriding generation.strategy from PROMPTFORGE_STRATEGY");
                config.generation.strategy = strategy;
            }
            None => warn!(value = %strategy, "invalid_strategy_override"),
        }
    }

    if let Some(model) = lookup("PROMPTFORGE_MODEL") {
        debug!("Overriding anthropic.model from PROMPTFORGE_MODEL");
        config.anthropic.model = model;
    }

    if let Some(dir) = lookup("PROMPTFORGE_EXPORT_DIR") {
        debug!("Overriding export.directory from PROMPTFORGE_EXPORT_DIR");
        config.export.directory = dir;
    }

    if let Some(level) = lookup("PROMPTFORGE_LOG") {
        debug!("Overriding logging.level from PROMPTFORGE_LOG");
        config.logging.level = level;
    }

    if config.anthropic.api_key.is_empty()
        && let Some(key) = lookup("ANTHROPIC_API_KEY")
    {
        debug!("Using anthropic.api_key from ANTHROPIC_API_KEY");
        config.anthropic.api_key = key;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 2222);
        assert_eq!(config.generation.strategy, Strategy::Local);
        assert_eq!(config.anthropic.api_key, "");
        assert_eq!(config.anthropic.model, "claude-3-5-haiku-20241022");
        assert_eq!(config.anthropic.max_tokens, 2048);
        assert_eq!(config.export.directory, ".");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.bind_address(), "0.0.0.0:2222");
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = Config::expand_tilde("~/.config/test");
        assert!(!expanded.to_string_lossy().starts_with('~'));

        let no_tilde = Config::expand_tilde("/absolute/path");
        assert_eq!(no_tilde, PathBuf::from("/absolute/path"));

        let relative = Config::expand_tilde("./relative/path");
        assert_eq!(relative, PathBuf::from("./relative/path"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
[server]
host = "127.0.0.1"
port = 4000

[generation]
strategy = "remote"

[anthropic]
api_key = "sk-test"
model = "claude-sonnet"
max_tokens = 1024

[export]
directory = "/tmp/prompts"

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:4000");
        assert_eq!(config.generation.strategy, Strategy::Remote);
        assert_eq!(config.anthropic.api_key, "sk-test");
        assert_eq!(config.anthropic.model, "claude-sonnet");
        assert_eq!(config.anthropic.max_tokens, 1024);
        assert_eq!(config.export_dir(), PathBuf::from("/tmp/prompts"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_partial_deserialization() {
        let toml_str = r#"
[server]
port = 9000
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.generation.strategy, Strategy::Local);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let toml_str = r#"
[server]
port = 9000
unknown_key = "should be ignored"

[unknown_section]
foo = "bar"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let toml_str = r#"
[generation]
strategy = "psychic"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let (config, status) = load_or_create_config(&path);
        assert_eq!(status, ConfigLoadStatus::Created);
        assert_eq!(config.server.port, 2222);

        let written: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.server.port, 2222);
        assert_eq!(written.generation.strategy, Strategy::Local);
    }

    #[test]
    fn test_existing_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = 7000\n").unwrap();

        let (config, status) = load_or_create_config(&path);
        assert_eq!(status, ConfigLoadStatus::Loaded);
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nport = ").unwrap();

        let (config, status) = load_or_create_config(&path);
        assert!(matches!(status, ConfigLoadStatus::Error(ref msg) if msg.starts_with("Malformed TOML")));
        assert_eq!(config.server.port, 2222);
        // The broken file is left for the operator to fix.
        assert_eq!(fs::read_to_string(&path).unwrap(), "[server\nport = ");
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[
            ("PORT", "8022"),
            ("PROMPTFORGE_HOST", "127.0.0.1"),
            ("PROMPTFORGE_STRATEGY", "Remote"),
            ("PROMPTFORGE_MODEL", "claude-other"),
            ("PROMPTFORGE_EXPORT_DIR", "/srv/prompts"),
            ("PROMPTFORGE_LOG", "debug"),
        ]);
        let config = apply_env_overrides_from(Config::default(), env);
        assert_eq!(config.bind_address(), "127.0.0.1:8022");
        assert_eq!(config.generation.strategy, Strategy::Remote);
        assert_eq!(config.anthropic.model, "claude-other");
        assert_eq!(config.export.directory, "/srv/prompts");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let env = env_of(&[("PORT", "not-a-port"), ("PROMPTFORGE_STRATEGY", "psychic")]);
        let config = apply_env_overrides_from(Config::default(), env);
        assert_eq!(config.server.port, 2222);
        assert_eq!(config.generation.strategy, Strategy::Local);
    }

    #[test]
    fn test_api_key_env_only_fills_empty_key() {
        let env = env_of(&[("ANTHROPIC_API_KEY", "from-env")]);
        let config = apply_env_overrides_from(Config::default(), &env);
        assert_eq!(config.anthropic.api_key, "from-env");

        let mut configured = Config::default();
        configured.anthropic.api_key = "from-file".to_string();
        let config = apply_env_overrides_from(configured, &env);
        assert_eq!(config.anthropic.api_key, "from-file");
    }

    #[test]
    fn test_validate_remote_requires_api_key() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.generation.strategy = Strategy::Remote;
        let err = config.validate().unwrap_err();
        assert!(err.contains("API key"));

        config.anthropic.api_key = "sk-test".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_max_tokens() {
        let mut config = Config::default();
        config.anthropic.max_tokens = 0;
        assert!(config.validate().is_err());
    }
}
