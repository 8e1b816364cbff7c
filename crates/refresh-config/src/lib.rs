//! Configuration management for refresh.
//!
//! Parses `refresh.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Bare `$VAR` syntax is not expanded (only `${VAR}` with braces).
//!
//! Expanded fields:
//! - `server.host`
//! - `watch.root`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// Optional fields override the loaded config only when set. List fields are
/// appended to the values from the file.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override upgrade endpoint path.
    pub endpoint: Option<String>,
    /// Override watch root directory.
    pub watch_root: Option<PathBuf>,
    /// Additional paths to ignore.
    pub ignore: Vec<String>,
    /// Additional allowed origins for the upgrade endpoint.
    pub allowed_origins: Vec<String>,
    /// Override verbose logging flag.
    pub verbose: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "refresh.toml";

/// Path served by the health check route.
pub const HEALTH_PATH: &str = "/health";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Watch configuration (root is a relative string from TOML).
    watch: WatchConfigRaw,
    /// Per-client delivery configuration.
    pub clients: ClientsConfig,
    /// Enable verbose logging.
    pub verbose: bool,

    /// Resolved watch configuration (set after loading).
    #[serde(skip)]
    pub watch_resolved: WatchConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Path of the WebSocket upgrade endpoint.
    pub endpoint: String,
    /// Grace period for draining sessions on shutdown, in milliseconds.
    pub shutdown_grace_ms: u64,
    /// Origins allowed to upgrade. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            endpoint: "/ws".to_owned(),
            shutdown_grace_ms: 5000,
            allowed_origins: Vec::new(),
        }
    }
}

/// Raw watch configuration as parsed from TOML (root as string).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct WatchConfigRaw {
    root: Option<String>,
    ignore: Vec<String>,
    rescan_new_dirs: bool,
}

/// Resolved watch configuration.
#[derive(Debug, Default)]
pub struct WatchConfig {
    /// Directory to watch for changes.
    pub root: PathBuf,
    /// Paths excluded from watching, matched exactly.
    pub ignore: Vec<String>,
    /// Register directories created after startup.
    pub rescan_new_dirs: bool,
}

/// Per-client delivery configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    /// Deadline for a single send to one client, in milliseconds.
    pub write_timeout_ms: u64,
    /// Number of messages buffered per client before sends start waiting.
    pub outbox_capacity: usize,
}

impl ClientsConfig {
    /// Per-client write deadline.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 2000,
            outbox_capacity: 16,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`watch.root`").
        field: String,
        /// Error message (e.g., "${`SITE_DIR`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a numeric field to be non-zero.
fn require_non_zero(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `refresh.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(endpoint) = &settings.endpoint {
            self.server.endpoint.clone_from(endpoint);
        }
        if let Some(root) = &settings.watch_root {
            self.watch_resolved.root.clone_from(root);
        }
        if let Some(verbose) = settings.verbose {
            self.verbose = verbose;
        }
        self.watch_resolved
            .ignore
            .extend(settings.ignore.iter().cloned());
        self.server
            .allowed_origins
            .extend(settings.allowed_origins.iter().cloned());
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config watching the given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            watch: WatchConfigRaw::default(),
            clients: ClientsConfig::default(),
            verbose: false,
            watch_resolved: WatchConfig {
                root: base.to_path_buf(),
                ignore: Vec::new(),
                rescan_new_dirs: false,
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically by [`Config::load`] after CLI settings are merged.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_clients()?;
        require_non_empty(
            &self.watch_resolved.root.to_string_lossy(),
            "watch.root",
        )?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but it's
        // unlikely to be intentional for a server clients must reconnect to
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        if !self.server.endpoint.starts_with('/') {
            return Err(ConfigError::Validation(
                "server.endpoint must start with /".to_owned(),
            ));
        }

        if self.server.endpoint == HEALTH_PATH {
            return Err(ConfigError::Validation(format!(
                "server.endpoint cannot be {HEALTH_PATH}"
            )));
        }

        Ok(())
    }

    /// Validate client delivery configuration.
    fn validate_clients(&self) -> Result<(), ConfigError> {
        require_non_zero(self.clients.write_timeout_ms, "clients.write_timeout_ms")?;
        require_non_zero(
            self.clients.outbox_capacity as u64,
            "clients.outbox_capacity",
        )?;
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref root) = self.watch.root {
            self.watch.root = Some(expand::expand_env(root, "watch.root")?);
        }

        Ok(())
    }

    /// Resolve the watch root against the config file directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let root = match self.watch.root.as_deref() {
            Some(root) => config_dir.join(root),
            None => config_dir.to_path_buf(),
        };

        self.watch_resolved = WatchConfig {
            root,
            ignore: self.watch.ignore.clone(),
            rescan_new_dirs: self.watch.rescan_new_dirs,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.endpoint, "/ws");
        assert_eq!(config.server.shutdown_grace(), Duration::from_secs(5));
        assert!(config.server.allowed_origins.is_empty());
        assert_eq!(config.watch_resolved.root, PathBuf::from("/test"));
        assert!(config.watch_resolved.ignore.is_empty());
        assert!(!config.watch_resolved.rescan_new_dirs);
        assert_eq!(config.clients.write_timeout(), Duration::from_secs(2));
        assert_eq!(config.clients.outbox_capacity, 16);
        assert!(!config.verbose);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
verbose = true

[server]
host = "0.0.0.0"
port = 9000
endpoint = "/refresh"
shutdown_grace_ms = 250
allowed_origins = ["http://localhost:3000"]

[watch]
root = "site"
ignore = ["node_modules", ".git"]
rescan_new_dirs = true

[clients]
write_timeout_ms = 500
outbox_capacity = 4
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert!(config.verbose);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.endpoint, "/refresh");
        assert_eq!(config.server.shutdown_grace(), Duration::from_millis(250));
        assert_eq!(
            config.server.allowed_origins,
            vec!["http://localhost:3000".to_owned()]
        );
        assert_eq!(config.watch_resolved.root, PathBuf::from("/project/site"));
        assert_eq!(
            config.watch_resolved.ignore,
            vec!["node_modules".to_owned(), ".git".to_owned()]
        );
        assert!(config.watch_resolved.rescan_new_dirs);
        assert_eq!(config.clients.write_timeout(), Duration::from_millis(500));
        assert_eq!(config.clients.outbox_capacity, 4);
    }

    #[test]
    fn test_resolve_paths_defaults_to_config_dir() {
        let mut config: Config = toml::from_str("").unwrap();
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.watch_resolved.root, PathBuf::from("/project"));
    }

    #[test]
    fn test_resolve_paths_keeps_absolute_root() {
        let toml = r#"
[watch]
root = "/srv/site"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.watch_resolved.root, PathBuf::from("/srv/site"));
    }

    #[test]
    fn test_apply_cli_settings_overrides() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            host: Some("0.0.0.0".to_owned()),
            port: Some(9000),
            endpoint: Some("/live".to_owned()),
            watch_root: Some(PathBuf::from("/custom/site")),
            verbose: Some(true),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.endpoint, "/live");
        assert_eq!(config.watch_resolved.root, PathBuf::from("/custom/site"));
        assert!(config.verbose);
    }

    #[test]
    fn test_apply_cli_settings_none_keeps_values() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.watch_resolved.root, PathBuf::from("/test"));
        assert!(!config.verbose);
    }

    #[test]
    fn test_apply_cli_settings_appends_lists() {
        let toml = r#"
[server]
allowed_origins = ["http://a.test"]

[watch]
ignore = ["node_modules"]
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));
        config.apply_cli_settings(&CliSettings {
            ignore: vec!["dist".to_owned(), "tmp".to_owned()],
            allowed_origins: vec!["http://b.test".to_owned()],
            ..Default::default()
        });

        assert_eq!(
            config.watch_resolved.ignore,
            vec!["node_modules".to_owned(), "dist".to_owned(), "tmp".to_owned()]
        );
        assert_eq!(
            config.server.allowed_origins,
            vec!["http://a.test".to_owned(), "http://b.test".to_owned()]
        );
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.host = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.host"));
    }

    #[test]
    fn test_validate_rejects_relative_endpoint() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.endpoint = "ws".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.endpoint"));
    }

    #[test]
    fn test_validate_rejects_health_endpoint() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.endpoint = "/health".to_owned();

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("/health")));
    }

    #[test]
    fn test_validate_rejects_zero_write_timeout() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.clients.write_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("clients.write_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_outbox_capacity() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.clients.outbox_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("clients.outbox_capacity"));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/refresh.toml")), None);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_file_resolves_root_against_file_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[server]
port = 3001

[watch]
root = "public"
ignore = ["public/vendor"]
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.server.port, 3001);
        assert_eq!(config.watch_resolved.root, dir.path().join("public"));
        assert_eq!(
            config.watch_resolved.ignore,
            vec!["public/vendor".to_owned()]
        );
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_validates_after_cli_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "").unwrap();

        let settings = CliSettings {
            endpoint: Some("no-slash".to_owned()),
            ..Default::default()
        };
        let result = Config::load(Some(&path), Some(&settings));

        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[server\nport = ").unwrap();

        let result = Config::load(Some(&path), None);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_expand_env_vars_uses_default() {
        let toml = r#"
[server]
host = "${REFRESH_TEST_HOST_UNSET:-0.0.0.0}"

[watch]
root = "${REFRESH_TEST_ROOT_UNSET:-site}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.watch_resolved.root, PathBuf::from("/project/site"));
    }
}
