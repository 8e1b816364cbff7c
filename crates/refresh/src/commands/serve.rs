//! `refresh serve` command implementation.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Args;
use refresh_config::{CliSettings, Config};
use refresh_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover refresh.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config).
    #[arg(short, long, env = "REFRESH_PORT")]
    port: Option<u16>,

    /// Host to bind to (overrides config).
    #[arg(long, env = "REFRESH_HOST")]
    host: Option<String>,

    /// Directory to watch (overrides config).
    #[arg(short, long, env = "REFRESH_WATCH")]
    watch: Option<PathBuf>,

    /// Comma-separated paths to ignore, added to the configured list.
    #[arg(short, long, value_delimiter = ',', env = "REFRESH_IGNORE")]
    ignore: Vec<String>,

    /// WebSocket endpoint path (overrides config).
    #[arg(long)]
    endpoint: Option<String>,

    /// Origin allowed to connect; repeat for more. Any origin if none given.
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    allow_origin: Vec<String>,

    /// Log every detected change.
    #[arg(short, long, env = "REFRESH_VERBOSE")]
    verbose: bool,
}

impl ServeArgs {
    /// Load configuration with these arguments applied on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub(crate) fn load_config(&self) -> Result<Config, CliError> {
        let cli_settings = CliSettings {
            host: self.host.clone(),
            port: self.port,
            endpoint: self.endpoint.clone(),
            watch_root: self.watch.clone(),
            ignore: self.ignore.clone(),
            allowed_origins: self.allow_origin.clone(),
            verbose: self.verbose.then_some(true),
        };

        Ok(Config::load(self.config.as_deref(), Some(&cli_settings))?)
    }

    /// Execute the serve command with a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be set up or the server fails.
    pub(crate) async fn execute(config: Config, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        output.highlight(&format!("refresh {version}"));
        if let Some(path) = &config.config_path {
            output.info(&format!("Config: {}", path.display()));
        }
        output.info(&format!(
            "Listening on ws://{}:{}{}",
            config.server.host, config.server.port, config.server.endpoint
        ));
        output.info(&format!(
            "Watching: {}",
            config.watch_resolved.root.display()
        ));
        if !config.watch_resolved.ignore.is_empty() {
            output.info(&format!(
                "Ignoring: {}",
                config.watch_resolved.ignore.join(", ")
            ));
        }
        if config.server.allowed_origins.is_empty() && !is_loopback(&config.server.host) {
            output.warning("Accepting connections from any origin on a non-loopback address");
        }

        run_server(server_config_from_config(&config)).await?;

        Ok(())
    }
}

/// Whether `host` names the local machine only.
fn is_loopback(host: &str) -> bool {
    host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}
