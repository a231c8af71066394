use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, ServerConfig};

/// Multi-user line-oriented TCP chat server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional TOML config file; flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host or IP address to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind. Use 0 for an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    /// Resolve the effective configuration: defaults, then file, then flags
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from(["line_chat", "--host", "127.0.0.1", "--port", "0"]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        let cli = Cli::parse_from(["line_chat"]);
        assert_eq!(cli.into_config().unwrap(), ServerConfig::default());
    }
}
