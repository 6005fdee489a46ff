use clap::Parser;
use std::path::PathBuf;

/// mailgate - streaming HTTP gateway for SMTP sessions
#[derive(Parser, Debug)]
#[command(name = "mailgate")]
#[command(about = "Drive SMTP sessions over a streaming HTTP connection")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, short = 'c', default_value = "mailgate.toml")]
    pub config: PathBuf,

    /// Listen address, overrides `server.bind`
    #[arg(long)]
    pub bind: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        if self.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["mailgate"]);
        assert_eq!(cli.config, PathBuf::from("mailgate.toml"));
        assert!(cli.bind.is_none());
        assert_eq!(cli.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from(["mailgate", "-c", "/etc/mailgate.toml", "--bind", "127.0.0.1:2525", "--debug"]);
        assert_eq!(cli.config, PathBuf::from("/etc/mailgate.toml"));
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:2525"));
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
        assert!(!cli.print_config);
    }
}
