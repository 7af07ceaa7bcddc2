//! threadlink command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Watch realtime conversation channels.
#[derive(Parser, Debug)]
#[command(name = "threadlink", version, about)]
struct Cli {
    /// Configuration file (default: ~/.config/threadlink/realtime.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to channels and print their events as JSON lines.
    ///
    /// Lines read from stdin in the form `<channel> <json>` are sent to
    /// that channel.
    Watch {
        /// Channel ids to connect.
        #[arg(required = true)]
        channels: Vec<String>,

        /// Session token (overrides the configured token file).
        #[arg(long, env = "THREADLINK_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Print the streaming endpoint for a channel, without the token.
    Endpoint {
        channel: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Watch { channels, token } => {
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                channels = channels.len(),
                "starting threadlink watch"
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::watch(config, channels, token))?;
            tracing::info!("watch stopped cleanly");
        }
        Command::Endpoint { channel } => {
            println!("{}", app::endpoint(&config, &channel)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_with_channels() {
        let cli = Cli::try_parse_from(["threadlink", "watch", "42", "43", "--token", "t"]).unwrap();
        match cli.command {
            Command::Watch { channels, token } => {
                assert_eq!(channels, vec!["42", "43"]);
                assert_eq!(token.as_deref(), Some("t"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn watch_requires_a_channel() {
        assert!(Cli::try_parse_from(["threadlink", "watch"]).is_err());
    }

    #[test]
    fn global_config_flag() {
        let cli =
            Cli::try_parse_from(["threadlink", "endpoint", "7", "--config", "/tmp/x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
    }
}
