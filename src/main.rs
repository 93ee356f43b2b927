#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Result};
use chatrelay::config::{Config, CONFIG_DIR_ENV};
use chatrelay::orchestrator::ChatOrchestrator;
use chatrelay::{gateway, observability, providers};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use tracing::info;

fn parse_temperature(s: &str) -> std::result::Result<f64, String> {
    let t: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !(0.0..=2.0).contains(&t) {
        return Err("temperature must be between 0.0 and 2.0".to_string());
    }
    Ok(t)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Session-aware chat relay.
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(version)]
#[command(about = "Bounded per-session chat history in front of a text-generation API.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (overrides CHATRELAY_CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    #[command(long_about = "\
Start the HTTP gateway.

Serves the chat page on / and the chat endpoint on POST /chat. Bind \
address defaults to the values in your config file (gateway.host / \
gateway.port).

Examples:
  chatrelay serve                  # use config defaults
  chatrelay serve -p 8080          # listen on port 8080
  chatrelay serve --host 0.0.0.0   # bind to all interfaces
  chatrelay serve -p 0             # random available port")]
    Serve {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Send one message to a session and print the reply
    #[command(long_about = "\
Send one message to a session and print the reply.

Runs the same turn as POST /chat: the message is appended to the \
session history and the bounded history is sent to the provider.

Examples:
  chatrelay chat -s demo -m \"hello\"
  chatrelay chat -s demo -m \"hello\" --model @cf/meta/llama-3.1-8b-instruct")]
    Chat {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Message text
        #[arg(short, long)]
        message: String,

        /// Model override for this turn
        #[arg(long)]
        model: Option<String>,

        /// Temperature override (0.0 - 2.0)
        #[arg(short, long, value_parser = parse_temperature)]
        temperature: Option<f64>,
    },

    /// Print the stored history of a session, one entry per line
    History {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Print as a JSON array instead of lines
        #[arg(long)]
        json: bool,
    },

    /// List supported generation providers
    Providers,

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `chatrelay`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(chatrelay completions bash)
  chatrelay completions zsh > ~/.zfunc/_chatrelay
  chatrelay completions fish > ~/.config/fish/completions/chatrelay.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
    /// Print the effective configuration as TOML (api_key masked)
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var(CONFIG_DIR_ENV, config_dir);
    }

    // Completions must remain stdout-only and should not load config or initialize logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    if let Commands::Config(ConfigCommands::Schema) = &cli.command {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    observability::init_tracing()?;

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Completions { .. } | Commands::Config(ConfigCommands::Schema) => {
            unreachable!("handled before config load")
        }

        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            if port == 0 {
                info!("Starting chatrelay gateway on {host} (random port)");
            } else {
                info!("Starting chatrelay gateway on {host}:{port}");
            }
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Chat {
            session,
            message,
            model,
            temperature,
        } => {
            let mut config = config;
            if let Some(model) = model {
                config.provider.model = model;
            }
            if let Some(temperature) = temperature {
                config.provider.temperature = temperature;
            }

            let orchestrator = ChatOrchestrator::from_config(&config)?;
            let reply = orchestrator.handle_chat(&session, &message).await?;
            println!("{}", reply.reply);
            Ok(())
        }

        Commands::History { session, json } => {
            let orchestrator = ChatOrchestrator::from_config(&config)?;
            let history = orchestrator.sessions().resolve(&session).history().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                for entry in &history {
                    println!("{entry}");
                }
            }
            Ok(())
        }

        Commands::Providers => {
            let active = config.provider.kind.trim().to_ascii_lowercase();
            println!("Supported providers:");
            for provider in providers::list_providers() {
                let marker = if provider.name == active { " (active)" } else { "" };
                println!(
                    "  {:<12} {}{}",
                    provider.name, provider.display_name, marker
                );
            }
            println!();
            println!("Model: {}", config.provider.model);
            Ok(())
        }

        Commands::Config(ConfigCommands::Show) => {
            println!("# {}", config.config_path.display());
            print!("{}", config.to_masked_toml()?);
            Ok(())
        }
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn completions_cli_parses_supported_shells() {
        for shell in ["bash", "fish", "zsh", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["chatrelay", "completions", shell])
                .expect("completions invocation should parse");
            match cli.command {
                Commands::Completions { .. } => {}
                other => panic!("expected completions command, got {other:?}"),
            }
        }
    }

    #[test]
    fn completion_generation_mentions_binary_name() {
        let mut output = Vec::new();
        write_shell_completion(CompletionShell::Bash, &mut output)
            .expect("completion generation should succeed");
        let script = String::from_utf8(output).expect("completion output should be valid utf-8");
        assert!(
            script.contains("chatrelay"),
            "completion script should reference binary name"
        );
    }

    #[test]
    fn chat_requires_session_and_message() {
        assert!(Cli::try_parse_from(["chatrelay", "chat", "-m", "hi"]).is_err());
        assert!(Cli::try_parse_from(["chatrelay", "chat", "-s", "demo"]).is_err());

        let cli = Cli::try_parse_from(["chatrelay", "chat", "-s", "demo", "-m", "hi"]).unwrap();
        match cli.command {
            Commands::Chat {
                session, message, ..
            } => {
                assert_eq!(session, "demo");
                assert_eq!(message, "hi");
            }
            other => panic!("expected chat command, got {other:?}"),
        }
    }

    #[test]
    fn chat_temperature_is_range_checked() {
        assert!(
            Cli::try_parse_from(["chatrelay", "chat", "-s", "a", "-m", "b", "-t", "2.5"]).is_err()
        );
        assert!(
            Cli::try_parse_from(["chatrelay", "chat", "-s", "a", "-m", "b", "-t", "0.2"]).is_ok()
        );
    }

    #[test]
    fn serve_accepts_host_and_port() {
        let cli = Cli::try_parse_from(["chatrelay", "serve", "-p", "0", "--host", "0.0.0.0"])
            .unwrap();
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, Some(0));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli =
            Cli::try_parse_from(["chatrelay", "history", "-s", "demo", "--config-dir", "/tmp/x"])
                .unwrap();
        assert_eq!(cli.config_dir.as_deref(), Some("/tmp/x"));
    }

    #[test]
    fn config_schema_subcommand_parses() {
        let cli = Cli::try_parse_from(["chatrelay", "config", "schema"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Schema)));
    }
}
