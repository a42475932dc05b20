pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gate")]
#[command(about = "Operator CLI for the tenant security pipeline")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Workspace lookup and schema names")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Refresh-token session management")]
    Session {
        #[command(subcommand)]
        cmd: commands::session::SessionCommands,
    },

    #[command(about = "Access and refresh token inspection")]
    Token {
        #[command(subcommand)]
        cmd: commands::token::TokenCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, output_format).await,
        Commands::Session { cmd } => commands::session::handle(cmd, output_format).await,
        Commands::Token { cmd } => commands::token::handle(cmd, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_revoke() {
        let cli = Cli::try_parse_from([
            "gate",
            "--json",
            "session",
            "revoke",
            "--user",
            "6f1c2a52-4a8e-4c55-9d5e-0d6f1f0b7a11",
            "--reason",
            "password_change",
        ])
        .unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Session { .. }));
    }

    #[test]
    fn text_is_the_default_output() {
        let cli = Cli::try_parse_from(["gate", "tenant", "schema", "acme"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Text);
    }
}
