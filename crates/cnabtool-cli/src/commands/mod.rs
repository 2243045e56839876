//! CLI commands and argument parsing.

pub mod delete;
pub mod inspect;
pub mod manifest;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// cnabtool - inspect and delete CNAB bundles in a container registry
#[derive(Parser)]
#[command(name = "cnabtool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
///
/// Values left unset fall back to the config file, then to defaults.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file path
    #[arg(short, long, global = true, env = "CNAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level verbosity: 0 quiet, 1 errors, 2 normal, 3 info, 4 debug
    #[arg(short, long, global = true, env = "CNAB_VERBOSITY")]
    pub verbosity: Option<u8>,

    /// Registry user name
    #[arg(short, long, global = true, env = "CNAB_USERNAME")]
    pub username: Option<String>,

    /// Registry password
    #[arg(short, long, global = true, env = "CNAB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Request timeout in milliseconds
    #[arg(short, long, global = true, env = "CNAB_TIMEOUT")]
    pub timeout: Option<u64>,

    /// URL scheme used to reach the registry
    #[arg(long, global = true, env = "CNAB_SCHEME")]
    pub scheme: Option<String>,

    /// HTTP client identifier sent as User-Agent
    #[arg(long, global = true, env = "CNAB_CLIENT")]
    pub client: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub unsecure: bool,

    /// Additional CA certificate (PEM)
    #[arg(long, global = true)]
    pub ca_cert: Option<PathBuf>,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Content manipulation
    #[command(subcommand)]
    Content(ContentCommands),

    /// Print version information
    Version,
}

/// Content verbs.
#[derive(Subcommand)]
pub enum ContentCommands {
    /// Get a manifest by reference and show it as JSON
    Manifest(manifest::ManifestArgs),

    /// Inspect every item of a CNAB repository and report a summary
    Inspect(inspect::InspectArgs),

    /// Delete a CNAB and every component no other CNAB uses
    Delete(delete::DeleteArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cnabtool",
            "content",
            "delete",
            "registry.example.com/app:v1",
            "--dry-run",
            "-v",
            "4",
            "--unsecure",
        ])
        .unwrap();

        assert_eq!(cli.global.verbosity, Some(4));
        assert!(cli.global.unsecure);
        match cli.command {
            Commands::Content(ContentCommands::Delete(args)) => {
                assert!(args.dry_run);
                assert_eq!(args.reference, "registry.example.com/app:v1");
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn test_cli_requires_reference() {
        assert!(Cli::try_parse_from(["cnabtool", "content", "inspect"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
