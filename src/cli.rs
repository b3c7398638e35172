use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::ModelReference;
use crate::error::{ActivatorError, Result};

pub const ACTIVATE_USAGE: &str = "required parameters: --clients (optional: --session, --model, --model-version, --threads >= 1)";
pub const FORMAT_USAGE: &str = "required options: --client-list, --database-id, --integration-type, and either --advisor-id with --link-id or --advisor-email";
pub const IMPORT_USAGE: &str = "required arguments: --imports";

#[derive(Parser)]
#[command(name = "autopilot")]
#[command(version)]
#[command(about = "Batch-activate client accounts onto a target allocation model", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enable autopilot for every client in a list
    Activate(ActivateArgs),
    /// Create clients from a list of import records
    Import(ImportArgs),
    /// Turn a CRM contact export into import records
    Format(FormatArgs),
}

impl Commands {
    /// Usage message to print when required arguments are missing or unusable
    pub fn usage_error(&self) -> Option<&'static str> {
        match self {
            Self::Activate(args) if !args.has_required() => Some(ACTIVATE_USAGE),
            Self::Import(args) if args.imports.is_none() => Some(IMPORT_USAGE),
            Self::Format(args) if !args.has_required() => Some(FORMAT_USAGE),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ActivateArgs {
    /// JSON array of client records
    #[arg(long)]
    pub clients: Option<PathBuf>,
    /// Session token (logs in when omitted)
    #[arg(long)]
    pub session: Option<String>,
    /// Model id (a model is synthesized when omitted)
    #[arg(long)]
    pub model: Option<i64>,
    /// Model version id, required with --model
    #[arg(long)]
    pub model_version: Option<i64>,
    /// Number of concurrent activations
    #[arg(long)]
    pub threads: Option<usize>,
}

impl ActivateArgs {
    pub fn has_required(&self) -> bool {
        self.clients.is_some() && self.threads != Some(0)
    }

    /// Model given on the command line; both ids or neither
    pub fn model_reference(&self) -> Result<Option<ModelReference>> {
        match (self.model, self.model_version) {
            (Some(model), Some(version)) => Ok(Some(ModelReference::new(model, version))),
            (None, None) => Ok(None),
            _ => Err(ActivatorError::Validation(
                "--model and --model-version must be given together".to_string(),
            )),
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ImportArgs {
    /// JSON array of import records
    #[arg(long)]
    pub imports: Option<PathBuf>,
    /// Write results here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct FormatArgs {
    /// JSON array of `{id, name}` contacts
    #[arg(long)]
    pub client_list: Option<PathBuf>,
    #[arg(long)]
    pub database_id: Option<String>,
    /// Integration link id (looked up with --advisor-email when omitted)
    #[arg(long)]
    pub link_id: Option<String>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub integration_type: Option<String>,
    #[arg(long)]
    pub advisor_id: Option<String>,
    /// Resolve advisor and link ids from the catalog
    #[arg(long)]
    pub advisor_email: Option<String>,
}

impl FormatArgs {
    pub fn has_required(&self) -> bool {
        let ids_given = self.advisor_id.is_some() && self.link_id.is_some();
        self.client_list.is_some()
            && self.database_id.is_some()
            && self.integration_type.is_some()
            && (ids_given || self.advisor_email.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_activate() {
        let cli = Cli::try_parse_from([
            "autopilot",
            "activate",
            "--clients",
            "clients.json",
            "--model",
            "7",
            "--model-version",
            "3",
            "--threads",
            "8",
        ])
        .unwrap();

        let Commands::Activate(args) = cli.command else {
            panic!("expected activate");
        };
        assert_eq!(args.clients, Some(PathBuf::from("clients.json")));
        assert_eq!(args.threads, Some(8));
        assert_eq!(
            args.model_reference().unwrap(),
            Some(ModelReference::new(7, 3))
        );
        assert_eq!(cli.config, "config");
    }

    #[test]
    fn test_missing_clients_still_parses() {
        // The binary reports the usage message and exits 1 itself
        let cli = Cli::try_parse_from(["autopilot", "activate"]).unwrap();
        assert_eq!(cli.command.usage_error(), Some(ACTIVATE_USAGE));
        let Commands::Activate(args) = cli.command else {
            panic!("expected activate");
        };
        assert!(args.clients.is_none());
    }

    #[test]
    fn test_zero_threads_is_rejected() {
        let cli = Cli::try_parse_from([
            "autopilot",
            "activate",
            "--clients",
            "clients.json",
            "--threads",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.command.usage_error(), Some(ACTIVATE_USAGE));

        let cli =
            Cli::try_parse_from(["autopilot", "activate", "--clients", "clients.json"]).unwrap();
        assert_eq!(cli.command.usage_error(), None);
    }

    #[test]
    fn test_model_without_version_is_rejected() {
        let args = ActivateArgs {
            model: Some(7),
            ..Default::default()
        };
        assert!(args.model_reference().is_err());
    }

    #[test]
    fn test_format_requirements() {
        let mut args = FormatArgs {
            client_list: Some("list.json".into()),
            database_id: Some("db".into()),
            integration_type: Some("redtail".into()),
            ..Default::default()
        };
        assert!(!args.has_required());

        args.advisor_email = Some("advisor@example.com".into());
        assert!(args.has_required());
    }
}
