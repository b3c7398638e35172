use autopilot_activator::activation::{ActivationOrchestrator, ModelSynthesizer};
use autopilot_activator::adapters::{MySqlCatalog, PortfolioApiClient, TargetServiceClient};
use autopilot_activator::cli::{
    ActivateArgs, Cli, Commands, FormatArgs, ImportArgs, ACTIVATE_USAGE, FORMAT_USAGE,
    IMPORT_USAGE,
};
use autopilot_activator::client_list::{load_clients, read_json_array, write_json};
use autopilot_activator::config::{AppConfig, LoggingConfig};
use autopilot_activator::domain::{ModelReference, Session};
use autopilot_activator::error::{ActivatorError, Result};
use autopilot_activator::onboarding::{
    format_clients, resolve_advisor_link, ClientImporter, ContactEntry, FormatOptions,
};
use autopilot_activator::remote::{PortfolioClient, RemoteCatalog};
use clap::Parser;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(usage) = cli.command.usage_error() {
        eprintln!("{usage}");
        std::process::exit(1);
    }

    let config = AppConfig::load_from(&cli.config)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Activate(args) => run_activate(&config, args).await,
        Commands::Import(args) => run_import(&config, args).await,
        Commands::Format(args) => run_format(&config, args).await,
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},autopilot_activator=debug,sqlx=warn",
            logging.level
        ))
    });

    // Progress and per-client failures go to stderr; stdout carries results
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn portfolio_client(config: &AppConfig) -> Result<Arc<PortfolioApiClient>> {
    Ok(Arc::new(PortfolioApiClient::new(
        &config.api,
        config.advisor.clone(),
    )?))
}

async fn session_or_login(token: Option<String>, client: &dyn PortfolioClient) -> Result<Session> {
    match token {
        Some(token) => Ok(Session::new(token)),
        None => {
            let session = client.login().await?;
            info!("logged in");
            Ok(session)
        }
    }
}

async fn run_activate(config: &AppConfig, args: ActivateArgs) -> Result<()> {
    config
        .validate_for_activation()
        .map_err(|errors| ActivatorError::Validation(errors.join("; ")))?;

    let model_arg = args.model_reference()?;
    let clients_path = args
        .clients
        .ok_or_else(|| ActivatorError::Validation(ACTIVATE_USAGE.to_string()))?;

    let portfolios = portfolio_client(config)?;
    let targets = Arc::new(TargetServiceClient::new(
        &config.targets,
        &config.api.authorization,
        config.api.request_timeout(),
    )?);

    let session = session_or_login(args.session, portfolios.as_ref()).await?;

    let model = match model_arg {
        Some(model) => model,
        None => {
            let catalog = Arc::new(MySqlCatalog::connect_lazy(&config.database));
            let synthesizer =
                ModelSynthesizer::new(portfolios.clone(), catalog, config.synthesis.clone());
            let model = synthesizer.synthesize_model(&session).await?;
            ModelReference::from_model(&model)?
        }
    };

    let clients = load_clients(&clients_path).await?;
    let threads = args.threads.unwrap_or(config.activation.threads);

    let orchestrator = ActivationOrchestrator::new(portfolios, targets, &config.activation);
    let summary = orchestrator
        .activate_all(&clients, model, &session, threads)
        .await;

    write_json(None, &summary).await
}

async fn run_import(config: &AppConfig, args: ImportArgs) -> Result<()> {
    let imports_path = args
        .imports
        .ok_or_else(|| ActivatorError::Validation(IMPORT_USAGE.to_string()))?;
    let records: Vec<Value> = read_json_array(&imports_path).await?;

    let portfolios = portfolio_client(config)?;
    let session = session_or_login(args.session, portfolios.as_ref()).await?;

    let outcomes = ClientImporter::new(portfolios)
        .import_all(&records, &session)
        .await;

    write_json(args.output.as_deref(), &outcomes).await
}

async fn run_format(config: &AppConfig, args: FormatArgs) -> Result<()> {
    let missing = || ActivatorError::Validation(FORMAT_USAGE.to_string());
    let list_path = args.client_list.clone().ok_or_else(missing)?;
    let database_id = args.database_id.clone().ok_or_else(missing)?;
    let integration_type = args.integration_type.clone().ok_or_else(missing)?;

    let (advisor_id, link_id) = match (args.advisor_id.clone(), args.link_id.clone()) {
        (Some(advisor_id), Some(link_id)) => (advisor_id, link_id),
        (advisor_id, link_id) => {
            let email = args.advisor_email.as_deref().ok_or_else(missing)?;
            let catalog = MySqlCatalog::connect_lazy(&config.database);
            let (found_advisor, found_link) =
                resolve_advisor_link(&catalog as &dyn RemoteCatalog, email, &integration_type)
                    .await?;
            (
                advisor_id.unwrap_or(found_advisor),
                link_id.unwrap_or(found_link),
            )
        }
    };

    let contacts: Vec<ContactEntry> = read_json_array(&list_path).await?;
    let options = FormatOptions {
        advisor_id,
        database_id,
        link_id,
        integration_type,
    };
    let records = format_clients(contacts, &options, chrono::Utc::now());

    write_json(args.output.as_deref(), &records).await
}
