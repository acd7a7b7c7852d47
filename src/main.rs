//! studioctl CLI entrypoint.
//!
//! This is the main entrypoint for the studioctl command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use studio_lifecycle::cli::{Cli, Commands, LogFormat, OutputFormatter, StateCommands};
use studio_lifecycle::config::{ConfigParser, ConfigValidator, DeployConfig, find_config_file};
use studio_lifecycle::error::Result;
use studio_lifecycle::reconciler::{ProjectReconciler, ReconciliationResult};
use studio_lifecycle::remote::HttpStudioClient;
use studio_lifecycle::resource::ResourceId;
use studio_lifecycle::state::{LockInfo, StateStore, WorkspaceState, open_store};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings),
        Commands::Plan => cmd_plan(config_path, &formatter).await,
        Commands::Apply { yes } => cmd_apply(config_path, yes, &formatter).await,
        Commands::Show { name } => cmd_show(config_path, &name, &formatter).await,
        Commands::Import { name, id } => cmd_import(config_path, &name, &id, &formatter).await,
        Commands::Drift => cmd_drift(config_path, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config_path, yes, &formatter).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new studio project in: {}", path.display());

    let config_path = path.join("studio.deploy.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/studio.deploy.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    let ignored = [".env", ".studio/"];
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = ignored
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# studioctl")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!("{}\n", ignored.join("\n")))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set the API endpoint and token");
    eprintln!("  2. Edit studio.deploy.yaml with your studio configuration");
    eprintln!("  3. Run 'studioctl validate' to check your configuration");
    eprintln!("  4. Run 'studioctl plan' to see what will change");
    eprintln!("  5. Run 'studioctl apply' to create your studios");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config)?;
    eprintln!("Configuration is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  Environment: {}", config.project.environment);
    eprintln!("  Endpoint: {}", config.remote.endpoint);
    eprintln!("  Studios: {}", config.studio_keys().join(", "));

    Ok(())
}

/// Show the reconciliation plan.
async fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, store) = load_config_and_state(config_path).await?;
    let client = create_client(&config)?;
    let state = load_state(&*store, &config).await?;

    let plans = ProjectReconciler::new(&config, client).plan(&state).await?;
    println!("{}", formatter.format_plans(&plans));

    Ok(())
}

/// Apply the configuration.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, store) = load_config_and_state(config_path).await?;
    let client = create_client(&config)?;
    let fleet = ProjectReconciler::new(&config, client);

    let lock = store.acquire_lock("", "apply").await?;
    let outcome: Result<Option<ReconciliationResult>> = async {
        let mut state = load_state(&*store, &config).await?;

        let plans = fleet.plan(&state).await?;
        if plans.iter().all(|p| p.is_empty()) {
            eprintln!("No changes to apply.");
            return Ok(None);
        }
        eprintln!("{}", formatter.format_plans(&plans));

        if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
            eprintln!("Apply cancelled.");
            return Ok(None);
        }

        let result = fleet.apply(&mut state).await;
        store.save(&state).await?;
        Ok(Some(result))
    }
    .await;
    release(&*store, &lock).await;

    if let Some(result) = outcome? {
        println!("{}", formatter.format_reconciliation(&result));
        result.into_result()?;
    }
    Ok(())
}

/// Show one tracked studio.
async fn cmd_show(
    config_path: Option<&PathBuf>,
    name: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, store) = load_config_and_state(config_path).await?;
    let state = load_state(&*store, &config).await?;

    match state.get(name) {
        Some(record) => println!("{}", formatter.format_record(record)),
        None => eprintln!("Studio '{name}' is not tracked."),
    }
    Ok(())
}

/// Import an existing studio.
async fn cmd_import(
    config_path: Option<&PathBuf>,
    name: &str,
    id: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, store) = load_config_and_state(config_path).await?;
    let client = create_client(&config)?;
    let fleet = ProjectReconciler::new(&config, client);

    let lock = store.acquire_lock("", "import").await?;
    let outcome: Result<WorkspaceState> = async {
        let mut state = load_state(&*store, &config).await?;
        let imported = fleet.import(&mut state, name, &ResourceId::new(id)).await;
        store.save(&state).await?;
        imported?;
        Ok(state)
    }
    .await;
    release(&*store, &lock).await;

    let state = outcome?;
    if let Some(record) = state.get(name) {
        println!("{}", formatter.format_record(record));
    }
    Ok(())
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, store) = load_config_and_state(config_path).await?;
    let client = create_client(&config)?;
    let state = load_state(&*store, &config).await?;

    let report = ProjectReconciler::new(&config, client).check_drift(&state).await;
    println!("{}", formatter.format_drift(&report));

    Ok(())
}

/// Destroy every tracked studio.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, store) = load_config_and_state(config_path).await?;
    let client = create_client(&config)?;
    let fleet = ProjectReconciler::new(&config, client);

    let lock = store.acquire_lock("", "destroy").await?;
    let outcome: Result<Option<ReconciliationResult>> = async {
        let mut state = load_state(&*store, &config).await?;
        let tracked: Vec<String> = state
            .studio_names()
            .into_iter()
            .filter_map(|name| state.get(name))
            .map(|r| match &r.id {
                Some(id) => format!("{} ({id})", r.name),
                None => r.name.clone(),
            })
            .collect();

        if tracked.is_empty() {
            eprintln!("No studios to destroy.");
            return Ok(None);
        }

        eprintln!("The following studios will be destroyed:");
        for studio in &tracked {
            eprintln!("  - {studio}");
        }

        if !auto_approve
            && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")?
        {
            eprintln!("Destruction cancelled.");
            return Ok(None);
        }

        let result = fleet.destroy(&mut state).await;
        store.save(&state).await?;
        Ok(Some(result))
    }
    .await;
    release(&*store, &lock).await;

    if let Some(result) = outcome? {
        println!("{}", formatter.format_reconciliation(&result));
        result.into_result()?;
    }
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, store) = load_config_and_state(config_path).await?;

    match command {
        StateCommands::Show => match store.load().await? {
            Some(state) => println!("{}", formatter.format_state(&state)),
            None => eprintln!("No state found."),
        },
        StateCommands::Lock { holder } => {
            let lock = store
                .acquire_lock(holder.as_deref().unwrap_or(""), "manual")
                .await?;
            eprintln!("State locked: {lock}");
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                store.force_unlock().await?;
                eprintln!("State forcefully unlocked.");
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

fn base_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

/// Loads and validates the configuration, then opens its state store.
async fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(DeployConfig, Box<dyn StateStore>)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    ConfigValidator::new().validate(&config)?;

    let store = open_store(&config).await?;
    debug!("Using {} state backend", store.backend_type());
    Ok((config, store))
}

/// Loads the saved state, or starts an empty one.
async fn load_state(store: &dyn StateStore, config: &DeployConfig) -> Result<WorkspaceState> {
    Ok(store
        .load()
        .await?
        .unwrap_or_else(|| WorkspaceState::new(&config.project.name, &config.project.environment)))
}

/// Creates the HTTP client for the configured endpoint.
fn create_client(config: &DeployConfig) -> Result<Arc<HttpStudioClient>> {
    let client = HttpStudioClient::from_config(&config.remote, ConfigParser::api_token())?;
    Ok(Arc::new(client))
}

/// Releases a lock, logging rather than failing if that is not possible.
async fn release(store: &dyn StateStore, lock: &LockInfo) {
    if let Err(e) = store.release_lock(&lock.lock_id).await {
        warn!("Failed to release state lock {}: {e}", lock.lock_id);
    }
}

/// Prompts on stderr and compares the answer.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}
