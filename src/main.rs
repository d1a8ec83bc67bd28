use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use querymodel::db::{
    BackingStore, ConnectionConfig, MemoryStore, PostgresStore, QueryExecutor, SavedConnections,
};
use querymodel::export::{render, ExportFormat};
use querymodel::model::ExecutableQuery;
use querymodel::{
    ContextCache, FileConfigSource, QueryModelConfig, QueryModelService, ServiceError,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Alias-driven ad-hoc filter queries over a relational model
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Query model file (default: <config dir>/querymodel/model.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run against a saved connection by name
    #[arg(long = "connect", global = true, conflicts_with = "demo")]
    connect: Option<String>,

    /// Serve rows from a JSON file instead of PostgreSQL
    #[arg(long, global = true)]
    demo: Option<PathBuf>,

    /// Execution timeout in milliseconds
    #[arg(long = "timeout-ms", global = true, default_value_t = 30_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the find keyword
    Keyword,
    /// List entities
    Entities,
    /// List the attributes of an entity
    Attributes { entity: String },
    /// List the operators applicable to an attribute
    Operators { entity: String, attribute: String },
    /// Show the possible values for an attribute and operator
    Values {
        entity: String,
        attribute: String,
        operator: String,
    },
    /// List separator aliases
    Separators,
    /// Execute a query read from a JSON file
    Run {
        query: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Table)]
        format: ExportFormat,
    },
    /// Print the SQL a query compiles to, with literals inlined
    Compile { query: PathBuf },
    /// Build the query model and report every configuration issue
    Check,
}

impl Command {
    fn needs_store(&self) -> bool {
        matches!(self, Command::Values { .. } | Command::Run { .. })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(QueryModelConfig::default_path);
    let source = Arc::new(FileConfigSource::new(config_path));
    let cache = Arc::new(ContextCache::new(source));

    let store: Arc<dyn BackingStore> = if cli.command.needs_store() {
        open_store(&cli)?
    } else {
        Arc::new(MemoryStore::new())
    };
    let executor = QueryExecutor::new(store, Duration::from_millis(cli.timeout_ms));
    let service = QueryModelService::new(cache, executor);

    let outcome = match cli.command {
        Command::Keyword => service.find_keyword().map(|k| println!("{}", k)),
        Command::Entities => service.entity_names().map(print_lines),
        Command::Attributes { entity } => service.attribute_names(&entity).map(print_lines),
        Command::Operators { entity, attribute } => {
            service.operator_names(&entity, &attribute).map(print_lines)
        }
        Command::Values {
            entity,
            attribute,
            operator,
        } => match service.possible_values(&entity, &attribute, &operator).await {
            Ok(view) => {
                println!("{}", serde_json::to_string_pretty(&view)?);
                Ok(())
            }
            Err(err) => Err(err),
        },
        Command::Separators => service.separator_names().map(print_lines),
        Command::Run { query, format } => {
            let query = read_query(&query)?;
            service
                .execute_query(query)
                .await
                .map(|view| print!("{}", render(&view, format)))
        }
        Command::Compile { query } => service
            .compile_query(read_query(&query)?)
            .map(|sql| println!("{}", sql)),
        Command::Check => service.reload_context().map(|()| println!("ok")),
    };

    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(err),
    })
}

fn report(err: ServiceError) -> ExitCode {
    match err {
        ServiceError::Invalid(invalid) => {
            eprintln!("Invalid request: {}", invalid);
            ExitCode::from(2)
        }
        ServiceError::Configuration(config) => {
            eprintln!("Configuration is invalid:");
            for issue in config.issues() {
                eprintln!("  - {}", issue);
            }
            ExitCode::from(3)
        }
        ServiceError::Failure(envelope) => {
            eprintln!("{}", envelope);
            ExitCode::FAILURE
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn read_query(path: &Path) -> Result<ExecutableQuery> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid query", path.display()))
}

fn open_store(cli: &Cli) -> Result<Arc<dyn BackingStore>> {
    if let Some(path) = &cli.demo {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read demo data {}", path.display()))?;
        return Ok(Arc::new(MemoryStore::from_json(&content)?));
    }

    let mut config = match &cli.connect {
        Some(name) => match SavedConnections::find(name)? {
            Some(config) => config,
            None => {
                let saved: Vec<String> = SavedConnections::load()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| format!("  - {}", c.name))
                    .collect();
                anyhow::bail!(
                    "no saved connection named {:?}\nSaved connections:\n{}",
                    name,
                    saved.join("\n")
                );
            }
        },
        None => ConnectionConfig::default(),
    };

    // Resolve password: PGPASSWORD env var, then interactive prompt
    if config.password.is_empty() {
        if let Ok(pw) = std::env::var("PGPASSWORD") {
            config.password = pw;
        } else if cli.connect.is_some() {
            let prompt = format!("Password for {}: ", config.display_string());
            config.password = rpassword::read_password_from_tty(Some(&prompt))?;
        }
    }

    Ok(Arc::new(PostgresStore::connect(&config)?))
}
