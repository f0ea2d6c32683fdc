//! scd-pattern: SCD code generator CLI
//!
//! # Usage
//!
//! ```bash
//! # Generate SQL blocks and table mapping
//! scd-pattern generate config.json --catalog storage.json
//!
//! # Also create the snapshot table in the catalog
//! scd-pattern generate config.json --catalog storage.json --create-snapshot
//!
//! # Show the statements only
//! scd-pattern sql config.json --catalog storage.json
//! ```

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use colored::*;
use scd_pattern::generator::resolve;
use scd_pattern::prelude::*;
use scd_pattern::resolver::InputTableResolver;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scd-pattern")]
#[command(version)]
#[command(about = "Slowly changing dimension SQL generator", long_about = None)]
#[command(after_help = "EXAMPLES:
    scd-pattern generate config.json --catalog storage.json
    scd-pattern generate config.json --catalog storage.json --create-snapshot -o out.json
    scd-pattern sql config.json --catalog storage.json
    scd-pattern table-id config.json")]
struct Cli {
    /// JSON storage catalog (overrides `catalog` in scd.toml)
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    /// Project feature gates, separated by `;`
    #[arg(long, global = true, env = "KBC_PROJECT_FEATURE_GATES")]
    feature_gate: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate SQL blocks and the table mapping
    Generate {
        /// Component configuration file
        config: PathBuf,

        /// Create the snapshot table when it does not exist
        #[arg(long)]
        create_snapshot: bool,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the generated statements
    Sql {
        /// Component configuration file
        config: PathBuf,
    },
    /// Show the computed template variables and snapshot layout
    Explain {
        /// Component configuration file
        config: PathBuf,
    },
    /// Print the snapshot table id
    TableId {
        /// Component configuration file
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        let user_error = e
            .downcast_ref::<ScdError>()
            .map_or(true, ScdError::is_user_error);
        std::process::exit(if user_error { 1 } else { 2 });
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("scd_pattern=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut runtime = RuntimeConfig::discover()?;
    if let Some(gates) = &cli.feature_gate {
        runtime = runtime.with_feature_gate_list(gates);
    }
    if let Some(catalog) = &cli.catalog {
        runtime.catalog = Some(catalog.clone());
    }

    match &cli.command {
        Commands::Generate {
            config,
            create_snapshot,
            output,
        } => generate_command(config, &runtime, *create_snapshot, output.as_deref()),
        Commands::Sql { config } => sql_command(config, &runtime),
        Commands::Explain { config } => explain_command(config, &runtime),
        Commands::TableId { config } => table_id_command(config),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ComponentConfig> {
    ComponentConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn open_catalog(runtime: &RuntimeConfig) -> anyhow::Result<JsonCatalog> {
    let path = runtime.catalog.as_ref().ok_or_else(|| {
        ScdError::config("No storage catalog configured. Use --catalog or set `catalog` in scd.toml.")
    })?;
    Ok(JsonCatalog::open(path)?)
}

fn generate_command(
    config_path: &Path,
    runtime: &RuntimeConfig,
    create_snapshot: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut catalog = open_catalog(runtime)?;

    let result = if create_snapshot {
        generate_with_snapshot(&config, runtime, &mut catalog)?
    } else {
        generate(&config, &catalog)?
    };
    let json = serde_json::to_string_pretty(&result)?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote result to {}", "✓".green(), path.display().to_string().cyan());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn sql_command(config_path: &Path, runtime: &RuntimeConfig) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let catalog = open_catalog(runtime)?;
    let result = generate(&config, &catalog)?;

    for (i, statement) in result.statements().enumerate() {
        println!("{}", format!("-- [{}]", i + 1).dimmed());
        println!("{}", statement);
        println!();
    }
    Ok(())
}

fn explain_command(config_path: &Path, runtime: &RuntimeConfig) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let catalog = open_catalog(runtime)?;
    let resolved = resolve(&config, &catalog)?;

    println!("{}", "SCD Pattern".cyan().bold());
    println!();
    println!("  {} {}", "Variant:".dimmed(), resolved.variant.to_string().cyan());
    println!("  {} {}", "Backend:".dimmed(), resolved.parameters.backend().to_string().cyan());
    println!("  {} {}", "Source:".dimmed(), resolved.source_table_id.to_string().white());
    println!("  {} {}", "Snapshot:".dimmed(), resolved.snapshot_table_id.yellow());
    println!("  {}", "Snapshot columns:".dimmed());
    for column in &resolved.schema.typed_columns {
        let length = column
            .definition
            .length
            .as_ref()
            .map(|l| format!("({})", l))
            .unwrap_or_default();
        println!(
            "    • {} {}{}",
            column.name.white(),
            column.definition.type_name.dimmed(),
            length.dimmed()
        );
    }

    println!();
    println!("{}", "Template variables:".green().bold());
    println!("{}", serde_json::to_string_pretty(&resolved.context())?);
    Ok(())
}

fn table_id_command(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    // Resolving the source table needs no schema, so nothing is looked up.
    let catalog = JsonCatalog::in_memory();
    let resolver = InputTableResolver::new(config.input_tables(), &catalog);
    let source = TableId::parse(resolver.source_table_id()?)?;

    let id = TableIdGenerator::new(config.parameters.hash()?, &source)
        .snapshot_table(&config.parameters.snapshot_table_name);
    println!("{}", id);
    Ok(())
}
