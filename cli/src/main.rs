use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use relstore_core::{MigrationDescriptor, Value};
use relstore_sqlite::{AdapterOptions, ExecuteResult, SqliteAdapter};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "relstore")]
#[command(about = "Migrate, query, and inspect SQLite databases", version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply a migration descriptor (JSON or YAML) to its table.
    Migrate(MigrateArgs),
    /// Execute one SQL statement and print rows as JSON lines.
    Exec(ExecArgs),
    /// Show columns, indexes, and migration version of a table.
    Inspect(InspectArgs),
    /// Allocate the next identity value for an entity attribute.
    Identity(IdentityArgs),
}

#[derive(Debug, Args)]
struct DbArgs {
    /// Path to the SQLite database file (":memory:" for a scratch database).
    #[arg(long, conflicts_with = "config")]
    db: Option<String>,
    /// Adapter options file (YAML or JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[command(flatten)]
    db: DbArgs,
    /// Migration descriptor file.
    #[arg(long)]
    descriptor: PathBuf,
}

#[derive(Debug, Args)]
struct ExecArgs {
    #[command(flatten)]
    db: DbArgs,
    /// SQL statement with `?` placeholders.
    sql: String,
    /// Placeholder value, in order. Integers, reals, and `null` are recognized.
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(Debug, Args)]
struct InspectArgs {
    #[command(flatten)]
    db: DbArgs,
    /// Table to inspect.
    table: String,
}

#[derive(Debug, Args)]
struct IdentityArgs {
    #[command(flatten)]
    db: DbArgs,
    /// Entity (table) name.
    #[arg(long)]
    entity: String,
    /// Attribute (column) name.
    #[arg(long)]
    attribute: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Migrate(args) => run_migrate(args),
        Command::Exec(args) => run_exec(args),
        Command::Inspect(args) => run_inspect(args),
        Command::Identity(args) => run_identity(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let mut descriptor = load_descriptor(&args.descriptor)?;
    let mut adapter = open_adapter(&args.db)?;
    let outcome = adapter
        .migrate(&mut descriptor)
        .map_err(|e| format!("Migration of '{}' failed: {e}", descriptor.applies_to))?;
    println!(
        "{} {}: {outcome}",
        descriptor.applies_to, descriptor.version
    );
    adapter.close();
    Ok(())
}

fn run_exec(args: ExecArgs) -> Result<(), String> {
    let values: Vec<Value> = args.params.iter().map(|raw| parse_param(raw)).collect();
    let mut adapter = open_adapter(&args.db)?;
    let result = adapter
        .execute(args.sql.as_str(), &values)
        .map_err(|e| e.to_string())?;
    match result {
        ExecuteResult::Rows(rows) => {
            for row in rows {
                let line = serde_json::to_string(&row)
                    .map_err(|e| format!("Failed to serialize row: {e}"))?;
                println!("{line}");
            }
        }
        ExecuteResult::Affected {
            changes,
            last_insert_id,
        } => {
            println!("{changes} row(s) affected (last insert id {last_insert_id})");
        }
    }
    adapter.close();
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<(), String> {
    let mut adapter = open_adapter(&args.db)?;
    let mut table = adapter.table(args.table.as_str());
    if !table.exists().map_err(|e| e.to_string())? {
        return Err(format!("Table '{}' does not exist", args.table));
    }
    let version = table.version().map_err(|e| e.to_string())?;
    let columns = table.columns().map_err(|e| e.to_string())?;

    println!("Table: {}", args.table);
    println!("  Version: {version}");
    println!("  Columns:");
    for column in &columns {
        let mut flags = Vec::new();
        if column.primary {
            flags.push("primary");
        }
        if !column.nullable {
            flags.push("not null");
        }
        let type_text = if column.type_text.is_empty() {
            "(untyped)"
        } else {
            column.type_text.as_str()
        };
        if flags.is_empty() {
            println!("    {} {type_text}", column.name);
        } else {
            println!("    {} {type_text} [{}]", column.name, flags.join(", "));
        }
    }

    let mut indexes = adapter.indexes(args.table.as_str());
    let indexes = indexes.list().map_err(|e| e.to_string())?;
    if !indexes.is_empty() {
        println!("  Indexes:");
        for index in indexes {
            println!("    {} ({})", index.name, index.columns.join(", "));
        }
    }
    Ok(())
}

fn run_identity(args: IdentityArgs) -> Result<(), String> {
    let mut adapter = open_adapter(&args.db)?;
    let value = adapter
        .select_identity(&args.entity, &args.attribute)
        .map_err(|e| e.to_string())?;
    println!("{value}");
    adapter.close();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_adapter(args: &DbArgs) -> Result<SqliteAdapter, String> {
    let options = match (&args.db, &args.config) {
        (Some(db), _) => AdapterOptions::new(db.as_str()),
        (None, Some(config)) => AdapterOptions::load(config).map_err(|e| e.to_string())?,
        (None, None) => return Err("Specify a database with --db or --config".to_string()),
    };
    let mut adapter = SqliteAdapter::new(options);
    adapter.open().map_err(|e| e.to_string())?;
    Ok(adapter)
}

/// Loads a migration descriptor, as JSON when the extension says so and YAML otherwise.
fn load_descriptor(path: &Path) -> Result<MigrationDescriptor, String> {
    let file = File::open(path)
        .map_err(|e| format!("Failed to open descriptor '{}': {e}", path.display()))?;
    let reader = BufReader::new(file);
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_reader(reader)
            .map_err(|e| format!("Invalid JSON descriptor '{}': {e}", path.display()))
    } else {
        serde_yaml::from_reader(reader)
            .map_err(|e| format!("Invalid YAML descriptor '{}': {e}", path.display()))
    }
}

fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Real(f),
        _ => Value::Text(raw.to_string()),
    }
}
