//! rowmap - compile and run table statements from a table file.
//!
//! # Usage
//!
//! ```bash
//! # Show the DDL for a table file
//! rowmap create --table orders.toml --dialect sqlite --dry-run
//!
//! # Select with filters
//! rowmap select --table orders.toml --column id --column total --filter user_id=7
//!
//! # Insert one row, or a JSON array of rows in one transaction
//! rowmap insert --table orders.toml --set id=1 --set total=9.5
//! rowmap insert --table orders.toml --rows orders.json
//! ```

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use rowmap::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowmap")]
#[command(version)]
#[command(about = "Compiled SQL for declared tables", long_about = None)]
#[command(after_help = "EXAMPLES:
    rowmap create --table orders.toml --dialect sqlite --dry-run
    rowmap select --table orders.toml --filter user_id=7 --format json
    rowmap insert --table orders.toml --set id=1 --set total=9.5")]
struct Cli {
    /// Config file (default: $CONFIG_DIR/rowmap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, global = true, env = "ROWMAP_DATABASE_URL")]
    database_url: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Table file (TOML)
    #[arg(short, long)]
    table: PathBuf,

    /// Don't execute, just show the generated SQL
    #[arg(short, long)]
    dry_run: bool,

    /// Dialect for DDL when no database is used
    #[arg(long, value_enum)]
    dialect: Option<DialectArg>,
}

#[derive(Subcommand)]
enum Commands {
    /// CREATE TABLE IF NOT EXISTS
    Create(Target),
    /// DROP TABLE IF EXISTS
    Drop(Target),
    /// Select rows
    Select {
        #[command(flatten)]
        target: Target,

        /// Column to select (repeatable, default: all)
        #[arg(short, long)]
        column: Vec<String>,

        /// Equality filter `col=value` (repeatable)
        #[arg(short, long)]
        filter: Vec<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Insert rows
    Insert {
        #[command(flatten)]
        target: Target,

        /// Column to insert (repeatable, default: all)
        #[arg(short, long)]
        column: Vec<String>,

        /// Field value `col=value` for a single row (repeatable)
        #[arg(short, long, conflicts_with = "rows")]
        set: Vec<String>,

        /// JSON file holding an array of row objects, inserted in one transaction
        #[arg(long)]
        rows: Option<PathBuf>,
    },
    /// Show the column type mapping of every dialect
    Types,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Postgres,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "rowmap=debug" } else { "rowmap=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Types => {
            show_types();
            Ok(())
        }
        Commands::Create(target) => ddl(cli, target, true).await,
        Commands::Drop(target) => ddl(cli, target, false).await,
        Commands::Select {
            target,
            column,
            filter,
            format,
        } => select(cli, target, column, filter, *format).await,
        Commands::Insert {
            target,
            column,
            set,
            rows,
        } => insert(cli, target, column, set, rows.as_ref()).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::discover(cli.config.as_deref()).context("loading config")?;
    config.apply_env(cli.database_url.clone());
    Ok(config)
}

fn load_table(target: &Target) -> Result<(TableDef, TableDescriptor<DynamicRow>)> {
    let def = TableDef::load(&target.table).with_context(|| format!("reading {}", target.table.display()))?;
    let table = def.to_descriptor()?;
    Ok((def, table))
}

/// Connect unless this is a dry run or no URL is configured.
async fn connect(cli: &Cli, target: &Target) -> Result<Option<Database>> {
    let config = load_config(cli)?;
    if target.dry_run {
        return Ok(None);
    }
    if config.database_url.is_none() {
        println!(
            "{}",
            "⚠ No database URL. Use --database-url or set ROWMAP_DATABASE_URL".yellow()
        );
        return Ok(None);
    }
    if cli.verbose {
        println!("{} {}", "Connecting to:".dimmed(), config.require_url()?);
    }
    Ok(Some(Database::from_config(&config).await?))
}

fn show_sql(sql: &str, args: &[Value]) {
    println!("{}", "Generated SQL:".green().bold());
    println!("{}", sql.white());
    if !args.is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for (i, arg) in args.iter().enumerate() {
            println!("  ${} = {}", i + 1, arg.to_string().yellow());
        }
    }
}

async fn ddl(cli: &Cli, target: &Target, create: bool) -> Result<()> {
    let (_, table) = load_table(target)?;

    let Some(db) = connect(cli, target).await? else {
        let dialect = target.dialect.map(Dialect::from).unwrap_or_default();
        let template = if create {
            build_create_table(&table, dialect)
        } else {
            build_drop_table(&table)
        };
        show_sql(template.sql(), &[]);
        return Ok(());
    };

    if create {
        db.create_table_with(&table).await?;
        println!("{} created {}", "✓".green(), table.qualified_name().cyan());
    } else {
        db.drop_table_with(&table).await?;
        println!("{} dropped {}", "✓".green(), table.qualified_name().cyan());
    }
    Ok(())
}

async fn select(cli: &Cli, target: &Target, columns: &[String], filters: &[String], format: OutputFormat) -> Result<()> {
    let (def, table) = load_table(target)?;

    let filters = filters
        .iter()
        .map(|pair| -> Result<Filter> {
            let (name, text) = split_pair(pair)?;
            let ty = def
                .column_type(name)
                .with_context(|| format!("unknown filter column '{}'", name))?;
            Ok(Filter::eq(name, Value::parse_as(text, ty)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    table.select_columns_strict(&names)?;

    let Some(db) = connect(cli, target).await? else {
        let template = build_select(&table, &filters, &names);
        show_sql(template.sql(), &template.filter_values());
        return Ok(());
    };

    let query = db.compile_query_with(Arc::new(table), &filters, &names);
    let headers: Vec<String> = query.template().columns().iter().map(|c| c.name().to_string()).collect();
    // Scanned rows are laid out by table position, not by selection order.
    let positions: Vec<usize> = headers.iter().filter_map(|h| def.position(h)).collect();
    let rows = query.run().await?;
    format_output(&headers, &positions, &rows, format);
    Ok(())
}

async fn insert(
    cli: &Cli,
    target: &Target,
    columns: &[String],
    set: &[String],
    rows_file: Option<&PathBuf>,
) -> Result<()> {
    let (def, table) = load_table(target)?;
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    table.select_columns_strict(&names)?;

    let input = InsertInput::read(&def, rows_file, set)?;

    let Some(db) = connect(cli, target).await? else {
        let template = build_insert(&table, &names);
        let binder = Binder::for_template(&template);
        for row in input.rows() {
            show_sql(template.sql(), &binder.values(Some(row)));
        }
        return Ok(());
    };

    let table = Arc::new(table);
    let affected = match &input {
        InsertInput::Single(row) => db.compile_insert_with(table, &names).run(row).await?.rows_affected,
        InsertInput::Batch(rows) => {
            let results = db.compile_batch_insert_with(table, &names).run(rows).await?;
            results.iter().map(|r| r.rows_affected).sum()
        }
    };
    println!("{} {} rows affected", "✓".green(), affected);
    Ok(())
}

/// `--set` pairs make one plain insert; a `--rows` file is always one
/// transaction, whatever its length.
#[derive(Debug, PartialEq)]
enum InsertInput {
    Single(DynamicRow),
    Batch(Vec<DynamicRow>),
}

impl InsertInput {
    fn read(def: &TableDef, rows_file: Option<&PathBuf>, set: &[String]) -> Result<Self> {
        match rows_file {
            Some(path) => Ok(Self::Batch(read_rows(def, path)?)),
            None => {
                let pairs = set.iter().map(|p| split_pair(p)).collect::<Result<Vec<_>>>()?;
                Ok(Self::Single(def.row_from_pairs(pairs)?))
            }
        }
    }

    fn rows(&self) -> &[DynamicRow] {
        match self {
            Self::Single(row) => std::slice::from_ref(row),
            Self::Batch(rows) => rows,
        }
    }
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.trim(), value)),
        _ => bail!("expected col=value, got '{}'", pair),
    }
}

fn read_rows(def: &TableDef, path: &PathBuf) -> Result<Vec<DynamicRow>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    objects
        .iter()
        .map(|object| -> Result<DynamicRow> {
            let mut row = DynamicRow::new(vec![Value::Null; def.columns.len()]);
            for (name, json) in object {
                let idx = def
                    .position(name)
                    .with_context(|| format!("unknown column '{}'", name))?;
                let value = match json {
                    serde_json::Value::Null => Value::Null,
                    serde_json::Value::String(s) => Value::parse_as(s, def.columns[idx].column_type)?,
                    other => Value::parse_as(&other.to_string(), def.columns[idx].column_type)?,
                };
                row.set(idx, value);
            }
            Ok(row)
        })
        .collect()
}

fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::TinyUint(v) => Json::from(*v),
        Value::Uint(v) => Json::from(*v),
        Value::BigUint(v) => Json::from(*v),
        Value::TinyInt(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::BigInt(v) => Json::from(*v),
        Value::Single(v) => Json::from(*v),
        Value::Double(v) => Json::from(*v),
        Value::String(s) => Json::String(s.clone()),
        Value::Timestamp(t) => Json::String(t.to_rfc3339()),
        other => Json::String(cell(other)),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_output(headers: &[String], positions: &[usize], rows: &[DynamicRow], format: OutputFormat) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .zip(positions)
                        .map(|(h, &idx)| (h.clone(), to_json(row.get(idx))))
                        .collect()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects).unwrap_or_default());
        }
        OutputFormat::Table => {
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| positions.iter().map(|&idx| cell(row.get(idx))).collect())
                .collect();
            print_table(headers, &cells);
            println!();
            println!("{} row(s) returned", rows.len().to_string().cyan());
        }
    }
}

fn print_table(headers: &[String], cells: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in cells {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.chars().count());
        }
    }

    let header: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:width$}", h, width = *w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:width$}", c, width = *w))
            .collect();
        println!("{}", line.join(" │ "));
    }
}

fn show_types() {
    println!(
        "{:12} {:20} {}",
        "Type".white().bold(),
        "Postgres".white().bold(),
        "SQLite".white().bold()
    );
    println!("{}", "─".repeat(48).dimmed());

    for ty in ColumnType::ALL {
        let name = serde_json::to_value(ty)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!(
            "{:12} {:20} {}",
            name.cyan(),
            Dialect::Postgres.resolve(ty).yellow(),
            Dialect::Sqlite.resolve(ty).yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const EVENTS: &str = r#"
        name = "events"

        [[columns]]
        name = "id"
        type = "big_int"

        [[columns]]
        name = "kind"
        type = "string"
    "#;

    #[test]
    fn test_single_row_file_is_a_batch() {
        let def = TableDef::from_toml(EVENTS).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": 1, "kind": "click"}}]"#).unwrap();
        let path = file.path().to_path_buf();

        let input = InsertInput::read(&def, Some(&path), &[]).unwrap();
        assert_eq!(
            input,
            InsertInput::Batch(vec![DynamicRow::new(vec![
                Value::BigInt(1),
                Value::String("click".into()),
            ])])
        );
    }

    #[test]
    fn test_set_pairs_are_a_single_insert() {
        let def = TableDef::from_toml(EVENTS).unwrap();
        let input = InsertInput::read(&def, None, &["kind=view".to_string()]).unwrap();
        assert_eq!(
            input,
            InsertInput::Single(DynamicRow::new(vec![Value::Null, Value::String("view".into())]))
        );
        assert_eq!(input.rows().len(), 1);
    }

    #[test]
    fn test_empty_rows_file() {
        let def = TableDef::from_toml(EVENTS).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        let path = file.path().to_path_buf();

        let input = InsertInput::read(&def, Some(&path), &[]).unwrap();
        assert_eq!(input, InsertInput::Batch(Vec::new()));
        assert!(input.rows().is_empty());
    }
}
