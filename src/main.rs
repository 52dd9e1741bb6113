//! heapdb command line: create tables, insert, scan and delete rows in a data directory

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser as ClapParser, Subcommand};
use heapdb::access::schema::{Column, Schema};
use heapdb::access::tuple::RecordId;
use heapdb::access::value::{Field, FieldType};
use heapdb::config::{BufferPoolConfig, DEFAULT_LOCK_TIMEOUT, DEFAULT_PAGES, DEFAULT_PAGE_SIZE};
use heapdb::database::Database;
use heapdb::error::DbResult;
use heapdb::executor::{self, AggregateExecutor, AggregateFunction, SeqScanExecutor};
use heapdb::storage::page::PageId;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

/// heapdb - a page-based storage engine with two-phase locking
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./heapdb_data")]
    data_dir: PathBuf,

    /// Number of pages the buffer pool holds
    #[arg(short, long, default_value_t = DEFAULT_PAGES)]
    pages: usize,

    /// Page size in bytes
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// How long to wait for a page lock before aborting, in milliseconds
    #[arg(long, default_value_t = DEFAULT_LOCK_TIMEOUT.as_millis() as u64)]
    lock_timeout_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a table from columns written as type:name, e.g. int:id string:name
    Create {
        table: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Insert one row; values are given in column order
    Insert {
        table: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Print every row of a table
    Scan { table: String },
    /// Delete the row at a page and slot
    Delete { table: String, page: u32, slot: u16 },
    /// Compute count, sum, avg, min or max of a column, optionally per group
    Aggregate {
        table: String,
        function: String,
        column: String,
        #[arg(long)]
        group_by: Option<String>,
    },
    /// List tables and buffer pool settings
    Stats,
}

impl Args {
    fn buffer_pool_config(&self) -> BufferPoolConfig {
        BufferPoolConfig::new(self.pages)
            .with_page_size(self.page_size)
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let db = Database::open(&args.data_dir, args.buffer_pool_config())
        .with_context(|| format!("Failed to open database in {}", args.data_dir.display()))?;

    match args.command {
        Command::Create { table, columns } => {
            let schema = parse_columns(&columns)?;
            let table_id = db
                .create_table(&table, schema)
                .with_context(|| format!("Failed to create table '{}'", table))?;
            info!("created table '{}' ({})", table, table_id);
        }
        Command::Insert { table, values } => {
            let table_id = db.table(&table)?;
            let schema = db.catalog().schema_of(table_id)?;
            if values.len() != schema.num_fields() {
                bail!(
                    "table '{}' has {} columns, got {} values",
                    table,
                    schema.num_fields(),
                    values.len()
                );
            }
            let fields = schema
                .columns()
                .iter()
                .zip(&values)
                .map(|(column, value)| Field::parse_str(column.field_type, value))
                .collect::<DbResult<Vec<_>>>()?;
            let rid = db.with_transaction(|tid| db.insert(tid, table_id, fields))?;
            println!("inserted at page {} slot {}", rid.page_id.page_no, rid.slot);
        }
        Command::Scan { table } => {
            let table_id = db.table(&table)?;
            let schema = db.catalog().schema_of(table_id)?;
            let rows =
                db.with_transaction(|tid| db.scan(tid, table_id).collect::<DbResult<Vec<_>>>())?;
            println!("{}", schema);
            for row in &rows {
                match row.record_id() {
                    Some(rid) => println!("{}:{}\t{}", rid.page_id.page_no, rid.slot, row),
                    None => println!("?\t{}", row),
                }
            }
            println!("({} rows)", rows.len());
        }
        Command::Delete { table, page, slot } => {
            let table_id = db.table(&table)?;
            let rid = RecordId::new(PageId::new(table_id, page), slot);
            let row = db.with_transaction(|tid| db.delete(tid, rid))?;
            println!("deleted {}", row);
        }
        Command::Aggregate {
            table,
            function,
            column,
            group_by,
        } => {
            let table_id = db.table(&table)?;
            let schema = db.catalog().schema_of(table_id)?;
            let index_of = |name: &str| {
                schema
                    .field_index(name)
                    .ok_or_else(|| anyhow!("table '{}' has no column '{}'", table, name))
            };
            let field = index_of(&column)?;
            let group_by = group_by.as_deref().map(index_of).transpose()?;
            let function: AggregateFunction = function.parse()?;

            let rows = db.with_transaction(|tid| {
                let scan = SeqScanExecutor::new(db.buffer_pool().clone(), tid, table_id)?;
                let mut agg = AggregateExecutor::new(Box::new(scan), group_by, field, function)?;
                executor::collect(&mut agg)
            })?;
            for row in &rows {
                println!("{}", row);
            }
        }
        Command::Stats => {
            let pool = db.buffer_pool();
            println!("data directory: {}", db.data_dir().display());
            println!(
                "buffer pool: {} pages of {} bytes, lock timeout {:?}",
                pool.capacity(),
                pool.config().page_size,
                pool.config().lock_timeout
            );
            for table_id in db.catalog().table_ids() {
                let file = db.catalog().storage_file(table_id)?;
                println!(
                    "table {} '{}': {} pages, schema ({})",
                    table_id,
                    db.catalog().table_name(table_id).unwrap_or_default(),
                    file.num_pages()?,
                    file.schema()
                );
            }
        }
    }

    Ok(())
}

/// Parses `type:name` column arguments
fn parse_columns(args: &[String]) -> Result<Schema> {
    let columns = args
        .iter()
        .map(|arg| -> Result<Column> {
            let (ty, name) = arg
                .split_once(':')
                .ok_or_else(|| anyhow!("column '{}' is not of the form type:name", arg))?;
            let field_type: FieldType = ty.parse()?;
            Ok(Column::new(name, field_type))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(columns)?)
}
