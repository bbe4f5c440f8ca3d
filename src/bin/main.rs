//! rowpipe CLI - stream a tab-delimited file through a worker process
//!
//! Usage:
//!   rowpipe run --worker <path> --input <file.tsv> --input-types <types> --output-types <types>
//!   rowpipe config
//!
//! Examples:
//!   rowpipe run --worker ./my-worker --input rows.tsv --input-types int64,string --output-types string
//!   rowpipe run --worker ./my-worker --format binary --input rows.tsv --input-types double --output-types double
//!   rowpipe config --config ./rowpipe.toml

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rowpipe::codec::TextCodec;
use rowpipe::config::{Settings, SettingsError};
use rowpipe::exchange::{Exchange, MemorySource, OutputCursor, RowSink};
use rowpipe::types::{DataType, Field, RowBatch, Schema, Value};
use rowpipe::wire::WireFormat;
use rowpipe::worker::{ChannelOptions, WorkerCommand};
use rowpipe::{ExchangeError, ExchangeResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowpipe")]
#[command(about = "Stream typed rows through an external worker process")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ROWPIPE_CONFIG, ./rowpipe.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one exchange and print the worker's rows as JSON lines
    Run {
        /// Worker executable
        #[arg(short, long)]
        worker: Option<String>,

        /// Argument passed to the worker (repeatable)
        #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Wire format: text or binary
        #[arg(short, long)]
        format: Option<WireFormat>,

        /// Tab-delimited input file, one row per line
        #[arg(short, long)]
        input: PathBuf,

        /// Comma-separated input column types
        #[arg(long)]
        input_types: String,

        /// Comma-separated input column names
        #[arg(long)]
        input_names: Option<String>,

        /// Comma-separated output column types
        #[arg(long)]
        output_types: Option<String>,

        /// Comma-separated output column names
        #[arg(long)]
        output_names: Option<String>,

        /// Rows per batch sent to the worker
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Print the effective settings as TOML
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&settings.logging.filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            worker,
            args,
            format,
            input,
            input_types,
            input_names,
            output_types,
            output_names,
            chunk_size,
        } => {
            let mut settings = settings;
            if let Some(worker) = worker {
                settings.worker.path = Some(worker);
            }
            settings.worker.args.extend(args);
            if let Some(format) = format {
                settings.format.kind = format;
            }
            if let Some(types) = output_types {
                settings.output.types = split_list(&types);
            }
            if let Some(names) = output_names {
                settings.output.names = split_list(&names);
            }
            if let Some(chunk_size) = chunk_size {
                settings.output.chunk_size = chunk_size;
            }
            let input_schema = match input_schema(&input_types, input_names.as_deref()) {
                Ok(schema) => schema,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            cmd_run(&settings, &input, input_schema).await
        }
        Commands::Config => cmd_config(&settings),
    }
}

async fn cmd_run(settings: &Settings, input: &Path, input_schema: Schema) -> ExitCode {
    let (command, output_schema, text, options) = match exchange_parts(settings) {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let content = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let rows = match parse_rows(&content, &input_schema, &text) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Error parsing '{}': {}", input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let mut source =
        match MemorySource::from_rows(input_schema.clone(), rows, settings.output.chunk_size) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };

    let exchange = match Exchange::spawn(&command, input_schema, output_schema, text, options).await
    {
        Ok(exchange) => exchange,
        Err(e) => {
            eprintln!("Error starting exchange: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut sink = JsonLinesSink::new(std::io::stdout());
    match exchange.run(&mut source, &mut sink).await {
        Ok(summary) if summary.aborted() => {
            eprintln!("{}", summary);
            ExitCode::FAILURE
        }
        Ok(summary) => {
            eprintln!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn exchange_parts(
    settings: &Settings,
) -> Result<(WorkerCommand, Schema, TextCodec, ChannelOptions), SettingsError> {
    settings.validate()?;
    Ok((
        settings.worker_command()?,
        settings.output_schema()?,
        settings.text_codec()?,
        settings.channel_options()?,
    ))
}

fn cmd_config(settings: &Settings) -> ExitCode {
    match settings.to_toml() {
        Ok(toml) => {
            print!("{}", toml);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn input_schema(types: &str, names: Option<&str>) -> Result<Schema, String> {
    let types = DataType::parse_list(types);
    if types.is_empty() {
        return Err("--input-types must name at least one type".to_string());
    }
    let Some(names) = names else {
        return Ok(Schema::from_types(&types));
    };
    let names = split_list(names);
    if names.len() != types.len() {
        return Err(format!(
            "{} input types but {} input names",
            types.len(),
            names.len()
        ));
    }
    Ok(Schema::new(
        names
            .into_iter()
            .zip(types)
            .map(|(name, data_type)| Field::new(name, data_type))
            .collect(),
    ))
}

/// Parse tab-delimited input with the same cell rules the worker replies use.
fn parse_rows(content: &str, schema: &Schema, text: &TextCodec) -> ExchangeResult<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    for (row, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let cells = text.split_row(line);
        if cells.len() != schema.len() {
            return Err(ExchangeError::ColumnCountMismatch {
                expected: schema.len(),
                actual: cells.len(),
            });
        }
        let values = cells
            .iter()
            .zip(schema.types())
            .enumerate()
            .map(|(col, (cell, data_type))| {
                text.decode_text(cell, data_type)
                    .map_err(|e| e.at_cell(row, col))
            })
            .collect::<ExchangeResult<Vec<_>>>()?;
        rows.push(values);
    }
    Ok(rows)
}

/// Writes each appended row as one JSON object per line.
struct JsonLinesSink<W> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    fn new(out: W) -> Self {
        Self { out }
    }
}

#[async_trait]
impl<W: Write + Send> RowSink for JsonLinesSink<W> {
    async fn append(&mut self, batch: RowBatch, _cursor: OutputCursor) -> ExchangeResult<()> {
        let names: Vec<&str> = batch.columns().iter().map(|c| c.name()).collect();
        for row in batch.rows() {
            let object: serde_json::Map<String, serde_json::Value> = names
                .iter()
                .zip(row)
                .map(|(name, value)| {
                    let json = serde_json::to_value(&value).unwrap_or(serde_json::Value::Null);
                    (name.to_string(), json)
                })
                .collect();
            writeln!(self.out, "{}", serde_json::Value::Object(object))
                .map_err(ExchangeError::SinkFailed)?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> ExchangeResult<()> {
        self.out.flush().map_err(ExchangeError::SinkFailed)
    }
}
