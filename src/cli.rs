use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::days_open::{DEFAULT_CLOSED_COLUMN, DEFAULT_OPENED_COLUMN, Period};
use crate::ingest::{DEFAULT_LOOKUP_KEY, DEFAULT_LOOKUP_VALUE};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Ingest SINAN arbovirus case reports and compute association statistics",
    long_about = None
)]
pub struct Cli {
    /// YAML configuration file (folders, chunk size, workers)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read a large export in chunks, join region acronyms and filter rows
    Ingest(IngestArgs),
    /// Chi-square, Cramér's V and contingency coefficient for every column pair
    Associate(AssociateArgs),
    /// Rank columns by how many rows hold a value
    Top(TopArgs),
    /// Summarise how many days cases stayed open before or after a cutoff
    DaysOpen(DaysOpenArgs),
    /// Count rows per calendar month of a date column
    Months(MonthsArgs),
    /// List the files in the configured dataset folder
    Datasets,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Source export (defaults to the configured dataset folder)
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// Region lookup file (defaults to the configured files folder)
    #[arg(short = 'l', long = "lookup")]
    pub lookup: Option<PathBuf>,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Rows per chunk (overrides the configuration)
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,
    /// Filter worker threads, 0 for one per core (overrides the configuration)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Column shared by the source and the lookup file
    #[arg(long = "lookup-key", default_value = DEFAULT_LOOKUP_KEY)]
    pub lookup_key: String,
    /// Lookup columns to attach to every row
    #[arg(long = "lookup-columns", value_delimiter = ',', default_value = DEFAULT_LOOKUP_VALUE)]
    pub lookup_columns: Vec<String>,
    /// Source columns to read (all when omitted); the lookup key is always read
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Row-level filters such as `CLASSI_FIN=10` or `SIGLA_UF != SP`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// CSV delimiter character for the source and lookup files
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct AssociateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Categorical columns to compare pairwise
    #[arg(short = 'C', long = "columns", value_delimiter = ',', required = true, num_args = 1..)]
    pub columns: Vec<String>,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TopArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Columns to rank
    #[arg(short = 'C', long = "columns", value_delimiter = ',', required = true, num_args = 1..)]
    pub columns: Vec<String>,
    /// How many columns to keep (defaults to the configured max set size)
    #[arg(short = 'k', long = "top")]
    pub k: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DaysOpenArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Cutoff date, e.g. 2022-11-30 or 30/11/2022
    #[arg(long)]
    pub cutoff: String,
    /// Summarise cases notified `before` (inclusive) or `after` the cutoff
    #[arg(long, default_value = "before", value_parser = parse_period)]
    pub period: Period,
    /// Notification date column
    #[arg(long, default_value = DEFAULT_OPENED_COLUMN)]
    pub opened: String,
    /// Closing date column
    #[arg(long, default_value = DEFAULT_CLOSED_COLUMN)]
    pub closed: String,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct MonthsArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Date column to spread over months
    #[arg(short = 'c', long)]
    pub column: String,
}

pub fn parse_period(value: &str) -> Result<Period, String> {
    value.parse::<Period>().map_err(|err| err.to_string())
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
