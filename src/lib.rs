pub mod association;
pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod days_open;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod io_utils;
pub mod report;
pub mod timing;
pub mod top_n;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    association::pairwise_associations,
    cli::{Cli, Commands},
    config::Config,
    dataset::Dataset,
    days_open::DateColumns,
    filter::ConditionFilter,
    ingest::IngestOptions,
    io_utils::CsvOptions,
    report::{format_number, print_table},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sinan_stats", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;
    debug!("Configuration: {config:?}");
    let label = command_label(&cli.command);
    let (result, _) = timing::measure(label, || dispatch(&cli.command, &config));
    result
}

fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Ingest(_) => "ingest",
        Commands::Associate(_) => "associate",
        Commands::Top(_) => "top",
        Commands::DaysOpen(_) => "days-open",
        Commands::Months(_) => "months",
        Commands::Datasets => "datasets",
    }
}

fn dispatch(command: &Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Ingest(args) => handle_ingest(args, config),
        Commands::Associate(args) => handle_associate(args),
        Commands::Top(args) => handle_top(args, config),
        Commands::DaysOpen(args) => handle_days_open(args),
        Commands::Months(args) => handle_months(args),
        Commands::Datasets => handle_datasets(config),
    }
}

fn load_input(args: &cli::InputArgs) -> Result<Dataset> {
    let options = CsvOptions::new(args.delimiter, args.input_encoding.as_deref())?;
    let dataset = Dataset::from_csv_path(&args.input, &options)?;
    info!(
        "Loaded {} row(s) and {} column(s) from {:?}",
        dataset.row_count(),
        dataset.column_count(),
        args.input
    );
    Ok(dataset)
}

fn handle_ingest(args: &cli::IngestArgs, config: &Config) -> Result<()> {
    let source = args.input.clone().unwrap_or_else(|| config.source_path());
    let lookup = args.lookup.clone().unwrap_or_else(|| config.lookup_path());
    let options = IngestOptions {
        chunk_size: args.chunk_size.unwrap_or(config.chunk_size),
        workers: args.workers.unwrap_or(config.workers),
        lookup_key: args.lookup_key.clone(),
        lookup_columns: args.lookup_columns.clone(),
        columns: args.columns.clone(),
        csv: CsvOptions::new(args.delimiter, args.input_encoding.as_deref())?,
    };
    let filter = ConditionFilter::parse(&args.filters)?;
    let dataset = ingest::ingest(&source, &lookup, &filter, &options)?;
    let output_delimiter = options
        .csv
        .delimiter_for(args.output.as_deref().unwrap_or(source.as_path()));
    dataset
        .write_csv(args.output.as_deref(), output_delimiter)
        .with_context(|| match &args.output {
            Some(path) => format!("Writing ingested dataset to {path:?}"),
            None => "Writing ingested dataset to stdout".to_string(),
        })?;
    info!("Wrote {} row(s)", dataset.row_count());
    Ok(())
}

fn handle_associate(args: &cli::AssociateArgs) -> Result<()> {
    let dataset = load_input(&args.input)?;
    let pairs = pairwise_associations(&dataset, &args.columns)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
        return Ok(());
    }
    let rows = pairs
        .iter()
        .map(|pair| {
            let a = &pair.association;
            vec![
                pair.left.clone(),
                pair.right.clone(),
                a.n.to_string(),
                format!("{}x{}", a.rows, a.cols),
                format_number(a.chi_square),
                a.cramers_v.map(format_number).unwrap_or_else(|| "n/a".to_string()),
                format_number(a.contingency_coefficient),
            ]
        })
        .collect::<Vec<_>>();
    print_table(
        &[
            "left",
            "right",
            "n",
            "table",
            "chi_square",
            "cramers_v",
            "contingency",
        ],
        &rows,
    );
    info!("Measured {} column pair(s)", pairs.len());
    Ok(())
}

fn handle_top(args: &cli::TopArgs, config: &Config) -> Result<()> {
    let dataset = load_input(&args.input)?;
    let k = args.k.unwrap_or(config.max_set_size);
    let ranked = top_n::top_k(&dataset, &args.columns, k)?;
    let rows = ranked
        .into_iter()
        .map(|(name, count)| vec![name, count.to_string()])
        .collect::<Vec<_>>();
    print_table(&["column", "non_missing"], &rows);
    Ok(())
}

fn handle_days_open(args: &cli::DaysOpenArgs) -> Result<()> {
    let dataset = load_input(&args.input)?;
    let columns = DateColumns {
        opened: args.opened.clone(),
        closed: args.closed.clone(),
    };
    let summary = days_open::days_open_stats_with(&dataset, &columns, &args.cutoff, args.period)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    let rows = [
        ("total_records", summary.total_records.to_string()),
        ("sum_of_days", summary.sum_of_days.to_string()),
        ("average_days", format_number(summary.average_days)),
        ("std_dev", format_number(summary.std_dev)),
        ("median", format_number(summary.median)),
        ("q1", format_number(summary.q1)),
        ("q3", format_number(summary.q3)),
        ("min", summary.min.to_string()),
        ("max", summary.max.to_string()),
    ]
    .into_iter()
    .map(|(name, value)| vec![name.to_string(), value])
    .collect::<Vec<_>>();
    print_table(&["statistic", "value"], &rows);
    info!("Summarised cases notified {} {}", args.period, args.cutoff);
    Ok(())
}

fn handle_months(args: &cli::MonthsArgs) -> Result<()> {
    let dataset = load_input(&args.input)?;
    let histogram = days_open::month_histogram(&dataset, &args.column)?;
    let rows = (1..=12u32)
        .map(|month| vec![month.to_string(), histogram.count(month).to_string()])
        .collect::<Vec<_>>();
    print_table(&["month", "count"], &rows);
    if histogram.unparsed > 0 {
        info!(
            "{} row(s) in '{}' had no usable date",
            histogram.unparsed, args.column
        );
    }
    Ok(())
}

fn handle_datasets(config: &Config) -> Result<()> {
    for name in config.datasets()? {
        println!("{name}");
    }
    Ok(())
}
