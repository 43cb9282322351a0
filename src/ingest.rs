//! Chunked ingestion of large surveillance exports.
//!
//! The source file is read sequentially on the calling thread in chunks of at
//! most `chunk_size` rows. Each chunk is left-joined with the lookup table
//! and handed to a bounded rayon pool that runs the [`ChunkFilter`]. The pool
//! scope is the join barrier: every submitted chunk finishes before the
//! results are concatenated in submission order.
//!
//! Any failure while reading, merging or filtering turns into
//! [`StatsError::IngestionFailed`]; a partial dataset is never returned.
//! A column selection naming a column the source lacks fails up front with
//! [`StatsError::MissingColumn`].

use std::{
    any::Any,
    collections::BTreeMap,
    io::Read,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::mpsc,
};

use anyhow::{Context, anyhow};
use encoding_rs::Encoding;
use log::{debug, error, info};

use crate::{
    data::Value,
    dataset::{Column, Dataset, DatasetBuilder},
    error::{Result, StatsError},
    io_utils::{self, CsvOptions},
};

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;
pub const DEFAULT_LOOKUP_KEY: &str = "SG_UF_NOT";
pub const DEFAULT_LOOKUP_VALUE: &str = "SIGLA_UF";

/// Per-chunk filtering step run on the worker pool.
pub trait ChunkFilter: Send + Sync {
    fn apply(&self, chunk: Dataset) -> anyhow::Result<Dataset>;
}

impl<F> ChunkFilter for F
where
    F: Fn(Dataset) -> anyhow::Result<Dataset> + Send + Sync,
{
    fn apply(&self, chunk: Dataset) -> anyhow::Result<Dataset> {
        self(chunk)
    }
}

/// Identity filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ChunkFilter for PassThrough {
    fn apply(&self, chunk: Dataset) -> anyhow::Result<Dataset> {
        Ok(chunk)
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunk_size: usize,
    /// Worker threads for the filter step; 0 uses the available parallelism.
    pub workers: usize,
    pub lookup_key: String,
    /// Lookup columns to attach; empty attaches every non-key column.
    pub lookup_columns: Vec<String>,
    /// Source columns to keep; empty keeps all. The lookup key is always read.
    pub columns: Vec<String>,
    pub csv: CsvOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            lookup_key: DEFAULT_LOOKUP_KEY.to_string(),
            lookup_columns: vec![DEFAULT_LOOKUP_VALUE.to_string()],
            columns: Vec::new(),
            csv: CsvOptions::default(),
        }
    }
}

/// Sequential reader yielding datasets of at most `chunk_size` rows.
///
/// Row identities are zero-based source row numbers. A source without data
/// rows still yields one empty chunk carrying the headers.
pub struct ChunkReader<R: Read> {
    reader: csv::Reader<R>,
    encoding: &'static Encoding,
    builder: DatasetBuilder,
    record: csv::ByteRecord,
    chunk_size: usize,
    next_row: u64,
    emitted: usize,
    done: bool,
}

impl ChunkReader<Box<dyn Read>> {
    pub fn open(path: &Path, chunk_size: usize, options: &CsvOptions) -> anyhow::Result<Self> {
        let delimiter = options.delimiter_for(path);
        let reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        Self::from_reader(reader, chunk_size, options.encoding)
            .with_context(|| format!("Opening {path:?} for chunked reading"))
    }
}

impl<R: Read> ChunkReader<R> {
    pub fn from_reader(
        mut reader: csv::Reader<R>,
        chunk_size: usize,
        encoding: &'static Encoding,
    ) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            return Err(anyhow!("Chunk size must be at least one row"));
        }
        let headers = io_utils::reader_headers(&mut reader, encoding)?;
        Ok(Self {
            reader,
            encoding,
            builder: DatasetBuilder::new(headers),
            record: csv::ByteRecord::new(),
            chunk_size,
            next_row: 0,
            emitted: 0,
            done: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        self.builder.headers()
    }

    /// Restricts every chunk to `columns` (source order); empty keeps all.
    /// Must be called before the first chunk is read.
    pub fn select_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Result<Self> {
        self.builder.select(columns)?;
        Ok(self)
    }

    fn fill(&mut self) -> anyhow::Result<()> {
        while self.builder.len() < self.chunk_size {
            let line = self.next_row + 2;
            if !self
                .reader
                .read_byte_record(&mut self.record)
                .with_context(|| format!("Reading row {line}"))?
            {
                self.done = true;
                break;
            }
            self.builder
                .push_byte_record(self.next_row, &self.record, self.encoding)
                .with_context(|| format!("Decoding row {line}"))?;
            self.next_row += 1;
        }
        Ok(())
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = anyhow::Result<Dataset>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(err) = self.fill() {
            self.done = true;
            return Some(Err(err));
        }
        if self.builder.is_empty() && self.emitted > 0 {
            return None;
        }
        self.emitted += 1;
        Some(Ok(self.builder.take()))
    }
}

/// Read-only reference table joined onto every chunk.
#[derive(Debug, Clone)]
pub struct LookupTable {
    key: String,
    columns: Vec<String>,
    rows: BTreeMap<Value, Vec<Option<Value>>>,
}

impl LookupTable {
    /// Indexes `dataset` by `key`. Rows with a missing key are skipped and
    /// repeated keys keep their first row.
    pub fn from_dataset<S: AsRef<str>>(dataset: &Dataset, key: &str, columns: &[S]) -> Result<Self> {
        let key_column = dataset.require_column(key)?;
        let names = if columns.is_empty() {
            dataset
                .column_names()
                .into_iter()
                .filter(|name| *name != key)
                .map(str::to_string)
                .collect::<Vec<_>>()
        } else {
            columns.iter().map(|c| c.as_ref().to_string()).collect()
        };
        let value_columns = names
            .iter()
            .map(|name| dataset.require_column(name))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = BTreeMap::new();
        for (row, key_value) in key_column.values().iter().enumerate() {
            let Some(key_value) = key_value else {
                continue;
            };
            rows.entry(key_value.clone()).or_insert_with(|| {
                value_columns
                    .iter()
                    .map(|column| column.values()[row].clone())
                    .collect()
            });
        }
        Ok(Self {
            key: key.to_string(),
            columns: names,
            rows,
        })
    }

    pub fn load<S: AsRef<str>>(
        path: &Path,
        key: &str,
        columns: &[S],
        options: &CsvOptions,
    ) -> anyhow::Result<Self> {
        let dataset = Dataset::from_csv_path(path, options)?;
        let table = Self::from_dataset(&dataset, key, columns)
            .with_context(|| format!("Indexing lookup table {path:?}"))?;
        info!(
            "Loaded lookup table {:?} with {} key(s)",
            path,
            table.len()
        );
        Ok(table)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends the lookup columns to `chunk`, keeping every chunk row in
    /// order. Unmatched rows get missing values.
    pub fn left_join(&self, mut chunk: Dataset) -> Result<Dataset> {
        let key_position = chunk
            .column_position(&self.key)
            .ok_or_else(|| StatsError::MissingColumn(self.key.clone()))?;
        let matches = (0..chunk.row_count())
            .map(|row| {
                chunk
                    .cell(row, key_position)
                    .and_then(|key| self.rows.get(key))
            })
            .collect::<Vec<_>>();

        let mut appended = Vec::with_capacity(self.columns.len());
        for (idx, name) in self.columns.iter().enumerate() {
            let values = matches
                .iter()
                .map(|found| found.and_then(|values| values[idx].clone()))
                .collect();
            appended.push(Column::new(joined_name(&chunk, name), values));
        }
        for column in appended {
            chunk.push_column(column)?;
        }
        Ok(chunk)
    }
}

fn joined_name(chunk: &Dataset, name: &str) -> String {
    if chunk.column(name).is_none() {
        return name.to_string();
    }
    let base = format!("lookup_{name}");
    let mut candidate = base.clone();
    let mut counter = 1usize;
    while chunk.column(&candidate).is_some() {
        candidate = format!("{base}_{counter}");
        counter += 1;
    }
    candidate
}

/// Reads `source` in chunks, joins each with the lookup file and filters the
/// chunks on a worker pool.
pub fn ingest<F>(source: &Path, lookup: &Path, filter: &F, options: &IngestOptions) -> Result<Dataset>
where
    F: ChunkFilter + ?Sized,
{
    if options.chunk_size == 0 {
        return Err(StatsError::InvalidArgument(
            "chunk size must be at least one row".to_string(),
        ));
    }
    let loaded = LookupTable::load(lookup, &options.lookup_key, &options.lookup_columns, &options.csv);
    let table = match loaded {
        Ok(table) => table,
        Err(err) => return Err(ingestion_failed(source, err)),
    };
    ingest_with_lookup(source, &table, filter, options)
}

/// Same as [`ingest`] with an already loaded lookup table.
pub fn ingest_with_lookup<F>(
    source: &Path,
    lookup: &LookupTable,
    filter: &F,
    options: &IngestOptions,
) -> Result<Dataset>
where
    F: ChunkFilter + ?Sized,
{
    info!(
        "Ingesting {:?} in chunks of {} row(s)",
        source, options.chunk_size
    );
    let chunks = ChunkReader::open(source, options.chunk_size, &options.csv)
        .map_err(|err| ingestion_failed(source, err))?
        .select_columns(&projection(&options.columns, lookup.key()))?;
    process_chunks(chunks, lookup, filter, options.workers)
        .map_err(|err| ingestion_failed(source, err))
}

fn projection(columns: &[String], key: &str) -> Vec<String> {
    let mut selected = columns.to_vec();
    if !selected.is_empty() && !selected.iter().any(|name| name == key) {
        selected.push(key.to_string());
    }
    selected
}

fn ingestion_failed(source: &Path, err: anyhow::Error) -> StatsError {
    error!("Ingestion of {source:?} failed: {err:#}");
    StatsError::IngestionFailed(format!("{err:#}"))
}

/// Joins and filters an already chunked source.
///
/// Chunks are pulled on the calling thread; filtering runs on a pool of
/// `workers` threads (0 = available parallelism). A failing task does not
/// stop the others: the first error in chunk order is reported once every
/// submitted chunk is done.
pub fn process_chunks<I, F>(
    chunks: I,
    lookup: &LookupTable,
    filter: &F,
    workers: usize,
) -> anyhow::Result<Dataset>
where
    I: IntoIterator<Item = anyhow::Result<Dataset>>,
    F: ChunkFilter + ?Sized,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("ingest-worker-{idx}"))
        .build()
        .context("Building the ingestion worker pool")?;
    debug!("Filtering on {} worker thread(s)", pool.current_num_threads());

    let (tx, rx) = mpsc::channel::<(usize, anyhow::Result<Dataset>)>();
    let mut submitted = 0usize;
    let mut read_error = None;

    pool.in_place_scope(|scope| {
        for (ordinal, chunk) in chunks.into_iter().enumerate() {
            let merged = chunk
                .with_context(|| format!("Reading chunk {ordinal}"))
                .and_then(|chunk| {
                    lookup
                        .left_join(chunk)
                        .with_context(|| format!("Merging chunk {ordinal} with the lookup table"))
                });
            let merged = match merged {
                Ok(merged) => merged,
                Err(err) => {
                    read_error = Some(err);
                    break;
                }
            };
            debug!("Submitting chunk {ordinal} ({} row(s))", merged.row_count());
            submitted += 1;
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| filter.apply(merged)))
                    .unwrap_or_else(|payload| Err(anyhow!("Filter panicked: {}", panic_message(&*payload))));
                // The receiver outlives the scope, so the send cannot fail.
                let _ = tx.send((ordinal, result));
            });
        }
    });
    drop(tx);

    let mut slots = (0..submitted).map(|_| None).collect::<Vec<_>>();
    for (ordinal, result) in rx {
        slots[ordinal] = Some(result);
    }
    if let Some(err) = read_error {
        return Err(err);
    }

    let mut parts = Vec::with_capacity(submitted);
    for (ordinal, slot) in slots.into_iter().enumerate() {
        let result = slot.ok_or_else(|| anyhow!("Chunk {ordinal} produced no result"))?;
        parts.push(result.with_context(|| format!("Filtering chunk {ordinal}"))?);
    }
    let combined = Dataset::concat(parts).context("Concatenating filtered chunks")?;
    info!(
        "Ingested {} chunk(s) into {} row(s)",
        submitted,
        combined.row_count()
    );
    Ok(combined)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
