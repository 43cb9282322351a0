//! In-memory tabular dataset.
//!
//! A [`Dataset`] is an ordered list of named [`Column`]s aligned by a row
//! index of `u64` identities. Identities survive filtering and
//! concatenation, which is what lets chunked ingestion reproduce exactly the
//! rows a single full read would produce.

use std::{
    collections::{HashMap, HashSet},
    io::Read,
    path::Path,
};

use anyhow::Context;
use encoding_rs::Encoding;
use log::debug;

use crate::{
    data::Value,
    error::{Result, StatsError},
    io_utils::{self, CsvOptions},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Builds a column by typing each raw label the way CSV fields are typed.
    pub fn from_raw<I, S>(name: impl Into<String>, raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            name,
            raw.into_iter().map(|s| Value::infer(s.as_ref())).collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn non_missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    fn take(&self, rows: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            values: rows.iter().map(|&idx| self.values[idx].clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    index: Vec<u64>,
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dataset whose row identities are `0..row_count`.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map_or(0, Column::len);
        Self::with_index((0..rows as u64).collect(), columns)
    }

    pub fn with_index(index: Vec<u64>, columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.len() != index.len() {
                return Err(StatsError::InvalidArgument(format!(
                    "column '{}' has {} value(s) but the dataset has {} row(s)",
                    column.name,
                    column.len(),
                    index.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(StatsError::InvalidArgument(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { index, columns })
    }

    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| StatsError::MissingColumn(name.to_string()))
    }

    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = (0..column.len() as u64).collect();
        }
        if column.len() != self.index.len() {
            return Err(StatsError::InvalidArgument(format!(
                "column '{}' has {} value(s) but the dataset has {} row(s)",
                column.name,
                column.len(),
                self.index.len()
            )));
        }
        if self.column(&column.name).is_some() {
            return Err(StatsError::InvalidArgument(format!(
                "duplicate column name '{}'",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Cell at `(row, column position)`; `None` when missing.
    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.columns
            .get(column)
            .and_then(|c| c.values.get(row))
            .and_then(Option::as_ref)
    }

    /// New dataset holding the given row positions, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            index: rows.iter().map(|&idx| self.index[idx]).collect(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    /// Keeps the rows for which `keep(row_position)` is true.
    pub fn filter_rows<F>(&self, mut keep: F) -> Dataset
    where
        F: FnMut(usize) -> bool,
    {
        let rows = (0..self.row_count()).filter(|&r| keep(r)).collect::<Vec<_>>();
        self.take_rows(&rows)
    }

    /// Drops rows whose identity already appeared earlier; first occurrence wins.
    pub fn deduplicated(&self) -> Dataset {
        let mut seen = HashSet::with_capacity(self.index.len());
        let rows = self
            .index
            .iter()
            .enumerate()
            .filter(|(_, id)| seen.insert(**id))
            .map(|(pos, _)| pos)
            .collect::<Vec<_>>();
        if rows.len() == self.index.len() {
            return self.clone();
        }
        debug!(
            "Dropped {} row(s) with duplicate identity",
            self.index.len() - rows.len()
        );
        self.take_rows(&rows)
    }

    /// Stacks datasets in order. All parts must share the same column names
    /// in the same order.
    pub fn concat(parts: Vec<Dataset>) -> Result<Dataset> {
        let mut parts = parts.into_iter();
        let Some(mut combined) = parts.next() else {
            return Ok(Dataset::new());
        };
        for part in parts {
            let expected = combined.column_names();
            let found = part.column_names();
            if expected != found {
                return Err(StatsError::InvalidArgument(format!(
                    "cannot concatenate datasets with columns {expected:?} and {found:?}"
                )));
            }
            combined.index.extend(part.index);
            for (target, source) in combined.columns.iter_mut().zip(part.columns) {
                target.values.extend(source.values);
            }
        }
        Ok(combined)
    }

    pub fn from_csv_path(path: &Path, options: &CsvOptions) -> anyhow::Result<Dataset> {
        let delimiter = options.delimiter_for(path);
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        Self::from_csv_reader(&mut reader, options.encoding)
            .with_context(|| format!("Loading dataset from {path:?}"))
    }

    pub fn from_csv_reader<R: Read>(
        reader: &mut csv::Reader<R>,
        encoding: &'static Encoding,
    ) -> anyhow::Result<Dataset> {
        let headers = io_utils::reader_headers(reader, encoding)?;
        let mut builder = DatasetBuilder::new(headers);
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
            builder.push_byte_record(row_idx as u64, &record, encoding)?;
        }
        Ok(builder.finish())
    }

    /// Writes the dataset as CSV to `path`, or stdout when `path` is `None` or `-`.
    pub fn write_csv(&self, path: Option<&Path>, delimiter: u8) -> anyhow::Result<()> {
        let mut writer = io_utils::open_csv_writer(path, delimiter)?;
        writer
            .write_record(self.column_names())
            .context("Writing headers")?;
        for row in 0..self.row_count() {
            let record = self
                .columns
                .iter()
                .map(|c| c.values[row].as_ref().map(Value::as_display).unwrap_or_default());
            writer
                .write_record(record)
                .with_context(|| format!("Writing row {}", row + 2))?;
        }
        writer.flush().context("Flushing CSV output")?;
        Ok(())
    }
}

/// Row-wise accumulator used by the CSV readers.
///
/// Repeated header names get a `.1`, `.2`, ... suffix so that the column
/// name invariant holds for any input file. [`DatasetBuilder::select`]
/// narrows the collected columns; unselected fields are never decoded.
#[derive(Debug)]
pub struct DatasetBuilder {
    fields: Vec<String>,
    positions: Vec<usize>,
    names: Vec<String>,
    index: Vec<u64>,
    cells: Vec<Vec<Option<Value>>>,
}

impl DatasetBuilder {
    pub fn new(headers: Vec<String>) -> Self {
        let fields = unique_names(headers);
        let positions = (0..fields.len()).collect::<Vec<_>>();
        let names = fields.clone();
        let cells = vec![Vec::new(); names.len()];
        Self {
            fields,
            positions,
            names,
            index: Vec::new(),
            cells,
        }
    }

    /// Keeps only `columns`, in source order. An empty list keeps every
    /// column. Rows collected so far are discarded.
    pub fn select<S: AsRef<str>>(&mut self, columns: &[S]) -> Result<()> {
        let mut positions = if columns.is_empty() {
            (0..self.fields.len()).collect::<Vec<_>>()
        } else {
            columns
                .iter()
                .map(|name| {
                    let name = name.as_ref();
                    self.fields
                        .iter()
                        .position(|field| field == name)
                        .ok_or_else(|| StatsError::MissingColumn(name.to_string()))
                })
                .collect::<Result<Vec<_>>>()?
        };
        positions.sort_unstable();
        positions.dedup();
        self.names = positions.iter().map(|&pos| self.fields[pos].clone()).collect();
        self.cells = vec![Vec::new(); positions.len()];
        self.positions = positions;
        self.index.clear();
        Ok(())
    }

    /// Names of the collected columns.
    pub fn headers(&self) -> &[String] {
        &self.names
    }

    /// Every header of the source, selected or not.
    pub fn source_headers(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Adds a full source record; only the selected fields are kept.
    pub fn push_record(&mut self, row_id: u64, record: &[String]) {
        self.index.push(row_id);
        for (values, &pos) in self.cells.iter_mut().zip(&self.positions) {
            values.push(record.get(pos).and_then(|raw| Value::infer(raw)));
        }
    }

    /// Like [`DatasetBuilder::push_record`], decoding only the selected fields.
    pub fn push_byte_record(
        &mut self,
        row_id: u64,
        record: &csv::ByteRecord,
        encoding: &'static Encoding,
    ) -> anyhow::Result<()> {
        let mut decoded = Vec::with_capacity(self.positions.len());
        for &pos in &self.positions {
            let raw = match record.get(pos) {
                Some(bytes) => Some(io_utils::decode_bytes(bytes, encoding)?),
                None => None,
            };
            decoded.push(raw.as_deref().and_then(Value::infer));
        }
        self.index.push(row_id);
        for (values, value) in self.cells.iter_mut().zip(decoded) {
            values.push(value);
        }
        Ok(())
    }

    /// Returns the rows collected so far and leaves the builder empty with
    /// the same headers.
    pub fn take(&mut self) -> Dataset {
        let index = std::mem::take(&mut self.index);
        let columns = self
            .names
            .iter()
            .zip(self.cells.iter_mut())
            .map(|(name, values)| Column::new(name.clone(), std::mem::take(values)))
            .collect();
        Dataset { index, columns }
    }

    pub fn finish(mut self) -> Dataset {
        self.take()
    }
}

fn unique_names(headers: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());
    for header in headers {
        let mut candidate = header.clone();
        while taken.contains(&candidate) {
            let counter = counts.entry(header.clone()).or_insert(0);
            *counter += 1;
            candidate = format!("{header}.{counter}");
        }
        taken.insert(candidate.clone());
        names.push(candidate);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(name: &str, raw: &[&str]) -> Column {
        Column::from_raw(name, raw.iter().copied())
    }

    #[test]
    fn rejects_unequal_column_lengths() {
        let err = Dataset::from_columns(vec![labels("a", &["1", "2"]), labels("b", &["1"])])
            .unwrap_err();
        assert!(matches!(err, StatsError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_duplicate_column_names() {
        let err = Dataset::from_columns(vec![labels("a", &["1"]), labels("a", &["2"])])
            .unwrap_err();
        assert!(matches!(err, StatsError::InvalidArgument(_)));
    }

    #[test]
    fn builder_renames_repeated_headers() {
        let builder = DatasetBuilder::new(vec!["SG_UF_NOT".into(), "SG_UF_NOT".into(), "x".into()]);
        assert_eq!(builder.headers(), ["SG_UF_NOT", "SG_UF_NOT.1", "x"]);
    }

    #[test]
    fn builder_selection_keeps_source_order() {
        let mut builder = DatasetBuilder::new(vec![
            "DT_NOTIFIC".into(),
            "SG_UF_NOT".into(),
            "FEBRE".into(),
        ]);
        builder.select(&["FEBRE", "DT_NOTIFIC"]).unwrap();
        assert_eq!(builder.headers(), ["DT_NOTIFIC", "FEBRE"]);
        builder.push_record(0, &["2021-02-20".into(), "35".into(), "1".into()]);
        let ds = builder.finish();
        assert_eq!(ds.column_names(), ["DT_NOTIFIC", "FEBRE"]);
        assert_eq!(ds.cell(0, 1), Some(&Value::Integer(1)));
    }

    #[test]
    fn builder_selection_requires_known_columns() {
        let mut builder = DatasetBuilder::new(vec!["FEBRE".into()]);
        assert_eq!(
            builder.select(&["VOMITO"]).unwrap_err(),
            StatsError::MissingColumn("VOMITO".into())
        );
        assert_eq!(builder.headers(), ["FEBRE"]);
    }

    #[test]
    fn deduplicated_keeps_first_identity() {
        let ds = Dataset::with_index(vec![0, 1, 0], vec![labels("a", &["x", "y", "z"])]).unwrap();
        let deduped = ds.deduplicated();
        assert_eq!(deduped.index(), [0, 1]);
        assert_eq!(
            deduped.column("a").unwrap().values()[0],
            Some(Value::String("x".into()))
        );
    }

    #[test]
    fn concat_preserves_order_and_identity() {
        let first = Dataset::with_index(vec![0, 1], vec![labels("a", &["1", "2"])]).unwrap();
        let second = Dataset::with_index(vec![2], vec![labels("a", &["3"])]).unwrap();
        let combined = Dataset::concat(vec![first, second]).unwrap();
        assert_eq!(combined.index(), [0, 1, 2]);
        assert_eq!(combined.cell(2, 0), Some(&Value::Integer(3)));
    }

    #[test]
    fn concat_rejects_mismatched_columns() {
        let first = Dataset::from_columns(vec![labels("a", &["1"])]).unwrap();
        let second = Dataset::from_columns(vec![labels("b", &["1"])]).unwrap();
        assert!(Dataset::concat(vec![first, second]).is_err());
    }

    #[test]
    fn filter_rows_keeps_identity() {
        let ds = Dataset::from_columns(vec![labels("a", &["1", "", "3"])]).unwrap();
        let kept = ds.filter_rows(|row| ds.cell(row, 0).is_some());
        assert_eq!(kept.index(), [0, 2]);
        assert_eq!(kept.column("a").unwrap().non_missing_count(), 2);
    }
}
