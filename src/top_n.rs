use crate::{
    dataset::Dataset,
    error::{Result, StatsError},
};

pub const DEFAULT_TOP_K: usize = 3;

/// Ranks `columns` by their number of non-missing cells and returns the
/// first `k`. Ties keep the order in which the columns were requested.
pub fn top_k<S: AsRef<str>>(
    dataset: &Dataset,
    columns: &[S],
    k: usize,
) -> Result<Vec<(String, usize)>> {
    let mut counts = columns
        .iter()
        .map(|name| {
            let name = name.as_ref();
            dataset
                .column(name)
                .map(|column| (name.to_string(), column.non_missing_count()))
                .ok_or_else(|| {
                    StatsError::InvalidArgument(format!("missing column in dataset: {name}"))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    // `sort_by` is stable, which is what keeps ties in request order.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(k);
    Ok(counts)
}

/// Number of rows where `column` holds a value.
pub fn non_missing_count(dataset: &Dataset, column: &str) -> Result<usize> {
    Ok(dataset.require_column(column)?.non_missing_count())
}
