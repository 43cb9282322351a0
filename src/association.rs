//! Categorical association measures.
//!
//! Every statistic here is derived from a single [`CrossTab`], built once by
//! [`CrossTab::build`]. Rows where either column is missing are left out of
//! the table, so the grand total is the number of complete pairs.
//!
//! | Measure | Formula |
//! |---------|---------|
//! | chi-square | Σ (O − E)² / E, with E = row total × column total / n |
//! | Cramér's V | √(χ² / (n · min(r − 1, s − 1))) |
//! | contingency coefficient | √(χ² / (χ² + n)) |

use itertools::Itertools;
use serde::Serialize;

use crate::{
    data::Value,
    dataset::{Column, Dataset},
    error::{Result, StatsError},
};

/// Contingency table of two categorical columns with its margins.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossTab {
    row_labels: Vec<Value>,
    col_labels: Vec<Value>,
    counts: Vec<Vec<u64>>,
    row_totals: Vec<u64>,
    col_totals: Vec<u64>,
    total: u64,
}

impl CrossTab {
    /// Cross-tabulates `rows` against `cols`. Labels are sorted.
    ///
    /// Fails with [`StatsError::InvalidArgument`] when a column is empty, the
    /// lengths differ, or no row has both values present.
    pub fn build(rows: &Column, cols: &Column) -> Result<Self> {
        for column in [rows, cols] {
            if column.is_empty() {
                return Err(StatsError::InvalidArgument(format!(
                    "column '{}' is empty",
                    column.name()
                )));
            }
        }
        if rows.len() != cols.len() {
            return Err(StatsError::InvalidArgument(format!(
                "columns '{}' ({} rows) and '{}' ({} rows) differ in length",
                rows.name(),
                rows.len(),
                cols.name(),
                cols.len()
            )));
        }

        let pairs = rows
            .values()
            .iter()
            .zip(cols.values())
            .filter_map(|(a, b)| Some((a.as_ref()?, b.as_ref()?)))
            .collect::<Vec<_>>();
        if pairs.is_empty() {
            return Err(StatsError::InvalidArgument(format!(
                "columns '{}' and '{}' share no complete rows",
                rows.name(),
                cols.name()
            )));
        }

        let row_labels = sorted_labels(pairs.iter().map(|(a, _)| *a));
        let col_labels = sorted_labels(pairs.iter().map(|(_, b)| *b));

        let mut counts = vec![vec![0u64; col_labels.len()]; row_labels.len()];
        for (a, b) in &pairs {
            let row = label_position(&row_labels, a, rows.name())?;
            let col = label_position(&col_labels, b, cols.name())?;
            counts[row][col] += 1;
        }
        let row_totals = counts.iter().map(|row| row.iter().sum()).collect::<Vec<u64>>();
        let col_totals = (0..col_labels.len())
            .map(|c| counts.iter().map(|row| row[c]).sum())
            .collect::<Vec<u64>>();

        Ok(Self {
            row_labels: row_labels.into_iter().cloned().collect(),
            col_labels: col_labels.into_iter().cloned().collect(),
            counts,
            row_totals,
            col_totals,
            total: pairs.len() as u64,
        })
    }

    pub fn row_labels(&self) -> &[Value] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[Value] {
        &self.col_labels
    }

    pub fn row_totals(&self) -> &[u64] {
        &self.row_totals
    }

    pub fn col_totals(&self) -> &[u64] {
        &self.col_totals
    }

    /// Grand total (the `All`/`All` margin).
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct row categories, margins excluded.
    pub fn rows(&self) -> usize {
        self.row_labels.len()
    }

    /// Number of distinct column categories, margins excluded.
    pub fn cols(&self) -> usize {
        self.col_labels.len()
    }

    pub fn observed(&self, row: usize, col: usize) -> u64 {
        self.counts[row][col]
    }

    pub fn expected(&self, row: usize, col: usize) -> f64 {
        self.row_totals[row] as f64 * self.col_totals[col] as f64 / self.total as f64
    }

    pub fn chi_square(&self) -> f64 {
        let mut statistic = 0.0;
        for row in 0..self.rows() {
            for col in 0..self.cols() {
                let expected = self.expected(row, col);
                let delta = self.observed(row, col) as f64 - expected;
                statistic += delta * delta / expected;
            }
        }
        statistic
    }

    /// Fails when either side has a single category, where
    /// `min(r - 1, s - 1)` is zero and the measure is undefined.
    pub fn cramers_v(&self) -> Result<f64> {
        let k = self.rows().min(self.cols());
        if k < 2 {
            return Err(StatsError::InvalidArgument(format!(
                "Cramér's V needs at least two categories per column, got a {}x{} table",
                self.rows(),
                self.cols()
            )));
        }
        let denominator = self.total as f64 * (k - 1) as f64;
        Ok((self.chi_square() / denominator).sqrt())
    }

    pub fn contingency_coefficient(&self) -> f64 {
        let chi2 = self.chi_square();
        (chi2 / (chi2 + self.total as f64)).sqrt()
    }
}

fn sorted_labels<'a, I>(labels: I) -> Vec<&'a Value>
where
    I: Iterator<Item = &'a Value>,
{
    let mut labels = labels.collect::<Vec<_>>();
    labels.sort();
    labels.dedup();
    labels
}

fn label_position(labels: &[&Value], label: &Value, column: &str) -> Result<usize> {
    labels.binary_search(&label).map_err(|_| {
        StatsError::InvalidArgument(format!(
            "label '{label}' in column '{column}' has no consistent position"
        ))
    })
}

pub fn chi_square(a: &Column, b: &Column) -> Result<f64> {
    Ok(CrossTab::build(a, b)?.chi_square())
}

pub fn cramers_v(a: &Column, b: &Column) -> Result<f64> {
    CrossTab::build(a, b)?.cramers_v()
}

pub fn contingency_coefficient(a: &Column, b: &Column) -> Result<f64> {
    Ok(CrossTab::build(a, b)?.contingency_coefficient())
}

/// All three measures of one column pair, computed from one table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Association {
    pub n: u64,
    pub rows: usize,
    pub cols: usize,
    pub chi_square: f64,
    /// `None` when either column has a single category.
    pub cramers_v: Option<f64>,
    pub contingency_coefficient: f64,
}

impl Association {
    pub fn measure(a: &Column, b: &Column) -> Result<Self> {
        Ok(Self::from_crosstab(&CrossTab::build(a, b)?))
    }

    pub fn from_crosstab(table: &CrossTab) -> Self {
        Self {
            n: table.total(),
            rows: table.rows(),
            cols: table.cols(),
            chi_square: table.chi_square(),
            cramers_v: table.cramers_v().ok(),
            contingency_coefficient: table.contingency_coefficient(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairAssociation {
    pub left: String,
    pub right: String,
    #[serde(flatten)]
    pub association: Association,
}

/// Measures every unordered pair of `columns`, in input order.
pub fn pairwise_associations<S: AsRef<str>>(
    dataset: &Dataset,
    columns: &[S],
) -> Result<Vec<PairAssociation>> {
    let resolved = columns
        .iter()
        .map(|name| dataset.require_column(name.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    resolved
        .into_iter()
        .tuple_combinations()
        .map(|(left, right)| {
            Ok(PairAssociation {
                left: left.name().to_string(),
                right: right.name().to_string(),
                association: Association::measure(left, right)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(name: &str, values: &[i64]) -> Column {
        Column::new(name, values.iter().map(|v| Some(Value::Integer(*v))).collect())
    }

    #[test]
    fn margins_sum_to_grand_total() {
        let a = ints("a", &[1, 1, 2, 2, 3]);
        let b = ints("b", &[1, 2, 1, 2, 2]);
        let table = CrossTab::build(&a, &b).unwrap();
        assert_eq!(table.total(), 5);
        assert_eq!(table.row_totals(), [2, 2, 1]);
        assert_eq!(table.col_totals(), [2, 3]);
        assert_eq!(table.row_totals().iter().sum::<u64>(), table.total());
    }

    #[test]
    fn large_integer_and_float_labels_share_one_table() {
        let raw = [
            "9007199254740993",
            "9007199254740992.0",
            "9007199254740992",
            "1",
            "2",
        ];
        let a = Column::from_raw("NU_NOTIFIC", raw.iter().cycle().take(60));
        let b = Column::from_raw("CS_SEXO", ["F", "M", "I"].iter().cycle().take(60));
        let table = CrossTab::build(&a, &b).unwrap();
        assert_eq!(table.rows(), 4);
        assert_eq!(table.total(), 60);
        assert_eq!(table.row_totals(), [12, 12, 24, 12]);
        assert_eq!(table.row_labels()[3], Value::Integer(9_007_199_254_740_993));
        assert!(table.chi_square().is_finite());
    }

    #[test]
    fn missing_cells_are_excluded_pairwise() {
        let a = Column::from_raw("a", ["x", "", "y", "x"]);
        let b = Column::from_raw("b", ["1", "2", "", "2"]);
        let table = CrossTab::build(&a, &b).unwrap();
        assert_eq!(table.total(), 2);
    }

    #[test]
    fn independent_columns_have_zero_chi_square() {
        let a = ints("a", &[0, 0, 1, 1]);
        let b = ints("b", &[0, 1, 0, 1]);
        assert!(chi_square(&a, &b).unwrap().abs() < 1e-12);
        assert!(cramers_v(&a, &b).unwrap().abs() < 1e-12);
    }

    #[test]
    fn perfect_two_by_two_association() {
        let a = ints("a", &[0, 0, 1, 1]);
        let chi2 = chi_square(&a, &a).unwrap();
        assert!((chi2 - 4.0).abs() < 1e-12);
        assert!((cramers_v(&a, &a).unwrap() - 1.0).abs() < 1e-12);
        let expected_c = (4.0_f64 / 8.0).sqrt();
        assert!((contingency_coefficient(&a, &a).unwrap() - expected_c).abs() < 1e-12);
    }

    #[test]
    fn single_category_column_rejects_cramers_v() {
        let a = ints("a", &[1, 1, 1]);
        let b = ints("b", &[1, 2, 3]);
        let err = cramers_v(&a, &b).unwrap_err();
        assert!(matches!(err, StatsError::InvalidArgument(_)));
        let measured = Association::measure(&a, &b).unwrap();
        assert_eq!(measured.cramers_v, None);
        assert_eq!(measured.chi_square, 0.0);
    }

    #[test]
    fn empty_or_misaligned_columns_are_invalid() {
        let empty = Column::new("empty", Vec::new());
        let a = ints("a", &[1, 2]);
        let b = ints("b", &[1]);
        assert!(matches!(
            chi_square(&empty, &a),
            Err(StatsError::InvalidArgument(_))
        ));
        assert!(matches!(
            contingency_coefficient(&a, &b),
            Err(StatsError::InvalidArgument(_))
        ));
        let all_missing = Column::new("m", vec![None, None]);
        assert!(matches!(
            chi_square(&all_missing, &a),
            Err(StatsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn pairwise_reports_every_pair_in_order() {
        let ds = Dataset::from_columns(vec![
            ints("FEBRE", &[1, 2, 1, 2]),
            ints("MIALGIA", &[1, 1, 2, 2]),
            ints("CEFALEIA", &[1, 2, 1, 1]),
        ])
        .unwrap();
        let pairs = pairwise_associations(&ds, &["FEBRE", "MIALGIA", "CEFALEIA"]).unwrap();
        let names = pairs
            .iter()
            .map(|p| (p.left.as_str(), p.right.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                ("FEBRE", "MIALGIA"),
                ("FEBRE", "CEFALEIA"),
                ("MIALGIA", "CEFALEIA")
            ]
        );
    }

    #[test]
    fn pairwise_reports_missing_column() {
        let ds = Dataset::from_columns(vec![ints("FEBRE", &[1, 2])]).unwrap();
        let err = pairwise_associations(&ds, &["FEBRE", "VOMITO"]).unwrap_err();
        assert_eq!(err, StatsError::MissingColumn("VOMITO".into()));
    }
}
