//! Row filters of the form `column<op>value`, usable as a chunk filter.

use anyhow::{Result, anyhow};
use log::debug;

use crate::{data::Value, dataset::Dataset, ingest::ChunkFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub raw_value: String,
    /// `raw_value` typed once at parse time.
    pub value: Option<Value>,
}

pub fn parse_filters(filters: &[String]) -> Result<Vec<FilterCondition>> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

pub fn parse_filter(filter: &str) -> Result<FilterCondition> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }

    let lowered = trimmed.to_ascii_lowercase();
    for (needle, op) in [
        (" contains ", ComparisonOperator::Contains),
        (" startswith ", ComparisonOperator::StartsWith),
        (" endswith ", ComparisonOperator::EndsWith),
    ] {
        if let Some(idx) = lowered.find(needle) {
            let (left, right_with_space) = trimmed.split_at(idx);
            let right = right_with_space[needle.len()..].trim();
            return Ok(FilterCondition::new(left.trim(), op, unquote(right)));
        }
    }

    for (needle, op) in [
        ("!=", ComparisonOperator::NotEq),
        (">=", ComparisonOperator::Ge),
        ("<=", ComparisonOperator::Le),
        ("=", ComparisonOperator::Eq),
        (">", ComparisonOperator::Gt),
        ("<", ComparisonOperator::Lt),
    ] {
        if let Some(idx) = trimmed.find(needle) {
            let left = trimmed[..idx].trim();
            let right = trimmed[idx + needle.len()..].trim();
            if left.is_empty() {
                break;
            }
            return Ok(FilterCondition::new(left, op, unquote(right)));
        }
    }

    Err(anyhow!("Failed to parse filter expression '{trimmed}'"))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

impl FilterCondition {
    pub fn new(column: &str, operator: ComparisonOperator, raw_value: &str) -> Self {
        Self {
            column: column.to_string(),
            operator,
            raw_value: raw_value.to_string(),
            value: Value::infer(raw_value),
        }
    }

    fn matches(&self, cell: Option<&Value>) -> bool {
        use ComparisonOperator::*;
        match self.operator {
            Contains | StartsWith | EndsWith => {
                let Some(value) = cell else {
                    return false;
                };
                let text = value.as_display();
                let needle = self.raw_value.as_str();
                match self.operator {
                    Contains => text.contains(needle),
                    StartsWith => text.starts_with(needle),
                    _ => text.ends_with(needle),
                }
            }
            Eq | NotEq | Gt | Ge | Lt | Le => match (cell, self.value.as_ref()) {
                (Some(left), Some(right)) => match self.operator {
                    Eq => left == right,
                    NotEq => left != right,
                    Gt => left > right,
                    Ge => left >= right,
                    Lt => left < right,
                    _ => left <= right,
                },
                (None, None) => matches!(self.operator, Eq | Ge | Le),
                (None, Some(_)) | (Some(_), None) => matches!(self.operator, NotEq),
            },
        }
    }
}

/// Keeps the rows that satisfy every condition.
#[derive(Debug, Clone, Default)]
pub struct ConditionFilter {
    conditions: Vec<FilterCondition>,
}

impl ConditionFilter {
    pub fn new(conditions: Vec<FilterCondition>) -> Self {
        Self { conditions }
    }

    pub fn parse(expressions: &[String]) -> Result<Self> {
        Ok(Self::new(parse_filters(expressions)?))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl ChunkFilter for ConditionFilter {
    fn apply(&self, chunk: Dataset) -> Result<Dataset> {
        if self.conditions.is_empty() {
            return Ok(chunk);
        }
        let positions = self
            .conditions
            .iter()
            .map(|condition| {
                chunk
                    .column_position(&condition.column)
                    .ok_or_else(|| anyhow!("Column '{}' not found for filter", condition.column))
            })
            .collect::<Result<Vec<_>>>()?;
        let filtered = chunk.filter_rows(|row| {
            self.conditions
                .iter()
                .zip(&positions)
                .all(|(condition, &col)| condition.matches(chunk.cell(row, col)))
        });
        debug!(
            "Filter kept {} of {} row(s)",
            filtered.row_count(),
            chunk.row_count()
        );
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn cases() -> Dataset {
        Dataset::from_columns(vec![
            Column::from_raw("CLASSI_FIN", ["10", "5", "", "10"]),
            Column::from_raw("SIGLA_UF", ["SP", "RJ", "SP", "MG"]),
        ])
        .unwrap()
    }

    #[test]
    fn parses_symbolic_and_word_operators() {
        let parsed = parse_filter("CLASSI_FIN >= 10").unwrap();
        assert_eq!(parsed.column, "CLASSI_FIN");
        assert_eq!(parsed.operator, ComparisonOperator::Ge);
        assert_eq!(parsed.raw_value, "10");
        assert_eq!(parsed.value, Some(Value::Integer(10)));

        let parsed = parse_filter("SIGLA_UF startswith 'S'").unwrap();
        assert_eq!(parsed.operator, ComparisonOperator::StartsWith);
        assert_eq!(parsed.raw_value, "S");

        let parsed = parse_filter("DT_NOTIFIC < '30/11/2022'").unwrap();
        assert!(matches!(parsed.value, Some(Value::Date(_))));

        assert!(parse_filter("   ").is_err());
        assert!(parse_filter("no operator here").is_err());
    }

    #[test]
    fn keeps_rows_matching_every_condition() {
        let filter =
            ConditionFilter::parse(&["CLASSI_FIN=10".to_string(), "SIGLA_UF!=MG".to_string()])
                .unwrap();
        let kept = filter.apply(cases()).unwrap();
        assert_eq!(kept.index(), [0]);
    }

    #[test]
    fn missing_cells_only_match_inequality() {
        let filter = ConditionFilter::parse(&["CLASSI_FIN!=5".to_string()]).unwrap();
        let kept = filter.apply(cases()).unwrap();
        assert_eq!(kept.index(), [0, 2, 3]);
    }

    #[test]
    fn typed_value_compares_numerically() {
        let filter = ConditionFilter::new(vec![FilterCondition::new(
            "CLASSI_FIN",
            ComparisonOperator::Gt,
            "5.5",
        )]);
        let kept = filter.apply(cases()).unwrap();
        assert_eq!(kept.index(), [0, 3]);
    }

    #[test]
    fn unknown_filter_column_is_an_error() {
        let filter = ConditionFilter::parse(&["EVOLUCAO=1".to_string()]).unwrap();
        assert!(filter.apply(cases()).is_err());
    }
}
