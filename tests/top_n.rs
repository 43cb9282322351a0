use proptest::prelude::*;
use sinan_stats::{
    data::Value,
    dataset::{Column, Dataset},
    error::StatsError,
    top_n::{DEFAULT_TOP_K, non_missing_count, top_k},
};

fn exam_dates() -> Dataset {
    Dataset::from_columns(vec![
        Column::from_raw("DT_CHIK_S1", ["2023-01-02", "", "", ""]),
        Column::from_raw("DT_PRNT", ["2023-01-02", "2023-01-04", "", ""]),
        Column::from_raw("DT_SORO", ["2023-01-02", "2023-01-04", "2023-01-09", ""]),
        Column::from_raw("DT_NS1", ["", "2023-01-04", "2023-01-09", ""]),
        Column::from_raw("DT_VIRAL", ["", "", "", ""]),
    ])
    .unwrap()
}

#[test]
fn default_k_keeps_three_most_filled_columns() {
    let columns = ["DT_CHIK_S1", "DT_PRNT", "DT_SORO", "DT_NS1", "DT_VIRAL"];
    let top = top_k(&exam_dates(), &columns, DEFAULT_TOP_K).unwrap();
    assert_eq!(
        top,
        [
            ("DT_SORO".to_string(), 3),
            ("DT_PRNT".to_string(), 2),
            ("DT_NS1".to_string(), 2),
        ]
    );
}

#[test]
fn k_larger_than_column_count_returns_everything() {
    let top = top_k(&exam_dates(), &["DT_VIRAL", "DT_NS1"], 10).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].0, "DT_NS1");
    assert_eq!(top[1], ("DT_VIRAL".to_string(), 0));
}

#[test]
fn zero_k_yields_nothing() {
    assert!(top_k(&exam_dates(), &["DT_SORO"], 0).unwrap().is_empty());
}

#[test]
fn unknown_column_is_an_invalid_argument() {
    let err = top_k(&exam_dates(), &["DT_SORO", "DT_PCR"], 3).unwrap_err();
    assert!(matches!(err, StatsError::InvalidArgument(message) if message.contains("DT_PCR")));
    assert_eq!(
        non_missing_count(&exam_dates(), "DT_PCR").unwrap_err(),
        StatsError::MissingColumn("DT_PCR".into())
    );
}

proptest! {
    #[test]
    fn ranking_is_sorted_and_stable_on_ties(
        fills in prop::collection::vec(0usize..6, 1..12),
        k in 0usize..15
    ) {
        let columns = fills
            .iter()
            .enumerate()
            .map(|(idx, filled)| {
                let values = (0..5)
                    .map(|row| (row < *filled).then(|| Value::Integer(row as i64)))
                    .collect();
                Column::new(format!("c{idx}"), values)
            })
            .collect::<Vec<_>>();
        let names = columns.iter().map(|c| c.name().to_string()).collect::<Vec<_>>();
        let dataset = Dataset::from_columns(columns).unwrap();
        let top = top_k(&dataset, &names, k).unwrap();

        prop_assert_eq!(top.len(), k.min(names.len()));
        for pair in top.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            prop_assert!(left.1 >= right.1);
            if left.1 == right.1 {
                let position = |name: &str| names.iter().position(|n| n == name).unwrap();
                prop_assert!(position(&left.0) < position(&right.0));
            }
        }
        for (name, count) in &top {
            let idx = names.iter().position(|n| n == name).unwrap();
            prop_assert_eq!(*count, fills[idx].min(5));
        }
    }
}
