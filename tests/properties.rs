use csv_blend::{
    cleaning,
    config::{CleanConfig, Normalization, OutlierMethod, Thresholds},
    data,
    frame::{Column, ColumnData, Table},
    inference,
};
use proptest::prelude::*;

fn with_row_ids(values: &[f64]) -> Table {
    let ids = (0..values.len()).map(|i| Some(i as f64)).collect::<Vec<_>>();
    let values = values.iter().map(|v| Some(*v)).collect::<Vec<_>>();
    Table::new(vec![Column::numbers("id", &ids), Column::numbers("x", &values)]).unwrap()
}

fn numbers(table: &Table, name: &str) -> Vec<Option<f64>> {
    match &table.column(name).unwrap().data {
        ColumnData::Number(values) => values.clone(),
        other => panic!("{name} is {}", other.kind_name()),
    }
}

proptest! {
    #[test]
    fn iqr_capping_keeps_rows_within_bounds(
        values in prop::collection::vec(-1_000i32..1_000, 4..60)
    ) {
        let values = values.into_iter().map(f64::from).collect::<Vec<_>>();
        let table = with_row_ids(&values);
        let result = cleaning::clean(&table, &CleanConfig::default(), &Thresholds::default()).unwrap();
        prop_assert_eq!(result.table.row_count(), values.len());

        let mut sorted = values.clone();
        sorted.sort_by(f64::total_cmp);
        let q1 = data::quantile_sorted(&sorted, 0.25).unwrap();
        let q3 = data::quantile_sorted(&sorted, 0.75).unwrap();
        let iqr = q3 - q1;
        let cleaned = numbers(&result.table, "x");
        for (original, capped) in values.iter().zip(&cleaned) {
            let capped = capped.unwrap();
            if iqr == 0.0 {
                prop_assert_eq!(capped, *original);
            } else {
                let expected = original.clamp(q1 - 1.5 * iqr, q3 + 1.5 * iqr);
                prop_assert!((capped - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn zscore_capping_clamps_to_three_deviations(
        values in prop::collection::vec(-1_000i32..1_000, 3..60)
    ) {
        let values = values.into_iter().map(f64::from).collect::<Vec<_>>();
        let config = CleanConfig {
            outlier_method: OutlierMethod::Zscore,
            ..CleanConfig::default()
        };
        let thresholds = Thresholds::default();
        let result = cleaning::clean(&with_row_ids(&values), &config, &thresholds).unwrap();
        prop_assert_eq!(result.table.row_count(), values.len());

        let mean = data::mean(&values).unwrap();
        let std = data::std_dev(&values).unwrap();
        let limit = thresholds.zscore_threshold * std;
        let cleaned = numbers(&result.table, "x");
        for (original, capped) in values.iter().zip(&cleaned) {
            let capped = capped.unwrap();
            if std == 0.0 {
                prop_assert_eq!(capped, *original);
            } else {
                let expected = original.clamp(mean - limit, mean + limit);
                prop_assert!((capped - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn deduplication_is_idempotent(
        rows in prop::collection::vec((0usize..3, 0usize..3), 1..40)
    ) {
        const LETTERS: [&str; 3] = ["a", "b", "c"];
        let left = rows.iter().map(|(l, _)| Some(LETTERS[*l])).collect::<Vec<_>>();
        let right = rows.iter().map(|(_, r)| Some(LETTERS[*r])).collect::<Vec<_>>();
        let table = Table::new(vec![Column::text("l", &left), Column::text("r", &right)]).unwrap();
        let config = CleanConfig {
            outlier_method: OutlierMethod::None,
            ..CleanConfig::default()
        };
        let thresholds = Thresholds::default();

        let once = cleaning::clean(&table, &config, &thresholds).unwrap();
        let twice = cleaning::clean(&once.table, &config, &thresholds).unwrap();
        prop_assert!(once.table.row_count() <= 9);
        prop_assert_eq!(twice.table.row_count(), once.table.row_count());
        prop_assert!(twice.log.find("remove_duplicates").is_none());
    }

    #[test]
    fn minmax_normalization_spans_unit_interval(
        values in prop::collection::vec(-500i32..500, 2..50)
    ) {
        let values = values.into_iter().map(f64::from).collect::<Vec<_>>();
        let config = CleanConfig {
            outlier_method: OutlierMethod::None,
            normalize: Normalization::Minmax,
            ..CleanConfig::default()
        };
        let result = cleaning::clean(&with_row_ids(&values), &config, &Thresholds::default()).unwrap();
        let cleaned = numbers(&result.table, "x").into_iter().flatten().collect::<Vec<_>>();
        let constant = values.iter().all(|v| *v == values[0]);
        if constant {
            prop_assert_eq!(cleaned, values);
        } else {
            prop_assert!(cleaned.iter().all(|v| (0.0..=1.0).contains(v)));
            let min = cleaned.iter().copied().fold(f64::INFINITY, f64::min);
            let max = cleaned.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert_eq!(min, 0.0);
            prop_assert_eq!(max, 1.0);
        }
    }

    #[test]
    fn zscore_normalization_centers_values(
        values in prop::collection::vec(-500i32..500, 3..50)
    ) {
        let values = values.into_iter().map(f64::from).collect::<Vec<_>>();
        prop_assume!(values.iter().any(|v| *v != values[0]));
        let config = CleanConfig {
            outlier_method: OutlierMethod::None,
            normalize: Normalization::Zscore,
            ..CleanConfig::default()
        };
        let result = cleaning::clean(&with_row_ids(&values), &config, &Thresholds::default()).unwrap();
        let cleaned = numbers(&result.table, "x").into_iter().flatten().collect::<Vec<_>>();
        prop_assert!(data::mean(&cleaned).unwrap().abs() < 1e-9);
        prop_assert!((data::std_dev(&cleaned).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn classification_is_idempotent(
        cells in prop::collection::vec(
            prop_oneof![
                Just(None),
                (0i32..50).prop_map(|v| Some(v.to_string())),
                (1u32..28).prop_map(|d| Some(format!("2024-02-{d:02}"))),
                "[a-z]{1,4}".prop_map(Some),
            ],
            1..40,
        )
    ) {
        let raw = cells.iter().map(|c| c.clone().unwrap_or_default()).collect::<Vec<_>>();
        let table = Table::new(vec![Column::new("c", ColumnData::from_raw(raw))]).unwrap();
        let thresholds = Thresholds::default();

        let (first, first_profile) = inference::classify(&table, &thresholds);
        let (second, second_profile) = inference::classify(&first, &thresholds);
        prop_assert_eq!(first_profile.kind_of("c"), second_profile.kind_of("c"));
        prop_assert_eq!(first, second);
    }
}
