use chrono::{DateTime, Utc};

use crate::{
    gcp::{BucketOptions, Distribution, ExplicitBuckets, Point, TimeInterval, TypedValue},
    view::{AggregationData, AggregationKind, MeasureKind, Row, View},
};

/// Converts an aggregated row into a Stackdriver point.
///
/// Last-value aggregations become gauge points, which carry only an end time. Every other
/// aggregation is cumulative over `[start, end]`.
///
/// Returns `None` when the row's data can't be expressed for this view, e.g. when the view and
/// the row disagree about the aggregation kind.
pub fn new_point(
    view: &View,
    row: &Row,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<Point> {
    let interval = match view.aggregation.kind {
        AggregationKind::LastValue => TimeInterval {
            start_time: None,
            end_time: end,
        },
        _ => TimeInterval {
            start_time: Some(start),
            end_time: end,
        },
    };
    let value = new_typed_value(view, row)?;
    Some(Point { interval, value })
}

fn new_typed_value(view: &View, row: &Row) -> Option<TypedValue> {
    match (view.aggregation.kind, &row.data) {
        (AggregationKind::Count, AggregationData::Count { value }) => {
            Some(TypedValue::Int64Value(*value))
        }
        (AggregationKind::Sum, AggregationData::Sum { value })
        | (AggregationKind::LastValue, AggregationData::LastValue { value }) => {
            Some(match view.measure.kind {
                MeasureKind::Int64 => TypedValue::Int64Value(*value as i64),
                MeasureKind::Float64 => TypedValue::DoubleValue(*value),
            })
        }
        (AggregationKind::Distribution, AggregationData::Distribution(data)) => {
            let bounds = &view.aggregation.buckets;
            if data.count_per_bucket.len() != bounds.len() + 1 {
                return None;
            }
            Some(TypedValue::DistributionValue(Distribution {
                count: data.count,
                mean: data.mean,
                sum_of_squared_deviation: data.sum_of_squared_dev,
                bucket_options: BucketOptions {
                    explicit_buckets: ExplicitBuckets {
                        bounds: bounds.clone(),
                    },
                },
                bucket_counts: data.count_per_bucket.clone(),
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::view::{Aggregation, DistributionData, Measure};

    fn view(measure: Measure, aggregation: Aggregation) -> View {
        View {
            name: "test_view".into(),
            description: "a test view".into(),
            tag_keys: vec![],
            measure,
            aggregation,
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let end = Utc::now();
        (end - Duration::seconds(10), end)
    }

    #[test]
    fn last_value_is_a_gauge_point() {
        let (start, end) = window();
        let view = view(Measure::int64("m", "m"), Aggregation::last_value());
        let row = Row::new(vec![], AggregationData::LastValue { value: 7.0 });

        let point = new_point(&view, &row, start, end).unwrap();
        assert_eq!(point.interval.start_time, None);
        assert_eq!(point.interval.end_time, end);
        assert_eq!(point.value, TypedValue::Int64Value(7));
    }

    #[test]
    fn sum_is_a_cumulative_point() {
        let (start, end) = window();
        let view = view(Measure::float64("m", "m"), Aggregation::sum());
        let row = Row::new(vec![], AggregationData::Sum { value: 2.5 });

        let point = new_point(&view, &row, start, end).unwrap();
        assert_eq!(point.interval.start_time, Some(start));
        assert_eq!(point.interval.end_time, end);
        assert_eq!(point.value, TypedValue::DoubleValue(2.5));
    }

    #[test]
    fn integer_sum_truncates_to_int64() {
        let (start, end) = window();
        let view = view(Measure::int64("m", "m"), Aggregation::sum());
        let row = Row::new(vec![], AggregationData::Sum { value: 12.0 });

        let point = new_point(&view, &row, start, end).unwrap();
        assert_eq!(point.value, TypedValue::Int64Value(12));
    }

    #[test]
    fn count_is_int64_regardless_of_measure() {
        let (start, end) = window();
        let view = view(Measure::float64("m", "m"), Aggregation::count());
        let row = Row::new(vec![], AggregationData::Count { value: 3 });

        let point = new_point(&view, &row, start, end).unwrap();
        assert_eq!(point.interval.start_time, Some(start));
        assert_eq!(point.value, TypedValue::Int64Value(3));
    }

    #[test]
    fn distribution_copies_bounds_and_counts() {
        let (start, end) = window();
        let view = view(
            Measure::float64("m", "m"),
            Aggregation::distribution([1.0, 5.0]),
        );
        let row = Row::new(
            vec![],
            AggregationData::Distribution(DistributionData {
                count: 4,
                min: 0.5,
                max: 9.0,
                mean: 3.0,
                sum_of_squared_dev: 40.5,
                count_per_bucket: vec![1, 2, 1],
            }),
        );

        let point = new_point(&view, &row, start, end).unwrap();
        assert_eq!(
            point.value,
            TypedValue::DistributionValue(Distribution {
                count: 4,
                mean: 3.0,
                sum_of_squared_deviation: 40.5,
                bucket_options: BucketOptions {
                    explicit_buckets: ExplicitBuckets {
                        bounds: vec![1.0, 5.0],
                    },
                },
                bucket_counts: vec![1, 2, 1],
            })
        );
    }

    #[test]
    fn distribution_with_mismatched_buckets_is_inconsistent() {
        let (start, end) = window();
        let view = view(
            Measure::float64("m", "m"),
            Aggregation::distribution([1.0, 5.0]),
        );
        let row = Row::new(
            vec![],
            AggregationData::Distribution(DistributionData {
                count: 1,
                count_per_bucket: vec![1],
                ..Default::default()
            }),
        );

        assert_eq!(new_point(&view, &row, start, end), None);
    }

    #[test]
    fn aggregation_mismatch_is_inconsistent() {
        let (start, end) = window();
        let view = view(Measure::int64("m", "m"), Aggregation::sum());
        let row = Row::new(vec![], AggregationData::Count { value: 1 });

        assert_eq!(new_point(&view, &row, start, end), None);
    }
}
