//! Fixtures and mocks shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing_subscriber::EnvFilter;

use crate::{
    batch::{BatchHandler, BatchSettings, BundleError, Bundler},
    client::MetricClient,
    errors::{ErrorHandler, ExportError},
    exporter::BundlerFactory,
    gcp::{CreateTimeSeriesRequest, MonitoredResource, TypedValue},
    view::{Aggregation, AggregationData, Measure, Row, RowData, Tag, View},
};

pub const PROJECT_1: &str = "project-1";
pub const PROJECT_2: &str = "project-2";

pub fn trace_init() {
    let filter = std::env::var("TEST_LOG").unwrap_or_else(|_| "error".to_string());
    _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

pub fn invalid_data_error() -> crate::Error {
    "invalid data".into()
}

pub fn sum_view(name: &str) -> Arc<View> {
    Arc::new(View {
        name: name.to_string(),
        description: format!("this is {name}"),
        tag_keys: Vec::new(),
        measure: Measure::int64(name, ""),
        aggregation: Aggregation::sum(),
    })
}

pub fn sum_row(tags: Vec<Tag>, value: i64) -> Arc<Row> {
    Arc::new(Row::new(
        tags,
        AggregationData::Sum {
            value: value as f64,
        },
    ))
}

pub fn int64_row(view: &Arc<View>, value: i64) -> RowData {
    let end = Utc.timestamp_opt(1_500_000_000, 0).unwrap();
    RowData::new(
        Arc::clone(view),
        end - Duration::seconds(10),
        end,
        sum_row(Vec::new(), value),
    )
}

/// Two int64 sum views and a handful of rows with distinct values 1 through 5, so that uploaded
/// requests can be checked by their values alone.
pub struct Fixtures {
    pub view1: Arc<View>,
    pub view2: Arc<View>,
    pub view1_rows: [Arc<Row>; 3],
    pub view2_rows: [Arc<Row>; 2],
    /// A row whose data doesn't match its view's aggregation.
    pub invalid: Arc<Row>,
    pub start1: DateTime<Utc>,
    pub end1: DateTime<Utc>,
    pub start2: DateTime<Utc>,
    pub end2: DateTime<Utc>,
}

impl Fixtures {
    pub fn new() -> Self {
        let view1 = sum_view("metric_1");
        let view2 = Arc::new(View {
            tag_keys: vec!["key_1".into(), "key_2".into(), "key_3".into()],
            ..(*sum_view("metric_2")).clone()
        });
        let tags = |values: [&str; 3]| {
            vec![
                Tag::new("key_1", values[0]),
                Tag::new("key_2", values[1]),
                Tag::new("key_3", values[2]),
            ]
        };

        let end2 = Utc.timestamp_opt(1_500_000_000, 0).unwrap();
        let start2 = end2 - Duration::seconds(10);
        let end1 = start2 - Duration::seconds(1);
        let start1 = end1 - Duration::seconds(10);

        Self {
            view1,
            view2,
            view1_rows: [
                sum_row(Vec::new(), 1),
                sum_row(Vec::new(), 2),
                sum_row(Vec::new(), 3),
            ],
            view2_rows: [
                sum_row(tags(["value_1", "value_2", "value_3"]), 4),
                sum_row(tags(["value_4", "value_5", "value_6"]), 5),
            ],
            invalid: Arc::new(Row::new(Vec::new(), AggregationData::Count { value: 1 })),
            start1,
            end1,
            start2,
            end2,
        }
    }

    pub fn view1_row(&self, index: usize) -> RowData {
        RowData::new(
            Arc::clone(&self.view1),
            self.start1,
            self.end1,
            Arc::clone(&self.view1_rows[index]),
        )
    }

    pub fn view2_row(&self, index: usize) -> RowData {
        RowData::new(
            Arc::clone(&self.view2),
            self.start2,
            self.end2,
            Arc::clone(&self.view2_rows[index]),
        )
    }

    pub fn invalid_row(&self) -> RowData {
        RowData::new(
            Arc::clone(&self.view2),
            self.start2,
            self.end2,
            Arc::clone(&self.invalid),
        )
    }
}

pub fn resource1() -> MonitoredResource {
    MonitoredResource::new("cloudsql_database")
        .with_label("project_id", PROJECT_1)
        .with_label("region", "us-central1")
        .with_label("database_id", "cloud-SQL-instance-1")
}

pub fn resource2() -> MonitoredResource {
    MonitoredResource::new("gce_instance")
        .with_label("project_id", PROJECT_2)
        .with_label("zone", "us-east1")
        .with_label("database_id", "GCE-instance-1")
}

/// Extracts the int64 value of every time series, one list per request.
pub fn int64_values(requests: &[CreateTimeSeriesRequest]) -> Vec<Vec<i64>> {
    requests
        .iter()
        .map(|request| {
            request
                .time_series
                .iter()
                .map(|series| match series.points[0].value {
                    TypedValue::Int64Value(value) => value,
                    ref other => panic!("not an int64 value: {other:?}"),
                })
                .collect()
        })
        .collect()
}

/// Records every request. Each scripted error is returned by one call, in order; once they are
/// used up, calls succeed.
#[derive(Default)]
pub struct MockMetricClient {
    requests: Mutex<Vec<CreateTimeSeriesRequest>>,
    errors: Mutex<VecDeque<crate::Error>>,
    close_error: Mutex<Option<crate::Error>>,
    requests_at_close: Mutex<Option<usize>>,
    closed: AtomicBool,
}

impl MockMetricClient {
    pub fn push_error(&self, error: crate::Error) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn fail_close(&self, error: crate::Error) {
        *self.close_error.lock().unwrap() = Some(error);
    }

    pub fn requests(&self) -> Vec<CreateTimeSeriesRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The number of requests received before the client was closed.
    pub fn requests_at_close(&self) -> Option<usize> {
        *self.requests_at_close.lock().unwrap()
    }
}

#[async_trait]
impl MetricClient for MockMetricClient {
    async fn create_time_series(&self, request: CreateTimeSeriesRequest) -> crate::Result<()> {
        assert!(!self.is_closed(), "request after close");
        self.requests.lock().unwrap().push(request);
        match self.errors.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn close(&self) -> crate::Result<()> {
        *self.requests_at_close.lock().unwrap() = Some(self.requests.lock().unwrap().len());
        self.closed.store(true, Ordering::Release);
        match self.close_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Collects every reported error as its message and the rows that came with it.
#[derive(Clone, Default)]
pub struct ErrorStore {
    errors: Arc<Mutex<Vec<(String, Vec<RowData>)>>>,
}

impl ErrorStore {
    pub fn len(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    /// Checks the reported errors in order by message prefix, message suffix and rows.
    #[track_caller]
    pub fn assert_errors(&self, expected: &[(&str, &str, Vec<RowData>)]) {
        let errors = self.errors.lock().unwrap();
        assert_eq!(
            errors.len(),
            expected.len(),
            "number of reported errors: {errors:?}"
        );
        for (i, ((message, rows), (prefix, suffix, expected_rows))) in
            errors.iter().zip(expected).enumerate()
        {
            assert!(
                message.starts_with(prefix),
                "error {i}: {message:?} does not start with {prefix:?}"
            );
            assert!(
                message.ends_with(suffix),
                "error {i}: {message:?} does not end with {suffix:?}"
            );
            similar_asserts::assert_eq!(rows, expected_rows, "rows of error {i}");
        }
    }
}

impl ErrorHandler for ErrorStore {
    fn on_error(&self, error: ExportError, rows: &[RowData]) {
        assert!(!rows.is_empty(), "error reported without rows: {error}");
        self.errors
            .lock()
            .unwrap()
            .push((error.to_string(), rows.to_vec()));
    }
}

/// A bundler that only remembers what was added to it.
#[derive(Default)]
pub struct RecordingBundler {
    rows: Mutex<Vec<RowData>>,
}

#[async_trait]
impl Bundler for RecordingBundler {
    fn add(&self, row: &RowData) -> Result<(), BundleError> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn flush(&self) {}

    async fn close(&self) {}
}

/// Hands out [`RecordingBundler`]s and keeps track of them by project.
#[derive(Clone, Default)]
pub struct RecordingBundlers {
    bundlers: Arc<Mutex<HashMap<String, Arc<RecordingBundler>>>>,
}

impl RecordingBundlers {
    pub fn factory(&self) -> BundlerFactory {
        let bundlers = Arc::clone(&self.bundlers);
        Arc::new(
            move |project_id: &str, _settings: BatchSettings, _handler: Arc<dyn BatchHandler>| {
                let bundler = Arc::new(RecordingBundler::default());
                bundlers
                    .lock()
                    .unwrap()
                    .insert(project_id.to_string(), Arc::clone(&bundler));
                bundler as Arc<dyn Bundler>
            },
        )
    }

    pub fn rows(&self) -> HashMap<String, Vec<RowData>> {
        self.bundlers
            .lock()
            .unwrap()
            .iter()
            .map(|(project_id, bundler)| {
                (project_id.clone(), bundler.rows.lock().unwrap().clone())
            })
            .collect()
    }
}
