//! Wire types of the Stackdriver Monitoring v3 `CreateTimeSeries` call.
//!
//! The types serialize to the JSON mapping of the v3 REST API: camel case field names, int64 values
//! as strings and RFC 3339 timestamps with nanosecond precision.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer, ser::SerializeSeq};

/// A request to write a list of time series to one project.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeSeriesRequest {
    /// The project on which to execute the request, formatted as `projects/{project_id}`.
    #[serde(skip)]
    pub name: String,
    pub time_series: Vec<TimeSeries>,
}

impl CreateTimeSeriesRequest {
    pub fn new(project_id: &str, time_series: Vec<TimeSeries>) -> Self {
        Self {
            name: format!("projects/{project_id}"),
            time_series,
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Metric {
    pub r#type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// The entity a time series describes, such as a VM instance or a database.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredResource {
    pub r#type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    pub fn new(r#type: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricKind {
    Cumulative,
    Gauge,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Int64,
    Double,
    Distribution,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub metric: Metric,
    pub resource: MonitoredResource,
    pub metric_kind: MetricKind,
    pub value_type: ValueType,
    pub points: Vec<Point>,
}

impl TimeSeries {
    /// Creates a time series holding exactly one point.
    ///
    /// The metric kind follows the point's interval: points without a start time are gauges.
    pub fn new(metric: Metric, resource: MonitoredResource, point: Point) -> Self {
        let metric_kind = if point.interval.start_time.is_some() {
            MetricKind::Cumulative
        } else {
            MetricKind::Gauge
        };
        Self {
            metric,
            resource,
            metric_kind,
            value_type: point.value.value_type(),
            points: vec![point],
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Point {
    pub interval: TimeInterval,
    pub value: TypedValue,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_datetime"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_datetime")]
    pub end_time: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TypedValue {
    #[serde(serialize_with = "serialize_int64_value")]
    Int64Value(i64),
    DoubleValue(f64),
    DistributionValue(Distribution),
}

impl TypedValue {
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Int64Value(_) => ValueType::Int64,
            Self::DoubleValue(_) => ValueType::Double,
            Self::DistributionValue(_) => ValueType::Distribution,
        }
    }
}

/// A distribution value. The range field is not populated since the backend rejects it.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    #[serde(serialize_with = "serialize_int64_value")]
    pub count: i64,
    pub mean: f64,
    pub sum_of_squared_deviation: f64,
    pub bucket_options: BucketOptions,
    #[serde(serialize_with = "serialize_int64_values")]
    pub bucket_counts: Vec<i64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BucketOptions {
    pub explicit_buckets: ExplicitBuckets,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExplicitBuckets {
    pub bounds: Vec<f64>,
}

fn serialize_int64_value<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

fn serialize_int64_values<S>(values: &[i64], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for value in values {
        seq.serialize_element(&value.to_string())?;
    }
    seq.end()
}

fn serialize_datetime<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

fn serialize_optional_datetime<S>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(value) => serialize_datetime(value, serializer),
        None => serializer.serialize_none(),
    }
}
