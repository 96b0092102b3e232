//! Output types of the stats aggregation library.
//!
//! Aggregation itself happens upstream. These types only describe what a view snapshot looks like
//! when it reaches the exporter: one [`View`] definition, the time window the snapshot covers, and
//! one [`Row`] per distinct tag combination.

use std::{mem, sync::Arc};

use chrono::{DateTime, Utc};

/// The value type recorded by a measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasureKind {
    Int64,
    Float64,
}

/// A named quantity that gets recorded and then aggregated by views.
#[derive(Clone, Debug, PartialEq)]
pub struct Measure {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub kind: MeasureKind,
}

impl Measure {
    pub fn int64(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, MeasureKind::Int64)
    }

    pub fn float64(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, MeasureKind::Float64)
    }

    fn new(name: impl Into<String>, description: impl Into<String>, kind: MeasureKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: "1".to_string(),
            kind,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationKind {
    Count,
    Sum,
    Distribution,
    LastValue,
}

impl AggregationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Distribution => "distribution",
            Self::LastValue => "last_value",
        }
    }
}

/// How a view aggregates its measure.
///
/// `buckets` holds the explicit bucket boundaries and is only meaningful for distributions.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregation {
    pub kind: AggregationKind,
    pub buckets: Vec<f64>,
}

impl Aggregation {
    pub const fn count() -> Self {
        Self {
            kind: AggregationKind::Count,
            buckets: Vec::new(),
        }
    }

    pub const fn sum() -> Self {
        Self {
            kind: AggregationKind::Sum,
            buckets: Vec::new(),
        }
    }

    pub const fn last_value() -> Self {
        Self {
            kind: AggregationKind::LastValue,
            buckets: Vec::new(),
        }
    }

    pub fn distribution(bounds: impl Into<Vec<f64>>) -> Self {
        Self {
            kind: AggregationKind::Distribution,
            buckets: bounds.into(),
        }
    }
}

/// A named metric definition: a measure, the tag keys it is broken down by, and an aggregation.
#[derive(Clone, Debug, PartialEq)]
pub struct View {
    pub name: String,
    pub description: String,
    pub tag_keys: Vec<String>,
    pub measure: Measure,
    pub aggregation: Aggregation,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Summary of a distribution aggregation.
///
/// `count_per_bucket` has one entry more than the view's bucket boundaries; the last entry counts
/// the overflow bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DistributionData {
    pub count: i64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum_of_squared_dev: f64,
    pub count_per_bucket: Vec<i64>,
}

/// The aggregated value of a single row.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregationData {
    Count { value: i64 },
    Sum { value: f64 },
    LastValue { value: f64 },
    Distribution(DistributionData),
}

impl AggregationData {
    pub const fn kind(&self) -> AggregationKind {
        match self {
            Self::Count { .. } => AggregationKind::Count,
            Self::Sum { .. } => AggregationKind::Sum,
            Self::LastValue { .. } => AggregationKind::LastValue,
            Self::Distribution(_) => AggregationKind::Distribution,
        }
    }

    fn allocated_bytes(&self) -> usize {
        match self {
            Self::Distribution(data) => data.count_per_bucket.len() * mem::size_of::<i64>(),
            _ => 0,
        }
    }
}

/// One tag combination's aggregated value within a view snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub tags: Vec<Tag>,
    pub data: AggregationData,
}

impl Row {
    pub const fn new(tags: Vec<Tag>, data: AggregationData) -> Self {
        Self { tags, data }
    }
}

/// A snapshot of one view as handed over by the aggregation library.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewData {
    pub view: Arc<View>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rows: Vec<Arc<Row>>,
}

impl ViewData {
    /// Splits the snapshot into the per-row units the exporter works on.
    pub fn row_data(&self) -> impl Iterator<Item = RowData> + '_ {
        self.rows.iter().map(|row| RowData {
            view: Arc::clone(&self.view),
            start: self.start,
            end: self.end,
            row: Arc::clone(row),
        })
    }
}

/// A single row of a view snapshot together with its view and time window.
///
/// This is the unit of work of the exporter. A view snapshot may hold rows belonging to several
/// projects, so the snapshot is split up before anything else happens. Cloning is cheap; the view
/// and row are shared.
#[derive(Clone, Debug, PartialEq)]
pub struct RowData {
    pub view: Arc<View>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub row: Arc<Row>,
}

impl RowData {
    pub const fn new(
        view: Arc<View>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        row: Arc<Row>,
    ) -> Self {
        Self {
            view,
            start,
            end,
            row,
        }
    }

    /// Approximate number of bytes this row contributes to a batch.
    ///
    /// The view is shared between rows and is not counted.
    pub fn estimated_size(&self) -> usize {
        let tags: usize = self
            .row
            .tags
            .iter()
            .map(|tag| tag.key.len() + tag.value.len())
            .sum();
        mem::size_of::<Self>() + mem::size_of::<Row>() + tags + self.row.data.allocated_bytes()
    }
}
