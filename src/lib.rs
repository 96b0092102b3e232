#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

//! Exports aggregated stats views to Stackdriver Monitoring.
//!
//! A single [`StatsExporter`] can publish to many GCP projects at once. Every row of an incoming
//! [`ViewData`] is classified to a project, buffered in that project's [`Batcher`], and uploaded
//! in `CreateTimeSeries` calls of bounded size. Data-level failures never surface as panics or
//! returned errors; they are handed to the configured [`ErrorHandler`] together with the rows they
//! affect, so callers can resubmit those rows if they wish.

#[macro_use]
extern crate tracing;

#[macro_use]
mod internal_events;

pub mod batch;
pub mod classify;
pub mod client;
pub mod config;
pub mod errors;
pub mod exporter;
pub mod gcp;
pub mod labels;
pub mod point;
pub mod resource;
#[cfg(test)]
pub mod test_util;
mod upload;
pub mod view;

pub use batch::{
    BatchConfig, BatchError, BatchHandler, BatchSettings, Batcher, BundleError, Bundler,
};
pub use classify::{ClassifyError, NotApplicable, ProjectClassifier, TagClassifier};
pub use client::{HttpClientConfig, HttpError, HttpMetricClient, MetricClient};
pub use config::{BuildError, ExporterConfig};
pub use errors::{CloseError, ErrorHandler, ExportError, IgnoreErrors};
pub use exporter::{BundlerFactory, StatsExporter, StatsExporterBuilder};
pub use resource::{GlobalResource, ResourceBuilder};
pub use view::{
    Aggregation, AggregationData, AggregationKind, DistributionData, Measure, MeasureKind, Row,
    RowData, Tag, View, ViewData,
};

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;
