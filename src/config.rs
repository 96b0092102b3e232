use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::batch::{BatchConfig, BatchError};

/// Stackdriver rejects requests with more time series than this.
pub const MAX_TIME_SERIES_PER_REQUEST: usize = 200;

const fn default_max_time_series_per_request() -> usize {
    MAX_TIME_SERIES_PER_REQUEST
}

#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum BuildError {
    #[snafu(display("Invalid batch settings: {source}"))]
    InvalidBatch { source: BatchError },
    #[snafu(display("`project_key_name` must not be empty"))]
    EmptyProjectKey,
    #[snafu(display("The maximum number of time series per request must be positive"))]
    ZeroMaxTimeSeries,
}

/// Configuration of a [`StatsExporter`](crate::StatsExporter).
///
/// Callbacks are not part of the configuration; they are passed to the exporter's builder.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// Labels attached to every time series.
    ///
    /// Tags of a row take precedence over default labels with the same key. Use default labels for
    /// values that stay the same for the lifetime of the exporter, such as the program's version.
    #[serde(default)]
    pub default_labels: BTreeMap<String, String>,

    /// The label holding the ID of the project a row is exported to.
    ///
    /// When set, and no classifier is passed to the builder, rows are routed by the value of this
    /// label, looked up in the row's tags first and in the default labels second. Rows without it
    /// are dropped.
    #[serde(default)]
    pub project_key_name: Option<String>,

    /// Labels that are never exported.
    ///
    /// They are still visible to the resource builder, which makes them a good place for the
    /// project ID and for values that only matter for the monitored resource.
    #[serde(default)]
    pub unexported_labels: Vec<String>,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(skip, default = "default_max_time_series_per_request")]
    pub(crate) max_time_series_per_request: usize,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            default_labels: BTreeMap::new(),
            project_key_name: None,
            unexported_labels: Vec::new(),
            batch: BatchConfig::default(),
            max_time_series_per_request: MAX_TIME_SERIES_PER_REQUEST,
        }
    }
}

impl ExporterConfig {
    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if self.project_key_name.as_deref() == Some("") {
            return Err(BuildError::EmptyProjectKey);
        }
        if self.max_time_series_per_request == 0 {
            return Err(BuildError::ZeroMaxTimeSeries);
        }
        Ok(())
    }
}
