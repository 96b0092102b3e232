use snafu::Snafu;

use crate::{batch::BundleError, view::RowData};

/// Errors reported while exporting row data.
///
/// None of these are returned from the exporter's API. They are passed to the configured
/// [`ErrorHandler`] along with the rows they affect.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExportError {
    #[snafu(display("failed to get project ID for view {view}: {source}"))]
    GetProjectId { view: String, source: crate::Error },

    #[snafu(display("inconsistent data found in view {view}"))]
    InconsistentData { view: String },

    #[snafu(display("failed to construct resource of view {view}: {source}"))]
    MakeResource { view: String, source: crate::Error },

    #[snafu(display(
        "failed to add row data of view {view} to bundle for project {project_id}: {source}"
    ))]
    AddToBundle {
        view: String,
        project_id: String,
        source: BundleError,
    },

    #[snafu(display("RPC call to create time series failed for project {project_id}: {source}"))]
    CreateTimeSeries {
        project_id: String,
        source: crate::Error,
    },
}

impl ExportError {
    pub(crate) const fn error_type(&self) -> &'static str {
        match self {
            Self::GetProjectId { .. } => "classification_failed",
            Self::InconsistentData { .. } => "conversion_failed",
            Self::MakeResource { .. } => "resource_failed",
            Self::AddToBundle { .. } => "bundle_failed",
            Self::CreateTimeSeries { .. } => "request_failed",
        }
    }

    pub(crate) const fn stage(&self) -> &'static str {
        match self {
            Self::CreateTimeSeries { .. } => "sending",
            _ => "processing",
        }
    }
}

/// Receives every error that happens while exporting, together with the affected rows.
///
/// At least one row is passed with every error. The rows must be treated as read only; they can
/// be resubmitted later by callers who want to retry.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, error: ExportError, rows: &[RowData]);
}

impl<F> ErrorHandler for F
where
    F: Fn(ExportError, &[RowData]) + Send + Sync,
{
    fn on_error(&self, error: ExportError, rows: &[RowData]) {
        self(error, rows)
    }
}

/// The default handler. Errors are still logged and counted by the exporter.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreErrors;

impl ErrorHandler for IgnoreErrors {
    fn on_error(&self, _error: ExportError, _rows: &[RowData]) {}
}

/// Returned by [`StatsExporter::close`](crate::StatsExporter::close).
#[derive(Debug, Snafu)]
#[snafu(display("failed to close metric client: {source}"))]
pub struct CloseError {
    source: crate::Error,
}

impl CloseError {
    pub(crate) fn new(source: crate::Error) -> Self {
        Self { source }
    }
}
