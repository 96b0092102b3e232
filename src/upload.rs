use std::{collections::BTreeMap, slice, sync::Arc};

use async_trait::async_trait;
use snafu::ResultExt;

use crate::{
    batch::BatchHandler,
    client::MetricClient,
    errors::{
        CreateTimeSeriesSnafu, ErrorHandler, ExportError, InconsistentDataSnafu, MakeResourceSnafu,
    },
    gcp::{CreateTimeSeriesRequest, Metric, TimeSeries},
    internal_events::{ExportErrorReported, TimeSeriesSent},
    labels::{raw_labels, strip_unexported},
    point::new_point,
    resource::ResourceBuilder,
    view::RowData,
};

/// State shared by every project of one exporter.
pub(crate) struct ExportContext {
    pub(crate) client: Arc<dyn MetricClient>,
    pub(crate) resource_builder: Arc<dyn ResourceBuilder>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) default_labels: BTreeMap<String, String>,
    pub(crate) unexported_labels: Vec<String>,
    pub(crate) max_time_series_per_request: usize,
}

impl ExportContext {
    pub(crate) fn report(&self, error: ExportError, rows: &[RowData]) {
        emit!(ExportErrorReported {
            error: &error,
            count: rows.len(),
        });
        self.error_handler.on_error(error, rows);
    }
}

/// Turns batches of one project into `CreateTimeSeries` calls.
pub(crate) struct ProjectUploader {
    project_id: String,
    context: Arc<ExportContext>,
}

impl ProjectUploader {
    pub(crate) const fn new(project_id: String, context: Arc<ExportContext>) -> Self {
        Self {
            project_id,
            context,
        }
    }

    pub(crate) fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Uploads `rows` in as many requests as the per-request limit requires.
    ///
    /// A failed request is reported with exactly the rows it carried; the remaining requests are
    /// still sent.
    pub(crate) async fn upload(&self, rows: Vec<RowData>) {
        let mut remaining = rows.as_slice();
        while !remaining.is_empty() {
            let (request, included, rest) = self.make_request(remaining);
            remaining = rest;
            let Some(request) = request else {
                continue;
            };

            let count = request.time_series.len();
            match self
                .context
                .client
                .create_time_series(request)
                .await
                .context(CreateTimeSeriesSnafu {
                    project_id: &self.project_id,
                }) {
                Ok(()) => emit!(TimeSeriesSent {
                    project_id: &self.project_id,
                    count,
                }),
                Err(error) => self.context.report(error, &included),
            }
        }
    }

    /// Builds the next request out of `rows`.
    ///
    /// Returns the request, the rows it holds and the rows left over once the request is full.
    /// Rows that can't be converted are reported on the spot and left out. The request is `None`
    /// when none of the consumed rows made it in.
    pub(crate) fn make_request<'a>(
        &self,
        rows: &'a [RowData],
    ) -> (
        Option<CreateTimeSeriesRequest>,
        Vec<RowData>,
        &'a [RowData],
    ) {
        let limit = self.context.max_time_series_per_request;
        let mut time_series = Vec::new();
        let mut included = Vec::new();
        let mut consumed = 0;

        for row in rows {
            consumed += 1;
            match self.time_series(row) {
                Ok(series) => {
                    time_series.push(series);
                    included.push(row.clone());
                    if time_series.len() >= limit {
                        break;
                    }
                }
                Err(error) => self.context.report(error, slice::from_ref(row)),
            }
        }

        let request = (!time_series.is_empty())
            .then(|| CreateTimeSeriesRequest::new(&self.project_id, time_series));
        (request, included, &rows[consumed..])
    }

    fn time_series(&self, row: &RowData) -> Result<TimeSeries, ExportError> {
        let view = &row.view;
        let point = new_point(view, &row.row, row.start, row.end).ok_or_else(|| {
            InconsistentDataSnafu {
                view: &view.name,
            }
            .build()
        })?;

        let labels = raw_labels(&self.context.default_labels, &row.row.tags);
        let resource = self
            .context
            .resource_builder
            .build(row, &labels)
            .context(MakeResourceSnafu { view: &view.name })?;

        let metric = Metric {
            r#type: view.name.clone(),
            labels: strip_unexported(labels, &self.context.unexported_labels),
        };
        Ok(TimeSeries::new(metric, resource, point))
    }
}

#[async_trait]
impl BatchHandler for ProjectUploader {
    async fn handle(&self, rows: Vec<RowData>) {
        self.upload(rows).await;
    }
}
