//! The multi-project stats exporter.

use std::{
    collections::HashMap,
    fmt, mem, slice,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::join_all;
use snafu::ResultExt;
use tokio_util::task::TaskTracker;

use crate::{
    batch::{BatchHandler, BatchSettings, Batcher, BundleError, Bundler},
    classify::{ClassifyError, NotApplicable, ProjectClassifier, TagClassifier},
    client::MetricClient,
    config::{BuildError, ExporterConfig, InvalidBatchSnafu},
    errors::{CloseError, ErrorHandler, ExportError, IgnoreErrors},
    internal_events::{OversizedRowUploaded, ProjectCreated, RowDataNotApplicable},
    resource::{GlobalResource, ResourceBuilder},
    upload::{ExportContext, ProjectUploader},
    view::{RowData, ViewData},
};

/// Creates the bundler of a project. It receives the project ID, the validated batch settings
/// and the handler that uploads the batches.
pub type BundlerFactory =
    Arc<dyn Fn(&str, BatchSettings, Arc<dyn BatchHandler>) -> Arc<dyn Bundler> + Send + Sync>;

fn default_bundler_factory() -> BundlerFactory {
    Arc::new(
        |project_id: &str, settings: BatchSettings, handler: Arc<dyn BatchHandler>| {
            Arc::new(Batcher::new(project_id, settings, handler)) as Arc<dyn Bundler>
        },
    )
}

struct ProjectData {
    bundler: Arc<dyn Bundler>,
    uploader: Arc<ProjectUploader>,
}

#[derive(Default)]
struct Projects {
    by_id: HashMap<String, ProjectData>,
    closed: bool,
}

/// Builder for [`StatsExporter`]. Every callback is optional.
pub struct StatsExporterBuilder {
    config: ExporterConfig,
    client: Arc<dyn MetricClient>,
    classifier: Option<Arc<dyn ProjectClassifier>>,
    resource_builder: Option<Arc<dyn ResourceBuilder>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    bundler_factory: Option<BundlerFactory>,
}

impl StatsExporterBuilder {
    /// Routes rows to projects. Takes precedence over `project_key_name`.
    #[must_use]
    pub fn classifier(mut self, classifier: impl ProjectClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Builds the monitored resource of every time series. Defaults to [`GlobalResource`].
    #[must_use]
    pub fn resource_builder(mut self, resource_builder: impl ResourceBuilder + 'static) -> Self {
        self.resource_builder = Some(Arc::new(resource_builder));
        self
    }

    /// Receives every export error along with the affected rows. Defaults to [`IgnoreErrors`].
    #[must_use]
    pub fn error_handler(mut self, error_handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(error_handler));
        self
    }

    /// Replaces the per-project [`Batcher`].
    #[must_use]
    pub fn bundler_factory(mut self, bundler_factory: BundlerFactory) -> Self {
        self.bundler_factory = Some(bundler_factory);
        self
    }

    pub fn build(self) -> Result<StatsExporter, BuildError> {
        self.config.validate()?;
        let batch = self.config.batch.validate().context(InvalidBatchSnafu)?;

        let ExporterConfig {
            default_labels,
            project_key_name,
            unexported_labels,
            max_time_series_per_request,
            ..
        } = self.config;

        let classifier = match (self.classifier, project_key_name) {
            (Some(classifier), _) => classifier,
            (None, Some(key)) => Arc::new(TagClassifier::new(key, &default_labels)),
            (None, None) => Arc::new(NotApplicable),
        };

        let context = ExportContext {
            client: self.client,
            resource_builder: self
                .resource_builder
                .unwrap_or_else(|| Arc::new(GlobalResource)),
            error_handler: self.error_handler.unwrap_or_else(|| Arc::new(IgnoreErrors)),
            default_labels,
            unexported_labels,
            max_time_series_per_request,
        };

        Ok(StatsExporter {
            classifier,
            context: Arc::new(context),
            batch,
            bundler_factory: self
                .bundler_factory
                .unwrap_or_else(default_bundler_factory),
            projects: Mutex::new(Projects::default()),
            tracker: TaskTracker::new(),
        })
    }
}

/// Exports view data to Stackdriver, splitting it up by GCP project.
///
/// Every row is classified to a project and queued in that project's bundler. Batches are uploaded
/// in `CreateTimeSeries` calls from the bundler's task. Failures are never returned to the caller;
/// they go to the error handler together with the rows they affect.
///
/// Exporting and flushing spawn Tokio tasks, so they must be called from within a Tokio runtime.
pub struct StatsExporter {
    classifier: Arc<dyn ProjectClassifier>,
    context: Arc<ExportContext>,
    batch: BatchSettings,
    bundler_factory: BundlerFactory,
    projects: Mutex<Projects>,
    tracker: TaskTracker,
}

impl fmt::Debug for StatsExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsExporter")
            .field("batch", &self.batch)
            .field("projects", &self.lock_projects().by_id.len())
            .finish_non_exhaustive()
    }
}

impl StatsExporter {
    pub fn builder(config: ExporterConfig, client: Arc<dyn MetricClient>) -> StatsExporterBuilder {
        StatsExporterBuilder {
            config,
            client,
            classifier: None,
            resource_builder: None,
            error_handler: None,
            bundler_factory: None,
        }
    }

    /// Queues every row of `data` for export.
    pub fn export_view(&self, data: &ViewData) {
        for row in data.row_data() {
            self.export_row(row);
        }
    }

    /// Queues a single row for export.
    pub fn export_row(&self, row: RowData) {
        let project_id = match self.classifier.project_id(&row) {
            Ok(project_id) => project_id,
            Err(ClassifyError::NotApplicable) => {
                emit!(RowDataNotApplicable {
                    view: &row.view.name
                });
                return;
            }
            Err(ClassifyError::Failed { source }) => {
                let error = ExportError::GetProjectId {
                    view: row.view.name.clone(),
                    source,
                };
                self.context.report(error, slice::from_ref(&row));
                return;
            }
        };

        let Some((bundler, uploader)) = self.project(&project_id) else {
            self.report_bundle_error(project_id, BundleError::Closed, &row);
            return;
        };

        match bundler.add(&row) {
            Ok(()) => {}
            Err(BundleError::Oversized { size, .. }) => {
                emit!(OversizedRowUploaded {
                    project_id: &project_id,
                    view: &row.view.name,
                    byte_size: size,
                });
                self.tracker
                    .spawn(async move { uploader.upload(vec![row]).await });
            }
            Err(error) => self.report_bundle_error(project_id, error, &row),
        }
    }

    /// Uploads everything that is queued and waits for it to finish.
    pub async fn flush(&self) {
        let bundlers: Vec<_> = self
            .lock_projects()
            .by_id
            .values()
            .map(|project| Arc::clone(&project.bundler))
            .collect();
        join_all(bundlers.iter().map(|bundler| bundler.flush())).await;
    }

    /// Flushes all projects, waits for in-flight uploads and closes the metric client.
    ///
    /// Rows exported afterwards are reported as rejected by the bundler.
    pub async fn close(&self) -> Result<(), CloseError> {
        let projects = {
            let mut projects = self.lock_projects();
            projects.closed = true;
            mem::take(&mut projects.by_id)
        };

        join_all(projects.values().map(|project| project.bundler.close())).await;
        self.tracker.close();
        self.tracker.wait().await;

        self.context.client.close().await.map_err(CloseError::new)
    }

    fn project(&self, project_id: &str) -> Option<(Arc<dyn Bundler>, Arc<ProjectUploader>)> {
        let mut projects = self.lock_projects();
        if projects.closed {
            return None;
        }

        let project = projects
            .by_id
            .entry(project_id.to_string())
            .or_insert_with(|| {
                emit!(ProjectCreated { project_id });
                let uploader = Arc::new(ProjectUploader::new(
                    project_id.to_string(),
                    Arc::clone(&self.context),
                ));
                let handler = Arc::clone(&uploader) as Arc<dyn BatchHandler>;
                ProjectData {
                    bundler: (self.bundler_factory)(uploader.project_id(), self.batch, handler),
                    uploader,
                }
            });
        Some((Arc::clone(&project.bundler), Arc::clone(&project.uploader)))
    }

    fn report_bundle_error(&self, project_id: String, source: BundleError, row: &RowData) {
        let error = ExportError::AddToBundle {
            view: row.view.name.clone(),
            project_id,
            source,
        };
        self.context.report(error, slice::from_ref(row));
    }

    fn lock_projects(&self) -> MutexGuard<'_, Projects> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
