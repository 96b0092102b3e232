use metrics::counter;

use crate::errors::ExportError;

pub(crate) trait InternalEvent: Sized {
    fn emit(self);
}

pub(crate) fn emit(event: impl InternalEvent) {
    event.emit();
}

macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event)
    };
}

#[derive(Debug)]
pub(crate) struct RowDataNotApplicable<'a> {
    pub(crate) view: &'a str,
}

impl InternalEvent for RowDataNotApplicable<'_> {
    fn emit(self) {
        trace!(message = "Row data is not applicable; dropping.", view = %self.view);
        counter!("component_discarded_events_total", "intentional" => "true").increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct ExportErrorReported<'a> {
    pub(crate) error: &'a ExportError,
    pub(crate) count: usize,
}

impl InternalEvent for ExportErrorReported<'_> {
    fn emit(self) {
        error!(
            message = "Failed to export row data.",
            error = %self.error,
            count = self.count,
            error_type = self.error.error_type(),
            stage = self.error.stage(),
        );
        counter!(
            "component_errors_total",
            "error_type" => self.error.error_type(),
            "stage" => self.error.stage(),
        )
        .increment(1);
        counter!("component_discarded_events_total", "intentional" => "false")
            .increment(self.count as u64);
    }
}

#[derive(Debug)]
pub(crate) struct TimeSeriesSent<'a> {
    pub(crate) project_id: &'a str,
    pub(crate) count: usize,
}

impl InternalEvent for TimeSeriesSent<'_> {
    fn emit(self) {
        debug!(
            message = "Time series sent.",
            project_id = %self.project_id,
            count = self.count,
        );
        counter!("component_sent_events_total").increment(self.count as u64);
        counter!("requests_sent_total").increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct BatchFlushed<'a> {
    pub(crate) project_id: &'a str,
    pub(crate) count: usize,
    pub(crate) byte_size: usize,
}

impl InternalEvent for BatchFlushed<'_> {
    fn emit(self) {
        trace!(
            message = "Flushing batch.",
            project_id = %self.project_id,
            count = self.count,
            byte_size = self.byte_size,
        );
    }
}

#[derive(Debug)]
pub(crate) struct OversizedRowUploaded<'a> {
    pub(crate) project_id: &'a str,
    pub(crate) view: &'a str,
    pub(crate) byte_size: usize,
}

impl InternalEvent for OversizedRowUploaded<'_> {
    fn emit(self) {
        debug!(
            message = "Row data exceeds the batch item limit; uploading it on its own.",
            project_id = %self.project_id,
            view = %self.view,
            byte_size = self.byte_size,
        );
        counter!("oversized_rows_total").increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct ProjectCreated<'a> {
    pub(crate) project_id: &'a str,
}

impl InternalEvent for ProjectCreated<'_> {
    fn emit(self) {
        debug!(message = "Exporting to new project.", project_id = %self.project_id);
        counter!("projects_created_total").increment(1);
    }
}
