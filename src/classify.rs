//! Routing of rows to GCP projects.

use std::collections::BTreeMap;

use snafu::Snafu;

use crate::view::RowData;

#[derive(Debug, Snafu)]
pub enum ClassifyError {
    /// The row doesn't belong to this exporter. It is dropped without being reported.
    #[snafu(display("row data is not applicable to this exporter"))]
    NotApplicable,

    #[snafu(display("{source}"))]
    Failed { source: crate::Error },
}

impl ClassifyError {
    pub fn failed(error: impl Into<crate::Error>) -> Self {
        Self::Failed {
            source: error.into(),
        }
    }
}

/// Decides which project a row is exported to.
///
/// Implementations must be cheap and free of side effects; they are called once per row on the
/// ingestion path.
pub trait ProjectClassifier: Send + Sync {
    fn project_id(&self, row: &RowData) -> Result<String, ClassifyError>;
}

impl<F> ProjectClassifier for F
where
    F: Fn(&RowData) -> Result<String, ClassifyError> + Send + Sync,
{
    fn project_id(&self, row: &RowData) -> Result<String, ClassifyError> {
        self(row)
    }
}

/// Treats every row as not applicable.
///
/// Used when neither a classifier nor a project key label is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotApplicable;

impl ProjectClassifier for NotApplicable {
    fn project_id(&self, _row: &RowData) -> Result<String, ClassifyError> {
        Err(ClassifyError::NotApplicable)
    }
}

/// Reads the project ID from a label.
///
/// The row's tags are inspected first. When no tag has the key, the default label with that key
/// is used. Rows with neither are not applicable.
#[derive(Clone, Debug)]
pub struct TagClassifier {
    key: String,
    default_project_id: Option<String>,
}

impl TagClassifier {
    pub fn new(key: impl Into<String>, default_labels: &BTreeMap<String, String>) -> Self {
        let key = key.into();
        let default_project_id = default_labels.get(&key).cloned();
        Self {
            key,
            default_project_id,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl ProjectClassifier for TagClassifier {
    fn project_id(&self, row: &RowData) -> Result<String, ClassifyError> {
        row.row
            .tags
            .iter()
            .find(|tag| tag.key == self.key)
            .map(|tag| tag.value.clone())
            .or_else(|| self.default_project_id.clone())
            .ok_or(ClassifyError::NotApplicable)
    }
}
