use std::collections::BTreeMap;

use crate::{gcp::MonitoredResource, view::RowData};

/// Builds the monitored resource a row's time series is attached to.
///
/// `labels` is the union of the default labels and the row's tags, unexported labels included,
/// which makes unexported labels a convenient place to carry resource-only information.
/// Returning an error drops the row and reports it.
pub trait ResourceBuilder: Send + Sync {
    fn build(
        &self,
        row: &RowData,
        labels: &BTreeMap<String, String>,
    ) -> crate::Result<MonitoredResource>;
}

impl<F> ResourceBuilder for F
where
    F: Fn(&RowData, &BTreeMap<String, String>) -> crate::Result<MonitoredResource> + Send + Sync,
{
    fn build(
        &self,
        row: &RowData,
        labels: &BTreeMap<String, String>,
    ) -> crate::Result<MonitoredResource> {
        self(row, labels)
    }
}

/// Attaches every time series to the `global` resource.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalResource;

impl ResourceBuilder for GlobalResource {
    fn build(
        &self,
        _row: &RowData,
        _labels: &BTreeMap<String, String>,
    ) -> crate::Result<MonitoredResource> {
        Ok(MonitoredResource::new("global"))
    }
}
