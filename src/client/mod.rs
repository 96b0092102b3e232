//! Clients for the Stackdriver Monitoring API.

use async_trait::async_trait;

use crate::gcp::CreateTimeSeriesRequest;

mod http;

pub use self::http::{HttpClientConfig, HttpError, HttpMetricClient};

/// The subset of the Monitoring API the exporter needs.
///
/// The client is shared by every project of an exporter, so calls for different projects may run
/// concurrently.
#[async_trait]
pub trait MetricClient: Send + Sync {
    /// Writes the time series of `request` to the project named by `request.name`.
    async fn create_time_series(&self, request: CreateTimeSeriesRequest) -> crate::Result<()>;

    /// Releases the client. Called once, after every upload of the exporter has finished.
    async fn close(&self) -> crate::Result<()>;
}
