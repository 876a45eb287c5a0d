//! Pushing gathered metrics to a Prometheus-compatible remote-write endpoint.

pub mod proto;
mod writer;

pub use proto::{Label, Sample, TimeSeries, WriteRequest};
pub use writer::{build_series, RemoteWriter};
