//! Statistics for the subscription directory

pub mod metrics;

pub use metrics::DirectoryStats;
pub(crate) use metrics::DirectoryMetrics;
