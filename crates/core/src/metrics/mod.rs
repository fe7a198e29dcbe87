pub mod platform_metrics;
pub mod registry;

pub use platform_metrics::PlatformMetrics;
pub use registry::{MetricsRegistry, MetricsService};