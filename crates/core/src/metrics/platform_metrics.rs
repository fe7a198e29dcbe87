use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

/// Platform-wide metrics shared across discovery, correlation, gateway
/// and credential-quota concerns. Each crate records against the
/// collectors it owns; `PlatformMetrics` just holds the registrations.
#[derive(Debug, Clone)]
pub struct PlatformMetrics {
    pub discovery_runs_total: IntCounterVec,
    pub discovery_duration_seconds: HistogramVec,

    pub detector_invocations_total: IntCounterVec,
    pub detector_duration_seconds: HistogramVec,

    pub correlation_duration_ms: HistogramVec,
    pub correlation_truncations_total: IntCounterVec,

    pub gateway_connected_clients: IntGaugeVec,
    pub gateway_messages_dropped_total: IntCounterVec,

    pub api_quota_remaining: IntGaugeVec,

    pub rl_adjustments_total: IntCounterVec,
}

impl PlatformMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let discovery_runs_total = IntCounterVec::new(
            Opts::new(
                format!("{}_discovery_runs_total", namespace),
                "Total number of discovery runs, by outcome",
            ),
            &["tenant_id", "platform", "outcome"],
        )?;

        let discovery_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_discovery_duration_seconds", namespace),
                "Wall-clock time to complete a discovery run",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["tenant_id", "platform"],
        )?;

        let detector_invocations_total = IntCounterVec::new(
            Opts::new(
                format!("{}_detector_invocations_total", namespace),
                "Total number of detector invocations",
            ),
            &["detector"],
        )?;

        let detector_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_detector_duration_seconds", namespace),
                "Time spent evaluating a single detector",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["detector"],
        )?;

        let correlation_duration_ms = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_correlation_duration_ms", namespace),
                "Time spent running the cross-platform correlation pipeline",
            )
            .buckets(vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0]),
            &["tenant_id"],
        )?;

        let correlation_truncations_total = IntCounterVec::new(
            Opts::new(
                format!("{}_correlation_truncations_total", namespace),
                "Total number of correlation batches truncated at maxEventsPerBatch",
            ),
            &["tenant_id"],
        )?;

        let gateway_connected_clients = IntGaugeVec::new(
            Opts::new(
                format!("{}_gateway_connected_clients", namespace),
                "Number of currently connected dashboard clients",
            ),
            &["tenant_id"],
        )?;

        let gateway_messages_dropped_total = IntCounterVec::new(
            Opts::new(
                format!("{}_gateway_messages_dropped_total", namespace),
                "Total number of gateway messages dropped (slow consumer or closed socket)",
            ),
            &["tenant_id", "reason"],
        )?;

        let api_quota_remaining = IntGaugeVec::new(
            Opts::new(
                format!("{}_api_quota_remaining", namespace),
                "Remaining daily API quota for a connector platform",
            ),
            &["tenant_id", "platform"],
        )?;

        let rl_adjustments_total = IntCounterVec::new(
            Opts::new(
                format!("{}_rl_adjustments_total", namespace),
                "Total number of reinforcement-learning threshold adjustments",
            ),
            &["metric", "direction"],
        )?;

        Ok(Self {
            discovery_runs_total,
            discovery_duration_seconds,
            detector_invocations_total,
            detector_duration_seconds,
            correlation_duration_ms,
            correlation_truncations_total,
            gateway_connected_clients,
            gateway_messages_dropped_total,
            api_quota_remaining,
            rl_adjustments_total,
        })
    }

    pub fn register_all(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.discovery_runs_total.clone()))?;
        registry.register(Box::new(self.discovery_duration_seconds.clone()))?;
        registry.register(Box::new(self.detector_invocations_total.clone()))?;
        registry.register(Box::new(self.detector_duration_seconds.clone()))?;
        registry.register(Box::new(self.correlation_duration_ms.clone()))?;
        registry.register(Box::new(self.correlation_truncations_total.clone()))?;
        registry.register(Box::new(self.gateway_connected_clients.clone()))?;
        registry.register(Box::new(self.gateway_messages_dropped_total.clone()))?;
        registry.register(Box::new(self.api_quota_remaining.clone()))?;
        registry.register(Box::new(self.rl_adjustments_total.clone()))?;

        Ok(())
    }
}
