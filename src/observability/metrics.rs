use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub events_emitted_total: IntCounterVec,
    pub sse_connections_active: IntGauge,
    pub batch_plans_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total single-order assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Events published on the bus by kind"),
            &["event"],
        )
        .expect("valid events_emitted_total metric");

        let sse_connections_active =
            IntGauge::new("sse_connections_active", "Currently open streaming connections")
                .expect("valid sse_connections_active metric");

        let batch_plans_total =
            IntCounter::new("batch_plans_total", "Batch route plans computed")
                .expect("valid batch_plans_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(events_emitted_total.clone()))
            .expect("register events_emitted_total");
        registry
            .register(Box::new(sse_connections_active.clone()))
            .expect("register sse_connections_active");
        registry
            .register(Box::new(batch_plans_total.clone()))
            .expect("register batch_plans_total");

        Self {
            registry,
            assignments_total,
            events_emitted_total,
            sse_connections_active,
            batch_plans_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
