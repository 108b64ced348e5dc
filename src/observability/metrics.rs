use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use metrics::{Unit, counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::types::{Cost, Decision};

pub const DECISIONS_TOTAL_METRIC: &str = "spl_decisions_total";
pub const COST_MICROS_TOTAL_METRIC: &str = "spl_cost_micros_total";
pub const PATTERNS_LEARNED_TOTAL_METRIC: &str = "spl_patterns_learned_total";
pub const BACKEND_FAILURES_TOTAL_METRIC: &str = "spl_backend_failures_total";

const DEFAULT_METRICS_PORT: u16 = 9464;

#[derive(Debug, Clone, Copy)]
pub struct MetricsRuntime {
    pub listen_addr: SocketAddr,
}

impl MetricsRuntime {
    pub fn default_listen_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_METRICS_PORT)
    }
}

pub fn start_prometheus_exporter(listen_addr: SocketAddr) -> Result<MetricsRuntime, BuildError> {
    describe_counter!(
        DECISIONS_TOTAL_METRIC,
        Unit::Count,
        "Decisions produced, labelled by agent, layer and method."
    );
    describe_counter!(
        COST_MICROS_TOTAL_METRIC,
        "Incurred processing cost in micro-dollars."
    );
    describe_counter!(
        PATTERNS_LEARNED_TOTAL_METRIC,
        Unit::Count,
        "Learned pattern proposals accepted into shared state."
    );
    describe_counter!(
        BACKEND_FAILURES_TOTAL_METRIC,
        Unit::Count,
        "Deliberations that ended without a backend answer."
    );

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()?;

    Ok(MetricsRuntime { listen_addr })
}

pub fn record_decision(agent_id: &str, decision: &Decision) {
    counter!(
        DECISIONS_TOTAL_METRIC,
        "agent" => agent_id.to_string(),
        "layer" => decision.layer.name(),
        "method" => decision.method.as_str()
    )
    .increment(1);
    record_cost(agent_id, decision.cost);
}

fn record_cost(agent_id: &str, cost: Cost) {
    counter!(COST_MICROS_TOTAL_METRIC, "agent" => agent_id.to_string()).increment(cost.micros());
}

pub fn record_pattern_learned(agent_id: &str) {
    counter!(PATTERNS_LEARNED_TOTAL_METRIC, "agent" => agent_id.to_string()).increment(1);
}

pub fn record_backend_failure(agent_id: &str) {
    counter!(BACKEND_FAILURES_TOTAL_METRIC, "agent" => agent_id.to_string()).increment(1);
}
