use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use time::OffsetDateTime;

use crate::types::{Confidence, Cost, Decision, Layer, Method, RequestId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRecord {
    pub request_id: RequestId,
    pub layer: Layer,
    pub method: Method,
    pub cost: Cost,
    pub confidence: Confidence,
    pub category: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl CostRecord {
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            request_id: decision.request_id.clone(),
            layer: decision.layer,
            method: decision.method,
            cost: decision.cost,
            confidence: decision.confidence,
            category: decision.category().map(str::to_string),
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerBreakdown {
    pub layer: Layer,
    pub count: u64,
    pub cost: Cost,
    /// Share of all requests, in percent.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_requests: u64,
    pub total_cost: Cost,
    pub baseline_cost: Cost,
    pub savings: Cost,
    pub suppressions: u64,
    /// Fraction of requests that never reached Layer 2.
    pub suppression_rate: f64,
    /// Actual cost divided by the all-Layer-2 baseline. Lower is better.
    pub cost_reduction_factor: f64,
    /// Baseline divided by actual cost; `None` when nothing was spent.
    pub savings_multiple: Option<f64>,
    pub layers: Vec<LayerBreakdown>,
    pub methods: BTreeMap<Method, u64>,
}

impl fmt::Display for CostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SPL Cost Report")?;
        writeln!(f, "===============")?;
        writeln!(f, "Total requests: {}", self.total_requests)?;
        writeln!(f, "Total cost: {}", self.total_cost)?;
        writeln!(f, "Baseline cost: {}", self.baseline_cost)?;
        writeln!(f, "Savings: {}", self.savings)?;
        writeln!(f, "Cost ratio: {:.3}", self.cost_reduction_factor)?;
        match self.savings_multiple {
            Some(multiple) => writeln!(f, "Cost reduction: {multiple:.1}x")?,
            None => writeln!(f, "Cost reduction: n/a")?,
        }
        writeln!(f, "Suppression rate: {:.1}%", self.suppression_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Layer breakdown:")?;
        for breakdown in &self.layers {
            writeln!(
                f,
                "  Layer {}: {} requests ({:.1}%)",
                breakdown.layer, breakdown.count, breakdown.percentage
            )?;
        }
        Ok(())
    }
}

/// Append-only log of per-request costs, aggregated on demand.
#[derive(Debug, Clone)]
pub struct CostTracker {
    baseline_unit: Cost,
    records: Vec<CostRecord>,
}

impl CostTracker {
    pub fn new(baseline_unit: Cost) -> Self {
        Self {
            baseline_unit,
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, record: CostRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    pub fn records_by_layer(&self, layer: Layer) -> impl Iterator<Item = &CostRecord> {
        self.records.iter().filter(move |record| record.layer == layer)
    }

    pub fn records_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a CostRecord> {
        self.records
            .iter()
            .filter(move |record| record.category.as_deref() == Some(category))
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn summary(&self) -> CostSummary {
        let total_requests = self.records.len() as u64;
        let total_cost: Cost = self.records.iter().map(|record| record.cost).sum();
        let baseline_cost = self.baseline_unit.saturating_mul(total_requests);

        let mut counts = [0u64; 3];
        let mut costs = [Cost::ZERO; 3];
        let mut methods = BTreeMap::new();
        for record in &self.records {
            let index = record.layer.index();
            counts[index] += 1;
            costs[index] = costs[index].saturating_add(record.cost);
            *methods.entry(record.method).or_insert(0) += 1;
        }

        let layers = Layer::ALL
            .iter()
            .map(|layer| LayerBreakdown {
                layer: *layer,
                count: counts[layer.index()],
                cost: costs[layer.index()],
                percentage: ratio(counts[layer.index()], total_requests) * 100.0,
            })
            .collect();
        let suppressions = counts[Layer::Reactive.index()] + counts[Layer::Tactical.index()];

        CostSummary {
            total_requests,
            total_cost,
            baseline_cost,
            savings: baseline_cost.saturating_sub(total_cost),
            suppressions,
            suppression_rate: ratio(suppressions, total_requests),
            cost_reduction_factor: ratio(total_cost.micros(), baseline_cost.micros()),
            savings_multiple: (total_cost > Cost::ZERO)
                .then(|| baseline_cost.micros() as f64 / total_cost.micros() as f64),
            layers,
            methods,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
