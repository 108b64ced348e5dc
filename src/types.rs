use std::{collections::BTreeMap, fmt, iter::Sum};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub type RequestId = String;
pub type RequesterId = String;
pub type AgentId = String;
pub type PatternName = String;

pub const MICROS_PER_DOLLAR: u64 = 1_000_000;

/// Monetary cost in integer micro-dollars.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cost(u64);

impl Cost {
    pub const ZERO: Cost = Cost(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Returns `None` for negative or non-finite amounts.
    pub fn from_dollars(dollars: f64) -> Option<Self> {
        if !dollars.is_finite() || dollars < 0.0 {
            return None;
        }
        let micros = (dollars * MICROS_PER_DOLLAR as f64).round();
        if micros > u64::MAX as f64 {
            return None;
        }
        Some(Self(micros as u64))
    }

    pub const fn micros(self) -> u64 {
        self.0
    }

    pub fn dollars(self) -> f64 {
        self.0 as f64 / MICROS_PER_DOLLAR as f64
    }

    pub fn saturating_add(self, other: Cost) -> Cost {
        Cost(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Cost) -> Cost {
        Cost(self.0.saturating_sub(other.0))
    }

    pub fn saturating_mul(self, factor: u64) -> Cost {
        Cost(self.0.saturating_mul(factor))
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.4}", self.dollars())
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Self {
        iter.fold(Cost::ZERO, Cost::saturating_add)
    }
}

/// A confidence score guaranteed to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);
    pub const ONE: Confidence = Confidence(1.0);

    /// For literal constants. Panics when `value` is outside `[0, 1]`.
    pub const fn constant(value: f64) -> Self {
        assert!(value >= 0.0 && value <= 1.0, "confidence constant out of range");
        Self(value)
    }

    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Confidence::new(value).ok_or_else(|| format!("confidence {value} is outside [0, 1]"))
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Layer {
    Reactive,
    Tactical,
    Deliberative,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Reactive, Layer::Tactical, Layer::Deliberative];

    pub fn index(self) -> usize {
        match self {
            Layer::Reactive => 0,
            Layer::Tactical => 1,
            Layer::Deliberative => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Layer::Reactive => "reactive",
            Layer::Tactical => "tactical",
            Layer::Deliberative => "deliberative",
        }
    }
}

impl From<Layer> for u8 {
    fn from(value: Layer) -> Self {
        value.index() as u8
    }
}

impl TryFrom<u8> for Layer {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Layer::Reactive),
            1 => Ok(Layer::Tactical),
            2 => Ok(Layer::Deliberative),
            other => Err(format!("unknown layer index {other}")),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    ValidationFail,
    Cache,
    Pattern,
    Reasoning,
    Fallback,
    Unresolved,
}

impl Method {
    pub fn layer(self) -> Layer {
        match self {
            Method::ValidationFail => Layer::Reactive,
            Method::Cache | Method::Pattern => Layer::Tactical,
            Method::Reasoning | Method::Fallback | Method::Unresolved => Layer::Deliberative,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::ValidationFail => "validation-fail",
            Method::Cache => "cache",
            Method::Pattern => "pattern",
            Method::Reasoning => "reasoning",
            Method::Fallback => "fallback",
            Method::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Category { category: String },
    Rejected { reason: String },
    Unresolved { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub requester: RequesterId,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl Request {
    pub fn new(requester: impl Into<RequesterId>, content: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            requester: requester.into(),
            content: content.into(),
            received_at: OffsetDateTime::now_utc(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub request_id: RequestId,
    pub outcome: Outcome,
    pub layer: Layer,
    pub method: Method,
    pub cost: Cost,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_pattern: Option<PatternName>,
}

impl Decision {
    pub fn category(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Category { category } => Some(category),
            Outcome::Rejected { .. } | Outcome::Unresolved { .. } => None,
        }
    }

    pub fn suppressed_deliberation(&self) -> bool {
        self.layer < Layer::Deliberative
    }
}

/// Fixed per-method unit costs. Ordering `layer0 <= cache <= layer1 <= layer2` is
/// enforced by [`CostTable::check_ordering`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTable {
    pub layer0: Cost,
    pub cache: Cost,
    pub layer1: Cost,
    pub layer2: Cost,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            layer0: Cost::ZERO,
            cache: Cost::from_micros(100),
            layer1: Cost::from_micros(1_000),
            layer2: Cost::from_micros(10_000),
        }
    }
}

impl CostTable {
    /// Layer 2 outcomes only cost the backend unit when the backend was actually called.
    pub fn cost_for(&self, method: Method, backend_invoked: bool) -> Cost {
        match method {
            Method::ValidationFail => self.layer0,
            Method::Cache => self.cache,
            Method::Pattern => self.layer1,
            Method::Reasoning => self.layer2,
            Method::Fallback | Method::Unresolved if backend_invoked => self.layer2,
            Method::Fallback | Method::Unresolved => Cost::ZERO,
        }
    }

    pub fn check_ordering(&self) -> Result<(), String> {
        if self.layer0 <= self.cache && self.cache <= self.layer1 && self.layer1 <= self.layer2 {
            return Ok(());
        }
        Err(format!(
            "unit costs must satisfy layer0 <= cache <= layer1 <= layer2 (got {} / {} / {} / {})",
            self.layer0, self.cache, self.layer1, self.layer2
        ))
    }
}
