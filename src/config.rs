use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::{
    deliberator::{DeliberatorConfig, backend::BackendConfig},
    matcher::pattern::compile_predicate,
    observability::metrics::MetricsRuntime,
    orchestrator::{AgentSettings, FallbackPolicy},
    types::{AgentId, Confidence, Cost, CostTable},
    validation::{Validator, types::ValidatorConfig},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_agents")]
    #[validate(length(min = 1))]
    pub agents: Vec<AgentId>,
    #[serde(default)]
    #[validate(nested)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    #[validate(nested)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    #[validate(nested)]
    pub deliberator: DeliberatorConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub patterns: Vec<PatternSeed>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("spl.sock")
}

fn default_agents() -> Vec<AgentId> {
    vec!["agent-1".to_string()]
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
    /// Per-component level overrides layered on top of `filter`, keyed by component name
    /// (`matcher`, `deliberator` and so on).
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
            components: BTreeMap::new(),
        }
    }
}

fn default_metrics_listen_addr() -> SocketAddr {
    MetricsRuntime::default_listen_addr()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

fn default_confidence_threshold() -> Confidence {
    Confidence::constant(0.85)
}

fn default_cache_capacity() -> usize {
    1024
}

/// Unit costs in dollars, as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default = "default_layer0_cost")]
    pub layer0: f64,
    #[serde(default = "default_cache_cost")]
    pub cache: f64,
    #[serde(default = "default_layer1_cost")]
    pub layer1: f64,
    #[serde(default = "default_layer2_cost")]
    pub layer2: f64,
}

fn default_layer0_cost() -> f64 {
    0.0
}

fn default_cache_cost() -> f64 {
    0.0001
}

fn default_layer1_cost() -> f64 {
    0.001
}

fn default_layer2_cost() -> f64 {
    0.01
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            layer0: default_layer0_cost(),
            cache: default_cache_cost(),
            layer1: default_layer1_cost(),
            layer2: default_layer2_cost(),
        }
    }
}

impl CostConfig {
    pub fn to_table(&self) -> Result<CostTable> {
        let table = CostTable {
            layer0: dollars("pipeline.costs.layer0", self.layer0)?,
            cache: dollars("pipeline.costs.cache", self.cache)?,
            layer1: dollars("pipeline.costs.layer1", self.layer1)?,
            layer2: dollars("pipeline.costs.layer2", self.layer2)?,
        };
        table.check_ordering().map_err(|message| anyhow!(message))?;
        Ok(table)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: Confidence,
    #[serde(default = "default_cache_capacity")]
    #[validate(range(min = 1))]
    pub cache_capacity: usize,
    #[serde(default)]
    pub costs: CostConfig,
    #[serde(default)]
    pub fallback: Option<FallbackPolicy>,
    /// Layer 2 spend in dollars before an agent suppresses itself.
    #[serde(default)]
    pub layer2_budget: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            cache_capacity: default_cache_capacity(),
            costs: CostConfig::default(),
            fallback: None,
            layer2_budget: None,
        }
    }
}

impl PipelineConfig {
    pub fn agent_settings(&self) -> Result<AgentSettings> {
        if let Some(fallback) = &self.fallback
            && fallback.category.trim().is_empty()
        {
            return Err(anyhow!("pipeline.fallback.category cannot be empty"));
        }
        let layer2_budget = self
            .layer2_budget
            .map(|budget| dollars("pipeline.layer2_budget", budget))
            .transpose()?;

        Ok(AgentSettings {
            confidence_threshold: self.confidence_threshold,
            costs: self.costs.to_table()?,
            cache_capacity: self.cache_capacity,
            fallback: self.fallback.clone(),
            layer2_budget,
        })
    }
}

/// A pattern written into shared state at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSeed {
    pub name: String,
    pub predicate: String,
    pub category: String,
    pub confidence: Confidence,
}

fn dollars(field: &str, value: f64) -> Result<Cost> {
    Cost::from_dollars(value).ok_or_else(|| anyhow!("{field} must be a non-negative amount"))
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize spl config")?;
        config
            .validate()
            .map_err(|errors| anyhow!("config validation failed: {errors}"))?;
        config.check_semantics()?;

        if !config.socket_path.is_absolute() {
            config.socket_path = config_base.join(&config.socket_path);
        }

        Ok(config)
    }

    /// Checks the schema cannot express: cost ordering, predicates, envelope schema.
    fn check_semantics(&self) -> Result<()> {
        self.pipeline.agent_settings()?;
        Validator::new(&self.validator).map_err(|err| anyhow!("validator: {err}"))?;

        let mut agent_ids = BTreeSet::new();
        for agent_id in &self.agents {
            if agent_id.trim().is_empty() {
                return Err(anyhow!("agent ids cannot be empty"));
            }
            if !agent_ids.insert(agent_id.as_str()) {
                return Err(anyhow!("agent '{agent_id}' is listed twice"));
            }
        }

        for seed in &self.patterns {
            if seed.name.trim().is_empty() || seed.category.trim().is_empty() {
                return Err(anyhow!("pattern seeds need a name and a category"));
            }
            compile_predicate(&seed.predicate)
                .map_err(|err| anyhow!("pattern '{}': {err}", seed.name))?;
        }

        Ok(())
    }
}

fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) {
        let configured = PathBuf::from(path_text);
        if configured.is_absolute() {
            return Ok(configured);
        }
        return Ok(config_base.join(&configured));
    }

    let local_default = config_base.join("spl.schema.json");
    if local_default.exists() {
        return Ok(local_default);
    }

    Err(anyhow!(
        "unable to resolve schema path: expected $schema in config or spl.schema.json next to it"
    ))
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;

    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
