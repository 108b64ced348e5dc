use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    deliberator::{
        error::BackendError,
        openai_compatible::{OpenAiCompatibleBackend, OpenAiCompatibleConfig},
        simulated::SimulatedBackend,
    },
    types::RequestId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasoningQuery {
    pub request_id: RequestId,
    pub content: String,
    pub context: BTreeMap<String, String>,
}

/// Raw backend answer. Confidence is checked by the deliberator, not trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub category: String,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, query: ReasoningQuery) -> Result<Resolution, BackendError>;
}

fn default_simulated_model() -> String {
    "simulated-keyword-v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    Simulated {
        #[serde(default = "default_simulated_model")]
        model: String,
    },
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible(OpenAiCompatibleConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Simulated {
            model: default_simulated_model(),
        }
    }
}

pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn ReasoningBackend>, BackendError> {
    match config {
        BackendConfig::Simulated { model } => Ok(Arc::new(SimulatedBackend::new(model.clone()))),
        BackendConfig::OpenAiCompatible(config) => {
            Ok(Arc::new(OpenAiCompatibleBackend::new(config.clone())?))
        }
    }
}
