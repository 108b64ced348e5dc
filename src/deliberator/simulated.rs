use async_trait::async_trait;

use crate::deliberator::{
    backend::{ReasoningBackend, ReasoningQuery, Resolution},
    error::BackendError,
};

struct KeywordRule {
    keywords: &'static [&'static str],
    category: &'static str,
    confidence: f64,
    rationale: &'static str,
}

const RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["urgent", "asap", "emergency"],
        category: "urgent",
        confidence: 0.92,
        rationale: "contains urgency indicators",
    },
    KeywordRule {
        keywords: &["invoice", "billing", "payment"],
        category: "billing",
        confidence: 0.88,
        rationale: "contains billing-related terms",
    },
    KeywordRule {
        keywords: &["unsubscribe", "viagra", "lottery"],
        category: "spam",
        confidence: 0.95,
        rationale: "contains spam indicators",
    },
];

/// Deterministic keyword classifier used for demos and offline runs.
pub struct SimulatedBackend {
    model: String,
}

impl SimulatedBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReasoningBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn resolve(&self, query: ReasoningQuery) -> Result<Resolution, BackendError> {
        let lowered = query.content.to_lowercase();
        let matched = RULES.iter().find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| lowered.contains(keyword))
        });

        let (category, confidence, rationale) = match matched {
            Some(rule) => (rule.category, rule.confidence, rule.rationale),
            None => ("other", 0.75, "no specific category matched"),
        };
        Ok(Resolution {
            category: category.to_string(),
            confidence,
            rationale: Some(rationale.to_string()),
            model: Some(self.model.clone()),
        })
    }
}
