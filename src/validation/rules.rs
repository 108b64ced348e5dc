use std::{
    collections::BTreeSet,
    sync::{PoisonError, RwLock},
};

use jsonschema::JSONSchema;
use serde_json::json;

use crate::{
    types::Request,
    validation::{
        error::{ValidatorError, blocked, format_violation, invalid_config, schema_violation},
        types::ValidatorConfig,
    },
};

/// Structural checks: length bounds, blocklisted terms and the optional envelope schema.
pub struct FormatRules {
    min_length: usize,
    max_length: usize,
    blocklist: RwLock<BTreeSet<String>>,
    envelope: Option<JSONSchema>,
}

impl FormatRules {
    pub fn new(config: &ValidatorConfig) -> Result<Self, ValidatorError> {
        let envelope = config
            .envelope_schema
            .as_ref()
            .map(|schema| {
                JSONSchema::compile(schema)
                    .map_err(|err| invalid_config(format!("envelope schema does not compile: {err}")))
            })
            .transpose()?;

        let mut blocklist = BTreeSet::new();
        for term in &config.blocklist {
            blocklist.insert(normalize_term(term)?);
        }

        Ok(Self {
            min_length: config.min_length,
            max_length: config.max_length,
            blocklist: RwLock::new(blocklist),
            envelope,
        })
    }

    pub fn check(&self, request: &Request) -> Result<(), ValidatorError> {
        let length = request.content.chars().count();
        if length < self.min_length {
            return Err(format_violation(format!(
                "content too short (min {} chars)",
                self.min_length
            )));
        }
        if length > self.max_length {
            return Err(format_violation(format!(
                "content too long (max {} chars)",
                self.max_length
            )));
        }

        let lowered = request.content.to_lowercase();
        {
            let blocklist = self.blocklist.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(term) = blocklist.iter().find(|term| lowered.contains(term.as_str())) {
                return Err(blocked(format!("blocked term detected: {term}")));
            }
        }

        if let Some(envelope) = &self.envelope {
            let instance = json!({
                "requester": request.requester,
                "content": request.content,
                "context": request.context,
            });
            if let Err(errors) = envelope.validate(&instance) {
                let messages: Vec<String> = errors.map(|error| error.to_string()).collect();
                return Err(schema_violation(format!(
                    "request envelope rejected: {}",
                    messages.join("; ")
                )));
            }
        }

        Ok(())
    }

    /// Returns `false` when the term was already present.
    pub fn add_term(&self, term: &str) -> Result<bool, ValidatorError> {
        let term = normalize_term(term)?;
        Ok(self
            .blocklist
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(term))
    }

    pub fn remove_term(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        self.blocklist
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&term)
    }

    pub fn blocklist_size(&self) -> usize {
        self.blocklist
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn normalize_term(term: &str) -> Result<String, ValidatorError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(invalid_config("blocklist terms cannot be empty"));
    }
    Ok(term.to_lowercase())
}
