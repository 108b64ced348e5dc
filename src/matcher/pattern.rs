use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::{
    matcher::error::{MatcherError, invalid_predicate},
    shared::types::Pattern,
};

const PREDICATE_SIZE_LIMIT: usize = 1 << 20;

pub fn compile_predicate(predicate: &str) -> Result<Regex, MatcherError> {
    if predicate.trim().is_empty() {
        return Err(invalid_predicate("pattern predicate cannot be empty"));
    }

    RegexBuilder::new(predicate)
        .case_insensitive(true)
        .size_limit(PREDICATE_SIZE_LIMIT)
        .build()
        .map_err(|err| invalid_predicate(format!("malformed predicate '{predicate}': {err}")))
}

/// A stored pattern together with its compiled predicate.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub pattern: Arc<Pattern>,
    regex: Regex,
}

impl CompiledPattern {
    pub fn compile(pattern: Arc<Pattern>) -> Result<Self, MatcherError> {
        let regex = compile_predicate(&pattern.predicate)?;
        Ok(Self { pattern, regex })
    }

    pub fn is_match(&self, normalized: &str) -> bool {
        self.regex.is_match(normalized)
    }
}
