use crate::{
    shared::types::{PatternDraft, Provenance},
    types::{AgentId, Confidence},
};

const MIN_TOKEN_CHARS: usize = 3;

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "because", "been", "before",
    "but", "can", "could", "dear", "did", "does", "for", "from", "had", "has", "have", "hello",
    "her", "here", "him", "his", "how", "into", "its", "just", "like", "more", "not", "now",
    "our", "out", "please", "regards", "she", "should", "some", "than", "thank", "thanks",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those", "was",
    "were", "what", "when", "where", "which", "who", "will", "with", "would", "you", "your",
];

/// A pattern derived from a confident backend answer, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternCandidate {
    pub name: String,
    pub predicate: String,
    pub category: String,
    pub confidence: Confidence,
    pub token: String,
}

impl PatternCandidate {
    pub fn into_draft(self, agent_id: impl Into<AgentId>) -> PatternDraft {
        PatternDraft {
            name: self.name,
            predicate: self.predicate,
            category: self.category,
            confidence: self.confidence,
            provenance: Provenance::learned_by(agent_id),
        }
    }
}

/// Longest alphanumeric word of at least three characters that is not a stopword.
/// Earlier words win ties.
pub fn distinctive_token(content: &str) -> Option<String> {
    let mut best: Option<(usize, String)> = None;
    for word in content.split(|c: char| !c.is_alphanumeric()) {
        let length = word.chars().count();
        if length < MIN_TOKEN_CHARS {
            continue;
        }
        let lowered = word.to_lowercase();
        if STOPWORDS.contains(&lowered.as_str()) {
            continue;
        }
        if best.as_ref().is_none_or(|(best_len, _)| length > *best_len) {
            best = Some((length, lowered));
        }
    }
    best.map(|(_, token)| token)
}

pub fn derive_candidate(
    content: &str,
    category: &str,
    confidence: Confidence,
) -> Option<PatternCandidate> {
    let token = distinctive_token(content)?;
    Some(PatternCandidate {
        name: format!("learned:{category}:{token}"),
        predicate: format!(r"\b{}\b", regex::escape(&token)),
        category: category.to_string(),
        confidence,
        token,
    })
}
