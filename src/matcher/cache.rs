use std::collections::{HashMap, VecDeque};

use crate::types::{Confidence, PatternName};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResolution {
    pub category: String,
    pub confidence: Confidence,
    pub pattern: Option<PatternName>,
}

/// Bounded map from content key to a confident resolution. Oldest insert is evicted first.
#[derive(Debug)]
pub struct ResolutionCache {
    capacity: usize,
    entries: HashMap<String, CachedResolution>,
    order: VecDeque<String>,
}

impl ResolutionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CachedResolution> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, resolution: CachedResolution) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = resolution;
            return;
        }

        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, resolution);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
