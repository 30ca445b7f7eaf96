// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::registration::AgentRegistration;

/// A registration paired with the raw (un-normalized) similarity score that
/// produced it. Callers compare `score` against their own notion of
/// threshold; the index itself only filters on the *normalized* score.
#[derive(Debug, Clone)]
pub struct ScoredRegistration {
    pub registration: AgentRegistration,
    pub score: f32,
}

/// Pluggable seam between the index and a real vector/ANN backend. The
/// crate ships no embedding model of its own — [`JaccardBackend`] is the
/// default, always-available fallback.
pub trait EmbeddingBackend: Send + Sync {
    /// Cosine similarity between the embeddings of `query` and `text`, in
    /// `[-1, 1]`. Implementations that have no real embeddings (the
    /// fallback) should instead implement token-overlap directly and return
    /// a raw score already in `[0, 1]`.
    fn similarity(&self, query: &str, text: &str) -> f32;

    /// Whether scores from this backend are already a raw `[0,1]` overlap
    /// score (Jaccard fallback) rather than a `[-1,1]` cosine score that
    /// needs the `(s+1)/2` normalization.
    fn is_raw_zero_to_one(&self) -> bool {
        false
    }
}

/// Token-overlap similarity: lowercase, split on whitespace, Jaccard index
/// of the resulting word sets. Returns 0.0 if either set is empty.
pub struct JaccardBackend;

impl EmbeddingBackend for JaccardBackend {
    fn similarity(&self, query: &str, text: &str) -> f32 {
        let a: HashSet<&str> = query.split_whitespace().collect();
        let b: HashSet<&str> = text.split_whitespace().collect();
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let intersection = a.intersection(&b).count();
        let union = a.union(&b).count();
        intersection as f32 / union as f32
    }

    fn is_raw_zero_to_one(&self) -> bool {
        true
    }
}

fn normalize_cosine(score: f32) -> f32 {
    (score + 1.0) / 2.0
}

/// Forward index from capability name to the set of agents advertising it,
/// plus an optional semantic-search layer over `(agent_id, capability)`.
pub struct CapabilityIndex {
    forward: RwLock<HashMap<String, Vec<AgentRegistration>>>,
    backend: Box<dyn EmbeddingBackend>,
}

impl Default for CapabilityIndex {
    fn default() -> Self {
        CapabilityIndex {
            forward: RwLock::new(HashMap::new()),
            backend: Box::new(JaccardBackend),
        }
    }
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(backend: Box<dyn EmbeddingBackend>) -> Self {
        CapabilityIndex {
            forward: RwLock::new(HashMap::new()),
            backend,
        }
    }

    pub fn add(&self, registration: &AgentRegistration) {
        let mut forward = self.forward.write().unwrap();
        for cap in &registration.capabilities {
            forward
                .entry(cap.name.clone())
                .or_default()
                .push(registration.clone());
        }
    }

    pub fn remove(&self, agent_id: &str) {
        let mut forward = self.forward.write().unwrap();
        for regs in forward.values_mut() {
            regs.retain(|r| r.agent_id != agent_id);
        }
        forward.retain(|_, regs| !regs.is_empty());
    }

    /// Exact-name lookup, falling back to semantic search over `name` when
    /// no capability is registered under that exact name.
    pub fn find_by_name(&self, name: &str, limit: usize, threshold: f32) -> Vec<AgentRegistration> {
        let exact = self.forward.read().unwrap().get(name).cloned().unwrap_or_default();
        if !exact.is_empty() {
            return exact.into_iter().take(limit).collect();
        }
        self.find_semantic(name, limit, threshold)
            .into_iter()
            .map(|s| s.registration)
            .collect()
    }

    /// Semantic search over `"name description"` text for every capability
    /// registered. Discards non-positive raw cosine scores, normalizes via
    /// `(s+1)/2` for thresholding, but returns the original raw score.
    /// Falls back transparently to Jaccard overlap when the configured
    /// backend reports raw `[0,1]` scores.
    pub fn find_semantic(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Vec<ScoredRegistration> {
        let forward = self.forward.read().unwrap();
        let mut seen: HashSet<String> = HashSet::new();
        let mut scored: Vec<ScoredRegistration> = Vec::new();

        for (cap_name, regs) in forward.iter() {
            for reg in regs {
                if !seen.insert(format!("{}:{}", reg.agent_id, cap_name)) {
                    continue;
                }
                let description = reg
                    .capabilities
                    .iter()
                    .find(|c| &c.name == cap_name)
                    .map(|c| format!("{} {}", c.name, c.description))
                    .unwrap_or_else(|| cap_name.clone());

                let raw = self.backend.similarity(query, &description);

                let passes = if self.backend.is_raw_zero_to_one() {
                    raw >= threshold
                } else {
                    if raw <= 0.0 {
                        continue;
                    }
                    normalize_cosine(raw) > threshold
                };

                if passes {
                    scored.push(ScoredRegistration {
                        registration: reg.clone(),
                        score: raw,
                    });
                }
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    pub fn all_capability_names(&self) -> Vec<String> {
        self.forward.read().unwrap().keys().cloned().collect()
    }
}
