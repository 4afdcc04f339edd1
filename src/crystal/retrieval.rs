//! Budget-aware retrieval over the crystal hierarchy.

use chrono::Utc;

use super::store::CrystalStore;
use super::types::Crystal;

/// One entry in a budget-aware retrieval result, carrying the running
/// cumulative-token column.
#[derive(Debug, Clone)]
pub struct RetrievedCrystal {
    pub crystal: Crystal,
    pub score: f32,
    pub cumulative_tokens: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalWeights {
    pub alpha_recency: f32,
    pub beta_relevance: f32,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            alpha_recency: 0.5,
            beta_relevance: 0.5,
        }
    }
}

fn relevance(crystal: &Crystal, query: Option<&str>) -> f32 {
    let Some(q) = query else { return 0.0 };
    let q = q.to_lowercase();
    let haystack = format!(
        "{} {} {}",
        crystal.insight.to_lowercase(),
        crystal.significance.to_lowercase(),
        crystal.topics.join(" ").to_lowercase()
    );
    if haystack.contains(&q) {
        1.0
    } else {
        0.0
    }
}

fn recency(crystal: &Crystal) -> f32 {
    let age_hours = (Utc::now() - crystal.crystallized_at).num_minutes().max(0) as f32 / 60.0;
    1.0 / (1.0 + age_hours)
}

/// Score crystals (highest-level first, per score) and greedily fill until
/// the cumulative token estimate exceeds `budget`.
///
/// Ties on score prefer the more recent crystal (see DESIGN.md).
pub fn retrieve(store: &CrystalStore, budget: u64, query: Option<&str>, weights: RetrievalWeights) -> Vec<RetrievedCrystal> {
    let mut candidates: Vec<Crystal> = store.all();
    candidates.sort_by(|a, b| b.level.cmp(&a.level).then(b.crystallized_at.cmp(&a.crystallized_at)));

    let mut scored: Vec<(Crystal, f32)> = candidates
        .into_iter()
        .map(|c| {
            let score = weights.alpha_recency * recency(&c) + weights.beta_relevance * relevance(&c, query);
            (c, score)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.0.crystallized_at.cmp(&a.0.crystallized_at))
    });

    let mut out = Vec::new();
    let mut cumulative = 0u64;
    for (crystal, score) in scored {
        let next = cumulative + crystal.token_estimate;
        if next > budget && !out.is_empty() {
            break;
        }
        cumulative = next;
        out.push(RetrievedCrystal {
            crystal,
            score,
            cumulative_tokens: cumulative,
        });
        if cumulative > budget {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crystal::types::{CrystalId, Honesty, Level, Mood, SourceRef};

    fn crystal(tokens: u64, insight: &str) -> Crystal {
        Crystal {
            id: CrystalId::new(),
            level: Level::Session,
            insight: insight.into(),
            significance: "sig".into(),
            topics: vec![],
            principles: vec![],
            mood: Mood::default(),
            source_ids: vec![SourceRef::Mark("m".into())],
            crystallized_at: Utc::now(),
            time_range: (Utc::now(), Utc::now()),
            confidence: 0.9,
            token_estimate: tokens,
            compression_ratio: 0.05,
            honesty: Honesty::disclose(0, 0.0, false),
        }
    }

    #[test]
    fn retrieval_stops_at_budget() {
        let store = CrystalStore::new();
        store.append(crystal(50, "alpha")).unwrap();
        store.append(crystal(50, "beta")).unwrap();
        store.append(crystal(50, "gamma")).unwrap();

        let results = retrieve(&store, 120, None, RetrievalWeights::default());
        assert!(results.len() <= 3);
        assert!(results.last().unwrap().cumulative_tokens <= 150);
    }

    #[test]
    fn retrieval_always_returns_at_least_one_even_over_budget() {
        let store = CrystalStore::new();
        store.append(crystal(500, "alpha")).unwrap();
        let results = retrieve(&store, 10, None, RetrievalWeights::default());
        assert_eq!(results.len(), 1);
    }
}
