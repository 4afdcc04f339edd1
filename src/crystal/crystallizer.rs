//! Crystallizer operation: compresses a bounded set of sources into one
//! honestly-disclosed synthesis.

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::llm::{LlmError, LlmProvider};
use super::types::{Crystal, CrystalId, Honesty, Level, Mood, SourceRef};

/// One source handed to the crystallizer: its reference plus the text used
/// for prompt assembly, deduplication, and honesty's semantic-distance
/// estimate.
#[derive(Debug, Clone)]
pub struct CrystalSource {
    pub reference: SourceRef,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct CrystallizerConfig {
    /// Sources whose text similarity (Jaccard over whitespace tokens)
    /// exceeds this are deduplicated.
    pub similarity_threshold: f32,
    /// Serialized crystal size must be <= this fraction of summed source
    /// size.
    pub compression_target: f32,
}

impl Default for CrystallizerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            compression_target: 0.10,
        }
    }
}

/// Parsed shape of the LLM's JSON response.
#[derive(Debug, Deserialize)]
struct LlmCrystalResponse {
    insight: String,
    significance: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    principles: Vec<String>,
    #[serde(default)]
    mood: Mood,
    confidence: f32,
}

/// Outcome of a single crystallization attempt, for audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrystallizationStatus {
    Llm,
    LlmRepaired,
    Fallback,
}

pub struct CrystallizationOutcome {
    pub crystal: Crystal,
    pub status: CrystallizationStatus,
}

/// Deduplicate near-identical sources, returning the kept sources and the
/// number dropped.
fn dedupe(sources: Vec<CrystalSource>, threshold: f32) -> (Vec<CrystalSource>, usize) {
    let mut kept: Vec<CrystalSource> = Vec::new();
    let mut dropped = 0usize;
    for candidate in sources {
        let candidate_tokens: std::collections::HashSet<&str> =
            candidate.text.split_whitespace().collect();
        let is_duplicate = kept.iter().any(|existing| {
            let existing_tokens: std::collections::HashSet<&str> =
                existing.text.split_whitespace().collect();
            jaccard(&candidate_tokens, &existing_tokens) >= threshold
        });
        if is_duplicate {
            dropped += 1;
        } else {
            kept.push(candidate);
        }
    }
    (kept, dropped)
}

fn jaccard(a: &std::collections::HashSet<&str>, b: &std::collections::HashSet<&str>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn assemble_prompt(level: Level, sources: &[CrystalSource]) -> String {
    let mut prompt = format!(
        "Synthesize the following {} sources at level {:?} into a JSON object with fields \
         insight, significance, topics, principles, mood ({{valence, arousal, confidence}}), \
         confidence. Be honest about what gets compressed away.\n\n",
        sources.len(),
        level
    );
    for (i, s) in sources.iter().enumerate() {
        prompt.push_str(&format!("--- source {i} ({}) ---\n{}\n", s.reference.as_str(), s.text));
    }
    prompt
}

fn parse_response(raw: &str) -> Result<LlmCrystalResponse, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Template-derived fallback: keyword extraction and statistical summary.
/// Must never produce confidence > 0.5.
fn template_fallback(sources: &[CrystalSource]) -> LlmCrystalResponse {
    let combined: String = sources.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
    let mut word_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for word in combined.split_whitespace() {
        let key = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if key.len() > 3 {
            *word_counts.entry(key).or_insert(0) += 1;
        }
    }
    let mut topics: Vec<String> = word_counts.into_iter().collect::<Vec<_>>().into_iter()
        .collect::<Vec<_>>();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let topics: Vec<String> = topics.into_iter().take(5).map(|(w, _)| w).collect();

    LlmCrystalResponse {
        insight: format!(
            "{} source(s) compressed; top terms: {}",
            sources.len(),
            topics.join(", ")
        ),
        significance: "template-derived synthesis; no LLM was consulted".to_string(),
        topics,
        principles: Vec::new(),
        mood: Mood::default(),
        confidence: 0.3,
    }
}

/// Compresses `sources` into a single `Crystal` at `level`.
///
/// Crystallizer failures are non-fatal: the underlying marks remain
/// untouched regardless of outcome.
pub async fn crystallize(
    provider: &dyn LlmProvider,
    level: Level,
    sources: Vec<CrystalSource>,
    config: &CrystallizerConfig,
) -> CrystallizationOutcome {
    let pre_filter_count = sources.len();
    let (kept, dropped_count) = dedupe(sources, config.similarity_threshold);
    let combined_len: usize = kept.iter().map(|s| s.text.len()).sum();

    let prompt = assemble_prompt(level, &kept);

    let (response, status) = match provider.generate(&prompt).await {
        Ok(raw) => match parse_response(&raw) {
            Ok(parsed) => (parsed, CrystallizationStatus::Llm),
            Err(e) => {
                warn!(error = %e, "malformed crystallizer response, retrying with repair prompt");
                let repair_prompt = format!(
                    "{prompt}\n\nYour previous response was not valid JSON matching the \
                     required schema. Return ONLY the JSON object, nothing else."
                );
                match provider.generate(&repair_prompt).await {
                    Ok(raw2) => match parse_response(&raw2) {
                        Ok(parsed) => (parsed, CrystallizationStatus::LlmRepaired),
                        Err(e2) => {
                            warn!(error = %e2, "crystallizer repair attempt failed, falling back");
                            (template_fallback(&kept), CrystallizationStatus::Fallback)
                        }
                    },
                    Err(_) => (template_fallback(&kept), CrystallizationStatus::Fallback),
                }
            }
        },
        Err(LlmError::Unavailable(reason)) => {
            info!(reason = %reason, "llm provider unavailable, using template fallback");
            (template_fallback(&kept), CrystallizationStatus::Fallback)
        }
        Err(e) => {
            warn!(error = %e, "llm provider call failed, using template fallback");
            (template_fallback(&kept), CrystallizationStatus::Fallback)
        }
    };

    let confidence = if status == CrystallizationStatus::Fallback {
        response.confidence.min(0.5)
    } else {
        response.confidence
    };

    let serialized_estimate = response.insight.len()
        + response.significance.len()
        + response.topics.iter().map(String::len).sum::<usize>();
    let compression_ratio = if combined_len == 0 {
        0.0
    } else {
        serialized_estimate as f32 / combined_len as f32
    };
    let undershoot = compression_ratio > config.compression_target;
    let confidence = if undershoot {
        (confidence - 0.1).max(0.0)
    } else {
        confidence
    };

    let semantic_distance_estimate = 1.0 - jaccard(
        &combined_text(&kept).split_whitespace().collect(),
        &response.insight.split_whitespace().collect(),
    );

    let honesty = Honesty {
        dropped_count: pre_filter_count - kept.len(),
        semantic_distance_estimate,
        disclosure: Honesty::disclose(dropped_count, semantic_distance_estimate, undershoot).disclosure,
        undershoot,
    };

    let now = Utc::now();
    let time_range = (
        now - chrono::Duration::hours(1),
        now,
    );

    let crystal = Crystal {
        id: CrystalId::new(),
        level,
        insight: response.insight,
        significance: response.significance,
        topics: response.topics,
        principles: response.principles,
        mood: response.mood,
        source_ids: kept.into_iter().map(|s| s.reference).collect(),
        crystallized_at: now,
        time_range,
        confidence,
        token_estimate: (serialized_estimate / 4).max(1) as u64,
        compression_ratio,
        honesty,
    };

    CrystallizationOutcome { crystal, status }
}

fn combined_text(sources: &[CrystalSource]) -> String {
    sources.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crystal::llm::{FixedProvider, UnavailableProvider};

    fn sources(n: usize) -> Vec<CrystalSource> {
        (0..n)
            .map(|i| CrystalSource {
                reference: SourceRef::Mark(format!("m{i}")),
                text: format!("distinct content number {i} about the widget subsystem"),
            })
            .collect()
    }

    #[tokio::test]
    async fn llm_free_fallback_never_exceeds_half_confidence() {
        let provider = UnavailableProvider;
        let outcome = crystallize(&provider, Level::Session, sources(3), &CrystallizerConfig::default()).await;
        assert_eq!(outcome.status, CrystallizationStatus::Fallback);
        assert!(outcome.crystal.confidence <= 0.5);
    }

    #[tokio::test]
    async fn twelve_marks_compress_into_one_crystal() {
        let provider = FixedProvider {
            response: serde_json::json!({
                "insight": "a dozen small steps converged on one approach",
                "significance": "marks this as the settled design",
                "topics": ["widget"],
                "principles": [],
                "mood": {"valence": 0.2, "arousal": 0.1, "confidence": 0.7},
                "confidence": 0.8
            })
            .to_string(),
        };
        let outcome = crystallize(&provider, Level::Session, sources(12), &CrystallizerConfig::default()).await;
        assert!(outcome.crystal.source_ids.len() <= 12);
        assert_eq!(outcome.crystal.level, Level::Session);
        assert!(!outcome.crystal.insight.is_empty());
        assert_eq!(
            outcome.crystal.honesty.dropped_count,
            12 - outcome.crystal.source_ids.len()
        );
    }

    #[tokio::test]
    async fn malformed_response_triggers_repair_then_fallback() {
        let provider = FixedProvider {
            response: "not json at all".to_string(),
        };
        let outcome = crystallize(&provider, Level::Session, sources(2), &CrystallizerConfig::default()).await;
        assert_eq!(outcome.status, CrystallizationStatus::Fallback);
    }

    #[test]
    fn dedupe_drops_near_identical_sources() {
        let mut dup_sources = sources(2);
        dup_sources[1].text = dup_sources[0].text.clone();
        let (kept, dropped) = dedupe(dup_sources, 0.9);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 1);
    }
}
