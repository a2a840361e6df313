//! Keyword-scored intent classification.
//!
//! Each configured intent carries a keyword list. A keyword found anywhere
//! in the lowercased utterance scores 1.0, and a further 0.5 when some
//! occurrence is bounded on both sides by a non-alphanumeric character or
//! the edge of the text. The highest total wins; ties go to the intent
//! declared first.

use parley_core::config::IntentKeywords;
use parley_core::error::{ParleyError, Result};
use parley_core::types::IntentScore;

/// Score at which confidence saturates at 1.0.
const FULL_CONFIDENCE_SCORE: f64 = 3.0;
const SUBSTRING_SCORE: f64 = 1.0;
const WHOLE_WORD_BONUS: f64 = 0.5;

struct IntentRule {
    name: String,
    keywords: Vec<String>,
}

/// Deterministic keyword classifier over an ordered intent list.
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl IntentClassifier {
    /// Compile the keyword configuration.
    ///
    /// Fails if the configuration is empty, any intent has no keywords, or a
    /// keyword is blank. A blank keyword would match every utterance.
    pub fn new(intents: &[IntentKeywords]) -> Result<Self> {
        if intents.is_empty() {
            return Err(ParleyError::Config(
                "intent keyword configuration is empty".to_string(),
            ));
        }

        let mut rules = Vec::with_capacity(intents.len());
        for intent in intents {
            if intent.keywords.is_empty() {
                return Err(ParleyError::Config(format!(
                    "intent '{}' has no keywords",
                    intent.name
                )));
            }
            let mut keywords = Vec::with_capacity(intent.keywords.len());
            for keyword in &intent.keywords {
                if keyword.trim().is_empty() {
                    return Err(ParleyError::Config(format!(
                        "intent '{}' has a blank keyword",
                        intent.name
                    )));
                }
                keywords.push(keyword.to_lowercase());
            }
            rules.push(IntentRule {
                name: intent.name.clone(),
                keywords,
            });
        }

        tracing::debug!(intents = rules.len(), "Intent classifier compiled");
        Ok(Self { rules })
    }

    /// Classify an utterance.
    ///
    /// Empty input and input matching no keyword both yield `("unknown", 0.0)`.
    pub fn classify(&self, text: &str) -> IntentScore {
        if text.is_empty() {
            return IntentScore::unknown();
        }

        let normalized = text.to_lowercase();
        let mut best: Option<(&str, f64)> = None;
        for rule in &self.rules {
            let score = score_rule(rule, &normalized);
            if score <= 0.0 {
                continue;
            }
            // Strictly greater keeps the earliest declared intent on ties.
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((rule.name.as_str(), score));
            }
        }

        match best {
            Some((intent, score)) => IntentScore {
                intent: intent.to_string(),
                confidence: (score / FULL_CONFIDENCE_SCORE).min(1.0),
            },
            None => IntentScore::unknown(),
        }
    }

    /// Raw score for every configured intent, in declaration order.
    pub fn scores(&self, text: &str) -> Vec<(String, f64)> {
        let normalized = text.to_lowercase();
        self.rules
            .iter()
            .map(|rule| (rule.name.clone(), score_rule(rule, &normalized)))
            .collect()
    }

    /// Configured intent names, in declaration order.
    pub fn intents(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}

fn score_rule(rule: &IntentRule, normalized: &str) -> f64 {
    let mut score = 0.0;
    for keyword in &rule.keywords {
        if normalized.contains(keyword.as_str()) {
            score += SUBSTRING_SCORE;
            if has_bounded_occurrence(normalized, keyword) {
                score += WHOLE_WORD_BONUS;
            }
        }
    }
    score
}

/// True if any occurrence of `keyword` has no alphanumeric neighbour.
///
/// Overlapping occurrences are checked too, so "aa" in "aaa aa" is found.
fn has_bounded_occurrence(haystack: &str, keyword: &str) -> bool {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(keyword) {
        let start = from + offset;
        let end = start + keyword.len();

        let open = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let close = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if open && close {
            return true;
        }

        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        if from >= haystack.len() {
            break;
        }
    }
    false
}
