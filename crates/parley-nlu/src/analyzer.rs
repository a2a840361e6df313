//! Combined classification, extraction, and context update for one turn.

use parley_core::config::IntentKeywords;
use parley_core::error::Result;
use parley_core::types::Analysis;

use crate::context::ContextTracker;
use crate::entity::EntityExtractor;
use crate::intent::IntentClassifier;

/// Runs the intent classifier and entity extractor over an utterance.
pub struct QueryAnalyzer {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
}

impl QueryAnalyzer {
    pub fn new(intents: &[IntentKeywords]) -> Result<Self> {
        Ok(Self {
            classifier: IntentClassifier::new(intents)?,
            extractor: EntityExtractor::new(),
        })
    }

    /// Analyze `text` and record the result as the conversation's context.
    pub fn analyze(&self, text: &str, context: &mut ContextTracker) -> Analysis {
        let analysis = self.analyze_detached(text);
        context.update(&analysis.intent, &analysis.entities);
        analysis
    }

    /// Analyze `text` without touching any conversation state.
    pub fn analyze_detached(&self, text: &str) -> Analysis {
        let score = self.classifier.classify(text);
        let entities = self.extractor.extract(text);

        tracing::debug!(
            intent = %score.intent,
            confidence = score.confidence,
            entity_categories = entities.len(),
            "Utterance analyzed"
        );

        Analysis {
            text: text.to_string(),
            intent: score.intent,
            confidence: score.confidence,
            entities,
        }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }
}
