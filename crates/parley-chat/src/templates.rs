//! Static response templates with entity and context enhancement.
//!
//! The catalog is the terminal stage of the response chain: it always has an
//! answer because the `unknown` entry is mandatory and every entry is
//! non-empty. Candidate selection draws from an injected random source so a
//! fixed seed reproduces the exact reply sequence.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use parley_core::config::ParleyConfig;
use parley_core::types::{category, ConversationContext, EntitySet, UNKNOWN_INTENT};

use crate::error::ChatError;

/// Intents whose template replies acknowledge extracted numbers and emails.
const ENHANCED_INTENTS: [&str; 2] = ["order_status", "product_info"];

const PRODUCT_FOLLOW_UP: &str =
    " Is there anything specific about the product you'd like to know?";

const ERROR_RESPONSES: [&str; 3] = [
    "I'm sorry, I'm having trouble processing your request. Could you try again?",
    "Oops! Something went wrong. Please rephrase your question.",
    "I apologize, but I didn't catch that. Can you say it again?",
];

/// Intent-keyed template catalog.
pub struct TemplateCatalog {
    templates: BTreeMap<String, Vec<String>>,
    rng: Mutex<StdRng>,
}

impl TemplateCatalog {
    /// Build a catalog. A `seed` makes selection reproducible; without one
    /// the generator is seeded from the operating system.
    pub fn new(
        templates: BTreeMap<String, Vec<String>>,
        seed: Option<u64>,
    ) -> Result<Self, ChatError> {
        if !templates.contains_key(UNKNOWN_INTENT) {
            return Err(ChatError::Configuration(format!(
                "template catalog is missing the mandatory '{}' entry",
                UNKNOWN_INTENT
            )));
        }
        if let Some((intent, _)) = templates.iter().find(|(_, lines)| lines.is_empty()) {
            return Err(ChatError::Configuration(format!(
                "template list for '{}' is empty",
                intent
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            templates,
            rng: Mutex::new(rng),
        })
    }

    pub fn from_config(config: &ParleyConfig) -> Result<Self, ChatError> {
        Self::new(config.templates.clone(), config.pipeline.rng_seed)
    }

    /// Candidates for `intent`, or the `unknown` entry when it has none.
    pub fn candidates(&self, intent: &str) -> &[String] {
        self.templates
            .get(intent)
            .or_else(|| self.templates.get(UNKNOWN_INTENT))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pick one candidate for `intent` uniformly at random.
    pub fn select(&self, intent: &str) -> String {
        let candidates = self.candidates(intent);
        if candidates.is_empty() {
            return String::new();
        }
        let index = self.next_index(candidates.len());
        candidates[index].clone()
    }

    /// Template reply for a turn, with entity and context clauses appended.
    pub fn respond(
        &self,
        intent: &str,
        entities: &EntitySet,
        context: &ConversationContext,
    ) -> String {
        let mut response = self.select(intent);

        if ENHANCED_INTENTS.contains(&intent) {
            if let Some(number) = entities.first(category::NUMBERS) {
                response.push_str(&format!(" I see you mentioned order number {}.", number));
            }
            if let Some(email) = entities.first(category::EMAILS) {
                response.push_str(&format!(" I'll send updates to {}.", email));
            }
        }

        if context.last_intent.as_deref() == Some("product_info") {
            response.push_str(PRODUCT_FOLLOW_UP);
        }

        response
    }

    /// Fixed question asking for a missing piece of information.
    pub fn clarification(missing: &str) -> &'static str {
        match missing {
            "order_number" => "Could you please provide your order number?",
            "product_name" => "Which product are you asking about?",
            "email" => "Could you provide your email address?",
            "phone" => "What's your phone number?",
            "details" => "Could you provide more details about your query?",
            _ => "Could you provide more information?",
        }
    }

    /// An apology for a turn that could not be processed.
    pub fn error_response(&self) -> String {
        ERROR_RESPONSES[self.next_index(ERROR_RESPONSES.len())].to_string()
    }

    pub fn intents(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    fn next_index(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_range(0..len)
    }
}

impl std::fmt::Debug for TemplateCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCatalog")
            .field("intents", &self.templates.len())
            .finish()
    }
}
