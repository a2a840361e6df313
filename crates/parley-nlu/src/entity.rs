//! Entity extraction from user utterances.

use std::sync::LazyLock;

use regex::Regex;

use parley_core::types::{category, EntitySet};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("Invalid number regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("Invalid email regex")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").expect("Invalid date regex")
});

/// Extracts numbers, email addresses, and dates from free text.
///
/// Each category is an independent pass over the input, so a substring may
/// appear under more than one category (the digits of a date are also
/// numbers). Categories without matches are omitted from the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract all recognized entities from `text`.
    pub fn extract(&self, text: &str) -> EntitySet {
        let mut entities = EntitySet::new();
        entities.insert(category::NUMBERS, find_all(&NUMBER_RE, text));
        entities.insert(category::EMAILS, find_all(&EMAIL_RE, text));
        entities.insert(category::DATES, find_all(&DATE_RE, text));
        entities
    }

    /// Extract entities and attach caller-supplied product names.
    ///
    /// Products are never inferred from the text itself.
    pub fn extract_with_products(&self, text: &str, products: &[String]) -> EntitySet {
        let mut entities = self.extract(text);
        let products: Vec<String> = products
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        entities.insert(category::PRODUCTS, products);
        entities
    }
}

fn find_all(re: &Regex, text: &str) -> Vec<String> {
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new()
    }

    // ---- Numbers ----

    #[test]
    fn test_extract_order_number_and_email() {
        let entities =
            extractor().extract("My order number is 12345 and email is test@example.com");
        assert_eq!(entities.get(category::NUMBERS), Some(&["12345".to_string()][..]));
        assert_eq!(
            entities.get(category::EMAILS),
            Some(&["test@example.com".to_string()][..])
        );
        assert!(!entities.contains(category::DATES));
    }

    #[test]
    fn test_extract_multiple_numbers_in_order() {
        let entities = extractor().extract("items 3 and 42 then 7");
        assert_eq!(
            entities.get(category::NUMBERS).unwrap(),
            &["3".to_string(), "42".to_string(), "7".to_string()]
        );
    }

    #[test]
    fn test_digits_inside_words_are_not_numbers() {
        let entities = extractor().extract("model abc123 is great");
        assert!(!entities.contains(category::NUMBERS));
    }

    #[test]
    fn test_hash_prefixed_order_number() {
        let entities = extractor().extract("What's the status of my order #12345?");
        assert_eq!(entities.first(category::NUMBERS), Some("12345"));
    }

    // ---- Emails ----

    #[test]
    fn test_email_requires_two_letter_tld() {
        let entities = extractor().extract("write to someone@host.c please");
        assert!(!entities.contains(category::EMAILS));
    }

    #[test]
    fn test_email_with_plus_and_dots() {
        let entities = extractor().extract("send it to first.last+shop@mail.example.org");
        assert_eq!(
            entities.first(category::EMAILS),
            Some("first.last+shop@mail.example.org")
        );
    }

    // ---- Dates ----

    #[test]
    fn test_extract_slash_and_dash_dates() {
        let entities = extractor().extract("shipped 12/05/2024, due 1-6-25");
        assert_eq!(
            entities.get(category::DATES).unwrap(),
            &["12/05/2024".to_string(), "1-6-25".to_string()]
        );
        // Date components are also numbers.
        assert!(entities.contains(category::NUMBERS));
    }

    #[test]
    fn test_date_with_three_digit_day_is_rejected() {
        let entities = extractor().extract("code 123/45/6789");
        assert!(!entities.contains(category::DATES));
    }

    // ---- Empty results ----

    #[test]
    fn test_no_entities_yields_empty_set() {
        let entities = extractor().extract("I want to check my order status");
        assert!(entities.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(extractor().extract("").is_empty());
    }

    // ---- Products ----

    #[test]
    fn test_products_only_from_hints() {
        let entities = extractor().extract("tell me about the laptop");
        assert!(!entities.contains(category::PRODUCTS));

        let hints = vec!["laptop".to_string(), "  ".to_string()];
        let entities = extractor().extract_with_products("tell me about the laptop", &hints);
        assert_eq!(entities.get(category::PRODUCTS).unwrap(), &["laptop".to_string()]);
    }

    #[test]
    fn test_blank_product_hints_are_dropped() {
        let hints = vec![String::new()];
        let entities = extractor().extract_with_products("hello", &hints);
        assert!(entities.is_empty());
    }
}
