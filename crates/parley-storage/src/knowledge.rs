//! FAQ knowledge base backed by the `faqs` table.
//!
//! Matching scores every stored record against the query tokens and bumps
//! the winner's `usage_count` inside the same database critical section, so
//! concurrent matches on one record never lose an increment.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use parley_core::error::ParleyError;
use parley_core::types::KnowledgeRecord;

use crate::db::{storage_err, Database};

const SELECT_COLUMNS: &str = "SELECT id, question, answer, category, keywords, usage_count FROM faqs";

/// Built-in FAQ entries: (question, answer, category, keywords).
const DEFAULT_FAQS: [(&str, &str, &str, &[&str]); 5] = [
    (
        "What are your business hours?",
        "We are available 24/7 to assist you with your queries.",
        "general",
        &["hours", "business", "available", "open"],
    ),
    (
        "How can I track my order?",
        "You can track your order by providing your order number. We will fetch the latest status for you.",
        "orders",
        &["track", "order", "status", "shipping"],
    ),
    (
        "What is your return policy?",
        "We offer a 30-day return policy on most items. Please contact customer service with your order details.",
        "returns",
        &["return", "refund", "policy", "exchange"],
    ),
    (
        "How do I reset my password?",
        "You can reset your password by clicking the \"Forgot Password\" link on the login page or contact support.",
        "account",
        &["password", "reset", "account", "login"],
    ),
    (
        "What payment methods do you accept?",
        "We accept credit cards, debit cards, PayPal, and other digital payment methods.",
        "payment",
        &["payment", "credit", "card", "paypal", "pay"],
    ),
];

/// Repository for FAQ knowledge records.
#[derive(Debug, Clone)]
pub struct KnowledgeRepository {
    db: Arc<Database>,
}

impl KnowledgeRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new record. Keywords are lowercased and blanks dropped.
    pub fn add(
        &self,
        question: &str,
        answer: &str,
        category: &str,
        keywords: &[String],
    ) -> Result<KnowledgeRecord, ParleyError> {
        let keywords = normalize_keywords(keywords);
        let keywords_json = serde_json::to_string(&keywords)?;
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO faqs (question, answer, category, keywords) VALUES (?1, ?2, ?3, ?4)",
                params![question, answer, category, keywords_json],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to add FAQ: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })?;

        debug!(id, category, "FAQ added");
        Ok(KnowledgeRecord {
            id,
            question: question.to_string(),
            answer: answer.to_string(),
            category: category.to_string(),
            keywords,
            usage_count: 0,
        })
    }

    /// Fetch a record by id.
    pub fn get(&self, id: i64) -> Result<Option<KnowledgeRecord>, ParleyError> {
        self.db.with_conn(|conn| {
            let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
            let result = conn
                .query_row(&sql, params![id], |row| Ok(row_to_record(row)))
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }

    /// All records, most used first.
    pub fn list(&self) -> Result<Vec<KnowledgeRecord>, ParleyError> {
        self.db.with_conn(|conn| {
            let sql = format!("{} ORDER BY usage_count DESC, id ASC", SELECT_COLUMNS);
            query_records(conn, &sql)
        })
    }

    pub fn count(&self) -> Result<u64, ParleyError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM faqs", [], |row| row.get(0))
                .map_err(storage_err)?;
            Ok(count as u64)
        })
    }

    /// Insert the built-in FAQ entries when the table is empty.
    ///
    /// Returns the number of records inserted.
    pub fn seed_defaults(&self) -> Result<usize, ParleyError> {
        if self.count()? > 0 {
            return Ok(0);
        }
        for (question, answer, category, keywords) in DEFAULT_FAQS {
            let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
            self.add(question, answer, category, &keywords)?;
        }
        info!(count = DEFAULT_FAQS.len(), "Seeded default FAQs");
        Ok(DEFAULT_FAQS.len())
    }

    /// Find the record whose keywords cover the most query tokens.
    ///
    /// A token counts once when any keyword is a substring of it. Only a
    /// strictly greater score replaces the running best, so ties resolve to
    /// the earliest stored record. A zero best score matches nothing. The
    /// winner's `usage_count` is incremented before it is returned.
    pub fn match_tokens(&self, tokens: &[String]) -> Result<Option<KnowledgeRecord>, ParleyError> {
        if tokens.is_empty() {
            return Ok(None);
        }

        self.db.with_conn(|conn| {
            let sql = format!("{} ORDER BY id ASC", SELECT_COLUMNS);
            let records = query_records(conn, &sql)?;

            let mut best: Option<(usize, KnowledgeRecord)> = None;
            for record in records {
                let score = score_record(&record, tokens);
                if score > best.as_ref().map_or(0, |(s, _)| *s) {
                    best = Some((score, record));
                }
            }

            let Some((score, mut record)) = best else {
                return Ok(None);
            };

            conn.execute(
                "UPDATE faqs SET usage_count = usage_count + 1, updated_at = strftime('%s', 'now')
                 WHERE id = ?1",
                params![record.id],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to bump FAQ usage: {}", e)))?;
            record.usage_count += 1;

            debug!(id = record.id, score, "FAQ matched");
            Ok(Some(record))
        })
    }
}

/// Number of tokens covered by at least one of the record's keywords.
fn score_record(record: &KnowledgeRecord, tokens: &[String]) -> usize {
    tokens
        .iter()
        .filter(|token| {
            record
                .keywords
                .iter()
                .any(|kw| token.contains(kw.as_str()))
        })
        .count()
}

fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn query_records(conn: &Connection, sql: &str) -> Result<Vec<KnowledgeRecord>, ParleyError> {
    let mut stmt = conn.prepare(sql).map_err(storage_err)?;
    let rows = stmt
        .query_map([], |row| Ok(row_to_record(row)))
        .map_err(storage_err)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(storage_err)??);
    }
    Ok(records)
}

fn row_to_record(row: &Row<'_>) -> Result<KnowledgeRecord, ParleyError> {
    let keywords_json: String = row.get(4).map_err(storage_err)?;
    let usage_count: i64 = row.get(5).map_err(storage_err)?;
    Ok(KnowledgeRecord {
        id: row.get(0).map_err(storage_err)?,
        question: row.get(1).map_err(storage_err)?,
        answer: row.get(2).map_err(storage_err)?,
        category: row.get(3).map_err(storage_err)?,
        keywords: serde_json::from_str(&keywords_json)?,
        usage_count: usage_count.max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> KnowledgeRepository {
        KnowledgeRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split_whitespace().map(|t| t.to_lowercase()).collect()
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    // ---- CRUD ----

    #[test]
    fn test_add_and_get() {
        let repo = repo();
        let added = repo
            .add("Do you ship abroad?", "Yes, worldwide.", "shipping", &kw(&["Abroad", " ", "ship"]))
            .unwrap();
        assert_eq!(added.keywords, vec!["abroad", "ship"]);

        let fetched = repo.get(added.id).unwrap().unwrap();
        assert_eq!(fetched, added);
        assert!(repo.get(added.id + 100).unwrap().is_none());
    }

    #[test]
    fn test_seed_defaults_only_when_empty() {
        let repo = repo();
        assert_eq!(repo.seed_defaults().unwrap(), 5);
        assert_eq!(repo.seed_defaults().unwrap(), 0);
        assert_eq!(repo.count().unwrap(), 5);
    }

    #[test]
    fn test_list_orders_by_usage() {
        let repo = repo();
        repo.seed_defaults().unwrap();
        repo.match_tokens(&tokens("refund please")).unwrap();
        repo.match_tokens(&tokens("return policy")).unwrap();

        let list = repo.list().unwrap();
        assert_eq!(list[0].category, "returns");
        assert_eq!(list[0].usage_count, 2);
        // Remaining records keep insertion order.
        assert_eq!(list[1].category, "general");
    }

    // ---- Matching ----

    #[test]
    fn test_match_default_password_faq() {
        let repo = repo();
        repo.seed_defaults().unwrap();
        let record = repo
            .match_tokens(&tokens("How do I reset my password"))
            .unwrap()
            .unwrap();
        assert_eq!(record.category, "account");
        assert_eq!(record.usage_count, 1);
    }

    #[test]
    fn test_keyword_must_be_inside_token() {
        let repo = repo();
        repo.add("Payments", "We take cards.", "payment", &kw(&["payment"]))
            .unwrap();
        // "pay" does not contain "payment".
        assert!(repo.match_tokens(&tokens("can i pay")).unwrap().is_none());
        // "payments" contains "payment".
        assert!(repo.match_tokens(&tokens("payments?")).unwrap().is_some());
    }

    #[test]
    fn test_no_overlap_returns_none_and_keeps_counts() {
        let repo = repo();
        repo.seed_defaults().unwrap();
        assert!(repo.match_tokens(&tokens("tell me a joke")).unwrap().is_none());
        assert!(repo.list().unwrap().iter().all(|r| r.usage_count == 0));
    }

    #[test]
    fn test_empty_tokens_match_nothing() {
        let repo = repo();
        repo.seed_defaults().unwrap();
        assert!(repo.match_tokens(&[]).unwrap().is_none());
    }

    #[test]
    fn test_tie_resolves_to_earliest_record() {
        let repo = repo();
        let first = repo.add("First", "one", "a", &kw(&["alpha"])).unwrap();
        repo.add("Second", "two", "b", &kw(&["beta"])).unwrap();

        let record = repo.match_tokens(&tokens("beta alpha")).unwrap().unwrap();
        assert_eq!(record.id, first.id);
    }

    #[test]
    fn test_higher_score_wins_over_earlier_record() {
        let repo = repo();
        repo.add("First", "one", "a", &kw(&["alpha"])).unwrap();
        let second = repo.add("Second", "two", "b", &kw(&["beta", "gamma"])).unwrap();

        let record = repo
            .match_tokens(&tokens("alpha beta gamma"))
            .unwrap()
            .unwrap();
        assert_eq!(record.id, second.id);
    }

    #[test]
    fn test_token_counts_once_even_with_many_keywords() {
        let repo = repo();
        let multi = repo.add("Multi", "m", "a", &kw(&["or", "ord", "order"])).unwrap();
        let two = repo.add("Two", "t", "b", &kw(&["track", "status"])).unwrap();

        // One token for "multi", two tokens for "two".
        let record = repo.match_tokens(&tokens("order track status")).unwrap().unwrap();
        assert_eq!(record.id, two.id);
        assert_ne!(record.id, multi.id);
    }

    #[test]
    fn test_concurrent_matches_do_not_lose_updates() {
        let repo = repo();
        let record = repo.add("Hours", "24/7", "general", &kw(&["hours"])).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        repo.match_tokens(&["hours".to_string()]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stored = repo.get(record.id).unwrap().unwrap();
        assert_eq!(stored.usage_count, 200);
    }
}
