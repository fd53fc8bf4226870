//! Built-in test suites per agent category.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One scored test input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Execution input.
    pub input: Value,
    /// Keywords whose presence in the output counts toward accuracy.
    #[serde(default)]
    pub expected_keywords: Vec<String>,
}

impl TestCase {
    /// Creates a case from a query string and keywords.
    pub fn query(query: &str, keywords: &[&str]) -> Self {
        Self {
            input: json!({ "query": query }),
            expected_keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

/// Categories with a dedicated suite.
pub const KNOWN_CATEGORIES: [&str; 5] = ["research", "coding", "writing", "analysis", "default"];

/// Suite for a category; unknown categories get the `default` suite.
#[must_use]
pub fn default_test_cases(category: &str) -> Vec<TestCase> {
    match category {
        "research" => vec![
            TestCase::query(
                "Summarize the key findings of transformer architectures.",
                &["attention", "transformer"],
            ),
            TestCase::query(
                "What are the benefits of retrieval-augmented generation?",
                &["retrieval", "generation"],
            ),
        ],
        "coding" => vec![
            TestCase::query("Write a Python function to reverse a linked list.", &["def", "node", "next"]),
            TestCase::query("Explain the difference between a stack and a queue.", &["stack", "queue", "FIFO"]),
        ],
        "writing" => vec![TestCase::query(
            "Write a professional email requesting a meeting.",
            &["meeting", "schedule"],
        )],
        "analysis" => vec![TestCase::query(
            "Analyze the pros and cons of microservices architecture.",
            &["microservice", "scalab"],
        )],
        _ => vec![TestCase::query("Hello, how can you help me?", &["help"])],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_category_has_cases() {
        for category in KNOWN_CATEGORIES {
            assert!(!default_test_cases(category).is_empty(), "{category}");
        }
    }

    #[test]
    fn test_unknown_category_falls_back() {
        assert_eq!(default_test_cases("poetry"), default_test_cases("default"));
    }

    #[test]
    fn test_case_deserializes_without_keywords() {
        let case: TestCase = serde_json::from_value(json!({"input": {"query": "q"}})).unwrap();
        assert!(case.expected_keywords.is_empty());
    }
}
