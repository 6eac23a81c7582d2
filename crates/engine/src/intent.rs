//! Request classification
//!
//! Turns free text into a deployment intent: whether the user is asking for
//! something to be installed, and the registry query that finds it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request recognised as asking for a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentIntent {
    /// Original request text
    pub request: String,
    /// Registry search query
    pub query: String,
    /// Keywords that matched
    pub matched: Vec<String>,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// `None` when the text is not a deployment request
    async fn classify(&self, text: &str) -> Option<DeploymentIntent>;
}

const DEPLOYMENT_KEYWORDS: &[&str] = &[
    "install",
    "deploy",
    "setup",
    "create",
    "add",
    "enable",
    "grafana",
    "prometheus",
    "elk",
    "elasticsearch",
    "kibana",
    "monitoring",
    "logging",
    "observability",
];

const VERBS: &[&str] = &[
    "install", "installing", "deploy", "deploying", "setup", "set", "up", "create", "add",
    "enable", "configure", "run",
];

const FILLER: &[&str] = &[
    "a", "an", "the", "me", "my", "our", "please", "can", "could", "you", "i", "want", "need",
    "would", "like", "to", "for", "on", "in", "into", "of", "with", "and", "this", "that",
    "cluster", "some",
];

/// Keyword matcher used when no text-generation service is configured
#[derive(Debug, Clone, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_ascii_alphanumeric() && c != '-')
            .map(|t| t.trim_matches('-').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// The search query left after dropping verbs and filler words
    pub fn query(text: &str) -> String {
        let tokens = Self::tokens(text);
        let kept: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .filter(|t| !VERBS.contains(t) && !FILLER.contains(t))
            .collect();

        if kept.is_empty() {
            tokens.join(" ")
        } else {
            kept.join(" ")
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, text: &str) -> Option<DeploymentIntent> {
        let tokens = Self::tokens(text);
        let matched: Vec<String> = DEPLOYMENT_KEYWORDS
            .iter()
            .filter(|k| tokens.iter().any(|t| t == *k))
            .map(|k| k.to_string())
            .collect();

        if matched.is_empty() {
            return None;
        }

        Some(DeploymentIntent {
            request: text.trim().to_string(),
            query: Self::query(text),
            matched,
        })
    }
}
