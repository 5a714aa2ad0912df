//! Summarization collaborator.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::SummarizeError;

/// Maximum body excerpt handed to the summarizer.
const MAX_EXCERPT_CHARS: usize = 4000;

/// Produces a short human-readable summary for a migrated paper.
/// `None` means "no summary available" and is not an error.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        title: &str,
        abstract_text: Option<&str>,
        excerpt: Option<&str>,
    ) -> Result<Option<String>, SummarizeError>;
}

/// Summarizer over an OpenAI-compatible chat completions endpoint.
pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl HttpSummarizer {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    fn build_prompt(title: &str, abstract_text: Option<&str>, excerpt: Option<&str>) -> String {
        let mut prompt = format!(
            "Summarize the following paper in two or three sentences.\n\nTitle: {title}\n"
        );
        if let Some(abstract_text) = abstract_text {
            prompt.push_str(&format!("\nAbstract: {abstract_text}\n"));
        }
        if let Some(excerpt) = excerpt {
            let excerpt: String = excerpt.chars().take(MAX_EXCERPT_CHARS).collect();
            prompt.push_str(&format!("\nExcerpt: {excerpt}\n"));
        }
        prompt
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(
        &self,
        title: &str,
        abstract_text: Option<&str>,
        excerpt: Option<&str>,
    ) -> Result<Option<String>, SummarizeError> {
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": Self::build_prompt(title, abstract_text, excerpt),
            }],
        });

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SummarizeError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SummarizeError::Backend(format!(
                "summarizer returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizeError::Backend(e.to_string()))?;
        let summary = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(summary)
    }
}

/// Deterministic summarizer for tests and offline runs: echoes the title
/// and the first abstract sentence.
pub struct StaticSummarizer;

#[async_trait]
impl Summarizer for StaticSummarizer {
    async fn summarize(
        &self,
        title: &str,
        abstract_text: Option<&str>,
        _excerpt: Option<&str>,
    ) -> Result<Option<String>, SummarizeError> {
        match abstract_text {
            Some(abstract_text) => {
                let first = abstract_text.split('.').next().unwrap_or("").trim();
                if first.is_empty() {
                    Ok(Some(format!("Summary of \"{title}\".")))
                } else {
                    Ok(Some(format!("{title}: {first}.")))
                }
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_sections() {
        let prompt =
            HttpSummarizer::build_prompt("Paper", Some("An abstract."), Some("Body text."));
        assert!(prompt.contains("Title: Paper"));
        assert!(prompt.contains("Abstract: An abstract."));
        assert!(prompt.contains("Excerpt: Body text."));
    }

    #[tokio::test]
    async fn test_static_summarizer() {
        let summary = StaticSummarizer
            .summarize("QCD at Scale", Some("We compute things. More."), None)
            .await
            .unwrap();
        assert_eq!(summary.as_deref(), Some("QCD at Scale: We compute things."));

        let none = StaticSummarizer
            .summarize("QCD at Scale", None, None)
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
