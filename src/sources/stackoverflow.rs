//! Stack Overflow 来源：Stack Exchange 2.3 advanced search

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::{check_status, html_to_text};

const STACKEXCHANGE_URL: &str = "https://api.stackexchange.com/2.3/search/advanced";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Question>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Question {
    title: String,
    link: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    is_answered: bool,
    #[serde(default)]
    answer_count: u64,
    #[serde(default)]
    tags: Vec<String>,
}

pub fn parse_response(body: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    if let Some(msg) = parsed.error_message {
        return Err(SourceError::Request(msg));
    }
    Ok(parsed
        .items
        .into_iter()
        .map(|q| {
            let content = q
                .body
                .as_deref()
                .map(html_to_text)
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| format!("Tags: {}", q.tags.join(", ")));
            ResultRecord::new(html_to_text(&q.title), content)
                .with_url(q.link)
                .with_field("score", q.score.to_string())
                .with_field("answered", q.is_answered.to_string())
                .with_field("answers", q.answer_count.to_string())
                .with_field("tags", q.tags.join(", "))
                .cap_content(max_content_chars)
        })
        .collect())
}

pub struct StackOverflowSource {
    client: Client,
    max_content_chars: usize,
}

impl StackOverflowSource {
    pub fn new(client: Client, max_content_chars: usize) -> Self {
        Self {
            client,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for StackOverflowSource {
    fn id(&self) -> &str {
        SourceId::SO
    }

    fn description(&self) -> &str {
        "Stack Overflow: programming questions, error messages and practical implementation answers"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(3, SourceType::QuestionAnswer)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let page_size = query.max_results.clamp(1, 100).to_string();
        let resp = self
            .client
            .get(STACKEXCHANGE_URL)
            .query(&[
                ("q", query.preferred("en")),
                ("site", "stackoverflow"),
                ("sort", "relevance"),
                ("order", "desc"),
                ("pagesize", page_size.as_str()),
                ("filter", "withbody"),
            ])
            .send()
            .await?;
        let body = check_status(resp)?.text().await?;
        parse_response(&body, self.max_content_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{"items":[
            {"title":"How do I borrow &amp; mutate?","link":"https://stackoverflow.com/questions/1/x","score":42,"is_answered":true,"answer_count":3,"tags":["rust","borrow-checker"],"body":"<p>I get E0502.</p>"},
            {"title":"Plain","link":"https://stackoverflow.com/questions/2/y","score":0,"tags":["rust"]}
        ],"has_more":false}"#;
        let records = parse_response(body, 3000).unwrap();
        assert_eq!(records[0].title, "How do I borrow & mutate?");
        assert!(records[0].content.contains("E0502"));
        assert_eq!(records[0].field("answered"), Some("true"));
        assert_eq!(records[1].content, "Tags: rust");
    }

    #[test]
    fn test_error_message_is_error() {
        let body = r#"{"error_id":502,"error_message":"too many requests from this IP","error_name":"throttle_violation"}"#;
        assert!(parse_response(body, 100).is_err());
    }
}
