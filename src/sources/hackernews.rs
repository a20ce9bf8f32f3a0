//! Hacker News 来源：Algolia 搜索（story），链接指向讨论页

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::{check_status, html_to_text};

const ALGOLIA_URL: &str = "https://hn.algolia.com/api/v1/search";

#[derive(Debug, Deserialize)]
struct AlgoliaResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    story_text: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

pub fn item_url(object_id: &str) -> String {
    format!("https://news.ycombinator.com/item?id={}", object_id)
}

pub fn parse_response(body: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let parsed: AlgoliaResponse = serde_json::from_str(body)?;
    Ok(parsed
        .hits
        .into_iter()
        .filter_map(|h| {
            let title = h.title.filter(|t| !t.trim().is_empty())?;
            let points = h.points.unwrap_or(0);
            let comments = h.num_comments.unwrap_or(0);
            let content = match h.story_text.as_deref().map(html_to_text) {
                Some(text) if !text.is_empty() => text,
                _ => format!("Hacker News discussion: {} points, {} comments.", points, comments),
            };
            Some(
                ResultRecord::new(title, content)
                    .with_url(item_url(&h.object_id))
                    .with_field("author", h.author.unwrap_or_default())
                    .with_field("points", points.to_string())
                    .with_field("comments", comments.to_string())
                    .with_field("created", h.created_at.unwrap_or_default())
                    .cap_content(max_content_chars),
            )
        })
        .collect())
}

pub struct HackerNewsSource {
    client: Client,
    max_content_chars: usize,
}

impl HackerNewsSource {
    pub fn new(client: Client, max_content_chars: usize) -> Self {
        Self {
            client,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsSource {
    fn id(&self) -> &str {
        SourceId::HN
    }

    fn description(&self) -> &str {
        "Hacker News: technical community discussion of startups, software and technology news"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(2, SourceType::Discussion)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let hits = query.max_results.max(1).to_string();
        let mut params = vec![
            ("query", query.preferred("en").to_string()),
            ("tags", "story".to_string()),
            ("hitsPerPage", hits),
        ];
        if let Some(range) = query.time_range {
            let since = chrono::Utc::now().timestamp() - range.as_seconds();
            params.push(("numericFilters", format!("created_at_i>{}", since)));
        }
        let resp = self.client.get(ALGOLIA_URL).query(&params).send().await?;
        let body = check_status(resp)?.text().await?;
        parse_response(&body, self.max_content_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{"hits":[
            {"objectID":"123","title":"Show HN: A Rust thing","author":"pg","points":120,"num_comments":45,"url":"https://example.com"},
            {"objectID":"124","title":"Ask HN: Opinions?","story_text":"<p>What do you think?</p>","points":3},
            {"objectID":"125","title":null}
        ]}"#;
        let records = parse_response(body, 3000).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url.as_deref(), Some("https://news.ycombinator.com/item?id=123"));
        assert!(records[0].content.contains("120 points"));
        assert!(!records[0].content.contains("example.com"));
        assert!(records[1].content.contains("What do you think?"));
        assert_eq!(records[1].field("author"), None);
    }
}
