//! Web 来源：配置了 Tavily Key 时用 Tavily，否则用 DuckDuckGo Instant Answer

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::check_status;
use crate::sources::tavily::{TavilyClient, TavilySearch};

/// 解析 DuckDuckGo Instant Answer 响应（Abstract + RelatedTopics）
pub fn parse_duckduckgo(data: &Value, max_results: usize, max_content_chars: usize) -> Vec<ResultRecord> {
    let mut results = Vec::new();

    if let Some(abstract_text) = data.get("AbstractText").and_then(|t| t.as_str()) {
        if !abstract_text.is_empty() {
            let title = data
                .get("Heading")
                .and_then(|h| h.as_str())
                .filter(|h| !h.is_empty())
                .unwrap_or("Result");
            let url = data.get("AbstractURL").and_then(|u| u.as_str()).unwrap_or("");
            results.push(
                ResultRecord::new(title, abstract_text)
                    .with_url(url)
                    .with_field("provider", "duckduckgo")
                    .cap_content(max_content_chars),
            );
        }
    }

    if let Some(topics) = data.get("RelatedTopics").and_then(|r| r.as_array()) {
        // 分组主题的子项在 "Topics" 里
        let flattened = topics.iter().flat_map(|t| match t.get("Topics").and_then(|s| s.as_array()) {
            Some(sub) => sub.iter().collect::<Vec<_>>(),
            None => vec![t],
        });
        for topic in flattened {
            if results.len() >= max_results {
                break;
            }
            if let Some(text) = topic.get("Text").and_then(|t| t.as_str()) {
                let url = topic.get("FirstURL").and_then(|u| u.as_str()).unwrap_or("");
                results.push(
                    ResultRecord::new(text.chars().take(80).collect::<String>(), text)
                        .with_url(url)
                        .with_field("provider", "duckduckgo")
                        .cap_content(max_content_chars),
                );
            }
        }
    }

    results
}

pub struct WebSource {
    client: Client,
    tavily: Option<TavilyClient>,
    max_content_chars: usize,
}

impl WebSource {
    pub fn new(client: Client, tavily: Option<TavilyClient>, max_content_chars: usize) -> Self {
        Self {
            client,
            tavily,
            max_content_chars,
        }
    }

    async fn search_tavily(
        &self,
        tavily: &TavilyClient,
        query: &SourceQuery,
    ) -> Result<Vec<ResultRecord>, SourceError> {
        let hits = tavily
            .search(&TavilySearch {
                query: query.text.clone(),
                max_results: query.max_results,
                time_range: query.time_range,
                include_domains: Vec::new(),
                advanced: false,
            })
            .await?;
        Ok(hits
            .into_iter()
            .map(|h| {
                let mut r = ResultRecord::new(h.title, h.content)
                    .with_url(h.url)
                    .with_field("provider", "tavily");
                if let Some(date) = h.published_date {
                    r = r.with_field("published", date);
                }
                r.cap_content(self.max_content_chars)
            })
            .collect())
    }

    async fn search_duckduckgo(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let resp = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[
                ("q", query.text.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;
        let data: Value = check_status(resp)?.json().await?;
        Ok(parse_duckduckgo(&data, query.max_results, self.max_content_chars))
    }
}

#[async_trait]
impl SourceAdapter for WebSource {
    fn id(&self) -> &str {
        SourceId::WEB
    }

    fn description(&self) -> &str {
        "Web search: current events, news, company and product pages, general coverage"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(3, SourceType::Web)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        match &self.tavily {
            Some(tavily) => self.search_tavily(tavily, query).await,
            None => self.search_duckduckgo(query).await,
        }
    }
}
