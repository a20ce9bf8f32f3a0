//! Tavily 搜索客户端（web 与 reddit 来源共用）

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::error::SourceError;
use crate::core::state::TimeRange;
use crate::sources::http::check_status;

const TAVILY_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Clone, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_range: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_domains: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub struct TavilyHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub published_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

/// Tavily 调用参数
#[derive(Debug, Clone, Default)]
pub struct TavilySearch {
    pub query: String,
    pub max_results: usize,
    pub time_range: Option<TimeRange>,
    pub include_domains: Vec<String>,
    pub advanced: bool,
}

#[derive(Clone)]
pub struct TavilyClient {
    client: Client,
    api_key: String,
}

impl TavilyClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    pub async fn search(&self, req: &TavilySearch) -> Result<Vec<TavilyHit>, SourceError> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query: &req.query,
            max_results: req.max_results,
            search_depth: if req.advanced { "advanced" } else { "basic" },
            include_answer: false,
            time_range: req.time_range.map(TimeRange::code),
            include_domains: &req.include_domains,
        };
        let resp = self.client.post(TAVILY_URL).json(&body).send().await?;
        let text = check_status(resp)?.text().await?;
        parse_response(&text)
    }
}

pub fn parse_response(body: &str) -> Result<Vec<TavilyHit>, SourceError> {
    let parsed: TavilyResponse = serde_json::from_str(body)?;
    Ok(parsed.results)
}
