//! GitHub 来源：仓库搜索，按 star 排序；可选 Token 提高限额

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::check_status;

const GITHUB_URL: &str = "https://api.github.com/search/repositories";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    html_url: String,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

pub fn parse_response(body: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    Ok(parsed
        .items
        .into_iter()
        .map(|r| {
            let description = r
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "No description.".to_string());
            ResultRecord::new(r.full_name, description)
                .with_url(r.html_url)
                .with_field("stars", r.stargazers_count.to_string())
                .with_field("language", r.language.unwrap_or_default())
                .with_field("updated", r.updated_at.unwrap_or_default())
                .cap_content(max_content_chars)
        })
        .collect())
}

pub struct GithubSource {
    client: Client,
    token: Option<String>,
    max_content_chars: usize,
}

impl GithubSource {
    pub fn new(client: Client, token: Option<String>, max_content_chars: usize) -> Self {
        Self {
            client,
            token,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for GithubSource {
    fn id(&self) -> &str {
        SourceId::GITHUB
    }

    fn description(&self) -> &str {
        "GitHub: open-source repositories, libraries, tools and reference implementations"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(3, SourceType::Code)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let per_page = query.max_results.clamp(1, 100).to_string();
        let mut req = self
            .client
            .get(GITHUB_URL)
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("q", query.preferred("en")),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if resp.status().as_u16() == 403 {
            // 未认证请求的限额用尽时返回 403
            return Err(SourceError::RateLimited);
        }
        let body = check_status(resp)?.text().await?;
        parse_response(&body, self.max_content_chars)
    }
}
