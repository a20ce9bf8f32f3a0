//! Reddit 来源：有 Tavily Key 时限定 reddit.com 域名检索（支持时间范围），否则用 Reddit 公开 JSON 搜索

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::check_status;
use crate::sources::tavily::{TavilyClient, TavilySearch};

const REDDIT_SEARCH_URL: &str = "https://www.reddit.com/search.json";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
}

pub fn parse_listing(body: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let listing: Listing = serde_json::from_str(body)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|c| {
            let p = c.data;
            let content = if p.selftext.trim().is_empty() {
                format!("r/{} thread: {} points, {} comments.", p.subreddit, p.score, p.num_comments)
            } else {
                p.selftext
            };
            ResultRecord::new(p.title, content)
                .with_url(format!("https://www.reddit.com{}", p.permalink))
                .with_field("subreddit", p.subreddit)
                .with_field("score", p.score.to_string())
                .with_field("comments", p.num_comments.to_string())
                .cap_content(max_content_chars)
        })
        .collect())
}

pub struct RedditSource {
    client: Client,
    tavily: Option<TavilyClient>,
    max_content_chars: usize,
}

impl RedditSource {
    pub fn new(client: Client, tavily: Option<TavilyClient>, max_content_chars: usize) -> Self {
        Self {
            client,
            tavily,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for RedditSource {
    fn id(&self) -> &str {
        SourceId::REDDIT
    }

    fn description(&self) -> &str {
        "Reddit: community opinions, user experiences and informal discussion"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(2, SourceType::Community)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let text = query.preferred("en");
        if let Some(tavily) = &self.tavily {
            let hits = tavily
                .search(&TavilySearch {
                    query: text.to_string(),
                    max_results: query.max_results,
                    time_range: query.time_range,
                    include_domains: vec!["reddit.com".to_string()],
                    advanced: true,
                })
                .await?;
            return Ok(hits
                .into_iter()
                .map(|h| {
                    ResultRecord::new(h.title, h.content)
                        .with_url(h.url)
                        .with_field("provider", "tavily")
                        .cap_content(self.max_content_chars)
                })
                .collect());
        }

        let limit = query.max_results.clamp(1, 100).to_string();
        let mut params = vec![
            ("q", text.to_string()),
            ("limit", limit),
            ("sort", "relevance".to_string()),
        ];
        if let Some(range) = query.time_range {
            params.push(("t", range.word().to_string()));
        }
        let resp = self.client.get(REDDIT_SEARCH_URL).query(&params).send().await?;
        let body = check_status(resp)?.text().await?;
        parse_listing(&body, self.max_content_chars)
    }
}
