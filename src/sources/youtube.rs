//! YouTube 来源：Data API v3 视频检索（需要 API Key，未配置时不可用）

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::{check_status, html_to_text};

const YOUTUBE_URL: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct ItemId {
    #[serde(rename = "videoId", default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "publishedAt", default)]
    published_at: String,
}

pub fn parse_response(body: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    Ok(parsed
        .items
        .into_iter()
        .filter_map(|item| {
            let video_id = item.id.video_id?;
            let s = item.snippet;
            let description = if s.description.trim().is_empty() {
                "No description.".to_string()
            } else {
                html_to_text(&s.description)
            };
            Some(
                ResultRecord::new(html_to_text(&s.title), description)
                    .with_url(format!("https://www.youtube.com/watch?v={}", video_id))
                    .with_field("channel", s.channel_title)
                    .with_field("published", s.published_at)
                    .cap_content(max_content_chars),
            )
        })
        .collect())
}

pub struct YoutubeSource {
    client: Client,
    api_key: Option<String>,
    max_content_chars: usize,
}

impl YoutubeSource {
    pub fn new(client: Client, api_key: Option<String>, max_content_chars: usize) -> Self {
        Self {
            client,
            api_key,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for YoutubeSource {
    fn id(&self) -> &str {
        SourceId::YOUTUBE
    }

    fn description(&self) -> &str {
        "YouTube: talks, tutorials, interviews and product demos"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(2, SourceType::Video)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::NotConfigured("YOUTUBE_API_KEY".to_string()))?;
        let max = query.max_results.clamp(1, 50).to_string();
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("type", "video".to_string()),
            ("q", query.text.clone()),
            ("maxResults", max),
            ("key", key.to_string()),
        ];
        if let Some(range) = query.time_range {
            let after = Utc::now() - ChronoDuration::seconds(range.as_seconds());
            params.push(("publishedAfter", after.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }
        let resp = self.client.get(YOUTUBE_URL).query(&params).send().await?;
        let body = check_status(resp)?.text().await?;
        parse_response(&body, self.max_content_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_skips_channels() {
        let body = r#"{"items":[
            {"id":{"kind":"youtube#video","videoId":"abc123"},"snippet":{"title":"Rust in 100 Seconds","description":"Quick intro.","channelTitle":"Fireship","publishedAt":"2021-09-01T00:00:00Z"}},
            {"id":{"kind":"youtube#channel","channelId":"UC1"},"snippet":{"title":"A channel","description":""}}
        ]}"#;
        let records = parse_response(body, 3000).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url.as_deref(), Some("https://www.youtube.com/watch?v=abc123"));
        assert_eq!(records[0].field("channel"), Some("Fireship"));
    }

    #[tokio::test]
    async fn test_unavailable_without_key() {
        let source = YoutubeSource::new(Client::new(), None, 3000);
        assert!(!source.is_available());
        let err = source.search(&SourceQuery::new("rust", 2)).await.unwrap_err();
        assert!(matches!(err, SourceError::NotConfigured(_)));
    }
}
