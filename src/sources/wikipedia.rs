//! Wikipedia 来源：MediaWiki search + extracts
//!
//! 语言按主题判断：含西班牙语重音字符或 ñ 时查 es.wikipedia.org，否则查 en。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::{check_status, html_to_text};

static SPANISH_MARKS: OnceLock<Option<Regex>> = OnceLock::new();

/// 简单的语言判断，仅区分 es / en
pub fn detect_language(topic: &str) -> &'static str {
    let re = SPANISH_MARKS.get_or_init(|| Regex::new(r"[áéíóúñÁÉÍÓÚÑ]").ok());
    match re {
        Some(re) if re.is_match(topic) => "es",
        _ => "en",
    }
}

#[derive(Debug, Deserialize)]
struct WikiResponse {
    #[serde(default)]
    query: Option<WikiQuery>,
}

#[derive(Debug, Deserialize)]
struct WikiQuery {
    #[serde(default)]
    pages: BTreeMap<String, WikiPage>,
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    fullurl: Option<String>,
    /// 搜索排名
    #[serde(default)]
    index: Option<u32>,
}

/// 解析 API 响应，按搜索排名排序
pub fn parse_response(body: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let parsed: WikiResponse = serde_json::from_str(body)?;
    let Some(query) = parsed.query else {
        return Ok(Vec::new());
    };
    let mut pages: Vec<WikiPage> = query.pages.into_values().collect();
    pages.sort_by_key(|p| p.index.unwrap_or(u32::MAX));
    Ok(pages
        .into_iter()
        .map(|p| {
            let mut record = ResultRecord::new(p.title, html_to_text(&p.extract));
            if let Some(url) = p.fullurl {
                record = record.with_url(url);
            }
            record.cap_content(max_content_chars)
        })
        .collect())
}

pub struct WikipediaSource {
    client: Client,
    max_content_chars: usize,
}

impl WikipediaSource {
    pub fn new(client: Client, max_content_chars: usize) -> Self {
        Self {
            client,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for WikipediaSource {
    fn id(&self) -> &str {
        SourceId::WIKI
    }

    fn description(&self) -> &str {
        "Wikipedia: encyclopedic background, definitions, history and general context"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(4, SourceType::Encyclopedic)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let lang = detect_language(&query.text);
        let endpoint = format!("https://{}.wikipedia.org/w/api.php", lang);
        let limit = query.max_results.max(1).to_string();
        let resp = self
            .client
            .get(&endpoint)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrsearch", query.text.as_str()),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts|info"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exlimit", "max"),
                ("inprop", "url"),
            ])
            .send()
            .await?;
        let body = check_status(resp)?.text().await?;
        tracing::debug!(lang = lang, "wikipedia search");
        parse_response(&body, self.max_content_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("inteligencia artificial en educación"), "es");
        assert_eq!(detect_language("año nuevo"), "es");
        assert_eq!(detect_language("artificial intelligence"), "en");
        assert_eq!(detect_language("人工智能"), "en");
    }

    #[test]
    fn test_parse_response_sorted_by_index() {
        let body = r#"{"batchcomplete":"","query":{"pages":{
            "200":{"pageid":200,"title":"Second","index":2,"extract":"Second page.","fullurl":"https://en.wikipedia.org/wiki/Second"},
            "100":{"pageid":100,"title":"First","index":1,"extract":"First page is longer.","fullurl":"https://en.wikipedia.org/wiki/First"}
        }}}"#;
        let records = parse_response(body, 5).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "First");
        assert_eq!(records[0].content, "First");
        assert_eq!(records[0].url.as_deref(), Some("https://en.wikipedia.org/wiki/First"));
    }

    #[test]
    fn test_parse_response_no_hits() {
        assert!(parse_response(r#"{"batchcomplete":""}"#, 100).unwrap().is_empty());
    }
}
