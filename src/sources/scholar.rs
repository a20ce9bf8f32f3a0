//! Semantic Scholar 来源：graph/v1 论文检索（标题、摘要、链接、年份、作者）

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::check_status;

const SCHOLAR_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const NO_ABSTRACT: &str = "No abstract available.";

#[derive(Debug, Deserialize)]
struct ScholarResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
struct Paper {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(rename = "citationCount", default)]
    citation_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    name: String,
}

pub fn parse_response(body: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let parsed: ScholarResponse = serde_json::from_str(body)?;
    Ok(parsed
        .data
        .into_iter()
        .filter_map(|p| {
            let title = p.title.filter(|t| !t.trim().is_empty())?;
            let content = p
                .abstract_text
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| NO_ABSTRACT.to_string());
            let authors: Vec<String> = p.authors.into_iter().map(|a| a.name).filter(|n| !n.is_empty()).collect();
            let mut record = ResultRecord::new(title, content)
                .with_field("authors", authors.join(", "))
                .with_field("year", p.year.map(|y| y.to_string()).unwrap_or_default())
                .with_field(
                    "citations",
                    p.citation_count.map(|c| c.to_string()).unwrap_or_default(),
                );
            if let Some(url) = p.url {
                record = record.with_url(url);
            }
            Some(record.cap_content(max_content_chars))
        })
        .collect())
}

pub struct ScholarSource {
    client: Client,
    max_content_chars: usize,
}

impl ScholarSource {
    pub fn new(client: Client, max_content_chars: usize) -> Self {
        Self {
            client,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for ScholarSource {
    fn id(&self) -> &str {
        SourceId::SCHOLAR
    }

    fn description(&self) -> &str {
        "Semantic Scholar: peer-reviewed academic papers with abstracts and citation counts"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(5, SourceType::Academic)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let limit = query.max_results.max(1).to_string();
        let resp = self
            .client
            .get(SCHOLAR_URL)
            .query(&[
                ("query", query.preferred("en")),
                ("limit", limit.as_str()),
                ("fields", "title,abstract,url,year,authors,citationCount"),
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
        let body = r#"{"total":2,"offset":0,"data":[
            {"paperId":"a","title":"Attention Is All You Need","abstract":"Transformers.","url":"https://www.semanticscholar.org/paper/a","year":2017,"citationCount":100000,"authors":[{"authorId":"1","name":"Ashish Vaswani"},{"authorId":"2","name":"Noam Shazeer"}]},
            {"paperId":"b","title":"Untitled abstract","abstract":null,"url":null,"year":null,"authors":[]}
        ]}"#;
        let records = parse_response(body, 3000).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field("authors"), Some("Ashish Vaswani, Noam Shazeer"));
        assert_eq!(records[0].field("year"), Some("2017"));
        assert_eq!(records[1].content, NO_ABSTRACT);
        assert!(records[1].is_link_less());
        assert_eq!(records[1].field("year"), None);
    }
}
