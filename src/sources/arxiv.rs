//! arXiv 来源：export.arxiv.org Atom API，使用英文查询变体

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::http::check_status;

const ARXIV_URL: &str = "http://export.arxiv.org/api/query";

#[derive(Default)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf: Option<String>,
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 解析 Atom feed 中的 entry 元素
pub fn parse_feed(xml: &str, max_content_chars: usize) -> Result<Vec<ResultRecord>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut entries: Vec<Entry> = Vec::new();
    let mut current: Option<Entry> = None;
    let mut field: Option<String> = None;
    let mut in_author = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = e.local_name();
                let name = std::str::from_utf8(local.as_ref()).unwrap_or("").to_string();
                match name.as_str() {
                    "entry" => current = Some(Entry::default()),
                    "author" if current.is_some() => in_author = true,
                    _ if current.is_some() => field = Some(name),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let local = e.local_name();
                if local.as_ref() == b"link" {
                    if let Some(entry) = current.as_mut() {
                        let mut href = None;
                        let mut is_pdf = false;
                        for attr in e.attributes().flatten() {
                            match attr.key.local_name().as_ref() {
                                b"href" => href = attr.unescape_value().ok().map(|v| v.to_string()),
                                b"title" => is_pdf = attr.value.as_ref() == b"pdf",
                                _ => {}
                            }
                        }
                        if is_pdf {
                            entry.pdf = href;
                        }
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field.as_deref()) {
                    let text = e.unescape().map(|t| t.to_string()).unwrap_or_default();
                    match (f, in_author) {
                        ("name", true) => entry.authors.push(collapse(&text)),
                        ("id", false) => entry.id.push_str(text.trim()),
                        ("title", false) => entry.title.push_str(&text),
                        ("summary", false) => entry.summary.push_str(&text),
                        ("published", false) => entry.published.push_str(text.trim()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"entry" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    }
                    b"author" => in_author = false,
                    _ => {}
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Malformed(format!("arXiv feed: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries
        .into_iter()
        .filter(|e| !e.title.trim().is_empty())
        .map(|e| {
            let mut record = ResultRecord::new(collapse(&e.title), collapse(&e.summary))
                .with_url(&e.id)
                .with_field("authors", e.authors.join(", "))
                .with_field("published", e.published.chars().take(10).collect::<String>());
            if let Some(pdf) = e.pdf {
                record = record.with_field("pdf", pdf);
            }
            record.cap_content(max_content_chars)
        })
        .collect())
}

pub struct ArxivSource {
    client: Client,
    max_content_chars: usize,
}

impl ArxivSource {
    pub fn new(client: Client, max_content_chars: usize) -> Self {
        Self {
            client,
            max_content_chars,
        }
    }
}

#[async_trait]
impl SourceAdapter for ArxivSource {
    fn id(&self) -> &str {
        SourceId::ARXIV
    }

    fn description(&self) -> &str {
        "arXiv: preprints in physics, mathematics, computer science and AI research"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(4, SourceType::Preprint)
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let search_query = format!("all:{}", query.preferred("en"));
        let max = query.max_results.max(1).to_string();
        let resp = self
            .client
            .get(ARXIV_URL)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await?;
        let body = check_status(resp)?.text().await?;
        parse_feed(&body, self.max_content_chars)
    }
}
