//! 参考文献：由 results_by_source 确定性地重新生成，与综合文本实际引用了什么无关
//!
//! 每条记录一行，格式按来源类型区分；来源按 BTreeMap 键序，记录按检索顺序。

use std::collections::BTreeMap;

use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};

/// 生成完整参考文献列表
pub fn build(
    results_by_source: &BTreeMap<SourceId, Vec<ResultRecord>>,
    reliability: &BTreeMap<SourceId, SourceReliability>,
) -> Vec<String> {
    results_by_source
        .iter()
        .flat_map(|(source, records)| {
            let source_type = reliability
                .get(source)
                .map(|r| r.source_type)
                .unwrap_or(SourceType::Web);
            records
                .iter()
                .map(move |record| format_entry(source, source_type, record))
        })
        .collect()
}

/// 单条参考文献
pub fn format_entry(source: &SourceId, source_type: SourceType, record: &ResultRecord) -> String {
    let title = if record.title.trim().is_empty() {
        "Untitled"
    } else {
        record.title.trim()
    };
    let mut entry = match source_type {
        SourceType::Academic | SourceType::Preprint => {
            let authors = record.field("authors").unwrap_or("Unknown authors");
            let year = record
                .field("year")
                .or_else(|| record.field("published").map(|d| d.get(..4).unwrap_or(d)))
                .unwrap_or("n.d.");
            let venue = if source_type == SourceType::Preprint {
                "arXiv preprint"
            } else {
                "Semantic Scholar"
            };
            format!("{} ({}). {}. {}.", authors, year, title, venue)
        }
        SourceType::Code => match record.field("stars") {
            Some(stars) => format!("{} [code repository, {} stars].", title, stars),
            None => format!("{} [code repository].", title),
        },
        SourceType::Encyclopedic => format!("{}. Encyclopedia entry.", title),
        SourceType::QuestionAnswer => format!("{} [Q&A thread].", title),
        SourceType::Discussion | SourceType::Community => {
            let place = record
                .field("subreddit")
                .map(|s| format!("r/{}", s))
                .unwrap_or_else(|| source.to_string());
            format!("{} [discussion, {}].", title, place)
        }
        SourceType::Video => match record.field("channel") {
            Some(channel) => format!("{} [video, {}].", title, channel),
            None => format!("{} [video].", title),
        },
        SourceType::UserProvided => format!("{} [local document].", title),
        SourceType::Web => format!("{} [web].", title),
    };
    match &record.url {
        Some(url) => {
            entry.push(' ');
            entry.push_str(url);
        }
        None => entry.push_str(" (no link)"),
    }
    entry
}
