//! 综合上下文构建
//!
//! 按来源键序拼接所有记录，每个来源前一行可靠性元数据，每条记录带质量分；
//! 超出字符预算时在边界处截断并追加显式标记。

use std::fmt::Write as _;

use crate::core::state::{ResearchState, ResultRecord};
use crate::research::quality::score_content;

/// 构建好的上下文
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchContext {
    pub text: String,
    pub truncated: bool,
    /// 截断前的字符数
    pub original_chars: usize,
    pub records: usize,
}

impl ResearchContext {
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

pub fn truncation_marker(limit: usize) -> String {
    format!("\n\n[... context truncated at {} characters ...]", limit)
}

/// 拼接上下文并按预算截断
pub fn build_context(state: &ResearchState, max_chars: usize) -> ResearchContext {
    let mut text = String::new();
    let _ = writeln!(text, "RESEARCH TOPIC: {}", state.topic());
    if state.working_topic != state.topic() {
        let _ = writeln!(text, "CURRENT FOCUS: {}", state.working_topic);
    }

    let mut records = 0;
    for (source, items) in &state.results_by_source {
        if items.is_empty() {
            continue;
        }
        let meta = state
            .source_reliability
            .get(source)
            .map(|r| r.describe())
            .unwrap_or_else(|| "type: unknown | reliability: n/a".to_string());
        let _ = writeln!(text, "\n=== SOURCE: {} ({}) ===", source, meta);
        for (i, record) in items.iter().enumerate() {
            write_record(&mut text, i + 1, record);
            records += 1;
        }
    }

    let original_chars = text.chars().count();
    let truncated = original_chars > max_chars;
    if truncated {
        text = text.chars().take(max_chars).collect();
        text.push_str(&truncation_marker(max_chars));
        tracing::warn!(
            original_chars,
            limit = max_chars,
            "Consolidation context truncated"
        );
    }

    ResearchContext {
        text,
        truncated,
        original_chars,
        records,
    }
}

fn write_record(out: &mut String, index: usize, record: &ResultRecord) {
    let _ = writeln!(out, "[{}] Title: {}", index, record.title);
    match &record.url {
        Some(url) => {
            let _ = writeln!(out, "URL: {}", url);
        }
        None => out.push_str("URL: none (do not cite with a link)\n"),
    }
    let _ = writeln!(out, "Quality: {:.2}", score_content(&record.content));
    if !record.fields.is_empty() {
        let fields: Vec<String> = record
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let _ = writeln!(out, "Details: {}", fields.join("; "));
    }
    let _ = writeln!(out, "Content: {}\n", record.content.trim());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{SourceReliability, SourceType};

    fn state() -> ResearchState {
        let mut s = ResearchState::new("rust async");
        s.merge_results(
            "web".into(),
            vec![ResultRecord::new("Blog", "web content")],
        );
        s.merge_results(
            "wiki".into(),
            vec![ResultRecord::new("Rust", "wiki content").with_url("https://w/rust")],
        );
        s.merge_results("hn".into(), vec![]);
        s.record_reliability("wiki".into(), SourceReliability::new(4, SourceType::Encyclopedic));
        s
    }

    #[test]
    fn test_sources_in_key_order_with_metadata() {
        let ctx = build_context(&state(), 10_000);
        assert!(!ctx.truncated);
        assert_eq!(ctx.records, 2);
        let web = ctx.text.find("=== SOURCE: web").unwrap();
        let wiki = ctx.text.find("=== SOURCE: wiki").unwrap();
        assert!(web < wiki);
        assert!(ctx.text.contains("=== SOURCE: wiki (type: encyclopedic | reliability: 4/5) ==="));
        assert!(ctx.text.contains("URL: https://w/rust"));
        assert!(ctx.text.contains("URL: none"));
        assert!(!ctx.text.contains("SOURCE: hn"));
    }

    #[test]
    fn test_truncation_marker_appended() {
        let ctx = build_context(&state(), 40);
        assert!(ctx.truncated);
        assert!(ctx.original_chars > 40);
        assert!(ctx.text.ends_with("[... context truncated at 40 characters ...]"));
        let body: String = ctx.text.chars().take(40).collect();
        assert!(ctx.text.starts_with(&body));
    }

    #[test]
    fn test_empty_state_has_no_records() {
        let ctx = build_context(&ResearchState::new("x y z"), 1000);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_refined_focus_is_shown() {
        let mut s = state();
        s.working_topic = "VERIFY AND DEEPEN: tokio".into();
        let ctx = build_context(&s, 10_000);
        assert!(ctx.text.contains("CURRENT FOCUS: VERIFY AND DEEPEN: tokio"));
    }
}
