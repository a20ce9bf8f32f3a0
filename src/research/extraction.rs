//! 推理输出的后处理
//!
//! 综合报告按优先级依次尝试：
//! 1. 结构化分隔符 `<report>...</report>`
//! 2. 去掉 `<think>` 推理块后，从第一个 Markdown 标题开始截取
//! 3. 按模式剥离开头的寒暄 / 推理前言行
//! 4. 原文（去掉推理块后）
//!
//! JSON 提取沿用「第一个括号到最后一个括号」的宽松做法。

use serde::Serialize;

pub const REPORT_OPEN: &str = "<report>";
pub const REPORT_CLOSE: &str = "</report>";

/// 实际生效的提取策略（写日志、测试用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    Delimiter,
    HeadingAnchor,
    PreambleStrip,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub strategy: ExtractionStrategy,
}

/// 常见的前言开头（小写比较）
const PREAMBLE_PREFIXES: [&str; 14] = [
    "okay",
    "ok,",
    "sure",
    "alright",
    "certainly",
    "here is",
    "here's",
    "below is",
    "let me",
    "i will",
    "i'll",
    "thinking",
    "first, i",
    "now, i",
];

/// 按策略顺序提取报告正文
pub fn extract_report(raw: &str) -> Extracted {
    if let Some(text) = by_delimiter(raw) {
        return Extracted {
            text,
            strategy: ExtractionStrategy::Delimiter,
        };
    }
    let cleaned = strip_think_blocks(raw);
    if let Some(text) = by_heading_anchor(&cleaned) {
        return Extracted {
            text,
            strategy: ExtractionStrategy::HeadingAnchor,
        };
    }
    if let Some(text) = by_preamble_strip(&cleaned) {
        return Extracted {
            text,
            strategy: ExtractionStrategy::PreambleStrip,
        };
    }
    Extracted {
        text: cleaned.trim().to_string(),
        strategy: ExtractionStrategy::Raw,
    }
}

/// `<report>` 与 `</report>` 之间的内容；缺少闭合标签时取开标签之后的全部
pub fn by_delimiter(raw: &str) -> Option<String> {
    let start = raw.rfind(REPORT_OPEN)? + REPORT_OPEN.len();
    let rest = &raw[start..];
    let body = match rest.find(REPORT_CLOSE) {
        Some(end) => &rest[..end],
        None => rest,
    };
    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// 去掉 `<think>...</think>` 块；只有闭合标签时丢弃其之前的内容，只有开标签时丢弃其之后的内容
pub fn strip_think_blocks(raw: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    if !rest.contains(OPEN) {
        if let Some(end) = rest.rfind(CLOSE) {
            return rest[end + CLOSE.len()..].to_string();
        }
        return rest.to_string();
    }

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        match after.find(CLOSE) {
            Some(end) => rest = &after[end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// 从第一个 Markdown 标题行开始截取
pub fn by_heading_anchor(text: &str) -> Option<String> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if is_heading(trimmed) {
            let lead = line.len() - trimmed.len();
            let body = text[offset + lead..].trim_end();
            return Some(body.to_string());
        }
        offset += line.len();
    }
    None
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

/// 剥离开头的前言行；没有可剥离的行时返回 None
pub fn by_preamble_strip(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.trim().lines().collect();
    let mut skip = 0;
    for line in &lines {
        let lower = line.trim().to_lowercase();
        if lower.is_empty() || PREAMBLE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            skip += 1;
        } else {
            break;
        }
    }
    if skip == 0 || skip >= lines.len() {
        return None;
    }
    Some(lines[skip..].join("\n").trim().to_string())
}

/// 第一个 `[` 到最后一个 `]`
pub fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

/// 第一个 `{` 到最后一个 `}`
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiter_wins() {
        let raw = "thinking...\n<report>\n# Title\nBody\n</report>\ntrailing";
        let out = extract_report(raw);
        assert_eq!(out.strategy, ExtractionStrategy::Delimiter);
        assert_eq!(out.text, "# Title\nBody");
    }

    #[test]
    fn test_delimiter_without_close_tag() {
        assert_eq!(by_delimiter("x <report> ## A\nb").as_deref(), Some("## A\nb"));
        assert_eq!(by_delimiter("<report>  </report>"), None);
        assert_eq!(by_delimiter("no tags"), None);
    }

    #[test]
    fn test_heading_anchor_after_think() {
        let raw = "<think>I should write # not this</think>\nSure, here it is.\n\n## Overview\n- point";
        let out = extract_report(raw);
        assert_eq!(out.strategy, ExtractionStrategy::HeadingAnchor);
        assert_eq!(out.text, "## Overview\n- point");
    }

    #[test]
    fn test_heading_requires_space() {
        assert_eq!(by_heading_anchor("#hashtag\ntext"), None);
        assert_eq!(
            by_heading_anchor("intro\n  # Real\nmore").as_deref(),
            Some("# Real\nmore")
        );
    }

    #[test]
    fn test_preamble_strip() {
        let raw = "Okay, let me summarize.\nHere is the report:\n\nRust is a language.\nIt is fast.";
        let out = extract_report(raw);
        assert_eq!(out.strategy, ExtractionStrategy::PreambleStrip);
        assert_eq!(out.text, "Rust is a language.\nIt is fast.");
    }

    #[test]
    fn test_raw_fallback() {
        let out = extract_report("  Rust is a language.  ");
        assert_eq!(out.strategy, ExtractionStrategy::Raw);
        assert_eq!(out.text, "Rust is a language.");
    }

    #[test]
    fn test_strip_think_variants() {
        assert_eq!(strip_think_blocks("a<think>x</think>b<think>y</think>c"), "abc");
        assert_eq!(strip_think_blocks("reasoning</think>answer"), "answer");
        assert_eq!(strip_think_blocks("answer<think>unfinished"), "answer");
    }

    #[test]
    fn test_json_extractors() {
        assert_eq!(
            extract_json_array("Sources: [\"wiki\", \"web\"] done"),
            Some("[\"wiki\", \"web\"]")
        );
        assert_eq!(extract_json_array("none"), None);
        assert_eq!(extract_json_array("] before ["), None);
        assert_eq!(
            extract_json_object("```json\n{\"a\": {\"b\": 1}}\n```"),
            Some("{\"a\": {\"b\": 1}}")
        );
    }
}
