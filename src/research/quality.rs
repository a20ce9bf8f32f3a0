//! 内容质量评分（0.0 ~ 1.0）
//!
//! 四项加权：长度分档、URL 数量、研究类关键词、结构标记。
//! 综合上下文为每条记录标注分数，最终报告携带综合文本的分数。

use std::sync::OnceLock;

use regex::Regex;

const RESEARCH_KEYWORDS: [&str; 10] = [
    "study",
    "research",
    "analysis",
    "findings",
    "methodology",
    "experiment",
    "data",
    "results",
    "conclusion",
    "evidence",
];

const STRUCTURE_MARKERS: [&str; 7] = ["\n\n", "##", "###", "- ", "* ", "1.", "2."];

static URL_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn count_urls(content: &str) -> usize {
    match URL_RE.get_or_init(|| Regex::new(r"https?://\S+").ok()) {
        Some(re) => re.find_iter(content).count(),
        None => content.matches("http").count(),
    }
}

/// 对一段文本打分
pub fn score_content(content: &str) -> f32 {
    if content.trim().is_empty() {
        return 0.0;
    }
    let mut score = 0.0_f32;

    let len = content.chars().count();
    score += if len > 1000 {
        0.3
    } else if len > 500 {
        0.2
    } else if len > 100 {
        0.1
    } else {
        0.0
    };

    let urls = count_urls(content);
    score += if urls >= 3 {
        0.2
    } else if urls >= 1 {
        0.1
    } else {
        0.0
    };

    let lower = content.to_lowercase();
    let keywords = RESEARCH_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    score += if keywords >= 5 {
        0.3
    } else if keywords >= 3 {
        0.2
    } else if keywords >= 1 {
        0.1
    } else {
        0.0
    };

    let structure = STRUCTURE_MARKERS
        .iter()
        .filter(|m| content.contains(*m))
        .count();
    score += if structure >= 3 {
        0.2
    } else if structure >= 1 {
        0.1
    } else {
        0.0
    };

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(score_content(""), 0.0);
        assert_eq!(score_content("   "), 0.0);
    }

    #[test]
    fn test_short_plain_text_is_low() {
        assert!(score_content("hello world") < 0.05);
    }

    #[test]
    fn test_rich_report_scores_high() {
        let mut text = String::from("## Findings\n\n- study of data\n- analysis and results\n");
        text.push_str("Evidence: https://a.example https://b.example https://c.example\n");
        text.push_str("conclusion ");
        text.push_str(&"methodology ".repeat(100));
        let s = score_content(&text);
        assert!(s > 0.95, "score was {}", s);
        assert!(s <= 1.0);
    }

    #[test]
    fn test_single_url_counts() {
        let with = score_content("see https://example.com");
        let without = score_content("see example dot com");
        assert!(with > without);
    }
}
