//! 分词与关键词打分（本地知识库检索用）
//!
//! 含 CJK 字符时使用 jieba 搜索引擎模式分词，否则按非字母数字字符切分。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 全局 Jieba 实例（延迟初始化，只读）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 分词并去重（保持首次出现顺序），拉丁词长度 < 2 的丢弃
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let raw: Vec<String> = if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .map(|s| s.to_lowercase())
            .collect()
    };

    let mut seen = BTreeSet::new();
    raw.into_iter()
        .filter(|s| {
            let first = s.chars().next().unwrap_or(' ');
            if is_cjk(first) {
                true
            } else {
                s.chars().count() > 1 && s.chars().any(char::is_alphanumeric)
            }
        })
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// 统计有多少个词出现在 haystack 中（haystack 需已小写）
pub fn count_hits(tokens: &[String], haystack_lower: &str) -> usize {
    tokens.iter().filter(|t| haystack_lower.contains(t.as_str())).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_english() {
        let tokens = tokenize("Rust async, Rust runtimes & a tokio-based stack");
        assert_eq!(tokens, vec!["rust", "async", "runtimes", "tokio", "based", "stack"]);
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("我喜欢编程和人工智能");
        assert!(tokens.iter().any(|t| t.contains("编程") || t.contains("智能")));
    }

    #[test]
    fn test_tokenize_mixed() {
        let tokens = tokenize("我喜欢 Rust 编程语言");
        assert!(tokens.iter().any(|t| t == "rust"));
    }

    #[test]
    fn test_count_hits() {
        let tokens = tokenize("ownership borrowing lifetimes");
        assert_eq!(count_hits(&tokens, "notes on ownership and lifetimes"), 2);
        assert_eq!(count_hits(&[], "anything"), 0);
    }

    #[test]
    fn test_contains_cjk() {
        assert!(contains_cjk("Hello 世界"));
        assert!(!contains_cjk("Hello World"));
    }
}
