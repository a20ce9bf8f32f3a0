//! 引用校验：综合文本中只允许出现检索记录里的 URL
//!
//! 不在白名单中的 Markdown 链接降级为纯文本标签，裸 URL 直接删除。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

static LINK_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 分组 1/2：Markdown 链接的标签与目标；分组 3：裸 URL。协议不区分大小写，`www.` 开头的主机也算 URL；
/// URL 内允许一层成对括号（维基百科标题）
fn link_pattern() -> Option<&'static Regex> {
    LINK_RE
        .get_or_init(|| {
            Regex::new(
                r#"\[([^\]\n]*)\]\(((?:(?i:https?|file)://|(?i:www)\.)(?:[^()\s]|\([^()\s]*\))+)\)|((?:(?i:https?|file)://|\b(?i:www)\.)(?:[^\s<>()\[\]"'`]|\([^\s()]*\))+)"#,
            )
            .ok()
        })
        .as_ref()
}

const TRAILING_PUNCT: &[char] = &['.', ',', ';', ':', '!', '?'];

/// 清洗结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scrubbed {
    pub text: String,
    /// 被移除的 URL（按出现顺序）
    pub stripped: Vec<String>,
}

/// URL 白名单守卫
#[derive(Debug, Clone, Default)]
pub struct CitationGuard {
    allowed: BTreeSet<String>,
}

impl CitationGuard {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// 协议大小写不敏感；无协议的 `www.` 形式与某条记录去掉协议后的部分一致也算允许
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.allowed.contains(url) {
            return true;
        }
        match url.split_once("://") {
            Some((scheme, rest)) => self
                .allowed
                .contains(&format!("{}://{}", scheme.to_ascii_lowercase(), rest)),
            None => self
                .allowed
                .iter()
                .any(|a| a.split_once("://").is_some_and(|(_, rest)| rest == url)),
        }
    }

    /// 移除所有不在白名单中的 URL
    pub fn scrub(&self, text: &str) -> Scrubbed {
        let Some(re) = link_pattern() else {
            return Scrubbed {
                text: text.to_string(),
                stripped: Vec::new(),
            };
        };

        let mut stripped = Vec::new();
        let out = re.replace_all(text, |caps: &Captures| {
            if let (Some(label), Some(target)) = (caps.get(1), caps.get(2)) {
                if self.is_allowed(target.as_str()) {
                    return caps[0].to_string();
                }
                stripped.push(target.as_str().to_string());
                return label.as_str().to_string();
            }
            let whole = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            if self.is_allowed(whole) {
                return whole.to_string();
            }
            let core = whole.trim_end_matches(TRAILING_PUNCT);
            if self.is_allowed(core) {
                return whole.to_string();
            }
            stripped.push(core.to_string());
            whole[core.len()..].to_string()
        });

        Scrubbed {
            text: out.into_owned(),
            stripped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CitationGuard {
        CitationGuard::new([
            "http://a",
            "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "file:///kb/notes.md",
        ])
    }

    #[test]
    fn test_allowed_links_untouched() {
        let text = "See [A](http://a) and [Rust](https://en.wikipedia.org/wiki/Rust_(programming_language)).";
        let out = guard().scrub(text);
        assert_eq!(out.text, text);
        assert!(out.stripped.is_empty());
    }

    #[test]
    fn test_fabricated_markdown_link_becomes_label() {
        let out = guard().scrub("Per [Fake Study](https://fake.example/paper) it works.");
        assert_eq!(out.text, "Per Fake Study it works.");
        assert_eq!(out.stripped, vec!["https://fake.example/paper".to_string()]);
    }

    #[test]
    fn test_bare_urls_keep_trailing_punctuation() {
        let out = guard().scrub("Sources: http://a, https://evil.example/x. Local file:///kb/notes.md");
        assert_eq!(out.text, "Sources: http://a, . Local file:///kb/notes.md");
        assert_eq!(out.stripped, vec!["https://evil.example/x".to_string()]);
    }

    #[test]
    fn test_mixed_case_scheme_and_www_hosts_are_checked() {
        let out = CitationGuard::new(["http://a"])
            .scrub("See [Fake](HTTPS://evil.example/paper) and Https://evil.example/x and www.evil.example/y");
        assert!(!out.text.contains("evil.example"), "{}", out.text);
        assert_eq!(out.text, "See Fake and  and ");
        assert_eq!(
            out.stripped,
            vec![
                "HTTPS://evil.example/paper".to_string(),
                "Https://evil.example/x".to_string(),
                "www.evil.example/y".to_string(),
            ]
        );
    }

    #[test]
    fn test_known_url_in_other_spelling_is_kept() {
        let guard = CitationGuard::new(["https://www.rust-lang.org/learn"]);
        let text = "Docs: HTTPS://www.rust-lang.org/learn and [book](www.rust-lang.org/learn).";
        let out = guard.scrub(text);
        assert_eq!(out.text, text);
        assert!(out.stripped.is_empty());
    }

    #[test]
    fn test_no_urls_is_noop() {
        let out = CitationGuard::default().scrub("plain text [label](#anchor)");
        assert_eq!(out.text, "plain text [label](#anchor)");
        assert!(out.stripped.is_empty());
    }
}
