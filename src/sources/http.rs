//! 适配器共用的 HTTP 工具：客户端构建、HTML 转文本、文本截断

use std::time::Duration;

use html2text::from_read;
use reqwest::Client;

use crate::core::error::SourceError;

const USER_AGENT: &str = concat!("forager/", env!("CARGO_PKG_VERSION"), " (research agent)");

/// 构建带超时与 User-Agent 的客户端；每个适配器持有一个，由构造函数注入
pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
pub fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 将 HTML 片段转为可读文本（API 返回的摘要常带 <span class="searchmatch"> 等标记或 &#39; 等实体）
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return html.trim().to_string();
    }
    match from_read(html.as_bytes(), 200) {
        Ok(text) if !text.trim().is_empty() => text.split_whitespace().collect::<Vec<_>>().join(" "),
        _ => strip_html_tags(html),
    }
}

/// 检查状态码，429 归为限流
pub fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        return Err(SourceError::RateLimited);
    }
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(
            strip_html_tags("<span class=\"searchmatch\">Rust</span> is   a <b>language</b>"),
            "Rust is a language"
        );
    }

    #[test]
    fn test_html_to_text_plain_passthrough() {
        assert_eq!(html_to_text("  plain text "), "plain text");
        let t = html_to_text("<p>Hello <b>world</b></p>");
        assert!(t.contains("Hello"));
        assert!(t.contains("world"));
        assert!(!t.contains("<p>"));
    }
}
